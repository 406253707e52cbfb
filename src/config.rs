use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1";

/// Where the answering service lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Reads `KBCHAT_API_BASE`, falling back to the local dev server.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let base_url =
            std::env::var("KBCHAT_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(base_url)
    }
}

/// Rerank pass configuration; present only when the second retrieval pass
/// is enabled for the mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankSettings {
    pub model_id: Option<String>,
    pub score_threshold: f32,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            model_id: None,
            score_threshold: 0.0,
        }
    }
}

/// Retrieval configuration scoped to one conversation mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeSettings {
    pub kb_ids: Vec<String>,
    pub top_k: u32,
    pub score_threshold: f32,
    pub model_id: Option<String>,
    pub rerank: Option<RerankSettings>,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            kb_ids: Vec::new(),
            top_k: 3,
            score_threshold: 0.3,
            model_id: None,
            rerank: None,
        }
    }
}
