//! Retrieval testing against a single knowledge base.
//!
//! Lets the settings UI probe what a query would retrieve, without the
//! generation stage of the chat pipeline.

use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::stream::client::HTTP;
use crate::types::{ApiError, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("recall service error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type RecallResult<T> = Result<T, RecallError>;

#[derive(Clone, Debug, Serialize)]
pub struct RecallRequest {
    pub query: String,
    pub top_k: u32,
    pub score_threshold: f32,
}

impl RecallRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 3,
            score_threshold: 0.0,
        }
    }
}

/// One hit of a recall test. Unlike chat citations there is never a
/// rerank score here; recall tests only exercise the vector pass.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RecallHit {
    #[serde(rename = "chunkId", default)]
    pub chunk_id: Option<String>,
    pub score: f32,
    pub content: String,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "kbName", default)]
    pub kb_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecallOutcome {
    pub results: Vec<RecallHit>,
    /// Seconds the service spent answering the probe.
    pub query_time: f64,
}

#[derive(Clone, Debug)]
pub struct RecallClient {
    config: ApiConfig,
}

impl RecallClient {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }

    pub async fn test(&self, kb_id: &str, request: &RecallRequest) -> RecallResult<RecallOutcome> {
        let url = format!("{}/knowledge-bases/{kb_id}/recall", self.config.base_url);
        let response = HTTP.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecallError::Status { status, body });
        }

        let envelope: Envelope<RecallOutcome> = response.json().await?;
        Ok(envelope.into_data()?)
    }
}
