use serde::{Deserialize, Serialize};

/// One retrieval hit attached to an assistant message. Field names mirror
/// the service payload (camelCase file fields, snake_case kb fields).
///
/// `score` is the vector-similarity score from the first retrieval pass;
/// `rerank_score` is only present on citations that went through the
/// second pass. The two must never be folded into one number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub kb_id: Option<String>,
    #[serde(default)]
    pub kb_name: String,
    #[serde(rename = "fileId", default)]
    pub file_id: Option<String>,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub rerank_score: Option<f32>,
    #[serde(rename = "content", default)]
    pub snippet: Option<String>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}

/// The two retrieval passes for one answer, kept distinct.
///
/// The service reports the final list under `citations` and, when it
/// reranked, the pre-rerank list under `original_citations`. Here pass
/// one is always the vector-similarity list and pass two the reranked
/// list, whichever field they arrived in. Ordering inside each list is
/// preserved exactly as received; nothing is re-scored or de-duplicated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievalPasses {
    /// Pass one: vector-similarity results.
    pub vector: Vec<Citation>,
    /// Pass two: rerank results, when the rerank pass ran.
    pub rerank: Option<Vec<Citation>>,
}

impl RetrievalPasses {
    pub fn from_wire(citations: Vec<Citation>, original_citations: Vec<Citation>) -> Self {
        if original_citations.is_empty() {
            Self {
                vector: citations,
                rerank: None,
            }
        } else {
            Self {
                vector: original_citations,
                rerank: Some(citations),
            }
        }
    }

    pub fn is_reranked(&self) -> bool {
        self.rerank.is_some()
    }

    /// The list the UI shows first: rerank results when present,
    /// otherwise the vector results.
    pub fn display_primary(&self) -> &[Citation] {
        self.rerank.as_deref().unwrap_or(&self.vector)
    }

    /// The secondary "pre-rerank" list, only meaningful when a rerank
    /// pass ran.
    pub fn display_secondary(&self) -> Option<&[Citation]> {
        self.rerank.is_some().then_some(self.vector.as_slice())
    }
}
