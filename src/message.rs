use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::citations::Citation;
use crate::types::Role;

/// Where a reasoning step sits in the answering workflow. The service
/// reports the short wire names (`thinking`, `decision`, `action`,
/// `response`); both spellings deserialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    #[serde(alias = "thinking")]
    IntentAnalysis,
    #[serde(alias = "decision")]
    RetrievalDecision,
    #[serde(alias = "action")]
    ToolInvocation,
    #[serde(alias = "response")]
    ResponseGeneration,
}

/// One reasoning step of an assistant turn. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub kind: StepKind,
    pub content: String,
    /// Seconds spent on this step.
    pub duration: Option<f64>,
    /// Cumulative seconds for the whole turn, reported on the last step.
    pub total_elapsed: Option<f64>,
}

/// One message in a mode's conversation history.
///
/// Owned exclusively by the session of the mode that created it; content
/// is mutable only while `streaming` is true, and reasoning steps are
/// meaningful only on assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub steps: Vec<ReasoningStep>,
    /// Pass-one (vector similarity) citations.
    pub citations: Vec<Citation>,
    /// Pass-two (rerank) citations, when the rerank pass ran.
    pub rerank_citations: Option<Vec<Citation>>,
    pub streaming: bool,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ConversationMessage {
    fn new(role: Role, content: String, streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            steps: Vec::new(),
            citations: Vec::new(),
            rerank_citations: None,
            streaming,
            error: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), false)
    }

    /// The empty assistant message a submission inserts before the stream
    /// produces anything.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), true)
    }
}
