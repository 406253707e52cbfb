//! Client-side engine for a knowledge-base chat UI.
//!
//! The core is the streaming answer pipeline: it opens a long-lived event
//! stream from the answering service, reassembles frames from raw bytes,
//! classifies them, routes them to the conversation session that opened
//! the stream, throttles progressive rendering, and merges two-stage
//! retrieval citations. Two sessions run independently (direct retrieval
//! and agent-guided); cancelling or erroring one never disturbs the
//! other.
//!
//! The ingestion workflow, retrieval testing, and session persistence are
//! loosely-coupled collaborators living in their own modules.

pub mod citations;
pub mod config;
pub mod ingest;
pub mod message;
pub mod persist;
pub mod recall;
pub mod session;
pub mod stream;
pub mod types;

pub use citations::{Citation, RetrievalPasses};
pub use config::{ApiConfig, ModeSettings, RerankSettings};
pub use message::{ConversationMessage, ReasoningStep, StepKind};
pub use session::{ChatMode, ChatSessions, SessionController};
pub use stream::{AnswerClient, AnswerRequest};
pub use types::{Role, WireMessage};

/// Installs the process-wide tracing subscriber. Call once at startup;
/// later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}
