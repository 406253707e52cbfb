/// Streaming answer pipeline.
///
/// This module turns the answering service's event stream into session
/// mutations:
///
/// - `decoder` - reassembles `(tag, payload)` frames from raw byte chunks
/// - `event` - classifies frames into the closed set of stream events
/// - `client` - opens the stream, pumps frames to a handler set, and
///   guarantees every stream reaches a terminal event
///
/// # Usage
///
/// ```rust,no_run
/// use kbchat::stream::AnswerClient;
///
/// let client = AnswerClient::from_env();
/// ```
pub mod client;
pub mod decoder;
pub mod event;

// Re-export main types
pub use client::{AnswerClient, AnswerRequest, ClientError, ClientResult, EventSink, pump};
pub use decoder::{Frame, FrameDecoder};
pub use event::{
    DonePayload, RetrievalPayload, StreamEvent, ThoughtPayload, classify,
};
