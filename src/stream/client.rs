use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::decoder::FrameDecoder;
use super::event::{DonePayload, RetrievalPayload, StreamEvent, ThoughtPayload, classify};
use crate::config::ApiConfig;
use crate::types::{ApiError, Envelope, WireMessage};

/// One connection pool for every call the engine makes.
pub(crate) static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("answering service error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Request body for `/chat/completions`.
#[derive(Clone, Debug, Serialize)]
pub struct AnswerRequest {
    pub messages: Vec<WireMessage>,
    pub kb_ids: Vec<String>,
    pub stream: bool,
    pub mode: &'static str,
    pub top_k: u32,
    pub score_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_model_id: Option<String>,
}

/// The handler set for one stream. Every decoded frame is delivered to
/// exactly one of these callbacks, in arrival order. After `on_done` or
/// `on_error` fires, no further callback is invoked for the stream.
pub trait EventSink: Send {
    fn on_thought(&mut self, thought: ThoughtPayload);
    fn on_retrieval(&mut self, retrieval: RetrievalPayload);
    fn on_delta(&mut self, delta: &str);
    fn on_done(&mut self, done: DonePayload);
    fn on_error(&mut self, message: &str);
}

/// Reads byte chunks, decodes frames, and dispatches classified events to
/// the sink until a terminal event, the end of the stream, or
/// cancellation.
///
/// Malformed payloads are logged and dropped without stalling the stream.
/// If the stream ends without a terminal frame, a `done` event is
/// synthesized so the caller always reaches a terminal state. A
/// cancellation signal stops the pump without any terminal callback; the
/// session already cleaned up when it sent the signal.
pub async fn pump<S, B, E>(chunks: S, mut cancel: oneshot::Receiver<()>, sink: &mut dyn EventSink)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut decoder = FrameDecoder::new();
    let mut cancellable = true;

    loop {
        tokio::select! {
            res = &mut cancel, if cancellable => {
                if res.is_ok() {
                    tracing::debug!("stream cancelled by caller");
                    return;
                }
                // Sender dropped without signalling; keep pumping.
                cancellable = false;
            }
            item = chunks.next() => match item {
                Some(Ok(chunk)) => {
                    for frame in decoder.feed(chunk.as_ref()) {
                        match classify(&frame) {
                            Ok(Some(StreamEvent::Thought(thought))) => sink.on_thought(thought),
                            Ok(Some(StreamEvent::Retrieval(retrieval))) => {
                                sink.on_retrieval(retrieval)
                            }
                            Ok(Some(StreamEvent::AnswerDelta(delta))) => sink.on_delta(&delta),
                            Ok(Some(StreamEvent::Done(done))) => {
                                sink.on_done(done);
                                return;
                            }
                            Ok(Some(StreamEvent::Error(message))) => {
                                sink.on_error(&message);
                                return;
                            }
                            Ok(None) => {
                                tracing::debug!(tag = ?frame.tag, "dropping unrecognized frame")
                            }
                            Err(err) => {
                                tracing::warn!(%err, "dropping frame with malformed payload")
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::error!(%err, "stream read failed");
                    sink.on_error(&format!("stream read failed: {err}"));
                    return;
                }
                None => break,
            }
        }
    }

    // The transport ended without a terminal frame; close the turn out so
    // the session cannot stay stuck in-progress.
    sink.on_done(DonePayload::default());
}

#[derive(Serialize)]
struct RewriteRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct RewriteResponse {
    rewritten_query: String,
}

/// HTTP client for the answering service.
#[derive(Clone, Debug)]
pub struct AnswerClient {
    config: ApiConfig,
}

impl AnswerClient {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }

    /// Opens the answer stream and pumps it into the sink. Transport
    /// failures and non-success statuses surface through `on_error`,
    /// never as a return value, so one code path handles every outcome.
    pub async fn stream_answer(
        &self,
        request: &AnswerRequest,
        cancel: oneshot::Receiver<()>,
        sink: &mut dyn EventSink,
    ) {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = HTTP
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(%err, "failed to reach answering service");
                sink.on_error(&format!("request failed: {err}"));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            sink.on_error(&format!("answering service error {status}: {body}"));
            return;
        }

        pump(response.bytes_stream(), cancel, sink).await;
    }

    /// Asks the service to rewrite a query for better retrieval.
    pub async fn rewrite(&self, query: &str) -> ClientResult<String> {
        let url = format!("{}/chat/rewrite", self.config.base_url);
        let response = HTTP.post(&url).json(&RewriteRequest { query }).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let envelope: Envelope<RewriteResponse> = response.json().await?;
        Ok(envelope.into_data()?.rewritten_query)
    }
}
