use serde::Deserialize;
use serde_json::Value;

use super::decoder::Frame;
use crate::citations::Citation;
use crate::message::StepKind;

/// A reasoning-step event.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ThoughtPayload {
    pub step: StepKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub duration: Option<f64>,
    /// Cumulative turn duration, present on the last step.
    #[serde(default)]
    pub cost: Option<f64>,
}

/// A retrieval-result event. `original_citations` is non-empty only when
/// the service reranked, in which case it holds the pre-rerank list.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RetrievalPayload {
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub original_citations: Vec<Citation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct AnswerPayload {
    content: String,
}

/// A terminal event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DonePayload {
    #[serde(default)]
    pub usage: Option<Value>,
}

/// The closed set of semantic stream events.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Thought(ThoughtPayload),
    Retrieval(RetrievalPayload),
    AnswerDelta(String),
    Done(DonePayload),
    Error(String),
}

/// Maps a frame to its event kind.
///
/// An explicit recognized tag is authoritative; anything else falls back
/// to payload shape, in priority order: error shape, `step`, `citations`,
/// string `content`, `usage` or empty object. Returns `Ok(None)` for a
/// well-formed payload matching no rule (the dispatcher drops it) and
/// `Err` for malformed JSON or a payload contradicting its tag.
pub fn classify(frame: &Frame) -> Result<Option<StreamEvent>, serde_json::Error> {
    let value: Value = serde_json::from_str(&frame.data)?;

    if let Some(tag) = frame.tag.as_deref() {
        match tag {
            "thought" => {
                return Ok(Some(StreamEvent::Thought(serde_json::from_value(value)?)));
            }
            "rag" => {
                return Ok(Some(StreamEvent::Retrieval(serde_json::from_value(value)?)));
            }
            "answer" => {
                let payload: AnswerPayload = serde_json::from_value(value)?;
                return Ok(Some(StreamEvent::AnswerDelta(payload.content)));
            }
            "done" => {
                return Ok(Some(StreamEvent::Done(serde_json::from_value(value)?)));
            }
            "error" => return Ok(Some(StreamEvent::Error(error_text(&value)))),
            _ => {}
        }
    }

    classify_by_shape(value)
}

fn classify_by_shape(value: Value) -> Result<Option<StreamEvent>, serde_json::Error> {
    let Value::Object(map) = &value else {
        return Ok(None);
    };

    if is_error_shaped(map) {
        return Ok(Some(StreamEvent::Error(error_text(&value))));
    }
    if map.contains_key("step") {
        return Ok(Some(StreamEvent::Thought(serde_json::from_value(value)?)));
    }
    if map.contains_key("citations") {
        return Ok(Some(StreamEvent::Retrieval(serde_json::from_value(value)?)));
    }
    if let Some(Value::String(content)) = map.get("content") {
        return Ok(Some(StreamEvent::AnswerDelta(content.clone())));
    }
    if map.contains_key("usage") || map.is_empty() {
        return Ok(Some(StreamEvent::Done(serde_json::from_value(value)?)));
    }

    Ok(None)
}

/// An `error` string field signals failure; so does a payload that is
/// nothing but a `message` (the service's error wrapper).
fn is_error_shaped(map: &serde_json::Map<String, Value>) -> bool {
    map.get("error").is_some_and(Value::is_string)
        || (map.len() == 1 && map.get("message").is_some_and(Value::is_string))
}

fn error_text(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .unwrap_or("answering service reported an error")
        .to_string()
}
