use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of conversation as the answering service expects it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Standard `{code, message, data}` envelope around every non-streaming
/// endpoint of the service.
#[derive(Clone, Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("service error {code}: {message}")]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

impl<T> Envelope<T> {
    /// Succeeds only for a 200 envelope; the payload is not required.
    pub fn ok(self) -> Result<(), ApiError> {
        if self.code == 200 {
            Ok(())
        } else {
            Err(ApiError {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Succeeds only for a 200 envelope that actually carries data.
    pub fn into_data(self) -> Result<T, ApiError> {
        let code = self.code;
        match (code, self.data) {
            (200, Some(data)) => Ok(data),
            (200, None) => Err(ApiError {
                code,
                message: "response missing data".to_string(),
            }),
            _ => Err(ApiError {
                code,
                message: self.message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwraps_success() {
        let envelope: Envelope<String> =
            serde_json::from_str(r#"{"code":200,"message":"success","data":"hello"}"#)
                .expect("valid envelope");
        assert_eq!(envelope.into_data().unwrap(), "hello");
    }

    #[test]
    fn envelope_surfaces_failure_code() {
        let envelope: Envelope<String> =
            serde_json::from_str(r#"{"code":40401,"message":"not found"}"#)
                .expect("valid envelope");
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.code, 40401);
        assert_eq!(err.message, "not found");
    }

    #[test]
    fn envelope_ok_ignores_missing_data() {
        let envelope: Envelope<String> =
            serde_json::from_str(r#"{"code":200,"message":"accepted"}"#).expect("valid envelope");
        assert!(envelope.ok().is_ok());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let msg = WireMessage::new(Role::Assistant, "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
