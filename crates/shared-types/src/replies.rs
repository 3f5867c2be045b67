//! # Reply Envelopes
//!
//! A successful reply is the bare store result. A failed reply is
//! `{"error": "<message>"}`. Exactly one of the two is sent per request.

use serde::{Deserialize, Serialize};

/// Error Envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    /// Build an error reply from anything displayable.
    pub fn new(message: impl ToString) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Empty success marker returned for deletes. Encodes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {}

/// Requester-side view of a reply: either the error envelope or a payload.
///
/// The error variant is tried first and only matches a document whose sole
/// field is `error`, so store objects are never mistaken for errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Error(ErrorReply),
    Ok(T),
}

impl<T> Reply<T> {
    /// Convert into a `Result`, mapping the error envelope to its message.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Error(e) => Err(e.error),
        }
    }

    /// Whether this reply is the error envelope.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use serde_json::json;

    #[test]
    fn test_error_reply_shape() {
        let v = serde_json::to_value(ErrorReply::new("quota exceeded")).unwrap();
        assert_eq!(v, json!({"error": "quota exceeded"}));
    }

    #[test]
    fn test_deleted_is_empty_object() {
        assert_eq!(serde_json::to_string(&Deleted {}).unwrap(), "{}");
    }

    #[test]
    fn test_reply_distinguishes_error_from_object() {
        let err: Reply<Object> = serde_json::from_value(json!({"error": "boom"})).unwrap();
        assert_eq!(err.into_result(), Err("boom".to_string()));

        // An object that happens to carry an `error` field is still an object.
        let obj: Reply<Object> =
            serde_json::from_value(json!({"error": "x", "metadata": {"name": "a"}})).unwrap();
        assert!(!obj.is_error());
    }

    #[test]
    fn test_delete_reply_decodes() {
        let ok: Reply<Deleted> = serde_json::from_value(json!({})).unwrap();
        assert_eq!(ok, Reply::Ok(Deleted {}));
    }
}
