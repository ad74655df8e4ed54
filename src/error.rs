//! Error taxonomy for command invocations.
//!
//! Every variant terminates the invocation it was raised in. A poll that runs
//! out of time is not an error; see [`crate::poller::PollOutcome`].

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the engine while preparing or issuing a request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A parameter's raw value could not be coerced to its declared type.
    #[error("invalid value for '{field}': {reason} (got {raw:?})")]
    Validation {
        field: String,
        raw: String,
        reason: String,
    },

    /// A credential required to authenticate the request is absent.
    #[error("missing credential: {name}")]
    MissingCredential { name: String },

    /// The secret store itself failed (locked keychain, platform error).
    #[error("secret store error for {name}: {message}")]
    Secret { name: String, message: String },

    /// The HTTP exchange did not complete or returned a non-2xx status.
    #[error("{}", transport_message(status, message))]
    Transport {
        status: Option<u16>,
        message: String,
        body: Option<Value>,
    },

    #[error("provider not found: {0}")]
    UnknownProvider(String),

    #[error("command not found: {provider}.{command}")]
    UnknownCommand { provider: String, command: String },
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("request failed with status {}: {}", code, message),
        None => format!("request failed: {}", message),
    }
}

impl EngineError {
    pub fn validation(field: &str, raw: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_credential(name: &str) -> Self {
        Self::MissingCredential { name: name.to_string() }
    }

    /// HTTP status carried by a transport error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Parsed error body carried by a transport error.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Transport { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_error_names_field_and_raw_value() {
        let err = EngineError::validation("temperature", "warm", "not a number");
        let message = err.to_string();
        assert!(message.contains("temperature"));
        assert!(message.contains("\"warm\""));
    }

    #[test]
    fn test_transport_error_exposes_status_and_body() {
        let err = EngineError::Transport {
            status: Some(422),
            message: "Unprocessable Entity".to_string(),
            body: Some(json!({"message": "qty is required"})),
        };
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.body().and_then(|b| b.get("message")), Some(&json!("qty is required")));
        assert_eq!(err.to_string(), "request failed with status 422: Unprocessable Entity");
    }

    #[test]
    fn test_transport_error_without_status() {
        let err = EngineError::Transport {
            status: None,
            message: "connection refused".to_string(),
            body: None,
        };
        assert_eq!(err.status(), None);
        assert!(err.body().is_none());
        assert_eq!(err.to_string(), "request failed: connection refused");
    }

    #[test]
    fn test_non_transport_errors_have_no_status() {
        assert_eq!(EngineError::missing_credential("token").status(), None);
    }
}
