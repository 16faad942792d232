use serde::Serialize;
use utoipa::ToSchema;

/// Failures at the edges of the engine. The calculations themselves never
/// fail; these cover input the host hands over before anything is computed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidConfig {
        key: String,
        value: String,
        reason: String,
    },

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            what: what.into(),
            source,
        }
    }

    pub fn encode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            what: what.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => codes::VALIDATION_FAILED,
            Self::InvalidConfig { .. } => codes::INVALID_CONFIG,
            Self::Io { .. } => codes::IO_FAILED,
            Self::Decode { .. } => codes::DECODE_FAILED,
            Self::Encode { .. } => codes::ENCODE_FAILED,
        }
    }
}

/// Error shape printed by hosts. Machine-readable first: an agent reading it
/// should be able to tell which input to fix.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorReport {
    /// Machine-readable error code (e.g. "validation_failed", "invalid_config")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which field or key caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ErrorReport {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            field: None,
            received: None,
            docs_hint: None,
        }
    }

    pub fn with_docs_hint(mut self, hint: impl Into<String>) -> Self {
        self.docs_hint = Some(hint.into());
        self
    }
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        let mut report = ErrorReport::new(err.code(), err.to_string());
        match err {
            EngineError::Validation { field, .. } => {
                report.field = Some(field.clone());
            }
            EngineError::InvalidConfig { key, value, .. } => {
                report.field = Some(key.clone());
                report.received = Some(serde_json::Value::String(value.clone()));
                report.docs_hint =
                    Some("Unset the variable to fall back to the built-in default.".to_string());
            }
            EngineError::Io { path, .. } => {
                report.field = Some(path.clone());
            }
            EngineError::Decode { what, .. } | EngineError::Encode { what, .. } => {
                report.field = Some(what.clone());
            }
        }
        report
    }
}

impl From<EngineError> for ErrorReport {
    fn from(err: EngineError) -> Self {
        ErrorReport::from(&err)
    }
}

/// Error codes shared by the engine and its hosts
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INVALID_CONFIG: &str = "invalid_config";
    pub const DECODE_FAILED: &str = "decode_failed";
    pub const ENCODE_FAILED: &str = "encode_failed";
    pub const IO_FAILED: &str = "io_failed";
}
