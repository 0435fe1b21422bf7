//! Error types for the action composer
//!
//! Three families, mirroring where a failure originates:
//! - `ComposerError`: a request the state machine refuses (wrong mode,
//!   invalid slot input, unknown capability)
//! - `BackendError`: a collaborator call failed. These never escape the
//!   composer; they are converted into notices or error results.
//! - `ConfigError`: configuration could not be loaded

use thiserror::Error;

use crate::composer::ComposerMode;

/// Errors returned by composer operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposerError {
    #[error("cannot {action} while the composer is {mode}")]
    InvalidTransition {
        action: &'static str,
        mode: ComposerMode,
    },

    #[error("no permitted capability named '{0}'")]
    UnknownCapability(String),

    #[error("entity '{0}' is not among the current results")]
    UnknownEntity(String),

    #[error("no suggestion with id {0}")]
    UnknownSuggestion(u64),

    #[error("slot '{slot}': {message}")]
    Validation { slot: String, message: String },

    #[error("slot '{slot}' expects {expected} input")]
    WrongSlotKind { slot: String, expected: String },

    #[error("'{capability}' still needs values for {missing:?}")]
    Incomplete {
        capability: String,
        missing: Vec<String>,
    },

    #[error("an execution request is already in flight")]
    ExecutionInFlight,

    #[error("an upload is already in progress for slot '{0}'")]
    UploadInFlight(String),
}

impl ComposerError {
    pub fn validation(slot: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            slot: slot.into(),
            message: message.into(),
        }
    }

    /// Whether the error should be shown inline next to the active slot.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::WrongSlotKind { .. } | Self::Incomplete { .. }
        )
    }
}

/// Failures reported by collaborator services.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

impl BackendError {
    /// 401/403 from the gateway: an authorization rejection.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_errors() {
        assert!(ComposerError::validation("amount", "not a number").is_inline());
        assert!(!ComposerError::ExecutionInFlight.is_inline());
    }

    #[test]
    fn authorization_status_is_detected() {
        let err = BackendError::Status {
            service: "gateway",
            status: 403,
            body: "forbidden".into(),
        };
        assert!(err.is_authorization());
        assert!(!BackendError::Rejected("nope".into()).is_authorization());
    }

    #[test]
    fn transition_message_names_mode() {
        let err = ComposerError::InvalidTransition {
            action: "confirm",
            mode: ComposerMode::Idle,
        };
        assert_eq!(err.to_string(), "cannot confirm while the composer is idle");
    }
}
