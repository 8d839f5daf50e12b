//! Error types for srcmap
//!
//! "No debug information" is never an error: resolvers return `None` for it.
//! Everything here means the debugger, the session, or the caller misbehaved.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for srcmap
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error("Failed to start debugger: {0}")]
    Spawn(String),

    #[error("A command is already pending on this session; wait for it to finish")]
    SessionBusy,

    #[error("Debugger session terminated: {0}")]
    SessionTerminated(String),

    #[error("Command '{command}' timed out after {secs} seconds; the session is no longer usable")]
    CommandTimeout { command: String, secs: u64 },

    // === Debugger Output Errors ===
    #[error("Debugger rejected '{command}': {message}")]
    CommandFailed { command: String, message: String },

    #[error("Unexpected debugger output for {what}: {detail}")]
    ParseFailure { what: String, detail: String },

    // === Input Errors ===
    #[error("Invalid address '{0}': expected a hexadecimal program counter")]
    InvalidAddress(String),

    #[error("Invalid source line: {0}")]
    InvalidLine(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse failure for the named kind of debugger output
    pub fn parse_failure(what: &str, detail: impl Into<String>) -> Self {
        Self::ParseFailure {
            what: what.to_string(),
            detail: detail.into(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: &str, message: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the session that produced this error must be recreated
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Self::Spawn(_) | Self::SessionTerminated(_) | Self::CommandTimeout { .. }
        )
    }
}

/// Serializable error for bridge replies
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeError {
    pub code: String,
    pub message: String,
}

impl BridgeError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<&Error> for BridgeError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::Spawn(_) => "SPAWN_FAILED",
            Error::SessionBusy => "SESSION_BUSY",
            Error::SessionTerminated(_) => "SESSION_TERMINATED",
            Error::ParseFailure { .. } => "PARSE_FAILURE",
            Error::CommandTimeout { .. } => "TIMEOUT",
            Error::CommandFailed { .. } => "COMMAND_FAILED",
            Error::InvalidAddress(_) | Error::InvalidLine(_) => "INVALID_REQUEST",
            _ => "INTERNAL_ERROR",
        };

        Self::new(code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_codes() {
        assert_eq!(BridgeError::from(&Error::SessionBusy).code, "SESSION_BUSY");
        assert_eq!(
            BridgeError::from(&Error::parse_failure("info symbol", "no marker")).code,
            "PARSE_FAILURE"
        );
        assert_eq!(
            BridgeError::from(&Error::CommandTimeout {
                command: "-data-disassemble".into(),
                secs: 3
            })
            .code,
            "TIMEOUT"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::SessionTerminated("gone".into()).is_fatal_to_session());
        assert!(!Error::SessionBusy.is_fatal_to_session());
        assert!(!Error::command_failed("x", "y").is_fatal_to_session());
    }
}
