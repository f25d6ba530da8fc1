//! Error types for modrun
//!
//! This module defines the error type shared across the runtime. Uses
//! `thiserror` for `Display` and `Error` implementations.
//!
//! Extension points (command bodies, interceptors, factories) return
//! `anyhow::Result`; those failures are folded into [`RuntimeError`] at the
//! point where the runtime has to report them.

use thiserror::Error;

use crate::command::ModuleStatus;

/// The primary error type for modrun operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration-related errors (unreadable file, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No plugin matched the requested identity or type.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The plugin is registered but disabled.
    #[error("Plugin '{0}' is disabled")]
    Disabled(String),

    /// The command descriptor failed parameter parsing and cannot be dispatched.
    #[error("Invalid command '{identity}': {}", .problems.join("; "))]
    InvalidCommand {
        identity: String,
        problems: Vec<String>,
    },

    /// The implementation behind a descriptor could not be described or constructed.
    #[error("Instantiation error: {0}")]
    Instantiation(String),

    /// The command body failed while the module was running.
    #[error("Execution of '{identity}' failed: {message}")]
    Execution { identity: String, message: String },

    /// A module was asked to move between two states the lifecycle forbids.
    #[error("Invalid module transition: {from} -> {to}")]
    InvalidTransition { from: ModuleStatus, to: ModuleStatus },

    /// `run` was called without a tokio runtime to spawn onto.
    #[error("No async runtime available to execute modules")]
    NoRuntime,

    /// A bounded wait on a module handle elapsed.
    #[error("Timed out waiting for module '{0}'")]
    Timeout(String),

    /// The worker task executing a module panicked or was aborted.
    #[error("Module worker failed: {0}")]
    Join(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for modrun operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::Config("max_concurrent_modules must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_concurrent_modules must be > 0"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RuntimeError = io_err.into();
        assert!(matches!(err, RuntimeError::Io(_)));
    }

    #[test]
    fn test_invalid_command_lists_problems() {
        let err = RuntimeError::InvalidCommand {
            identity: "demo.Threshold".to_string(),
            problems: vec![
                "Invalid duplicate parameter: level".to_string(),
                "Invalid immutable parameter: mode".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("demo.Threshold"));
        assert!(msg.contains("duplicate parameter: level"));
        assert!(msg.contains("; Invalid immutable"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RuntimeError::InvalidTransition {
            from: ModuleStatus::Complete,
            to: ModuleStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Invalid module transition: COMPLETE -> RUNNING"
        );
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
