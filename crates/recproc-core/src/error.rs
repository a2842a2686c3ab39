//! Error types for recproc-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for recproc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running a transformer
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// A script file could not be read or evaluated
    #[error("failed to load script '{}': {message}", .path.display())]
    ScriptLoad {
        /// Script that failed
        path: PathBuf,
        /// Reader or engine error
        message: String,
    },

    /// The configured target did not resolve to a function
    #[error("target '{target}' {reason}")]
    TargetNotCallable {
        /// Configured target name
        target: String,
        /// What the name resolved to instead
        reason: String,
    },

    /// Record batch could not be serialized before dispatch
    #[error("failed to encode record batch: {message}")]
    Encode {
        /// Serializer or engine error
        message: String,
    },

    /// External process could not be started
    #[error("failed to launch '{command}': {source}")]
    Launch {
        /// Flattened command line
        command: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// External process exceeded its deadline and was killed
    #[error("process timed out after {timeout:?}{}", render_diagnostics(.diagnostics))]
    Timeout {
        /// Configured deadline
        timeout: Duration,
        /// stderr captured before the process was killed
        diagnostics: String,
    },

    /// The process or script signaled a runtime error
    #[error("execution failed: {message}{}", render_diagnostics(.diagnostics))]
    Execution {
        /// Failure description (exit status, thrown value, ...)
        message: String,
        /// Captured stderr, empty for scripts
        diagnostics: String,
    },

    /// The script returned something that is neither text nor a batch
    #[error("invalid result type: expected JSON text or an array of objects, got {found}")]
    ResultShape {
        /// Description of the returned value
        found: String,
    },

    /// Result text could not be parsed into a record batch
    #[error("failed to decode record batch: {source}{}", render_diagnostics(.diagnostics))]
    Decode {
        /// JSON parse error
        #[source]
        source: serde_json::Error,
        /// Captured stderr, empty for scripts
        diagnostics: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage at which a transformer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input batch could not be serialized
    Encode,
    /// Backend construction failed
    Config,
    /// External process could not be started
    Launch,
    /// External process exceeded its deadline
    Timeout,
    /// Runtime failure inside the process or script
    Execution,
    /// Returned value had the wrong shape
    ResultShape,
    /// Returned text was not a valid batch
    Decode,
}

impl ErrorKind {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Config => "config",
            Self::Launch => "launch",
            Self::Timeout => "timeout",
            Self::Execution => "execution",
            Self::ResultShape => "result_shape",
            Self::Decode => "decode",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error by the stage that produced it
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParse(_)
            | Self::ConfigInvalid { .. }
            | Self::ScriptLoad { .. }
            | Self::TargetNotCallable { .. }
            | Self::Io(_) => ErrorKind::Config,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::Launch { .. } => ErrorKind::Launch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::ResultShape { .. } => ErrorKind::ResultShape,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Captured diagnostic text, if the failing stage produced any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Timeout { diagnostics, .. }
            | Self::Execution { diagnostics, .. }
            | Self::Decode { diagnostics, .. }
                if !diagnostics.is_empty() =>
            {
                Some(diagnostics.as_str())
            }
            _ => None,
        }
    }
}

fn render_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": stderr: {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_includes_stderr() {
        let err = Error::Timeout {
            timeout: Duration::from_secs(1),
            diagnostics: "still working...\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "process timed out after 1s: stderr: still working..."
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_empty_diagnostics_are_omitted() {
        let err = Error::Execution {
            message: "exit status: 3".to_string(),
            diagnostics: String::new(),
        };
        assert_eq!(err.to_string(), "execution failed: exit status: 3");
        assert!(err.diagnostics().is_none());
    }

    #[test]
    fn test_config_errors_share_a_kind() {
        let err = Error::TargetNotCallable {
            target: "transform".to_string(),
            reason: "is not defined".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "target 'transform' is not defined");
        assert_eq!(ErrorKind::ResultShape.to_string(), "result_shape");
    }
}
