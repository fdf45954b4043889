//! Error types for nettune

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for usage errors (matches clap's own usage exit code)
pub const EXIT_USAGE: i32 = 2;

/// Exit code for every other fatal error
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Error)]
pub enum TuneError {
    /// DNS argument is neither a known provider nor an address list
    #[error("Unknown DNS provider '{0}' (expected cloudflare, quad9, google or a comma-separated IP list)")]
    UnknownDnsProvider(String),
    /// Not running with administrative rights
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Writing a persisted file failed
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Command execution failed
    #[error("Command '{cmd}' failed{}: {stderr}", code_suffix(.code))]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },
    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

impl TuneError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TuneError::UnknownDnsProvider(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// Whether this is a usage error (raised before any state is touched)
    pub fn is_usage(&self) -> bool {
        self.exit_code() == EXIT_USAGE
    }
}

impl From<serde_json::Error> for TuneError {
    fn from(error: serde_json::Error) -> Self {
        TuneError::Parse(error.to_string())
    }
}

pub type TuneResult<T> = Result<T, TuneError>;
