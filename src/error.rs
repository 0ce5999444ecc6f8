use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A request field is missing or malformed. Raised before any process is spawned.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The external utility exited with a non-zero status.
    #[error("{program} exited with status {}: {stderr}", status_label(*.status))]
    Execution {
        program: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The utility reported success but the expected artifact is absent.
    #[error("utility succeeded but output file {} is missing", .0.display())]
    MissingOutput(PathBuf),

    #[error("could not find executable {0}")]
    ExecutableNotFound(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Captured standard error of a failed invocation, verbatim.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::Execution { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn status_label(status: Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}
