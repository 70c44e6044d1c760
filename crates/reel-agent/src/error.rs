//! Error types for reel-agent

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using reel-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end an agent run.
///
/// Recoverable problems (bad tool arguments, failed renders) never show up
/// here; they are fed back into the conversation as tool results.
#[derive(Error, Debug)]
pub enum Error {
    /// The model endpoint could not be reached or rejected the request
    #[error("could not reach the model: {0}")]
    Model(#[from] reel_ai::Error),

    /// The model response stream failed part-way
    #[error("could not reach the model: {0}")]
    ModelStream(String),

    /// The iteration budget ran out before a successful render
    #[error("ran out of iterations: {iterations}/{max} used without a successful render")]
    BudgetExhausted { iterations: u32, max: u32 },

    /// The model named an operation outside the fixed set
    #[error("model requested unknown operation '{0}'")]
    UnknownOperation(String),

    /// The model kept answering in free text while tool usage was required
    #[error("model answered without a tool call {consecutive} times in a row (iteration {iteration})")]
    NonCompliant { iteration: u32, consecutive: u32 },

    /// Another run holds the working directory
    #[error("working directory {} is in use by another run (lock file {})", .dir.display(), .lock.display())]
    WorkspaceBusy { dir: PathBuf, lock: PathBuf },

    /// Filesystem failure outside of tool execution
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run log (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came from talking to the model
    pub fn is_model_failure(&self) -> bool {
        matches!(self, Error::Model(_) | Error::ModelStream(_))
    }
}

/// Failure of a single operation, reported back to the model as data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_messages_are_distinct() {
        let exhausted = Error::BudgetExhausted {
            iterations: 25,
            max: 25,
        }
        .to_string();
        let model = Error::ModelStream("HTTP 401".into()).to_string();
        assert!(exhausted.starts_with("ran out of iterations"));
        assert!(model.starts_with("could not reach the model"));
    }

    #[test]
    fn test_is_model_failure() {
        assert!(Error::Model(reel_ai::Error::InvalidApiKey).is_model_failure());
        assert!(!Error::UnknownOperation("x".into()).is_model_failure());
    }
}
