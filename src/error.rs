//! # Error Types
//!
//! Every failure a user action can run into is one variant of
//! [`VisualizerError`]. None of them are fatal: the web layer turns each into a
//! visible message scoped to the request that caused it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisualizerError {
    /// The dataset sample handed to the shape detector was empty.
    #[error("the dataset is empty; upload a file with at least one record")]
    EmptyDataset,

    /// A sampled record was not a JSON object.
    #[error("record {index} is not a JSON object (found {found})")]
    InvalidRecord { index: usize, found: &'static str },

    #[error("failed to load tokenizer '{identifier}': {reason}")]
    TokenizerLoad { identifier: String, reason: String },

    /// A dataset line was not valid JSON. `line` is 1-based.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("tokenization failed: {0}")]
    Encode(String),

    #[error("tokenizer repository error: {0}")]
    Repository(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The blocking worker pool failed to run a job.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisualizerError {
    pub fn tokenizer_load(identifier: &str, reason: impl ToString) -> Self {
        VisualizerError::TokenizerLoad {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Short name of a JSON value's type, used in error messages.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
