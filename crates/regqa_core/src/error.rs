use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by every layer. Parse/store problems are handled locally
/// (skip-and-continue), so they have no code here; index and generation failures
/// propagate to the boundary.
pub mod codes {
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG_LOAD_FAILED";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    pub const REGULATION_READ_FAILED: &str = "REGULATION_READ_FAILED";
    pub const CHUNK_STORE_FAILED: &str = "CHUNK_STORE_FAILED";

    pub const DB_OPEN_FAILED: &str = "DB_OPEN_FAILED";
    pub const DB_MIGRATION_FAILED: &str = "DB_MIGRATION_FAILED";
    pub const DB_TX_FAILED: &str = "DB_TX_FAILED";

    pub const INDEX_UNAVAILABLE: &str = "INDEX_UNAVAILABLE";
    pub const INDEX_BUILD_FAILED: &str = "INDEX_BUILD_FAILED";
    pub const INDEX_NO_CHUNKS: &str = "INDEX_NO_CHUNKS";
    pub const INDEX_NOT_READY: &str = "INDEX_NOT_READY";
    pub const EMBEDDING_SPACE_MISMATCH: &str = "EMBEDDING_SPACE_MISMATCH";

    pub const EMBEDDINGS_FAILED: &str = "EMBEDDINGS_FAILED";
    pub const RETRIEVAL_EMPTY_QUESTION: &str = "RETRIEVAL_EMPTY_QUESTION";
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";

    pub const OLLAMA_URL_INVALID: &str = "OLLAMA_URL_INVALID";
    pub const OLLAMA_UNREACHABLE: &str = "OLLAMA_UNREACHABLE";
    pub const OLLAMA_UNHEALTHY: &str = "OLLAMA_UNHEALTHY";
}

/// Single structured error shape used across the parser, index, generation and CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = self.details.as_deref() {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
