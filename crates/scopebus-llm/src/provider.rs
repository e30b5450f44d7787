//! Query backend trait

use crate::types::QueryRequest;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query error types
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request failed: {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// One slow request/response call, e.g. a vision or language model.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Run the request to completion and return the response text.
    async fn query(&self, request: QueryRequest) -> QueryResult<String>;
}
