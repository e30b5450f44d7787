//! Error types for Scopebus

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Required frame data was not supplied. This is a wiring fault and is
    /// always surfaced to the caller.
    #[error("{pipeline} requires video input")]
    MissingInput { pipeline: String },

    #[error("frame shape mismatch: expected {expected:?}, got {actual:?} at index {index}")]
    ShapeMismatch {
        index: usize,
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("invalid port {0}: must be within 1024-65535")]
    InvalidPort(u32),

    #[error("transport error during {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing_input(pipeline: impl Into<String>) -> Self {
        Self::MissingInput {
            pipeline: pipeline.into(),
        }
    }

    pub fn transport(op: &'static str, source: std::io::Error) -> Self {
        Self::Transport { op, source }
    }

    /// True for faults that indicate miswiring rather than a degraded side channel.
    pub fn is_input_contract(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. } | Self::ShapeMismatch { .. } | Self::InvalidFrame(_)
        )
    }
}
