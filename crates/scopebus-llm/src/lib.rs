//! Scopebus LLM - non-blocking, rate-limited queries against inference services

pub mod client;
pub mod encode;
pub mod ollama;
pub mod provider;
pub mod trigger;
pub mod types;

pub use client::{OnComplete, QueryClient, QueryStats};
pub use encode::frame_to_jpeg_base64;
pub use ollama::OllamaProvider;
pub use provider::{QueryBackend, QueryError, QueryResult};
pub use trigger::FireTrigger;
pub use types::*;
