//! Scopebus Pipelines - per-frame plugins built on the channel, query, and ledger core

pub mod config;
pub mod library;
pub mod llm;
pub mod pipeline;
pub mod registry;
pub mod text_log;
pub mod udp_prompt;
pub mod vlm;

pub use config::ScopebusConfig;
pub use library::BusLibraryPipeline;
pub use llm::LlmPipeline;
pub use pipeline::{FrameInput, Pipeline, PromptSettings, Requirements};
pub use registry::{create_pipeline, PIPELINE_IDS};
pub use text_log::TextLogPipeline;
pub use udp_prompt::UdpPromptPipeline;
pub use vlm::{VlmPipeline, VlmPostPipeline, VlmPrePipeline};
