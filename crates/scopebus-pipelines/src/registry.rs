//! Pipeline lookup by id

use crate::config::ScopebusConfig;
use crate::library::BusLibraryPipeline;
use crate::llm::LlmPipeline;
use crate::pipeline::Pipeline;
use crate::text_log::TextLogPipeline;
use crate::udp_prompt::UdpPromptPipeline;
use crate::vlm::{VlmPipeline, VlmPostPipeline, VlmPrePipeline};
use scopebus_core::{Device, Error, Params, Result};

pub const PIPELINE_IDS: &[&str] = &[
    BusLibraryPipeline::ID,
    VlmPipeline::ID,
    VlmPrePipeline::ID,
    VlmPostPipeline::ID,
    LlmPipeline::ID,
    UdpPromptPipeline::ID,
    TextLogPipeline::ID,
];

/// Construct the pipeline registered under `id` with load-time parameters
/// `load`. Socket and client setup failures are returned.
pub fn create_pipeline(
    id: &str,
    config: &ScopebusConfig,
    load: &Params,
    device: Device,
) -> Result<Box<dyn Pipeline>> {
    let pipeline: Box<dyn Pipeline> = match id {
        BusLibraryPipeline::ID => Box::new(BusLibraryPipeline::new(device)),
        VlmPipeline::ID => Box::new(VlmPipeline::from_config(config, load, device)?),
        VlmPrePipeline::ID => Box::new(VlmPrePipeline::from_config(config, load, device)?),
        VlmPostPipeline::ID => Box::new(VlmPostPipeline::from_config(config, load, device)?),
        LlmPipeline::ID => Box::new(LlmPipeline::from_config(config, load, device)?),
        UdpPromptPipeline::ID => Box::new(UdpPromptPipeline::from_config(config, load, device)?),
        TextLogPipeline::ID => Box::new(TextLogPipeline::from_config(config, load, device)),
        other => {
            return Err(Error::ConfigError(format!(
                "unknown pipeline '{other}', expected one of: {}",
                PIPELINE_IDS.join(", ")
            )))
        }
    };
    Ok(pipeline)
}
