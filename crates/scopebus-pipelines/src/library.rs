//! Passthrough pipeline that makes the shared library visible to the host

use crate::pipeline::{FrameInput, Pipeline};
use scopebus_core::{Device, FrameBatch, PipelineOutput, Result};

pub struct BusLibraryPipeline {
    device: Device,
}

impl BusLibraryPipeline {
    pub const ID: &'static str = "bus-library";

    pub fn new(device: Device) -> Self {
        Self { device }
    }
}

impl Pipeline for BusLibraryPipeline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput> {
        let frames = FrameBatch::from_input(Self::ID, input.video.as_deref(), self.device)?;
        Ok(PipelineOutput::new(frames.clamp()))
    }
}
