//! Receive text over UDP and feed it downstream as a prompt

use crate::config::ScopebusConfig;
use crate::pipeline::{FrameInput, Pipeline};
use scopebus_core::{Device, FrameBatch, Params, PipelineOutput, Prompt, Result};
use scopebus_udp::{MulticastGroup, UdpReceiver};

/// Parameters this pipeline consumes instead of forwarding.
pub const OWN_KEYS: &[&str] = &[
    "udp_port",
    "prompt_weight",
    "overlay_enabled",
    "font_size",
    "text_opacity",
    "bg_opacity",
];

/// Unlike the ledger-backed pipelines, the last received text is appended on
/// every frame so downstream always sees the current remote prompt.
pub struct UdpPromptPipeline {
    receiver: UdpReceiver,
    last_text: String,
    device: Device,
}

impl UdpPromptPipeline {
    pub const ID: &'static str = "udp-prompt";

    pub fn new(receiver: UdpReceiver, device: Device) -> Self {
        Self {
            receiver,
            last_text: String::new(),
            device,
        }
    }

    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Result<Self> {
        let port = MulticastGroup::check_port(load.port_or("udp_port", config.udp.port))?;
        let receiver = UdpReceiver::with_group(port, config.multicast_group())?
            .with_settle(config.port_settle());
        Ok(Self::new(receiver, device))
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

impl Pipeline for UdpPromptPipeline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput> {
        let frames = FrameBatch::from_input(Self::ID, input.video.as_deref(), self.device)?;
        let params = &input.params;

        self.receiver
            .update_port(params.port_or("udp_port", self.receiver.port()));
        if let Some(msg) = self.receiver.poll() {
            self.last_text = msg.display_text();
        }

        let mut out = PipelineOutput::new(frames.clamp());
        out.forward_params(params, OWN_KEYS);
        out.prompts = input.prompts;
        if !self.last_text.is_empty() {
            out.prompts
                .push(Prompt::new(self.last_text.clone(), params.f64_or("prompt_weight", 100.0)));
            if params.bool_or("overlay_enabled", true) {
                out.overlay_text = Some(self.last_text.clone());
            }
        }
        Ok(out)
    }

    fn shutdown(&mut self) {
        self.receiver.close();
    }
}
