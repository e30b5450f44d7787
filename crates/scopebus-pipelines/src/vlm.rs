//! Vision-model pipelines
//!
//! - [`VlmPipeline`]: caption frames, inject the caption as a prompt, surface
//!   it as overlay text.
//! - [`VlmPrePipeline`]: caption raw camera frames, inject, and broadcast each
//!   caption over UDP for a postprocessor elsewhere in the chain.
//! - [`VlmPostPipeline`]: receive captions over UDP and surface them as
//!   overlay text on the processed video.

use crate::config::ScopebusConfig;
use crate::pipeline::{ollama_client, FrameInput, Pipeline, PromptSettings};
use scopebus_core::{Device, FrameBatch, Params, PipelineOutput, PromptLedger, Result};
use scopebus_llm::encode::DEFAULT_JPEG_QUALITY;
use scopebus_llm::{frame_to_jpeg_base64, OnComplete, QueryClient, QueryRequest};
use scopebus_udp::{UdpReceiver, UdpSender};
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_INTERVAL_SECS: f64 = 3.0;
const DEFAULT_VLM_PROMPT: &str = "Describe what you see in this image in one sentence.";

/// Fire a caption query for the first frame if the client is due.
fn maybe_caption(
    client: &QueryClient,
    frames: &FrameBatch,
    params: &Params,
    on_complete: Option<OnComplete>,
) {
    let interval = crate::config::seconds(params.f64_or("send_interval", DEFAULT_INTERVAL_SECS));
    if !client.should_send(interval, Instant::now()) {
        return;
    }
    let image = match frame_to_jpeg_base64(frames, 0, DEFAULT_JPEG_QUALITY) {
        Ok(image) => image,
        Err(e) => {
            warn!(error = %e, "frame encode failed, skipping caption");
            return;
        }
    };
    let prompt = params.str_or("vlm_prompt", DEFAULT_VLM_PROMPT);
    client.fire_async(QueryRequest::new(prompt).with_image(image), on_complete);
}

fn inject_response(ledger: &mut PromptLedger, out: &mut PipelineOutput, text: &str, params: &Params) {
    if params.bool_or("inject_prompt", true) {
        let settings = PromptSettings::from_params(params);
        ledger.inject_if_new(
            out,
            text,
            settings.weight,
            settings.transition_steps,
            settings.interpolation,
        );
    }
}

// ---------------------------------------------------------------------------
// Standalone
// ---------------------------------------------------------------------------

pub struct VlmPipeline {
    client: QueryClient,
    ledger: PromptLedger,
    device: Device,
}

impl VlmPipeline {
    pub const ID: &'static str = "vlm-ollama";

    pub fn new(client: QueryClient, device: Device) -> Self {
        Self {
            client,
            ledger: PromptLedger::new(),
            device,
        }
    }

    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Result<Self> {
        let client = ollama_client(config, load, &config.ollama.vlm_model)?;
        Ok(Self::new(client, device))
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }
}

impl Pipeline for VlmPipeline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput> {
        let frames = FrameBatch::from_input(Self::ID, input.video.as_deref(), self.device)?;
        let params = &input.params;

        maybe_caption(&self.client, &frames, params, None);

        let response = self.client.last_response();
        let mut out = PipelineOutput::new(frames.clamp());
        out.prompts = input.prompts;
        if params.bool_or("overlay_enabled", true) && !response.is_empty() {
            out.overlay_text = Some(response.clone());
        }
        inject_response(&mut self.ledger, &mut out, &response, params);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Preprocessor
// ---------------------------------------------------------------------------

pub struct VlmPrePipeline {
    client: QueryClient,
    sender: UdpSender,
    ledger: PromptLedger,
    device: Device,
}

impl VlmPrePipeline {
    pub const ID: &'static str = "vlm-ollama-pre";

    pub fn new(client: QueryClient, sender: UdpSender, device: Device) -> Self {
        Self {
            client,
            sender,
            ledger: PromptLedger::new(),
            device,
        }
    }

    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Result<Self> {
        let client = ollama_client(config, load, &config.ollama.vlm_model)?;
        let port = load.port_or("udp_port", config.udp.port);
        let port = scopebus_udp::MulticastGroup::check_port(port)?;
        let sender = UdpSender::with_group(port, config.multicast_group())?
            .with_settle(config.port_settle());
        Ok(Self::new(client, sender, device))
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn sender(&self) -> &UdpSender {
        &self.sender
    }
}

impl Pipeline for VlmPrePipeline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput> {
        let frames = FrameBatch::from_input(Self::ID, input.video.as_deref(), self.device)?;
        let params = &input.params;

        self.sender
            .update_port(params.port_or("udp_port", self.sender.port()));
        let sent = self.sender.flush_outbox();
        if sent > 0 {
            debug!(sent, port = self.sender.port(), "broadcast captions");
        }

        let outbox = self.sender.outbox();
        let broadcast: OnComplete = Box::new(move |text: &str| {
            outbox.post(text.to_string());
        });
        maybe_caption(&self.client, &frames, params, Some(broadcast));

        let response = self.client.last_response();
        let mut out = PipelineOutput::new(frames.clamp());
        out.prompts = input.prompts;
        inject_response(&mut self.ledger, &mut out, &response, params);
        Ok(out)
    }

    fn shutdown(&mut self) {
        self.sender.close();
    }
}

// ---------------------------------------------------------------------------
// Postprocessor
// ---------------------------------------------------------------------------

pub struct VlmPostPipeline {
    receiver: UdpReceiver,
    last_text: String,
    device: Device,
}

impl VlmPostPipeline {
    pub const ID: &'static str = "vlm-ollama-post";

    pub fn new(receiver: UdpReceiver, device: Device) -> Self {
        Self {
            receiver,
            last_text: String::new(),
            device,
        }
    }

    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Result<Self> {
        let port = load.port_or("udp_port", config.udp.port);
        let port = scopebus_udp::MulticastGroup::check_port(port)?;
        let receiver = UdpReceiver::with_group(port, config.multicast_group())?
            .with_settle(config.port_settle());
        Ok(Self::new(receiver, device))
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

impl Pipeline for VlmPostPipeline {
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
        if params.bool_or("overlay_enabled", true) && !self.last_text.is_empty() {
            out.overlay_text = Some(self.last_text.clone());
        }
        Ok(out)
    }

    fn shutdown(&mut self) {
        self.receiver.close();
    }
}
