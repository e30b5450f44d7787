//! Text-model preprocessor
//!
//! Sends the live-edited `input_prompt` to a text model and injects the
//! response as a prompt. The input is debounced so a half-typed prompt is
//! never sent; a settled edit fires straight away instead of waiting out
//! `send_interval`.

use crate::config::{seconds, ScopebusConfig};
use crate::pipeline::{ollama_client, FrameInput, Pipeline, PromptSettings};
use scopebus_core::{Device, FrameBatch, Params, PipelineOutput, PromptLedger, Result};
use scopebus_llm::{FireTrigger, OnComplete, QueryClient, QueryRequest};
use scopebus_udp::{MulticastGroup, UdpSender};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_INTERVAL_SECS: f64 = 5.0;
const DEFAULT_INPUT_PROMPT: &str = "a dreamy landscape";

pub struct LlmPipeline {
    client: QueryClient,
    trigger: FireTrigger,
    sender: UdpSender,
    ledger: PromptLedger,
    device: Device,
}

impl LlmPipeline {
    pub const ID: &'static str = "llm-ollama";

    pub fn new(client: QueryClient, sender: UdpSender, prompt_settle: Duration, device: Device) -> Self {
        Self {
            client,
            trigger: FireTrigger::new(prompt_settle),
            sender,
            ledger: PromptLedger::new(),
            device,
        }
    }

    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Result<Self> {
        let client = ollama_client(config, load, &config.ollama.llm_model)?;
        let port = MulticastGroup::check_port(load.port_or("udp_port", config.udp.port))?;
        let sender = UdpSender::with_group(port, config.multicast_group())?
            .with_settle(config.port_settle());
        Ok(Self::new(client, sender, config.prompt_settle(), device))
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn trigger(&self) -> &FireTrigger {
        &self.trigger
    }

    pub fn sender(&self) -> &UdpSender {
        &self.sender
    }

    fn maybe_fire(&mut self, params: &Params, now: Instant) {
        let text = params.str_or("input_prompt", DEFAULT_INPUT_PROMPT);
        let interval = seconds(params.f64_or("send_interval", DEFAULT_INTERVAL_SECS));
        let Some(prompt) = self.trigger.poll(&self.client, text, interval, now) else {
            return;
        };

        let request = QueryRequest::new(prompt).with_system(params.str_or("system_prompt", ""));
        let on_complete = if params.bool_or("udp_enabled", false) {
            let outbox = self.sender.outbox();
            let port = self.sender.port();
            let broadcast: OnComplete = Box::new(move |text: &str| {
                if outbox.post(text.to_string()) {
                    info!(bytes = text.len(), port, "queued response for broadcast");
                }
            });
            Some(broadcast)
        } else {
            None
        };
        self.client.fire_async(request, on_complete);
    }
}

impl Pipeline for LlmPipeline {
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
            debug!(sent, port = self.sender.port(), "broadcast responses");
        }

        self.maybe_fire(params, Instant::now());

        let response = self.client.last_response();
        let mut out = PipelineOutput::new(frames.clamp());
        out.prompts = input.prompts;
        if params.bool_or("overlay_enabled", true) && !response.is_empty() {
            out.overlay_text = Some(response.clone());
        }
        if params.bool_or("inject_prompt", true) {
            let settings = PromptSettings::from_params(params);
            self.ledger.inject_if_new(
                &mut out,
                &response,
                settings.weight,
                settings.transition_steps,
                settings.interpolation,
            );
        }
        Ok(out)
    }

    fn shutdown(&mut self) {
        self.sender.close();
    }
}
