//! Debug monitor: log everything flowing through the chain
//!
//! Builds a snapshot of the frame shape, incoming prompts and every
//! forwarded parameter, logs it at most once per `log_interval`, and hands
//! the same lines to the overlay renderer. Nothing is consumed: all
//! parameters that are not the monitor's own settings pass straight through.

use crate::config::{seconds, ScopebusConfig};
use crate::pipeline::{FrameInput, Pipeline};
use scopebus_core::{Device, FrameBatch, Params, PipelineOutput, Prompt, Result};
use scopebus_udp::{MulticastGroup, UdpReceiver};
use std::time::Instant;
use tracing::{info, warn};

pub const OWN_KEYS: &[&str] = &[
    "overlay_enabled",
    "print_to_stdout",
    "log_interval",
    "show_video_shape",
    "show_prompts",
    "show_all_keys",
    "font_size",
    "text_opacity",
    "text_position",
    "bg_opacity",
    "max_value_length",
    "udp_enabled",
    "udp_port",
];

const RULE: &str = "============================================================";

/// Which sections a snapshot includes.
#[derive(Clone, Copy, Debug)]
pub struct LineOptions {
    pub show_video_shape: bool,
    pub show_prompts: bool,
    pub show_all_keys: bool,
    pub max_value_length: usize,
}

impl LineOptions {
    pub fn from_params(params: &Params) -> Self {
        Self {
            show_video_shape: params.bool_or("show_video_shape", true),
            show_prompts: params.bool_or("show_prompts", true),
            show_all_keys: params.bool_or("show_all_keys", true),
            max_value_length: params.u32_or("max_value_length", 80) as usize,
        }
    }
}

/// Cut `s` to `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

/// Render the snapshot lines for one frame.
pub fn debug_lines(
    frames: &FrameBatch,
    prompts: &[Prompt],
    params: &Params,
    options: LineOptions,
) -> Vec<String> {
    let mut lines = Vec::new();

    if options.show_video_shape {
        lines.push(format!(
            "video: shape={:?} dtype=f32 device={}",
            frames.shape(),
            frames.device()
        ));
    }

    if options.show_prompts {
        if prompts.is_empty() {
            lines.push("prompts: (none)".to_string());
        } else {
            lines.push(format!("prompts: ({} entries)", prompts.len()));
            for (i, prompt) in prompts.iter().enumerate() {
                lines.push(format!(
                    "  [{i}] w={} | {}",
                    prompt.weight,
                    truncate(&prompt.text, options.max_value_length)
                ));
            }
        }
    }

    if options.show_all_keys {
        let others: Vec<_> = params
            .iter()
            .filter(|(key, _)| !OWN_KEYS.contains(&key.as_str()))
            .collect();
        if !others.is_empty() {
            lines.push(format!("--- other keys ({}) ---", others.len()));
            for (key, value) in others {
                lines.push(format!(
                    "{key}: {}",
                    truncate(&value.to_string(), options.max_value_length)
                ));
            }
        }
    }

    lines
}

pub struct TextLogPipeline {
    receiver: Option<UdpReceiver>,
    last_message: String,
    last_print: Option<Instant>,
    device: Device,
}

impl TextLogPipeline {
    pub const ID: &'static str = "text-log";

    pub fn new(receiver: Option<UdpReceiver>, device: Device) -> Self {
        Self {
            receiver,
            last_message: String::new(),
            last_print: None,
            device,
        }
    }

    /// Runs without a receiver when `udp_enabled` is off or the bind fails.
    pub fn from_config(config: &ScopebusConfig, load: &Params, device: Device) -> Self {
        let receiver = if load.bool_or("udp_enabled", true) {
            let port = load.port_or("udp_port", config.udp.port);
            match MulticastGroup::check_port(port)
                .and_then(|port| UdpReceiver::with_group(port, config.multicast_group()))
            {
                Ok(receiver) => Some(receiver.with_settle(config.port_settle())),
                Err(e) => {
                    warn!(error = %e, "text log running without UDP");
                    None
                }
            }
        } else {
            None
        };
        Self::new(receiver, device)
    }

    pub fn has_receiver(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    fn should_print(&mut self, params: &Params, now: Instant) -> bool {
        if !params.bool_or("print_to_stdout", true) {
            return false;
        }
        let interval = seconds(params.f64_or("log_interval", 1.0));
        let due = self
            .last_print
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        if due {
            self.last_print = Some(now);
        }
        due
    }
}

impl Pipeline for TextLogPipeline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput> {
        let frames = FrameBatch::from_input(Self::ID, input.video.as_deref(), self.device)?;
        let params = &input.params;

        if let Some(msg) = self.receiver.as_mut().and_then(UdpReceiver::poll) {
            self.last_message = msg.display_text();
        }

        let mut lines = debug_lines(&frames, &input.prompts, params, LineOptions::from_params(params));
        if !self.last_message.is_empty() {
            lines.insert(0, format!("UDP: {}", self.last_message));
        }

        if self.should_print(params, Instant::now()) {
            info!("{RULE}");
            info!("kwargs snapshot @ {}", chrono::Local::now().format("%H:%M:%S"));
            info!("{RULE}");
            for line in &lines {
                info!("  {line}");
            }
            info!("{RULE}");
        }

        let mut out = PipelineOutput::new(frames.clamp());
        if params.bool_or("overlay_enabled", true) && !lines.is_empty() {
            out.overlay_text = Some(lines.join("\n"));
        }
        out.forward_params(params, OWN_KEYS);
        out.prompts = input.prompts;
        Ok(out)
    }

    fn shutdown(&mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            receiver.close();
        }
    }
}
