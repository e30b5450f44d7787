//! Core types for Scopebus

use crate::frames::FrameBatch;
use crate::params::{ParamValue, Params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A message carried over a multicast channel.
///
/// The wire makes no distinction between the variants: a payload that
/// decodes as JSON is delivered as `Json`, anything else as `Text`.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Text(String),
    Json(serde_json::Value),
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Parse user-supplied text, preferring a JSON reading.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => Message::Json(value),
            Err(_) => Message::Text(text.to_string()),
        }
    }

    /// Decode a datagram payload. Invalid UTF-8 is replaced, never rejected.
    pub fn decode(payload: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(payload))
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.as_bytes().to_vec(),
            Message::Json(v) => v.to_string().into_bytes(),
        }
    }

    /// Human-readable text for display or prompting.
    ///
    /// JSON strings are unwrapped and objects with a string `text` field yield
    /// that field; any other JSON value is rendered compactly.
    pub fn display_text(&self) -> String {
        match self {
            Message::Text(s) => s.clone(),
            Message::Json(serde_json::Value::String(s)) => s.clone(),
            Message::Json(v) => match v.get("text").and_then(|t| t.as_str()) {
                Some(text) => text.to_string(),
                None => v.to_string(),
            },
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Message {
    fn from(v: serde_json::Value) -> Self {
        Message::Json(v)
    }
}

/// A weighted text prompt handed to the downstream renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub weight: f64,
}

impl Prompt {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Temporal interpolation used when blending between prompt sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Slerp,
    Linear,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Slerp => "slerp",
            Interpolation::Linear => "linear",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slerp" => Ok(Interpolation::Slerp),
            "linear" => Ok(Interpolation::Linear),
            other => Err(format!("unknown interpolation method: {other}")),
        }
    }
}

/// A multi-step blend from the active prompts to `target_prompts`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub target_prompts: Vec<Prompt>,
    #[serde(rename = "num_steps")]
    pub step_count: u32,
    #[serde(rename = "temporal_interpolation_method")]
    pub interpolation: Interpolation,
}

/// Structured result of one pipeline call.
///
/// `prompts` is append-only within a call: upstream entries are kept and new
/// ones are pushed after them. At most one `transition` is active.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub video: FrameBatch,
    pub prompts: Vec<Prompt>,
    pub transition: Option<Transition>,
    /// Text the host's overlay renderer should draw, if any.
    pub overlay_text: Option<String>,
    /// Pass-through parameters the core does not interpret.
    pub extra: BTreeMap<String, ParamValue>,
}

impl PipelineOutput {
    pub fn new(video: FrameBatch) -> Self {
        Self {
            video,
            prompts: Vec::new(),
            transition: None,
            overlay_text: None,
            extra: BTreeMap::new(),
        }
    }

    /// Copy every parameter not in `own` into the pass-through map.
    pub fn forward_params(&mut self, params: &Params, own: &[&str]) {
        for (key, value) in params.iter() {
            if !own.contains(&key.as_str()) {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }
}
