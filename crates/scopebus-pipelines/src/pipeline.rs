//! Pipeline trait and per-call input

use crate::config::ScopebusConfig;
use scopebus_core::{Error, Interpolation, Params, PipelineOutput, Prompt, RawFrame, Result};
use scopebus_llm::{OllamaProvider, QueryClient};
use std::sync::Arc;
use tracing::debug;

/// What the host must supply per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requirements {
    pub input_size: usize,
}

/// Everything the host hands a pipeline for one frame tick.
#[derive(Clone, Debug, Default)]
pub struct FrameInput {
    pub video: Option<Vec<RawFrame>>,
    pub params: Params,
    /// Prompts contributed by upstream pipelines.
    pub prompts: Vec<Prompt>,
}

impl FrameInput {
    pub fn new(video: Vec<RawFrame>) -> Self {
        Self {
            video: Some(video),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_prompts(mut self, prompts: Vec<Prompt>) -> Self {
        self.prompts = prompts;
        self
    }
}

/// A per-frame plugin. `call` runs once per frame on the host's processing
/// path and must never block on the network.
pub trait Pipeline: Send {
    fn id(&self) -> &'static str;

    fn prepare(&self, _params: &Params) -> Requirements {
        Requirements { input_size: 1 }
    }

    fn call(&mut self, input: FrameInput) -> Result<PipelineOutput>;

    /// Release channel sockets. In-flight queries are not waited for.
    fn shutdown(&mut self) {}
}

/// How a response is turned into a prompt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PromptSettings {
    pub weight: f64,
    pub transition_steps: u32,
    pub interpolation: Interpolation,
}

impl PromptSettings {
    pub fn from_params(params: &Params) -> Self {
        let raw = params.str_or("interpolation_method", "slerp");
        let interpolation = raw.parse().unwrap_or_else(|e| {
            debug!("{e}, using slerp");
            Interpolation::Slerp
        });
        Self {
            weight: params.f64_or("prompt_weight", 100.0),
            transition_steps: params.u32_or("transition_steps", 0),
            interpolation,
        }
    }
}

/// Build a query client for the Ollama server named by the load-time
/// parameters, falling back to `config`.
pub(crate) fn ollama_client(
    config: &ScopebusConfig,
    load: &Params,
    default_model: &str,
) -> Result<QueryClient> {
    let url = load.str_or("ollama_url", &config.ollama.url);
    let model = load.str_or("ollama_model", default_model);
    let provider = OllamaProvider::with_timeout(url, model, config.request_timeout())
        .map_err(|e| Error::ConfigError(format!("ollama client: {e}")))?;
    QueryClient::new(Arc::new(provider))
        .map_err(|e| Error::ConfigError(format!("query runtime: {e}")))
}
