//! Query types and the inference service's request/response shapes

use serde::{Deserialize, Serialize};

/// One request to an inference backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Base64-encoded images sent alongside the prompt.
    pub images: Vec<String>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Attach a system prompt. Empty strings are treated as none.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = if system.is_empty() { None } else { Some(system) };
        self
    }

    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.images.push(image_base64.into());
        self
    }
}

/// Body of `POST /api/generate`.
#[derive(Clone, Debug, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl GenerateRequest {
    pub fn from_query(model: impl Into<String>, request: QueryRequest) -> Self {
        Self {
            model: model.into(),
            prompt: request.prompt,
            stream: false,
            system: request.system,
            images: request.images,
        }
    }
}

/// Non-streaming reply from `POST /api/generate`.
#[derive(Clone, Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub done: bool,
}
