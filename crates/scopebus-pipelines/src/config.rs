//! Load-time configuration
//!
//! Values a plugin reads once at construction. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. Per-frame values come
//! from the `Params` snapshot instead.

use scopebus_llm::ollama::{DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_VLM_MODEL};
use scopebus_udp::MulticastGroup;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopebusConfig {
    /// Inference server connection.
    pub ollama: OllamaConfig,
    /// Multicast group and default topic ports.
    pub udp: UdpConfig,
    /// Settle windows.
    pub debounce: DebounceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama API server.
    pub url: String,
    /// Vision model for frame captioning.
    pub vlm_model: String,
    /// Text model for prompt rewriting.
    pub llm_model: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub group: Ipv4Addr,
    pub ttl: u32,
    /// Primary topic port.
    pub port: u16,
    /// Secondary topic port.
    pub secondary_port: u16,
}

/// The two windows serve different inputs and are tuned independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// How long a new channel port must stay requested before switching.
    pub port_settle_secs: f64,
    /// How long live-edited query text must stay unchanged before firing.
    pub prompt_settle_secs: f64,
}

// ============================================================
// Defaults
// ============================================================

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            vlm_model: DEFAULT_VLM_MODEL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            group: MulticastGroup::DEFAULT_ADDR,
            ttl: MulticastGroup::DEFAULT_TTL,
            port: MulticastGroup::DEFAULT_PORT,
            secondary_port: MulticastGroup::SECONDARY_PORT,
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            port_settle_secs: MulticastGroup::REBIND_DELAY.as_secs_f64(),
            prompt_settle_secs: 1.0,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl ScopebusConfig {
    /// Load config from a TOML file. Returns defaults if the file is missing
    /// or invalid.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn multicast_group(&self) -> MulticastGroup {
        MulticastGroup::new(self.udp.group).with_ttl(self.udp.ttl)
    }

    pub fn port_settle(&self) -> Duration {
        seconds(self.debounce.port_settle_secs)
    }

    pub fn prompt_settle(&self) -> Duration {
        seconds(self.debounce.prompt_settle_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }
}

/// Seconds to a `Duration`; negative or non-finite values become zero.
pub fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_rejects_nonsense() {
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn settle_windows_default_independently() {
        let config = ScopebusConfig::default();
        assert_eq!(config.port_settle(), Duration::from_secs(3));
        assert_eq!(config.prompt_settle(), Duration::from_secs(1));
    }
}
