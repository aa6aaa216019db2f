use meshcall_core::IceServerConfig;
use meshcall_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const SERVER_URL_ENV: &str = "MESHCALL_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the coordination server.
    pub server_url: String,
    /// Used until the server advertises its own list.
    pub ice_servers: Vec<IceServerConfig>,
    pub reconnect: ReconnectPolicy,
    pub speaker: SpeakerConfig,
    pub heartbeat_interval_ms: u64,
    /// Tear a session down if it stays `negotiating` this long. Off by default.
    pub negotiation_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000/ws".to_owned(),
            ice_servers: vec![
                IceServerConfig::stun(DEFAULT_STUN_ADDR),
                IceServerConfig::stun(DEFAULT_STUN_ADDR_2),
            ],
            reconnect: ReconnectPolicy::default(),
            speaker: SpeakerConfig::default(),
            heartbeat_interval_ms: 25_000,
            negotiation_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var(SERVER_URL_ENV) {
            config.server_url = url;
        }
        config
    }

    /// Never zero; a ticking interval needs a positive period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_ms.map(Duration::from_millis)
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub interval_ms: u64,
    /// Energy must be strictly above this to count as speech.
    pub threshold: u8,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            threshold: 30,
        }
    }
}

impl SpeakerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
