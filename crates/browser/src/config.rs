//! Session configuration

use std::path::Path;
use std::time::Duration;

use dom::DomServiceConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::FrameFormat;

pub const DEFAULT_PORT: u16 = 10000;

/// Session configuration
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub id: String,
    /// Name announced to the peer in the greeting
    pub name: String,
    /// Address the Conductor binds, or the Conductor a Collaborator dials
    pub host: String,
    pub port: u16,
    pub homepage: Option<String>,
    pub frame_format: FrameFormat,
    pub first_tick_ms: u64,
    pub tick_interval_ms: u64,
    /// Extra lateness tolerated on a tick before the loop counts as stalled
    pub stall_timeout_ms: Option<u64>,
    pub fetch_timeout_secs: u64,
    /// How long one frame may take to reach a peer's socket before the link drops
    pub send_timeout_ms: u64,
    pub strict_parsing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: "gaudy".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            homepage: None,
            frame_format: FrameFormat::default(),
            first_tick_ms: 10,
            tick_interval_ms: 1000,
            stall_timeout_ms: None,
            fetch_timeout_secs: 30,
            send_timeout_ms: 2000,
            strict_parsing: false,
        }
    }
}

impl SessionConfig {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn first_tick(&self) -> Duration {
        Duration::from_millis(self.first_tick_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }

    pub fn dom_config(&self) -> DomServiceConfig {
        DomServiceConfig {
            strict: self.strict_parsing,
        }
    }
}
