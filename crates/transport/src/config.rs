use std::time::Duration;

use mcumgr_protocol::Scheme;
use mcumgr_protocol::constants::DEFAULT_MTU;
use serde::{Deserialize, Serialize};

/// Transport settings, usually loaded from the `[transport]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest frame the link carries, header included.
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    #[serde(default)]
    pub scheme: Scheme,

    /// How long a request waits for its response.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: default_mtu(),
            scheme: Scheme::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
