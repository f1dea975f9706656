//! CLI configuration.
//!
//! Stored as TOML at `~/.config/mcumgr/mcumgr.toml` with optional
//! `[transport]` and `[transfer]` tables. A missing file means defaults;
//! command-line flags win over both.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mcumgr_transfer::TransferConfig;
use mcumgr_transport::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Overrides;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device address for the transfer commands.
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_address() -> String {
    "127.0.0.1:1337".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            transport: TransportConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(addr) = &overrides.addr {
            self.address = addr.clone();
        }
        if let Some(mtu) = overrides.mtu {
            self.transport.mtu = mtu;
        }
        if let Some(timeout) = overrides.timeout_ms {
            self.transport.request_timeout_ms = timeout;
        }
        if let Some(window) = overrides.window {
            self.transfer.window_capacity = window;
        }
        if let Some(alignment) = overrides.alignment {
            self.transfer.memory_alignment = alignment;
        }
        if let Some(attempts) = overrides.max_attempts {
            self.transfer.max_attempts = attempts;
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("mcumgr").join("mcumgr.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("mcumgr")
            .join("mcumgr.toml")
    }
}
