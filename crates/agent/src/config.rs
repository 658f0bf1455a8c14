//! Agent configuration
//!
//! Read from an optional file named by `AGENT_CONFIG_FILE` and from
//! `AGENT_*` environment variables. Collection settings are nested under
//! `vsphere`, e.g. `AGENT_VSPHERE__ENABLE_TAGS=true`.

use agent_lib::settings::AgentSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE_ENV: &str = "AGENT_CONFIG_FILE";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// vCenter or ESXi host this agent reports for, used in logs
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Maximum jitter added to the interval, in seconds
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,

    /// Per-cycle timeout in seconds
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Run a single cycle and exit
    #[serde(default)]
    pub one_shot: bool,

    /// Inventory snapshot to collect from
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Integration name reported in payloads
    #[serde(default = "default_integration_name")]
    pub integration_name: String,

    #[serde(default)]
    pub vsphere: AgentSettings,
}

fn default_endpoint() -> String {
    "localhost".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_collection_interval() -> u64 {
    60
}

fn default_jitter() -> u64 {
    5
}

fn default_cycle_timeout() -> u64 {
    50
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_integration_name() -> String {
    "com.vsphere.agent".to_string()
}

impl AgentConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load configuration with an explicit optional config file
    pub fn load_from(file: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read agent configuration")?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;

        agent
            .vsphere
            .validate()
            .context("Invalid vSphere collection settings")?;

        if agent.cycle_timeout_secs == 0 {
            anyhow::bail!("cycle_timeout_secs must be greater than zero");
        }

        Ok(agent)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}
