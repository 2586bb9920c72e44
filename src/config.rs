//! Configuration loader
//!
//! Loads the client-side stack settings from `stack.yaml` in the config
//! directory. Every field has a default, so a missing file is not an error.

use anyhow::{Context, Result};
use mdb_types::CommandOption;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::stack::AdvancementParams;

/// Client-side stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Stack-level advancement used when neither the document nor the entry sets one
    pub default_advancement: AdvancementParams,
    /// Hide arguments that are already initialized behind a "show all" disclosure
    pub collapse_initialized_arguments: bool,
    /// Cadence of the UI refresh tick that consumes live-feed updates
    pub refresh_interval_ms: u64,
    /// Namespace whose alias is stored instead of the qualified name
    pub preferred_namespace: Option<String>,
    /// Extra options offered alongside every issued command
    pub command_options: Vec<CommandOption>,
    /// Acknowledgment statuses that let a run continue
    pub accepting_ack_statuses: Vec<String>,
    /// Acknowledgment statuses that stop a run
    pub stopping_ack_statuses: Vec<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            default_advancement: AdvancementParams::default_stack(),
            collapse_initialized_arguments: true,
            refresh_interval_ms: 500,
            preferred_namespace: None,
            command_options: Vec::new(),
            accepting_ack_statuses: vec!["OK".to_string(), "DISABLED".to_string()],
            stopping_ack_statuses: vec!["NOK".to_string(), "CANCELLED".to_string()],
        }
    }
}

impl StackConfig {
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Create loader from STACK_CONFIG_DIR env var or default to "config"
    pub fn from_env() -> Self {
        let dir = std::env::var("STACK_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::new(dir)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load `stack.yaml`, falling back to defaults when the file is absent
    pub fn load(&self) -> Result<StackConfig> {
        let path = self.config_dir.join("stack.yaml");
        if !path.exists() {
            debug!("No {} found, using default stack config", path.display());
            return Ok(StackConfig::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: StackConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        info!(
            "Loaded stack config from {} ({} command options)",
            path.display(),
            config.command_options.len()
        );
        Ok(config)
    }
}
