//! Runner configuration, read from `pulse.ron` in the working directory.

use std::fs;
use std::path::Path;
use std::time::Duration;

use pipeline_logging::{pipeline_info, pipeline_warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "pulse.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Entry page of the research site.
    pub entry_url: String,
    /// Target names seeded into the work list.
    pub targets: Vec<String>,
    pub confirmation_enabled: bool,
    pub confirm_timeout_secs: u64,
    pub gate_poll_interval_ms: u64,
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            entry_url: "https://www.moneycontrol.com".to_string(),
            targets: Vec::new(),
            confirmation_enabled: false,
            confirm_timeout_secs: 5,
            gate_poll_interval_ms: 200,
            output_dir: "output".to_string(),
        }
    }
}

impl AppConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_interval_ms)
    }
}

/// Loads the config, falling back to defaults when the file is missing or
/// unreadable.
pub fn load_config(path: &Path) -> AppConfig {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            pipeline_info!("no config at {:?}, using defaults", path);
            return AppConfig::default();
        }
        Err(err) => {
            pipeline_warn!("failed to read config from {:?}: {}", path, err);
            return AppConfig::default();
        }
    };

    match ron::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            pipeline_warn!("failed to parse config from {:?}: {}", path, err);
            AppConfig::default()
        }
    }
}
