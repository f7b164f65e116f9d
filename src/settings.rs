use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "WORKSTATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/workstate.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub database_path: PathBuf,
    /// Cadence of both the dispatcher and every workplace worker.
    pub poll_interval_secs: u64,
    pub log_level: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/workstate.sqlite3"),
            poll_interval_secs: 10,
            log_level: "info".into(),
        }
    }
}

impl ServiceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: ServiceSettings,
}

impl SettingsStore {
    /// Resolve the settings path from `WORKSTATE_CONFIG` or the default.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load settings, writing a default file first when none exists.
    pub fn load_or_create(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            let defaults = ServiceSettings::default();
            persist(&path, &defaults)?;
            return Ok(Self {
                path,
                data: defaults,
            });
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let data = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.data
    }
}

fn persist(path: &Path, data: &ServiceSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}
