use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::Path,
    time::Duration,
};

pub const CONFIG_FILE: &str = "maolan-pool.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Project rate every imported clip is resampled to.
    pub sample_rate: u32,
    pub bpm: f64,
    /// Writeback threads; all cores when unset.
    pub workers: Option<usize>,
    /// Minimum time between incremental flushes of a recording.
    pub flush_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bpm: 120.0,
            workers: None,
            flush_interval_ms: 2_000,
        }
    }
}

impl PoolConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reads `maolan-pool.toml` from `dir`, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        match Self::load(&path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}
