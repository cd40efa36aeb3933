//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sessions with no events for this long are swept.
    #[serde(default = "default_session_max_age_hours")]
    pub session_max_age_hours: u64,
    /// Partial recording uploads are dropped after this long.
    #[serde(default = "default_recording_buffer_ttl_secs")]
    pub recording_buffer_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Deadline for mutating requests.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: usize,
    /// Window for server-side duplicate suppression; 0 disables it.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_max_age_hours() -> u64 {
    24
}

fn default_recording_buffer_ttl_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_chunk_bytes() -> usize {
    flowcap_core::DEFAULT_MAX_CHUNK_BYTES
}

fn default_max_total_chunks() -> usize {
    flowcap_core::DEFAULT_MAX_TOTAL_CHUNKS
}

fn default_dedup_window_ms() -> u64 {
    flowcap_core::DEDUP_WINDOW_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_max_age_hours: default_session_max_age_hours(),
            recording_buffer_ttl_secs: default_recording_buffer_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_total_chunks: default_max_total_chunks(),
            dedup_window_ms: default_dedup_window_ms(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    pub fn session_max_age_ms(&self) -> u64 {
        self.session_max_age_hours * 60 * 60 * 1000
    }

    pub fn recording_buffer_ttl_ms(&self) -> u64 {
        self.recording_buffer_ttl_secs * 1000
    }
}
