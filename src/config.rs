//! Layered configuration for the relay.
//!
//! Settings come from `.relay/relay.toml` (optional), then `RELAY_*`
//! environment variables, then CLI flags applied by the caller.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! url = "ws://localhost:8080/mcp"
//! request_timeout_secs = 120
//! connect_timeout_secs = 10
//!
//! [pipeline]
//! max_chunk_bytes = 20000
//! source_extension = "java"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//!
//! [logging]
//! format = "pretty"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines on stderr (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

/// Connection to the backend agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Upper bound on one round trip
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "ws://localhost:8080/mcp".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Repository pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Chunk size bound in bytes; a single larger file still becomes one chunk
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// File extension collected from a repository, without the dot
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
}

fn default_max_chunk_bytes() -> usize {
    20_000
}

fn default_source_extension() -> String {
    "java".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            source_extension: default_source_extension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
}

/// Root of `relay.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse relay.toml")
    }

    /// Load `.relay/relay.toml` under `project_dir`, or defaults if absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = Self::default_path(project_dir);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn default_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".relay").join("relay.toml")
    }

    /// Full resolution: explicit file (or the default location) → environment → validation.
    pub fn resolve(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(project_dir)?,
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `RELAY_*` overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RELAY_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Some(secs) = lookup("RELAY_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid RELAY_REQUEST_TIMEOUT_SECS '{}'", secs))?;
        }
        if let Some(bytes) = lookup("RELAY_MAX_CHUNK_BYTES") {
            self.pipeline.max_chunk_bytes = bytes
                .trim()
                .parse()
                .with_context(|| format!("Invalid RELAY_MAX_CHUNK_BYTES '{}'", bytes))?;
        }
        if let Some(ext) = lookup("RELAY_SOURCE_EXTENSION") {
            self.pipeline.source_extension = ext;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid RELAY_PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.backend.url.starts_with("ws://") {
            bail!(
                "Invalid backend url '{}': expected a ws:// address",
                self.backend.url
            );
        }
        if self.backend.request_timeout_secs == 0 {
            bail!("backend.request_timeout_secs must be greater than zero");
        }
        if self.backend.connect_timeout_secs == 0 {
            bail!("backend.connect_timeout_secs must be greater than zero");
        }
        if self.pipeline.max_chunk_bytes == 0 {
            bail!("pipeline.max_chunk_bytes must be greater than zero");
        }
        if self.pipeline.source_extension.trim_start_matches('.').trim().is_empty() {
            bail!("pipeline.source_extension must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.connect_timeout_secs)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize relay.toml")
    }
}
