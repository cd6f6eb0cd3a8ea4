use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::logging::{LogConfig, LogFormat};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TRACE_BENCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "trace-bench.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ─── File layout ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Server reader tasks
    #[serde(default = "default_reader_pool_size")]
    pub reader_pool_size: usize,

    /// 0 = tracing off, 1 = every request, N = every Nth request
    #[serde(default = "default_trace_rate")]
    pub trace_rate: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Spans retained before the oldest are evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Where the JSON summary is written on shutdown, if anywhere
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Log file; stderr when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".into()
}
fn default_reader_pool_size() -> usize {
    4
}
fn default_trace_rate() -> u64 {
    1
}
fn default_capacity() -> usize {
    crate::trace::collector::DEFAULT_CAPACITY
}
fn default_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader_pool_size: default_reader_pool_size(),
            trace_rate: default_trace_rate(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            export_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            path: None,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Loads from `$TRACE_BENCH_CONFIG`, else `trace-bench.toml`.
    /// `RUST_LOG` overrides the configured log level.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_path(&path)?;
        if let Ok(level) = std::env::var("RUST_LOG") {
            if !level.is_empty() {
                config.logging.level = level;
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.reader_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.reader_pool_size must be at least 1".into(),
            ));
        }
        if self.collector.capacity == 0 {
            return Err(ConfigError::Invalid(
                "collector.capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.logging.format,
            level: self.logging.level.clone(),
            output_path: self.logging.path.clone(),
        }
    }
}
