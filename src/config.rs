//! Configuration loading for the reading engine.
//!
//! All tunables live in `conf/config.toml` if present. Any missing or invalid
//! entries fall back to defaults so a reading session can always start.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Smallest font size offered for flowed text.
pub const MIN_TEXT_FONT_SIZE: u32 = 14;
/// Largest font size offered for flowed text.
pub const MAX_TEXT_FONT_SIZE: u32 = 28;

/// Engine configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "default_container_width")]
    pub default_container_width: f32,
    #[serde(default = "default_page_inset")]
    pub page_inset: f32,
    #[serde(default = "default_text_font_size")]
    pub text_font_size: u32,
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default)]
    pub counter_endpoint: Option<String>,
    #[serde(default)]
    pub counter_api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: default_log_level(),
            default_container_width: default_container_width(),
            page_inset: default_page_inset(),
            text_font_size: default_text_font_size(),
            words_per_minute: default_words_per_minute(),
            store_dir: default_store_dir(),
            counter_endpoint: None,
            counter_api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            outbox_capacity: default_outbox_capacity(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl EngineConfig {
    /// Keep runtime values in bounds regardless of where they came from.
    pub fn sanitized(mut self) -> Self {
        self.text_font_size = self
            .text_font_size
            .clamp(MIN_TEXT_FONT_SIZE, MAX_TEXT_FONT_SIZE);
        if !self.default_container_width.is_finite() || self.default_container_width <= 0.0 {
            self.default_container_width = default_container_width();
        }
        if !self.page_inset.is_finite() || self.page_inset < 0.0 {
            self.page_inset = 0.0;
        }
        self.words_per_minute = self.words_per_minute.max(1);
        self.outbox_capacity = self.outbox_capacity.max(1);
        self.retry_max_attempts = self.retry_max_attempts.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> EngineConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return EngineConfig::default();
        }
    };

    parse_config(&contents).unwrap_or_else(|err| {
        warn!(path = %path.display(), "Invalid config TOML: {err}");
        EngineConfig::default()
    })
}

pub fn parse_config(contents: &str) -> Result<EngineConfig, toml::de::Error> {
    let cfg = toml::from_str::<EngineConfig>(contents)?;
    debug!("Parsed configuration");
    Ok(cfg.sanitized())
}

fn default_container_width() -> f32 {
    800.0
}

fn default_page_inset() -> f32 {
    16.0
}

fn default_text_font_size() -> u32 {
    18
}

fn default_words_per_minute() -> u32 {
    200
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_log_level() -> LogLevel {
    LogLevel::Debug
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").expect("empty config parses");
        assert_eq!(cfg.default_container_width, 800.0);
        assert_eq!(cfg.page_inset, 16.0);
        assert_eq!(cfg.text_font_size, 18);
        assert_eq!(cfg.words_per_minute, 200);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert!(cfg.counter_endpoint.is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = parse_config(
            r#"
            text_font_size = 64
            default_container_width = 0.0
            page_inset = -4.0
            retry_max_attempts = 0
            log_level = "warn"
            "#,
        )
        .expect("config parses");
        assert_eq!(cfg.text_font_size, MAX_TEXT_FONT_SIZE);
        assert_eq!(cfg.default_container_width, 800.0);
        assert_eq!(cfg.page_inset, 0.0);
        assert_eq!(cfg.retry_max_attempts, 1);
        assert_eq!(cfg.log_level, LogLevel::Warn);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/nonexistent/folio/config.toml"));
        assert_eq!(cfg.outbox_capacity, 64);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }
}
