//! Shared logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::archive::ArchiveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Reads `OMNI_LOG_LEVEL`, `OMNI_LOG_FORMAT` (`json`/`pretty`) and
/// `OMNI_LOG_TARGET`. Unparseable values keep the default.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();
    if let Some(level) = env_value("OMNI_LOG_LEVEL") {
        config.level = level;
    }
    if let Some(format) = env_value("OMNI_LOG_FORMAT").and_then(|raw| parse_log_format(&raw)) {
        config.format = format;
    }
    if let Some(target) = env_value("OMNI_LOG_TARGET").and_then(|raw| parse_bool(&raw)) {
        config.include_target = target;
    }
    config
}

/// Trimmed value of `key`; unset and blank variables are `None`.
pub(crate) fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig, component: &'static str) {
    info!(
        component,
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

/// Records the archive settings a binary runs with.
pub fn log_archive_config(config: &ArchiveConfig, component: &'static str) {
    info!(
        component,
        event = "app.archive_config",
        data_root = %config.data_root.display(),
        base_url = %config.base_url,
        http_timeout_ms = config.http_timeout_ms,
        max_retries = config.max_retries
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
