//! Logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoggingConfig {
    pub(crate) level: String,
    pub(crate) format: LogFormat,
    pub(crate) include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: false,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub(crate) fn logging_config_from_env() -> LoggingConfig {
    logging_config_from(|key| env::var(key).ok())
}

/// Build the config from `DENSIFY_LOG_*` variables resolved through `lookup`.
pub(crate) fn logging_config_from(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = lookup("DENSIFY_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Some(parsed) = lookup("DENSIFY_LOG_FORMAT").and_then(|f| parse_log_format(&f)) {
        config.format = parsed;
    }

    if let Some(parsed) = lookup("DENSIFY_LOG_TARGET").and_then(|t| parse_bool(&t)) {
        config.include_target = parsed;
    }

    config
}

pub(crate) fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so panel output on stdout stays clean.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.compact().finish())?,
    }

    Ok(())
}

pub(crate) fn log_app_start(config: &LoggingConfig, command: &str) {
    info!(
        event = "app.start",
        command,
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> LoggingConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        logging_config_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_env_missing() {
        assert_eq!(config_from(&[]), LoggingConfig::default());
    }

    #[test]
    fn parses_json_and_level_and_target_from_env() {
        let cfg = config_from(&[
            ("DENSIFY_LOG_LEVEL", "debug"),
            ("DENSIFY_LOG_FORMAT", "JSON"),
            ("DENSIFY_LOG_TARGET", "yes"),
        ]);

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.include_target);
    }

    #[test]
    fn invalid_format_or_target_falls_back_to_defaults() {
        let cfg = config_from(&[
            ("DENSIFY_LOG_LEVEL", "  "),
            ("DENSIFY_LOG_FORMAT", "yaml"),
            ("DENSIFY_LOG_TARGET", "maybe"),
        ]);

        assert_eq!(cfg, LoggingConfig::default());
    }
}
