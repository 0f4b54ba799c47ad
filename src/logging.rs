//! Tracing setup for the command-line tool.
//!
//! Environment variables take precedence over the `[logging]` section:
//!
//! - `RELALG_TRACE_LEVEL` filter directive (e.g. `relalg_opt=trace`)
//! - `RELALG_TRACE_JSON` `1` for JSON lines, `0` for compact text
//! - `RELALG_TRACE_FILE` append events to this file instead of stderr

use crate::config::LoggingConfig;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

/// Effective tracing settings after environment overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl TraceSettings {
    /// Settings from `config`, overridden by the process environment
    pub fn from_env(config: &LoggingConfig) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Settings from `config`, overridden by whatever `lookup` returns
    pub fn resolve(config: &LoggingConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("RELALG_TRACE_LEVEL").unwrap_or_else(|| config.level.clone());
        let json = lookup("RELALG_TRACE_JSON").map_or_else(|| config.format == "json", |v| v != "0");
        let file = lookup("RELALG_TRACE_FILE")
            .map(PathBuf::from)
            .or_else(|| config.file.clone());
        TraceSettings { level, json, file }
    }
}

/// Install the global subscriber. Keep the returned guard alive until the
/// program exits, dropping it flushes buffered events.
pub fn init_tracing(settings: &TraceSettings) -> std::io::Result<WorkerGuard> {
    let (writer, guard) = match &settings.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&settings.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer.clone())
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if settings.json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    // a subscriber installed earlier (e.g. by a test harness) stays in place
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_config_values_without_overrides() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            file: None,
        };
        let settings = TraceSettings::resolve(&config, lookup(&[]));
        assert_eq!(settings.level, "debug");
        assert!(settings.json);
        assert_eq!(settings.file, None);
    }

    #[test]
    fn test_environment_wins() {
        let config = LoggingConfig::default();
        let settings = TraceSettings::resolve(
            &config,
            lookup(&[
                ("RELALG_TRACE_LEVEL", "relalg_opt=trace"),
                ("RELALG_TRACE_JSON", "1"),
                ("RELALG_TRACE_FILE", "/tmp/relalg.log"),
            ]),
        );
        assert_eq!(settings.level, "relalg_opt=trace");
        assert!(settings.json);
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/relalg.log")));
    }

    #[test]
    fn test_json_switch_off() {
        let config = LoggingConfig {
            format: "json".to_string(),
            ..LoggingConfig::default()
        };
        let settings = TraceSettings::resolve(&config, lookup(&[("RELALG_TRACE_JSON", "0")]));
        assert!(!settings.json);
    }
}
