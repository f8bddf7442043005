//! Process configuration and logging setup
//!
//! Values come from the environment, optionally seeded from a `.env` file.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::core::deadline::DEFAULT_DEADLINE_MARGIN_SECS;
use crate::core::replay::{DEFAULT_VARIANCE_BASE, MAX_VARIANCE_BASE};
use crate::core::resolver::{RunMode, SourceHint};

/// Largest accepted deadline margin (one day)
pub const MAX_DEADLINE_MARGIN_SECS: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(other.to_string()),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub default_source: SourceHint,
    pub cache_dir: PathBuf,
    pub enable_historical: bool,
    pub use_mock: bool,
    pub mock_data_file: PathBuf,
    /// Record dump served as the realtime feed
    pub feed_dump_file: Option<PathBuf>,
    pub enable_data_save: bool,
    pub historical_auto_fetch: bool,
    pub deadline_margin_secs: i64,
    pub replay_variance: f64,
    pub replay_seed: Option<u64>,
    pub cache_retention_days: u32,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            default_source: SourceHint::Auto,
            cache_dir: PathBuf::from("./historical_cache"),
            enable_historical: true,
            use_mock: true,
            mock_data_file: PathBuf::from("./mock_data/sample_odds.json"),
            feed_dump_file: None,
            enable_data_save: true,
            historical_auto_fetch: false,
            deadline_margin_secs: DEFAULT_DEADLINE_MARGIN_SECS,
            replay_variance: DEFAULT_VARIANCE_BASE,
            replay_seed: None,
            cache_retention_days: 365,
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load from the process environment after reading an optional `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("ENVIRONMENT").unwrap_or(defaults.environment);
        let development = environment.trim().eq_ignore_ascii_case("development");

        Ok(Self {
            default_source: parse_or(&get, "DEFAULT_DATA_SOURCE", defaults.default_source)?,
            cache_dir: get("HISTORICAL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            enable_historical: bool_or(&get, "ENABLE_HISTORICAL_DATA", defaults.enable_historical)?,
            use_mock: bool_or(&get, "USE_MOCK_DATA", development)?,
            mock_data_file: get("MOCK_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.mock_data_file),
            feed_dump_file: get("FEED_DUMP_FILE").map(PathBuf::from),
            enable_data_save: bool_or(&get, "ENABLE_DATA_SAVE", defaults.enable_data_save)?,
            historical_auto_fetch: bool_or(
                &get,
                "HISTORICAL_AUTO_FETCH",
                defaults.historical_auto_fetch,
            )?,
            deadline_margin_secs: parse_within(
                &get,
                "DEADLINE_MARGIN_SECS",
                defaults.deadline_margin_secs,
                |secs: &i64| (0..=MAX_DEADLINE_MARGIN_SECS).contains(secs),
            )?,
            replay_variance: parse_within(
                &get,
                "REPLAY_VARIANCE",
                defaults.replay_variance,
                |v: &f64| v.is_finite() && (0.0..=MAX_VARIANCE_BASE).contains(v),
            )?,
            replay_seed: get("REPLAY_SEED")
                .map(|v| parse_value("REPLAY_SEED", &v))
                .transpose()?,
            cache_retention_days: parse_or(
                &get,
                "CACHE_RETENTION_DAYS",
                defaults.cache_retention_days,
            )?,
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or(&get, "LOG_FORMAT", defaults.log_format)?,
            environment,
        })
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_environment(&self.environment)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

/// Like `parse_or`, but values failing `accept` are errors too
fn parse_within<T, G, A>(get: &G, key: &str, default: T, accept: A) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
    A: Fn(&T) -> bool,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };
    let parsed = parse_value(key, &value)?;
    if accept(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value,
        })
    }
}

fn bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, "development");
        assert_eq!(config.run_mode(), RunMode::Archival);
        assert_eq!(config.default_source, SourceHint::Auto);
        assert!(config.use_mock);
        assert!(config.enable_historical);
        assert!(config.feed_dump_file.is_none());
        assert_eq!(config.deadline_margin_secs, 60);
        assert_eq!(config.replay_variance, 0.1);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_production_disables_mock_by_default() {
        let config = load(&[("ENVIRONMENT", "production")]).unwrap();
        assert_eq!(config.run_mode(), RunMode::Live);
        assert!(!config.use_mock);

        let config = load(&[("ENVIRONMENT", "production"), ("USE_MOCK_DATA", "true")]).unwrap();
        assert!(config.use_mock);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DEFAULT_DATA_SOURCE", "historical"),
            ("HISTORICAL_CACHE_DIR", "/tmp/odds"),
            ("FEED_DUMP_FILE", "/tmp/feed.dat"),
            ("REPLAY_SEED", "42"),
            ("PORT", "9000"),
            ("LOG_FORMAT", "json"),
            ("ENABLE_DATA_SAVE", "0"),
        ])
        .unwrap();
        assert_eq!(config.default_source, SourceHint::Historical);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/odds"));
        assert_eq!(config.feed_dump_file, Some(PathBuf::from("/tmp/feed.dat")));
        assert_eq!(config.replay_seed, Some(42));
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(!config.enable_data_save);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("PORT", "  "), ("REPLAY_SEED", "")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.replay_seed, None);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert_eq!(
            load(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::Invalid {
                key: "PORT".to_string(),
                value: "eighty".to_string()
            }
        );
        assert!(load(&[("USE_MOCK_DATA", "maybe")]).is_err());
        assert!(load(&[("DEFAULT_DATA_SOURCE", "ftp")]).is_err());
        assert!(load(&[("REPLAY_VARIANCE", "ten")]).is_err());
    }

    #[test]
    fn test_replay_variance_must_be_finite_and_bounded() {
        for value in ["NaN", "inf", "-inf", "1.5", "0.5", "-0.1"] {
            assert_eq!(
                load(&[("REPLAY_VARIANCE", value)]).unwrap_err(),
                ConfigError::Invalid {
                    key: "REPLAY_VARIANCE".to_string(),
                    value: value.to_string()
                },
                "{}",
                value
            );
        }
        assert_eq!(load(&[("REPLAY_VARIANCE", "0")]).unwrap().replay_variance, 0.0);
        assert_eq!(load(&[("REPLAY_VARIANCE", "0.45")]).unwrap().replay_variance, 0.45);
    }

    #[test]
    fn test_deadline_margin_is_bounded() {
        for value in ["-1", "86401", "9223372036854775807"] {
            assert!(load(&[("DEADLINE_MARGIN_SECS", value)]).is_err(), "{}", value);
        }
        assert_eq!(
            load(&[("DEADLINE_MARGIN_SECS", "86400")]).unwrap().deadline_margin_secs,
            86_400
        );
        assert_eq!(load(&[("DEADLINE_MARGIN_SECS", "0")]).unwrap().deadline_margin_secs, 0);
    }

    #[test]
    fn test_retention_days_reject_negatives() {
        assert!(load(&[("CACHE_RETENTION_DAYS", "-1")]).is_err());
        assert_eq!(load(&[("CACHE_RETENTION_DAYS", "30")]).unwrap().cache_retention_days, 30);
    }
}
