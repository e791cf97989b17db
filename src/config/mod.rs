//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "atelier";
const ENV_PREFIX: &str = "ATELIER";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_ENTRIES: u64 = 512;
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 30;

/// Settings overrides accepted on the command line.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ATELIER_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    /// Base URL of the platform, e.g. https://atelier.example.
    #[arg(long = "site", env = "ATELIER_SITE_URL", value_name = "URL", global = true)]
    pub site: Option<String>,

    /// Override the request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub toggle: ToggleSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: NonZeroUsize,
    pub stale_after: Option<Duration>,
    pub refetch_on_invalidate: bool,
}

#[derive(Debug, Clone)]
pub struct ToggleSettings {
    pub pending_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(overrides: &ConfigOverrides) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = overrides.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    cache: RawCacheSettings,
    toggle: RawToggleSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(site) = overrides.site.as_ref() {
            self.api.base_url = Some(site.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.api.timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            cache,
            toggle,
            logging,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            cache: build_cache_settings(cache)?,
            toggle: build_toggle_settings(toggle)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api.base_url.filter(|url| !url.trim().is_empty()).ok_or_else(|| {
        LoadError::invalid(
            "api.base_url",
            "is required (set it in atelier.toml, ATELIER_API__BASE_URL or --site)",
        )
    })?;
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("api.base_url", format!("failed to parse: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }

    let timeout_seconds = api.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = match api.user_agent {
        Some(agent) if agent.trim().is_empty() => {
            return Err(LoadError::invalid("api.user_agent", "must not be empty"));
        }
        other => other,
    };

    Ok(ApiSettings {
        base_url,
        timeout: Duration::from_secs(timeout_seconds),
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_entries = non_zero_usize(
        cache.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
        "cache.max_entries",
    )?;

    let stale_after = match cache.stale_after_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.stale_after_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(CacheSettings {
        max_entries,
        stale_after,
        refetch_on_invalidate: cache.refetch_on_invalidate.unwrap_or(true),
    })
}

fn build_toggle_settings(toggle: RawToggleSettings) -> Result<ToggleSettings, LoadError> {
    let seconds = toggle
        .pending_timeout_seconds
        .unwrap_or(DEFAULT_PENDING_TIMEOUT_SECS);
    if seconds == 0 {
        return Err(LoadError::invalid(
            "toggle.pending_timeout_seconds",
            "must be greater than zero",
        ));
    }
    Ok(ToggleSettings {
        pending_timeout: Duration::from_secs(seconds),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    user_agent: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_entries: Option<u64>,
    stale_after_seconds: Option<u64>,
    refetch_on_invalidate: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToggleSettings {
    pending_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
