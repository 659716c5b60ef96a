use crate::data_structures::Interval;
use crate::utils::parse_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TICKER: &str = "NVDA";
pub const DEFAULT_START_DATE: &str = "2010-06-30";
pub const DEFAULT_END_DATE: &str = "2020-06-30";
pub const DEFAULT_QUERY_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid date for {field}: '{value}'")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid interval '{0}', expected one of 1d, 1wk, 1mo")]
    InvalidInterval(String),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

// HTTP client settings shared by every request
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub query_base_url: String,
    pub cookie_url: String,
    pub rate_limit_per_minute: u32,
    pub random_agent: bool,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_base_url: DEFAULT_QUERY_BASE_URL.to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            rate_limit_per_minute: 30,
            random_agent: true,
            max_retries: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

// YAML-serializable configuration structure, every field optional
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ConfigYaml {
    pub ticker: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub interval: Option<String>,
    pub workdir: Option<PathBuf>,
    pub rate_limit_per_minute: Option<u32>,
    pub random_agent: Option<bool>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub query_base_url: Option<String>,
    pub cookie_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub ticker: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub interval: Interval,
    pub workdir: Option<PathBuf>,
    pub client: ClientConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ticker: DEFAULT_TICKER.to_string(),
            start_date: parse_date(DEFAULT_START_DATE),
            end_date: parse_date(DEFAULT_END_DATE),
            interval: Interval::Daily,
            workdir: None,
            client: ClientConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit YAML path, then `CONFIG_FILE`, then environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_yaml(path);
        }
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(Path::new(&config_file))
        } else {
            Self::from_env()
        }
    }

    pub fn from_yaml(path: &Path) -> Result<Self, ConfigError> {
        let yaml_content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loading config from {}", path.display());
        Self::from_yaml_str(&yaml_content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let yaml_config: ConfigYaml = serde_yaml::from_str(content)?;
        Self::from_parts(yaml_config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from `YFX_*` keys resolved through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = ConfigYaml {
            ticker: lookup("YFX_TICKER"),
            start_date: lookup("YFX_START_DATE"),
            end_date: lookup("YFX_END_DATE"),
            interval: lookup("YFX_INTERVAL"),
            workdir: lookup("YFX_WORKDIR").map(PathBuf::from),
            rate_limit_per_minute: parse_opt(&lookup, "YFX_RATE_LIMIT")?,
            random_agent: parse_opt(&lookup, "YFX_RANDOM_AGENT")?,
            max_retries: parse_opt(&lookup, "YFX_MAX_RETRIES")?,
            timeout_secs: parse_opt(&lookup, "YFX_TIMEOUT_SECS")?,
            query_base_url: lookup("YFX_QUERY_BASE_URL"),
            cookie_url: lookup("YFX_COOKIE_URL"),
        };
        Self::from_parts(parsed)
    }

    fn from_parts(raw: ConfigYaml) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let client_defaults = defaults.client;

        let start_date = match raw.start_date {
            Some(value) => parse_config_date("start_date", &value)?,
            None => defaults.start_date,
        };
        let end_date = match raw.end_date {
            Some(value) => parse_config_date("end_date", &value)?,
            None => defaults.end_date,
        };
        let interval = match raw.interval {
            Some(value) => value
                .parse::<Interval>()
                .map_err(ConfigError::InvalidInterval)?,
            None => defaults.interval,
        };

        Ok(Self {
            ticker: raw.ticker.unwrap_or(defaults.ticker).to_uppercase(),
            start_date,
            end_date,
            interval,
            workdir: raw.workdir,
            client: ClientConfig {
                query_base_url: raw.query_base_url.unwrap_or(client_defaults.query_base_url),
                cookie_url: raw.cookie_url.unwrap_or(client_defaults.cookie_url),
                rate_limit_per_minute: raw
                    .rate_limit_per_minute
                    .unwrap_or(client_defaults.rate_limit_per_minute),
                random_agent: raw.random_agent.unwrap_or(client_defaults.random_agent),
                max_retries: raw.max_retries.unwrap_or(client_defaults.max_retries),
                timeout: raw
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(client_defaults.timeout),
            },
        })
    }
}

// An empty string or "none" clears the date (full history / up to now)
fn parse_config_date(field: &'static str, value: &str) -> Result<Option<NaiveDate>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_date(trimmed)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

fn parse_opt<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
