use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use air365_common::{FieldKind, StationQuery};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "AIR365_CONFIG";
pub const KWEATHER_API_URL: &str = "https://datacenter.kweather.co.kr/api/app/iotData";

/// Longest accepted refresh interval: one year
pub const MAX_INTERVAL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream endpoint, overridable for proxies and local testing
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Width of one fetch cache bucket
    #[serde(default = "default_bucket_minutes")]
    pub cache_bucket_minutes: u64,

    /// Station groups keyed by slug
    #[serde(default)]
    pub sensors: BTreeMap<String, StationGroupConfig>,
}

/// One `[sensors.<slug>]` block, as written by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationGroupConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub station_no: String,

    /// Refresh interval in seconds
    #[serde(default = "default_interval")]
    pub interval: i64,

    #[serde(default = "default_sensor_types")]
    pub sensor_types: Vec<String>,

    #[serde(default)]
    pub sensor_location: Option<String>,

    #[serde(default)]
    pub unique_id: Option<String>,
}

/// A station group that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationGroup {
    pub slug: String,
    pub name: String,
    pub station: StationQuery,
    pub interval: Duration,
    pub fields: Vec<FieldKind>,
    pub location: Option<String>,
    pub unique_id: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8365
}

fn default_api_url() -> String {
    KWEATHER_API_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_bucket_minutes() -> u64 {
    10
}

fn default_interval() -> i64 {
    3600
}

fn default_sensor_types() -> Vec<String> {
    FieldKind::DEFAULT_MEASUREMENTS
        .iter()
        .map(|f| f.as_str().to_string())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            host: default_host(),
            port: default_port(),
            api_url: default_api_url(),
            request_timeout_seconds: default_request_timeout(),
            cache_bucket_minutes: default_bucket_minutes(),
            sensors: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file '{}'", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn bucket_width(&self) -> Result<Duration, ConfigError> {
        if self.cache_bucket_minutes == 0 {
            return Err(ConfigError::ZeroBucket);
        }
        Ok(Duration::from_secs(self.cache_bucket_minutes * 60))
    }

    /// Validate every group, logging and skipping the ones that fail.
    pub fn station_groups(&self) -> Vec<StationGroup> {
        let mut groups = Vec::with_capacity(self.sensors.len());
        for (slug, group) in &self.sensors {
            match group.validate(slug) {
                Ok(valid) => groups.push(valid),
                Err(e) => tracing::error!("Skipping station group: {}", e),
            }
        }
        groups
    }
}

impl StationGroupConfig {
    pub fn validate(&self, slug: &str) -> Result<StationGroup, ConfigError> {
        let station = StationQuery::new(self.station_no.as_str()).map_err(|_| {
            ConfigError::EmptyStationNo {
                group: slug.to_string(),
            }
        })?;

        if self.interval <= 0 {
            return Err(ConfigError::ZeroInterval {
                group: slug.to_string(),
                interval: self.interval,
            });
        }
        if self.interval > MAX_INTERVAL_SECONDS {
            return Err(ConfigError::IntervalTooLarge {
                group: slug.to_string(),
                interval: self.interval,
                max: MAX_INTERVAL_SECONDS,
            });
        }

        let mut fields = Vec::with_capacity(self.sensor_types.len());
        for raw in &self.sensor_types {
            let field: FieldKind = raw.parse().map_err(|_| ConfigError::UnknownField {
                group: slug.to_string(),
                field: raw.clone(),
            })?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        if fields.is_empty() {
            return Err(ConfigError::NoFields {
                group: slug.to_string(),
            });
        }

        let name = if self.name.trim().is_empty() {
            slug.to_string()
        } else {
            self.name.trim().to_string()
        };

        Ok(StationGroup {
            slug: slug.to_string(),
            name,
            station,
            interval: Duration::from_secs(self.interval as u64),
            fields,
            location: self.sensor_location.clone().filter(|l| !l.trim().is_empty()),
            unique_id: self.unique_id.clone(),
        })
    }
}

pub static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Load the config file named by `AIR365_CONFIG` (or `config.toml`) into [`CONFIG`].
pub fn read_config() -> anyhow::Result<&'static AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::from_file(&path)?;
    Ok(CONFIG.get_or_init(|| config))
}
