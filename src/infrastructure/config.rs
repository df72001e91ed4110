use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;

pub const DEFAULT_ACTIVITY_WATCH_URL: &str = "http://localhost:5600/api/0/query/";
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub activity_watch_url: String,
    pub refresh_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Count only time the AFK watcher reports as not-afk.
    pub filter_afk: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            activity_watch_url: DEFAULT_ACTIVITY_WATCH_URL.to_string(),
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            filter_afk: true,
        }
    }
}

impl AppConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn activity_watch_endpoint(&self) -> Result<Url, InfraError> {
        Url::parse(self.activity_watch_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!(
                "invalid activityWatchUrl '{}': {error}",
                self.activity_watch_url
            ))
        })
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        self.activity_watch_endpoint()?;
        if self.refresh_interval_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "refreshIntervalSeconds must be > 0".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "requestTimeoutSeconds must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_app_file() -> serde_json::Value {
    let defaults = AppConfig::default();
    serde_json::json!({
        "schema": SUPPORTED_SCHEMA,
        "activityWatchUrl": defaults.activity_watch_url,
        "refreshIntervalSeconds": defaults.refresh_interval_seconds,
        "requestTimeoutSeconds": defaults.request_timeout_seconds,
        "filterAfk": defaults.filter_afk
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_file())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let mut value = read_config(&config_dir.join(APP_JSON))?;
    if let Some(object) = value.as_object_mut() {
        object.remove("schema");
    }
    let config: AppConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
