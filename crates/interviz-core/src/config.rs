use crate::error::{InterVizError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "INTERVIZ_CONFIG";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "interviz.toml";

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// How jobs share the engine's computational region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionPolicy {
    /// Every job runs in its own cloned mapset
    #[default]
    Isolated,
    /// Jobs share one mapset; region-narrowing jobs take exclusive access
    Exclusive,
}

impl std::fmt::Display for RegionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionPolicy::Isolated => write!(f, "isolated"),
            RegionPolicy::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// HTTP status used for domain errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatusMode {
    /// Always answer 200, the error lives in the `message` body only
    #[default]
    Compat,
    /// 400 for request errors, 500 for computation errors, 504 for timeouts
    Http,
}

/// Layered configuration for the Interviz service
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub host: ConfigValue<String>,
    pub port: ConfigValue<u16>,
    pub pool_size: ConfigValue<usize>,
    pub queue_capacity: ConfigValue<usize>,
    pub dem_path: ConfigValue<Option<PathBuf>>,
    pub temp_root: ConfigValue<PathBuf>,
    pub region_policy: ConfigValue<RegionPolicy>,
    pub job_timeout_secs: ConfigValue<u64>,
    pub error_status: ConfigValue<ErrorStatusMode>,
    pub static_dir: ConfigValue<PathBuf>,
    pub cors_origin: ConfigValue<String>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            host: ConfigValue::new("0.0.0.0".to_string(), ConfigSource::Default),
            port: ConfigValue::new(5000, ConfigSource::Default),
            pool_size: ConfigValue::new(4, ConfigSource::Default),
            queue_capacity: ConfigValue::new(64, ConfigSource::Default),
            dem_path: ConfigValue::new(None, ConfigSource::Default),
            temp_root: ConfigValue::new(env::temp_dir(), ConfigSource::Default),
            region_policy: ConfigValue::new(RegionPolicy::Isolated, ConfigSource::Default),
            job_timeout_secs: ConfigValue::new(300, ConfigSource::Default),
            error_status: ConfigValue::new(ErrorStatusMode::Compat, ConfigSource::Default),
            static_dir: ConfigValue::new(PathBuf::from("."), ConfigSource::Default),
            cors_origin: ConfigValue::new(
                "http://localhost:3000".to_string(),
                ConfigSource::Default,
            ),
        }
    }

    /// Defaults, then the config file if one exists, then the environment
    pub fn load() -> Result<Self> {
        let config = Self::with_defaults();

        let config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => config.load_from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                config.load_from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => config,
        };

        let config = config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| InterVizError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| InterVizError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(host) = file_config.host {
            self.host.update(host, ConfigSource::File);
        }
        if let Some(port) = file_config.port {
            self.port.update(port, ConfigSource::File);
        }
        if let Some(pool_size) = file_config.pool_size {
            self.pool_size.update(pool_size, ConfigSource::File);
        }
        if let Some(queue_capacity) = file_config.queue_capacity {
            self.queue_capacity.update(queue_capacity, ConfigSource::File);
        }
        if let Some(dem_path) = file_config.dem_path {
            self.dem_path.update(Some(dem_path), ConfigSource::File);
        }
        if let Some(temp_root) = file_config.temp_root {
            self.temp_root.update(temp_root, ConfigSource::File);
        }
        if let Some(region_policy) = file_config.region_policy {
            self.region_policy.update(region_policy, ConfigSource::File);
        }
        if let Some(job_timeout_secs) = file_config.job_timeout_secs {
            self.job_timeout_secs.update(job_timeout_secs, ConfigSource::File);
        }
        if let Some(error_status) = file_config.error_status {
            self.error_status.update(error_status, ConfigSource::File);
        }
        if let Some(static_dir) = file_config.static_dir {
            self.static_dir.update(static_dir, ConfigSource::File);
        }
        if let Some(cors_origin) = file_config.cors_origin {
            self.cors_origin.update(cors_origin, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Ok(host) = env::var("INTERVIZ_HOST") {
            self.host.update(host, ConfigSource::Environment);
        }

        if let Ok(port_str) = env::var("INTERVIZ_PORT") {
            match port_str.parse::<u16>() {
                Ok(port) => self.port.update(port, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_PORT value '{}': expected a port number",
                    port_str
                ),
            }
        }

        if let Ok(size_str) = env::var("INTERVIZ_POOL_SIZE") {
            match size_str.parse::<usize>() {
                Ok(size) => self.pool_size.update(size, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_POOL_SIZE value '{}': expected a positive integer",
                    size_str
                ),
            }
        }

        if let Ok(capacity_str) = env::var("INTERVIZ_QUEUE_CAPACITY") {
            match capacity_str.parse::<usize>() {
                Ok(capacity) => self.queue_capacity.update(capacity, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_QUEUE_CAPACITY value '{}': expected a positive integer",
                    capacity_str
                ),
            }
        }

        if let Ok(dem) = env::var("INTERVIZ_DEM") {
            self.dem_path.update(Some(PathBuf::from(dem)), ConfigSource::Environment);
        }

        if let Ok(root) = env::var("INTERVIZ_TEMP_ROOT") {
            self.temp_root.update(PathBuf::from(root), ConfigSource::Environment);
        }

        if let Ok(policy_str) = env::var("INTERVIZ_REGION_POLICY") {
            match parse_region_policy(&policy_str) {
                Ok(policy) => self.region_policy.update(policy, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_REGION_POLICY value '{}': expected isolated or exclusive",
                    policy_str
                ),
            }
        }

        if let Ok(timeout_str) = env::var("INTERVIZ_JOB_TIMEOUT") {
            match timeout_str.parse::<u64>() {
                Ok(timeout) => self.job_timeout_secs.update(timeout, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_JOB_TIMEOUT value '{}': expected seconds",
                    timeout_str
                ),
            }
        }

        if let Ok(status_str) = env::var("INTERVIZ_ERROR_STATUS") {
            match parse_error_status(&status_str) {
                Ok(mode) => self.error_status.update(mode, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid INTERVIZ_ERROR_STATUS value '{}': expected compat or http",
                    status_str
                ),
            }
        }

        if let Ok(dir) = env::var("INTERVIZ_STATIC_DIR") {
            self.static_dir.update(PathBuf::from(dir), ConfigSource::Environment);
        }

        if let Ok(origin) = env::var("INTERVIZ_CORS_ORIGIN") {
            self.cors_origin.update(origin, ConfigSource::Environment);
        }

        self
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size.value == 0 {
            return Err(InterVizError::ConfigInvalid {
                key: "pool_size".to_string(),
                reason: "the worker pool needs at least one worker".to_string(),
            });
        }
        if self.queue_capacity.value == 0 {
            return Err(InterVizError::ConfigInvalid {
                key: "queue_capacity".to_string(),
                reason: "the job queue needs a capacity of at least one".to_string(),
            });
        }
        if self.job_timeout_secs.value == 0 {
            return Err(InterVizError::ConfigInvalid {
                key: "job_timeout_secs".to_string(),
                reason: "the job deadline must be at least one second".to_string(),
            });
        }
        Ok(())
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "bind".to_string(),
            (format!("{}:{}", self.host.value, self.port.value), self.port.source),
        );
        map.insert(
            "pool_size".to_string(),
            (self.pool_size.value.to_string(), self.pool_size.source),
        );
        map.insert(
            "dem_path".to_string(),
            (
                self.dem_path
                    .value
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<discover>".to_string()),
                self.dem_path.source,
            ),
        );
        map.insert(
            "region_policy".to_string(),
            (self.region_policy.value.to_string(), self.region_policy.source),
        );
        map.insert(
            "job_timeout_secs".to_string(),
            (self.job_timeout_secs.value.to_string(), self.job_timeout_secs.source),
        );
        map.insert(
            "error_status".to_string(),
            (format!("{:?}", self.error_status.value), self.error_status.source),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    pool_size: Option<usize>,
    queue_capacity: Option<usize>,
    dem_path: Option<PathBuf>,
    temp_root: Option<PathBuf>,
    region_policy: Option<RegionPolicy>,
    job_timeout_secs: Option<u64>,
    error_status: Option<ErrorStatusMode>,
    static_dir: Option<PathBuf>,
    cors_origin: Option<String>,
}

/// Parse region policy from string
pub fn parse_region_policy(s: &str) -> Result<RegionPolicy> {
    match s.to_lowercase().as_str() {
        "isolated" | "isolate" => Ok(RegionPolicy::Isolated),
        "exclusive" | "lock" => Ok(RegionPolicy::Exclusive),
        _ => Err(InterVizError::ConfigInvalid {
            key: "region_policy".to_string(),
            reason: format!("Invalid region policy: {}. Use isolated or exclusive", s),
        }),
    }
}

/// Parse error status mode from string
pub fn parse_error_status(s: &str) -> Result<ErrorStatusMode> {
    match s.to_lowercase().as_str() {
        "compat" | "200" => Ok(ErrorStatusMode::Compat),
        "http" => Ok(ErrorStatusMode::Http),
        _ => Err(InterVizError::ConfigInvalid {
            key: "error_status".to_string(),
            reason: format!("Invalid error status mode: {}. Use compat or http", s),
        }),
    }
}

/// Find the elevation raster to serve: the first `*.tif` in `dir`, by name
pub fn discover_dem(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| InterVizError::ConfigInvalid {
        key: "dem_path".to_string(),
        reason: format!("No GeoTIFF found in {}", dir.display()),
    })
}
