use std::{collections::BTreeMap, path::Path, path::PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::logging::{RollingPolicy, Severity, DEFAULT_LOG_DIRECTORY};

const DEFAULT_ENVIRONMENT: &str = "Production";

/// Hosting environment the process runs in, taken from `APP_ENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub name: String,
}

impl HostEnvironment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn from_env() -> Self {
        let name = std::env::var("APP_ENV")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        Self::new(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub environment_settings: EnvironmentSettings,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub app_environment: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            app_environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub minimum_level: Severity,
    /// Minimum level per target prefix, e.g. `hyper: info`.
    pub overrides: BTreeMap<String, Severity>,
    pub console: ConsoleConfig,
    pub file: FileSinkConfig,
    pub request_logging: RequestLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let overrides = [
            ("hyper", Severity::Information),
            ("axum", Severity::Warning),
            ("tower_http", Severity::Warning),
        ]
        .into_iter()
        .map(|(target, level)| (target.to_string(), level))
        .collect();

        Self {
            minimum_level: Severity::Debug,
            overrides,
            console: ConsoleConfig::default(),
            file: FileSinkConfig::default(),
            request_logging: RequestLoggingConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives: the minimum level followed by the overrides.
    pub fn directives(&self) -> String {
        let mut directives = vec![self.minimum_level.as_directive().to_string()];
        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level.as_directive()));
        }
        directives.join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    Template,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Template,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub file_size_limit_bytes: Option<u64>,
    pub roll_on_file_size_limit: bool,
    pub retained_file_count: Option<usize>,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            file_prefix: env!("CARGO_PKG_NAME").to_string(),
            file_size_limit_bytes: Some(1024 * 1024 * 1024),
            roll_on_file_size_limit: true,
            retained_file_count: Some(7),
        }
    }
}

impl FileSinkConfig {
    /// Rolling policy producing `<prefix>-<environment>-Log-<yyyyMMdd>.txt`.
    pub fn policy(&self, environment: &str) -> RollingPolicy {
        RollingPolicy::new(
            &self.directory,
            format!("{}-{}-Log-", self.file_prefix, environment),
        )
        .file_size_limit(self.file_size_limit_bytes)
        .roll_on_file_size_limit(self.roll_on_file_size_limit)
        .retained_file_count(self.retained_file_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLoggingConfig {
    /// Level of every request-completion event, whatever the status code.
    pub level: Severity,
}

impl Default for RequestLoggingConfig {
    fn default() -> Self {
        Self {
            level: Severity::Debug,
        }
    }
}

impl AppConfig {
    pub fn load(environment: &HostEnvironment) -> Result<Self> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(Path::new(&config_dir), environment)
    }

    /// Layers `default.yaml`, `<environment>.yaml` and `WEATHER_*` variables
    /// (`WEATHER_LOGGING__MINIMUM_LEVEL` sets `logging.minimum_level`).
    pub fn load_from(config_dir: &Path, environment: &HostEnvironment) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(config_dir.join("default.yaml")))
            .add_source(
                config::File::from(config_dir.join(format!("{}.yaml", environment.name)))
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("WEATHER")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Override with environment variables if present
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", i64::from(port.parse::<u16>()?))?;
        }

        let settings = builder.build()?;
        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }
}
