use dispatch::config::{Config as DispatchConfig, ConfigError as DispatchConfigError};
use refdata::config::Config as RefdataConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "vas".to_string()
}

#[derive(Deserialize, Debug, Default)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    pub refdata: RefdataConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(metrics) = &self.metrics
            && metrics.statsd_port == 0
        {
            return Err(DispatchConfigError::InvalidPort.into());
        }
        self.dispatch.validate()?;
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] DispatchConfigError),
}
