use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker_capacity: {0}. Must be at least 1")]
    InvalidWorkerCapacity(usize),

    #[error("Invalid {0}: must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Invalid failure_limit: {0}. Must be at least 1")]
    InvalidFailureLimit(u32),

    #[error("Artifact root cannot be empty")]
    EmptyArtifactRoot,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .texpro/config.yaml (project config)
    /// 3. .texpro/local.yaml (project local overrides, optional)
    /// 4. TEXPRO_* environment variables (`__` separates nested keys)
    /// 5. REPORTS_* environment variables for the scheduler block
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(None)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::figment(Some(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match file {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment
                .merge(Yaml::file(".texpro/config.yaml"))
                .merge(Yaml::file(".texpro/local.yaml")),
        };
        figment
            .merge(Env::prefixed("TEXPRO_").split("__"))
            .merge(Env::prefixed("REPORTS_").map(|key| format!("reports.{key}").into()))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        let reports = &config.reports;
        if reports.worker_capacity == 0 {
            return Err(ConfigError::InvalidWorkerCapacity(reports.worker_capacity));
        }
        for (name, value) in [
            ("tick_interval_seconds", reports.tick_interval_seconds),
            ("job_deadline_seconds", reports.job_deadline_seconds),
            ("lease_ttl_seconds", reports.lease_ttl_seconds),
            ("aggregator_deadline_seconds", reports.aggregator_deadline_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if reports.failure_limit == 0 {
            return Err(ConfigError::InvalidFailureLimit(reports.failure_limit));
        }
        if reports.artifact_root.trim().is_empty() {
            return Err(ConfigError::EmptyArtifactRoot);
        }

        if config.smtp.host.is_some() && config.smtp.from_address.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "smtp.from_address is required when smtp.host is set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CatchupPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".texpro/texpro.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.reports.worker_capacity, 4);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.reports.worker_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidWorkerCapacity(0))
        ));
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = Config::default();
        config.reports.lease_ttl_seconds = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroDuration("lease_ttl_seconds"))
        ));
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_paths() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));

        let mut config = Config::default();
        config.reports.artifact_root = " ".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyArtifactRoot)));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "reports:\n  worker_capacity: 2\n  failure_limit: 5\nlogging:\n  level: debug"
        )
        .unwrap();
        file.flush().unwrap();

        let config = temp_env::with_vars(
            [
                ("REPORTS_WORKER_CAPACITY", Some("8")),
                ("REPORTS_CATCHUP_POLICY", Some("all")),
                ("TEXPRO_SMTP__HOST", Some("smtp.example.com")),
                ("TEXPRO_SERVER__PORT", Some("9090")),
            ],
            || ConfigLoader::load_from_file(file.path()).unwrap(),
        );

        assert_eq!(config.reports.worker_capacity, 8, "REPORTS_ env should win over the file");
        assert_eq!(config.reports.failure_limit, 5, "File value should persist when not overridden");
        assert_eq!(config.reports.catchup_policy, CatchupPolicy::All);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.smtp.host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let result = temp_env::with_var("REPORTS_TICK_INTERVAL_SECONDS", Some("0"), || {
            let file = NamedTempFile::new().unwrap();
            ConfigLoader::load_from_file(file.path())
        });
        assert!(result.is_err());
    }
}
