//! Application configuration management.
//!
//! Handles loading, saving, and validating the halo configuration:
//! - Sync-error escalation grace period
//! - Debug-only runtime switches (infection override)

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::derive::DerivationConfig;
use crate::error::{HaloError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sync escalation settings.
    pub sync: SyncConfig,

    /// Debug-only switches; all off in release configurations.
    pub debug: DebugConfig,
}

/// Sync escalation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How many hours a bare connectivity failure must persist before it is
    /// surfaced as a sync problem.
    pub error_grace_period_hours: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            error_grace_period_hours: 24,
        }
    }
}

/// Debug-only switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Honour the injected infection override in the derivation.
    pub allow_infection_override: bool,
}

impl AppConfig {
    /// Load configuration from `path`, or return defaults if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the platform default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_or_default(Self::config_path()?)
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`HaloError::ConfigValidation`] for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.sync.error_grace_period_hours == 0 {
            return Err(HaloError::ConfigValidation {
                field: "sync.error_grace_period_hours",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The derivation parameters this configuration yields.
    #[must_use]
    pub fn derivation(&self) -> DerivationConfig {
        DerivationConfig {
            sync_error_grace_period: Duration::hours(i64::from(
                self.sync.error_grace_period_hours,
            )),
            allow_infection_override: self.debug.allow_infection_override,
        }
    }

    /// Get the configuration file path.
    fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/halo/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "halo")
                .ok_or(HaloError::NoPlatformDirectory("config"))?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sync.error_grace_period_hours, 24);
        assert!(!config.debug.allow_infection_override);
        assert_eq!(
            config.derivation().sync_error_grace_period,
            Duration::days(1)
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.sync.error_grace_period_hours = 6;
        config.debug.allow_infection_override = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nerror_grace_period_hours = 2\n").unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.sync.error_grace_period_hours, 2);
        assert!(!loaded.debug.allow_infection_override);
    }

    #[test]
    fn test_zero_grace_period_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nerror_grace_period_hours = 0\n").unwrap();

        let err = AppConfig::load_or_default(&path).unwrap_err();
        assert!(err.is_config_error());
    }
}
