//! Unified error types for the halo core library.
//!
//! Only the persistence and configuration surfaces return errors; the
//! derivation engine itself never fails across its public boundary — all
//! engine failure is represented as state (see the `derive` and `diary`
//! modules). Each variant here captures exactly one failure mode and its
//! message points at a resolution.

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all halo operations.
#[derive(Debug, Error)]
pub enum HaloError {
    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration could not be serialized for writing.
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {field}: {message}")]
    ConfigValidation {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// No platform directory could be determined for config or data files.
    #[error("Cannot determine a {0} directory on this platform")]
    NoPlatformDirectory(&'static str),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// A persisted document exists but could not be parsed.
    #[error("Failed to parse persisted document {}: {source}", .path.display())]
    DocumentParse {
        /// The document path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A persisted document could not be serialized.
    #[error("Failed to serialize persisted document: {0}")]
    DocumentSerialize(#[from] serde_json::Error),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for halo operations.
pub type Result<T> = std::result::Result<T, HaloError>;

impl HaloError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse(_)
                | Self::ConfigSerialize(_)
                | Self::ConfigValidation { .. }
                | Self::NoPlatformDirectory(_)
        )
    }

    /// Returns `true` if this error is related to persistence or I/O.
    #[inline]
    #[must_use]
    pub const fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            Self::DocumentParse { .. } | Self::DocumentSerialize(_) | Self::Io(_)
        )
    }
}
