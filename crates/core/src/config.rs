//! TOML-based configuration for gitstage.
//!
//! The file is optional: a missing default config yields
//! [`AppConfig::default`]. Paths given explicitly must exist.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External merge / diff tool.
    #[serde(default)]
    pub merge_tool: MergeToolConfig,

    /// Per-repository behaviour.
    #[serde(default)]
    pub repository: RepositoryConfig,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge tool
// ---------------------------------------------------------------------------

/// Supported external merge / diff tools.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeToolKind {
    #[default]
    Meld,
    #[serde(rename = "kdiff3")]
    KDiff3,
    #[serde(rename = "p4merge")]
    P4Merge,
    #[serde(rename = "diffmerge")]
    DiffMerge,
}

impl MergeToolKind {
    /// Executable name used when no explicit path is configured.
    pub fn default_executable(self) -> &'static str {
        match self {
            Self::Meld => "meld",
            Self::KDiff3 => "kdiff3",
            Self::P4Merge => "p4merge",
            Self::DiffMerge => "diffmerge",
        }
    }
}

impl std::fmt::Display for MergeToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_executable())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeToolConfig {
    #[serde(default)]
    pub kind: MergeToolKind,

    /// Explicit executable path; falls back to the tool name on `$PATH`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl MergeToolConfig {
    /// The program to launch.
    pub fn executable(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.kind.default_executable()))
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Per-repository user settings file at the repo root. Never listed as a
    /// change, and removed before a pull if it was never committed.
    #[serde(default = "default_settings_filename")]
    pub settings_filename: String,
}

fn default_settings_filename() -> String {
    ".gitstage-user.toml".into()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            settings_filename: default_settings_filename(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Default config location: `<config dir>/gitstage/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("gitstage").join("config.toml"))
    }

    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise built-in defaults. The result is validated.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::load_from_file(&p)?,
                _ => {
                    debug!("no configuration file, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.repository.settings_filename;
        if name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.settings_filename".into(),
                detail: "settings filename must not be empty".into(),
            });
        }
        if name.contains('/') || name.contains('\\') {
            return Err(ConfigError::InvalidValue {
                field: "repository.settings_filename".into(),
                detail: "settings filename must be a bare file name".into(),
            });
        }
        if let Some(path) = &self.merge_tool.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "merge_tool.path".into(),
                    detail: "tool path must not be empty when set".into(),
                });
            }
        }
        Ok(())
    }
}
