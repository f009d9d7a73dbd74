//! Daemon configuration.
//!
//! Settings come from, in increasing precedence:
//! 1. built-in defaults
//! 2. a TOML file (`--config`, or `$XDG_CONFIG_HOME/tunedmode/config.toml`)
//! 3. the `TUNEDMODE_PROFILE` environment variable
//! 4. the `--profile` command-line flag
//!
//! ```toml
//! performance_profile = "latency-performance"
//! reconcile_interval_secs = 5
//! profile_timeout_secs = 10
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use tunedmode_core::ProfileName;

use crate::registry::{RegistrySettings, DEFAULT_RECONCILE_INTERVAL};
use crate::tuned::DEFAULT_PROFILE_TIMEOUT;

/// Environment variable overriding the performance profile.
pub const ENV_PROFILE: &str = "TUNEDMODE_PROFILE";

/// Profile applied when nothing else is configured.
pub const DEFAULT_PERFORMANCE_PROFILE: &str = "latency-performance";

const APP_DIR: &str = "tunedmode";
const FILENAME: &str = "config.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("performance profile from {origin} must not be empty")]
    EmptyProfile { origin: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

// ============================================================================
// File Format
// ============================================================================

/// On-disk representation. Every key is optional.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    performance_profile: String,
    reconcile_interval_secs: u64,
    profile_timeout_secs: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            performance_profile: DEFAULT_PERFORMANCE_PROFILE.to_string(),
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL.as_secs(),
            profile_timeout_secs: DEFAULT_PROFILE_TIMEOUT.as_secs(),
        }
    }
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Validated daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub performance_profile: ProfileName,
    pub reconcile_interval: Duration,
    pub profile_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            performance_profile: ProfileName::new(DEFAULT_PERFORMANCE_PROFILE),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            profile_timeout: DEFAULT_PROFILE_TIMEOUT,
        }
    }
}

impl DaemonConfig {
    /// `$XDG_CONFIG_HOME/tunedmode/config.toml`, if a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILENAME))
    }

    /// Builds the effective configuration from every source.
    ///
    /// An explicit `config_path` must exist; the default path may be absent,
    /// in which case defaults apply.
    pub fn resolve(
        config_path: Option<&Path>,
        env_profile: Option<&str>,
        cli_profile: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => {
                    debug!("No config file, using defaults");
                    Self::default()
                }
            },
        };

        if let Some(profile) = env_profile {
            config.performance_profile = parse_profile(profile, ENV_PROFILE)?;
        }
        if let Some(profile) = cli_profile {
            config.performance_profile = parse_profile(profile, "--profile")?;
        }

        Ok(config)
    }

    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Self::from_file(file)
    }

    fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            performance_profile: parse_profile(&file.performance_profile, "config file")?,
            reconcile_interval: positive_secs(file.reconcile_interval_secs, "reconcile_interval_secs")?,
            profile_timeout: positive_secs(file.profile_timeout_secs, "profile_timeout_secs")?,
        })
    }

    /// Parameters for `spawn_registry`.
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            performance_profile: self.performance_profile.clone(),
            reconcile_interval: self.reconcile_interval,
        }
    }
}

fn parse_profile(raw: &str, origin: &'static str) -> Result<ProfileName, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::EmptyProfile { origin })
}

fn positive_secs(secs: u64, field: &'static str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.performance_profile.as_str(), "latency-performance");
        assert_eq!(config.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.profile_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
            performance_profile = "throughput-performance"
            reconcile_interval_secs = 2
            profile_timeout_secs = 30
            "#,
        );

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.performance_profile.as_str(), "throughput-performance");
        assert_eq!(config.reconcile_interval, Duration::from_secs(2));
        assert_eq!(config.profile_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config("performance_profile = \"accelerator-performance\"\n");

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.performance_profile.as_str(), "accelerator-performance");
        assert_eq!(config.reconcile_interval, DEFAULT_RECONCILE_INTERVAL);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let file = write_config("perfomance_profile = \"typo\"\n");
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_rejects_zero_interval() {
        let file = write_config("reconcile_interval_secs = 0\n");
        let err = DaemonConfig::load(file.path()).unwrap_err();
        assert_eq!(err.to_string(), "reconcile_interval_secs must be greater than zero");
    }

    #[test]
    fn test_load_rejects_empty_profile() {
        let file = write_config("performance_profile = \"  \"\n");
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::EmptyProfile { origin: "config file" })
        ));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        assert!(matches!(
            DaemonConfig::resolve(Some(&missing), None, None),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_precedence_file_env_cli() {
        let file = write_config("performance_profile = \"from-file\"\n");

        let config = DaemonConfig::resolve(Some(file.path()), None, None).unwrap();
        assert_eq!(config.performance_profile.as_str(), "from-file");

        let config = DaemonConfig::resolve(Some(file.path()), Some("from-env"), None).unwrap();
        assert_eq!(config.performance_profile.as_str(), "from-env");

        let config =
            DaemonConfig::resolve(Some(file.path()), Some("from-env"), Some("from-cli")).unwrap();
        assert_eq!(config.performance_profile.as_str(), "from-cli");
    }

    #[test]
    fn test_empty_env_profile_is_error() {
        let file = write_config("");
        assert!(matches!(
            DaemonConfig::resolve(Some(file.path()), Some(""), None),
            Err(ConfigError::EmptyProfile { origin: ENV_PROFILE })
        ));
    }

    #[test]
    fn test_registry_settings() {
        let settings = DaemonConfig::default().registry_settings();
        assert_eq!(settings.performance_profile.as_str(), DEFAULT_PERFORMANCE_PROFILE);
        assert_eq!(settings.reconcile_interval, DEFAULT_RECONCILE_INTERVAL);
    }
}
