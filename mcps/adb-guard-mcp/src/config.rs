//! Gateway configuration
//!
//! Loaded once at start-up from TOML. Every field has a default so an empty
//! file (or no file) is a valid configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationKind;
use crate::security::{ProtectedPath, RiskLevel};

/// Env var that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "ADB_GUARD_CONFIG_PATH";

/// Upper bound for `security.confirmation_ttl_secs` (one day)
pub const MAX_CONFIRMATION_TTL_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid rule pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdbGuardConfig {
    #[serde(default)]
    pub adb: AdbConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbConfig {
    /// adb binary, looked up on PATH when not absolute
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Default per-command timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Hard cap for caller-supplied timeouts
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: u64,
}

fn default_binary() -> String {
    "adb".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_timeout() -> u64 {
    300
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_timeout(),
            max_timeout_secs: default_max_timeout(),
        }
    }
}

impl AdbConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Text output returned to the client is cut at this many bytes
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Default line limit for logcat
    #[serde(default = "default_log_lines")]
    pub log_lines: u32,
}

fn default_max_output() -> usize {
    100_000
}

fn default_log_lines() -> u32 {
    1000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: default_max_output(),
            log_lines: default_log_lines(),
        }
    }
}

/// A classification rule added on top of the built-in tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub risk: RiskLevel,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Relative device paths resolve here; no path may leave it
    #[serde(default = "default_device_root")]
    pub device_root: String,

    /// Lifetime of a confirmation token
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_secs: u64,

    /// Hex-encoded HMAC key. A random key is generated when unset, so
    /// tokens do not survive a restart.
    #[serde(default)]
    pub confirmation_secret: Option<String>,

    /// Extra rules, checked before the built-in rules of the same band
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Extra critical path prefixes
    #[serde(default)]
    pub protected_paths: Vec<ProtectedPath>,

    /// Minimum risk per operation, e.g. `adb_shell = "medium"`
    #[serde(default)]
    pub operation_floors: HashMap<OperationKind, RiskLevel>,
}

fn default_device_root() -> String {
    "/".to_string()
}

fn default_confirmation_ttl() -> u64 {
    300
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            device_root: default_device_root(),
            confirmation_ttl_secs: default_confirmation_ttl(),
            confirmation_secret: None,
            rules: Vec::new(),
            protected_paths: Vec::new(),
            operation_floors: HashMap::new(),
        }
    }
}

impl SecurityConfig {
    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }
}

impl AdbGuardConfig {
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load from the first config file found, or defaults if there is none.
    ///
    /// Search order:
    /// 1. `$ADB_GUARD_CONFIG_PATH`
    /// 2. `./adb-guard.toml`
    /// 3. `$XDG_CONFIG_HOME/adb-guard/config.toml`
    /// 4. `~/.adb-guard.toml`
    ///
    /// A file that exists but does not parse is an error, and so is an
    /// explicit path that does not exist. Falling back to defaults would
    /// silently drop operator rules.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }

    /// [`AdbGuardConfig::load`] with the explicit path already resolved
    pub fn load_with(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::from_path(&path)?;
            tracing::info!("Loaded config from {}={}", CONFIG_PATH_ENV, path.display());
            return Ok(config);
        }

        for path in Self::search_paths() {
            if path.exists() {
                let config = Self::from_path(&path)?;
                tracing::info!("Loaded config from {}", path.display());
                return Ok(config);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("adb-guard.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("adb-guard").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".adb-guard.toml"));
        }
        paths
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.adb.timeout_secs == 0 {
            return Err(invalid("adb.timeout_secs", "must be greater than zero"));
        }
        if self.adb.max_timeout_secs < self.adb.timeout_secs {
            return Err(invalid(
                "adb.max_timeout_secs",
                "must not be lower than adb.timeout_secs",
            ));
        }
        if self.security.confirmation_ttl_secs == 0 {
            return Err(invalid(
                "security.confirmation_ttl_secs",
                "must be greater than zero",
            ));
        }
        if self.security.confirmation_ttl_secs > MAX_CONFIRMATION_TTL_SECS {
            return Err(invalid(
                "security.confirmation_ttl_secs",
                format!("must not exceed {MAX_CONFIRMATION_TTL_SECS}"),
            ));
        }
        if !self.security.device_root.starts_with('/') {
            return Err(invalid("security.device_root", "must be an absolute path"));
        }
        if let Some(bad) = self
            .security
            .protected_paths
            .iter()
            .find(|p| !p.path_prefix.starts_with('/'))
        {
            return Err(invalid(
                "security.protected_paths",
                format!("'{}' is not an absolute path", bad.path_prefix),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> Result<AdbGuardConfig, ConfigError> {
        AdbGuardConfig::from_toml_str(content, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.adb.binary, "adb");
        assert_eq!(config.adb.timeout_secs, 30);
        assert_eq!(config.adb.max_timeout_secs, 300);
        assert_eq!(config.limits.max_output_bytes, 100_000);
        assert_eq!(config.security.device_root, "/");
        assert_eq!(config.security.confirmation_ttl(), Duration::from_secs(300));
        assert!(config.security.rules.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [adb]
            binary = "/opt/platform-tools/adb"
            timeout_secs = 10

            [security]
            device_root = "/sdcard"
            confirmation_ttl_secs = 60

            [[security.rules]]
            pattern = "^am\\s+kill"
            risk = "high"
            category = "process_control"

            [[security.protected_paths]]
            path_prefix = "/data/misc/keystore/"
            reason = "keystore"

            [security.operation_floors]
            adb_shell = "medium"
            "#,
        )
        .unwrap();

        assert_eq!(config.adb.binary, "/opt/platform-tools/adb");
        assert_eq!(config.adb.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.security.rules[0].risk, RiskLevel::High);
        assert_eq!(config.security.protected_paths.len(), 1);
        assert_eq!(
            config.security.operation_floors.get(&OperationKind::Shell),
            Some(&RiskLevel::Medium)
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            parse("[adb]\ntimeout_secs = 0"),
            Err(ConfigError::InvalidSetting { .. })
        ));
        assert!(matches!(
            parse("[adb]\ntimeout_secs = 60\nmax_timeout_secs = 30"),
            Err(ConfigError::InvalidSetting { .. })
        ));
        assert!(matches!(
            parse("[security]\ndevice_root = \"sdcard\""),
            Err(ConfigError::InvalidSetting { .. })
        ));
        assert!(matches!(
            parse("[security]\nconfirmation_ttl_secs = \"soon\""),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            parse("[security]\nconfirmation_ttl_secs = 9000000000000"),
            Err(ConfigError::InvalidSetting { .. })
        ));
        assert!(parse("[security]\nconfirmation_ttl_secs = 86400").is_ok());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let missing = AdbGuardConfig::load_with(Some(PathBuf::from("/nonexistent/adb-guard.toml")));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[security]\ndevice_root = \"/sdcard\"").unwrap();
        let config = AdbGuardConfig::load_with(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.security.device_root, "/sdcard");
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_output_bytes = 2048").unwrap();
        let config = AdbGuardConfig::from_path(file.path()).unwrap();
        assert_eq!(config.limits.max_output_bytes, 2048);

        let missing = AdbGuardConfig::from_path(Path::new("/nonexistent/adb-guard.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
