use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DevPkiError, Result};

pub const CONFIG_FILE_NAME: &str = "config.toml";
const MIN_RSA_KEY_BITS: u32 = 2048;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ca: CaDefaults,
    #[serde(default)]
    pub ocsp: OcspConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the per-OS data directory when set
    #[serde(default)]
    pub data_directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaDefaults {
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_serial_max")]
    pub serial_max: u32,
    #[serde(default = "default_common_name_prefix")]
    pub common_name_prefix: String,
}

impl Default for CaDefaults {
    fn default() -> Self {
        Self {
            key_bits: default_key_bits(),
            validity_days: default_validity_days(),
            serial_max: default_serial_max(),
            common_name_prefix: default_common_name_prefix(),
        }
    }
}

fn default_key_bits() -> u32 {
    2048
}

fn default_validity_days() -> u32 {
    730 // 2 years
}

fn default_serial_max() -> u32 {
    100_000
}

fn default_common_name_prefix() -> String {
    "DevPKI CA".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcspConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub clock_skew_secs: u32,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            clock_skew_secs: 0,
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_response_bytes() -> usize {
    1024 * 1024
}

impl OcspConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path).map_err(|e| {
            DevPkiError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(config_str)
            .map_err(|e| DevPkiError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from `dir` when present, built-in defaults otherwise
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ca.key_bits < MIN_RSA_KEY_BITS {
            return Err(DevPkiError::Config(format!(
                "ca.key_bits must be at least {}, got {}",
                MIN_RSA_KEY_BITS, self.ca.key_bits
            )));
        }
        if self.ca.validity_days == 0 {
            return Err(DevPkiError::Config("ca.validity_days must be positive".into()));
        }
        if self.ca.serial_max == 0 {
            return Err(DevPkiError::Config("ca.serial_max must be positive".into()));
        }
        if self.ocsp.timeout_secs == 0 {
            return Err(DevPkiError::Config("ocsp.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.ca.key_bits, 2048);
        assert_eq!(config.ca.validity_days, 730);
        assert_eq!(config.ca.serial_max, 100_000);
        assert_eq!(config.ocsp.timeout(), Duration::from_secs(5));
        assert!(config.storage.data_directory.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::from_toml(
            r#"
            [ca]
            key_bits = 3072
            common_name_prefix = "Lab CA"

            [ocsp]
            timeout_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.ca.key_bits, 3072);
        assert_eq!(config.ca.common_name_prefix, "Lab CA");
        assert_eq!(config.ca.validity_days, 730);
        assert_eq!(config.ocsp.timeout_secs, 2);
    }

    #[test]
    fn test_rejects_weak_keys_and_zero_timeout() {
        let weak = AppConfig::from_toml("[ca]\nkey_bits = 1024\n");
        assert!(matches!(weak, Err(DevPkiError::Config(_))));

        let no_timeout = AppConfig::from_toml("[ocsp]\ntimeout_secs = 0\n");
        assert!(matches!(no_timeout, Err(DevPkiError::Config(_))));
    }

    #[test]
    fn test_load_from_dir_without_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.ca.serial_max, 100_000);

        fs::write(dir.path().join(CONFIG_FILE_NAME), "[ca]\nvalidity_days = 30\n").unwrap();
        let config = AppConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.ca.validity_days, 30);
    }

    #[test]
    fn test_load_from_missing_dir_creates_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("not-yet");
        let config = AppConfig::load_from_dir(&missing).unwrap();
        assert!(config.storage.data_directory.is_none());
        assert!(!missing.exists());
    }
}
