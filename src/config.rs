//! Deployment configuration.
//!
//! Settings load from `~/.polystore/config.toml` (or an explicit path) and
//! individual values can be overridden through `POLYSTORE_*` environment
//! variables. Everything is optional; the defaults suit embedded use where
//! the host wires metadata and adapters directly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Environment id used to scope unique resource names; overrides the
    /// metadata store's value when set.
    pub env_id: Option<String>,
    /// Path of the application manifest for file-backed metadata.
    pub manifest_path: Option<PathBuf>,
    /// Prefer read replicas for read-side methods when available.
    pub use_read_replicas: bool,
}

impl ClientConfig {
    /// Directory holding the configuration file.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".polystore"))
    }

    fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load the configuration: file values first, environment overrides on
    /// top. A missing file yields the defaults.
    pub fn load() -> Self {
        let mut config = Self::config_file()
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    debug!("ignoring unreadable config file: {e}");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidValue(format!(
                "Cannot read configuration file '{}': {e}",
                path.display()
            ))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ClientError::InvalidValue(format!(
                "Cannot parse configuration file '{}': {e}",
                path.display()
            ))
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(env_id) = std::env::var("POLYSTORE_ENV_ID") {
            if !env_id.trim().is_empty() {
                self.env_id = Some(env_id.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("POLYSTORE_MANIFEST") {
            if !path.trim().is_empty() {
                self.manifest_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(flag) = std::env::var("POLYSTORE_USE_READ_REPLICAS") {
            self.use_read_replicas = matches!(flag.trim(), "1" | "true" | "yes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate the process environment; serialize them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        unsafe {
            std::env::remove_var("POLYSTORE_ENV_ID");
            std::env::remove_var("POLYSTORE_MANIFEST");
            std::env::remove_var("POLYSTORE_USE_READ_REPLICAS");
        }
    }

    #[test]
    fn parses_toml_settings() {
        let config: ClientConfig = toml::from_str(
            r#"
            envId = "env_7"
            manifestPath = "/srv/app/manifest.json"
            useReadReplicas = true
            "#,
        )
        .unwrap();
        assert_eq!(config.env_id.as_deref(), Some("env_7"));
        assert_eq!(
            config.manifest_path.as_deref(),
            Some(Path::new("/srv/app/manifest.json"))
        );
        assert!(config.use_read_replicas);
    }

    #[test]
    fn environment_overrides_file_values() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("POLYSTORE_ENV_ID", "env_override");
            std::env::set_var("POLYSTORE_USE_READ_REPLICAS", "true");
        }

        let mut config = ClientConfig {
            env_id: Some("env_file".to_string()),
            ..Default::default()
        };
        config.apply_env_overrides();
        assert_eq!(config.env_id.as_deref(), Some("env_override"));
        assert!(config.use_read_replicas);

        clear_env();
    }

    #[test]
    fn defaults_are_empty() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config, ClientConfig::default());
    }
}
