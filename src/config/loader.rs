use std::{collections::HashMap, env, fs, path::PathBuf};

use tracing::debug;

use super::RegistryConfig;
use crate::errors::ConfigError;

pub const ENV_NAME: &str = "DI_REGISTRY_NAME";
pub const ENV_DUPLICATE_POLICY: &str = "DI_REGISTRY_DUPLICATE_POLICY";

/// Loads a `RegistryConfig` from an optional TOML file and the environment
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader without a file; only the environment is consulted
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Loader reading the given file (`~` is expanded)
    pub fn with_path(path: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(path.as_ref());
        Self {
            path: Some(PathBuf::from(expanded.as_ref())),
        }
    }

    /// File first, then environment overrides
    pub fn load(&self) -> Result<RegistryConfig, ConfigError> {
        let config = self.load_file()?.unwrap_or_default();
        apply_env(config, &collect_env_vars())
    }

    /// Read the file only; a missing file is not an error
    pub fn load_file(&self) -> Result<Option<RegistryConfig>, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            debug!(path = %path.display(), "registry config file not found, using defaults");
            return Ok(None);
        }

        let display = path.to_string_lossy().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(display.clone(), e))?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))?;
        Ok(Some(config))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `DI_REGISTRY_*` values on top of a config
pub fn apply_env(
    mut config: RegistryConfig,
    env_map: &HashMap<String, String>,
) -> Result<RegistryConfig, ConfigError> {
    if let Some(name) = env_map.get(ENV_NAME) {
        config.name = Some(name.clone());
    }
    if let Some(policy) = env_map.get(ENV_DUPLICATE_POLICY) {
        config.duplicate_policy = policy.parse()?;
    }
    Ok(config)
}

fn collect_env_vars() -> HashMap<String, String> {
    let mut env_map = HashMap::new();
    for key in [ENV_NAME, ENV_DUPLICATE_POLICY] {
        if let Ok(value) = env::var(key) {
            env_map.insert(key.to_string(), value);
        }
    }
    env_map
}
