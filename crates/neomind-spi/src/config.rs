//! Extension system configuration.
//!
//! Defaults cover the common case; a TOML file or environment variables can
//! add resource directories, change the loading strategies or switch the
//! injection mode.
//!
//! ```toml
//! injection = "type"
//! resource_dirs = ["/etc/neomind"]
//!
//! [[strategies]]
//! directory = "spi/internal/"
//! prefer_bundled = true
//!
//! [[strategies]]
//! directory = "plugins/"
//! overridden = true
//! excluded_packages = ["legacy."]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ExtensionError, Result};
use crate::extension::injector::InjectionMode;
use crate::extension::loader::LoadingStrategy;

/// Declaration directories of the default strategies.
pub mod directories {
    /// Declarations shipped with the runtime.
    pub const INTERNAL: &str = "spi/internal/";
    pub const STANDARD: &str = "spi/";
    pub const SERVICES: &str = "services/";
}

/// Environment variable names.
pub mod env_vars {
    /// Extra resource roots, in the platform path-list format.
    pub const SPI_PATH: &str = "NEOMIND_SPI_PATH";
    /// `name` or `type`.
    pub const INJECTION: &str = "NEOMIND_SPI_INJECTION";
    /// Emit JSON logs when truthy.
    pub const LOG_JSON: &str = "NEOMIND_LOG_JSON";
}

/// Configuration of an extension system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// Loading strategies, consulted in order.
    pub strategies: Vec<LoadingStrategy>,
    /// Filesystem roots searched for declaration resources.
    pub resource_dirs: Vec<PathBuf>,
    pub injection: InjectionMode,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            strategies: LoadingStrategy::defaults(),
            resource_dirs: Vec::new(),
            injection: InjectionMode::default(),
        }
    }
}

impl SpiConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ExtensionError::Config(format!("invalid configuration: {}", e)))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtensionError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), strategies = config.strategies.len(), "Loaded extension configuration");
        Ok(config)
    }

    /// Defaults adjusted by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(paths) = lookup(env_vars::SPI_PATH).filter(|p| !p.trim().is_empty()) {
            self.resource_dirs.extend(
                std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()),
            );
        }
        if let Some(mode) = lookup(env_vars::INJECTION).filter(|m| !m.trim().is_empty()) {
            self.injection = mode.parse()?;
        }
        Ok(())
    }

    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dirs.push(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SpiConfig::default();
        assert_eq!(config.strategies, LoadingStrategy::defaults());
        assert!(config.resource_dirs.is_empty());
        assert_eq!(config.injection, InjectionMode::ByName);
    }

    #[test]
    fn test_from_toml() {
        let config = SpiConfig::from_toml_str(
            r#"
            injection = "type"
            resource_dirs = ["/etc/neomind"]

            [[strategies]]
            directory = "plugins/"
            overridden = true
            excluded_packages = ["legacy."]
            "#,
        )
        .unwrap();
        assert_eq!(config.injection, InjectionMode::ByType);
        assert_eq!(config.resource_dirs, vec![PathBuf::from("/etc/neomind")]);
        assert_eq!(config.strategies.len(), 1);
        assert_eq!(config.strategies[0].directory, "plugins/");
        assert!(config.strategies[0].overridden);
        assert!(!config.strategies[0].prefer_bundled);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        assert_eq!(SpiConfig::from_toml_str("").unwrap(), SpiConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = SpiConfig::from_toml_str("injection = \"field\"").unwrap_err();
        assert!(matches!(err, ExtensionError::Config(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spi.toml");
        std::fs::write(&path, "injection = \"name\"\n").unwrap();
        assert_eq!(SpiConfig::load(&path).unwrap().injection, InjectionMode::ByName);
        assert!(SpiConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, String> = HashMap::from([
            (env_vars::SPI_PATH, std::env::join_paths(["/a", "/b"]).unwrap().into_string().unwrap()),
            (env_vars::INJECTION, "type".to_string()),
        ]);
        let mut config = SpiConfig::default();
        config.apply_env(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.resource_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.injection, InjectionMode::ByType);

        let mut config = SpiConfig::default();
        let err = config
            .apply_env(|key| (key == env_vars::INJECTION).then(|| "bogus".to_string()))
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Config(_)));
    }
}
