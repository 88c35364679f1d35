//! Loading strategies: where declarations live and how they combine.

use serde::{Deserialize, Serialize};

use crate::config::directories;

/// One source of declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingStrategy {
    /// Directory prefix joined with the extension point name.
    pub directory: String,
    /// Whether later declarations may replace an existing name outright.
    pub overridden: bool,
    /// Class prefixes to skip.
    pub excluded_packages: Vec<String>,
    /// Search bundled resources before application resources.
    pub prefer_bundled: bool,
}

impl Default for LoadingStrategy {
    fn default() -> Self {
        Self::standard()
    }
}

impl LoadingStrategy {
    pub fn new(directory: impl Into<String>) -> Self {
        let mut directory = directory.into();
        if !directory.is_empty() && !directory.ends_with('/') {
            directory.push('/');
        }
        Self {
            directory,
            overridden: false,
            excluded_packages: Vec::new(),
            prefer_bundled: false,
        }
    }

    pub fn with_overridden(mut self, overridden: bool) -> Self {
        self.overridden = overridden;
        self
    }

    pub fn with_excluded_packages(mut self, packages: &[&str]) -> Self {
        self.excluded_packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_prefer_bundled(mut self, prefer: bool) -> Self {
        self.prefer_bundled = prefer;
        self
    }

    /// Declarations shipped with the runtime itself.
    pub fn internal() -> Self {
        Self::new(directories::INTERNAL).with_prefer_bundled(true)
    }

    /// Application declarations.
    pub fn standard() -> Self {
        Self::new(directories::STANDARD).with_overridden(true)
    }

    /// Service-loader style declarations.
    pub fn services() -> Self {
        Self::new(directories::SERVICES).with_overridden(true)
    }

    /// The strategies consulted when none are configured, in order.
    pub fn defaults() -> Vec<Self> {
        vec![Self::internal(), Self::standard(), Self::services()]
    }

    pub fn resource_path(&self, extension_point: &str) -> String {
        format!("{}{}", self.directory, extension_point)
    }

    pub fn is_excluded(&self, class: &str) -> bool {
        self.excluded_packages
            .iter()
            .any(|package| !package.is_empty() && class.starts_with(package.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_is_normalized() {
        assert_eq!(LoadingStrategy::new("plugins").directory, "plugins/");
        assert_eq!(LoadingStrategy::new("plugins/").directory, "plugins/");
    }

    #[test]
    fn test_default_order() {
        let strategies = LoadingStrategy::defaults();
        let directories: Vec<_> = strategies.iter().map(|s| s.directory.as_str()).collect();
        assert_eq!(directories, vec!["spi/internal/", "spi/", "services/"]);
        assert!(!strategies[0].overridden);
        assert!(strategies[0].prefer_bundled);
        assert!(strategies[1].overridden);
    }

    #[test]
    fn test_excluded_packages() {
        let strategy = LoadingStrategy::standard().with_excluded_packages(&["legacy.", ""]);
        assert!(strategy.is_excluded("legacy.rpc.OldProtocol"));
        assert!(!strategy.is_excluded("neomind.rpc.HttpProtocol"));
        assert_eq!(
            strategy.resource_path("neomind.rpc.Protocol"),
            "spi/neomind.rpc.Protocol"
        );
    }
}
