//! Dependency injection into extension instances.
//!
//! A new instance receives an [`Injector`] in [`Extension::inject`] and asks
//! it for each dependency by property name. Objects come from the adaptive
//! [`ObjectFactory`], which consults every registered factory by priority:
//!
//! - `spi`: the adaptive instance of another extension point
//! - `provided`: objects registered with [`ExtensionSystem::provide`]
//!
//! Failures are logged and leave the property unset.

use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::implementation::Implementation;
use super::system::ExtensionSystem;
use super::types::{downcast, AnyObject, DependencyType, Extension, ExtensionPoint};
use crate::error::{ExtensionError, Result};

/// How dependencies are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InjectionMode {
    /// By type, narrowed by the property name.
    #[default]
    #[serde(rename = "name")]
    ByName,
    /// By type only.
    #[serde(rename = "type")]
    ByType,
}

impl FromStr for InjectionMode {
    type Err = ExtensionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" | "by_name" | "byname" => Ok(InjectionMode::ByName),
            "type" | "by_type" | "bytype" => Ok(InjectionMode::ByType),
            other => Err(ExtensionError::Config(format!(
                "unknown injection mode '{}', expected 'name' or 'type'",
                other
            ))),
        }
    }
}

/// Source of injectable objects. Itself an extension point.
pub trait ObjectFactory: Extension {
    /// The object of type `ty`, optionally narrowed by `name`.
    fn get_object(
        &self,
        system: &ExtensionSystem,
        ty: &DependencyType,
        name: Option<&str>,
    ) -> Result<Option<AnyObject>>;
}

impl ExtensionPoint for dyn ObjectFactory {
    const NAME: &'static str = "neomind.spi.ObjectFactory";
}

/// Declarations of the built-in factories.
pub(crate) const BUILTIN_DECLARATIONS: &str = "\
adaptive=neomind.spi.AdaptiveObjectFactory
spi=neomind.spi.SpiObjectFactory
provided=neomind.spi.ProvidedObjectFactory
";

/// Catalog entries of the built-in factories.
pub(crate) fn builtin_implementations() -> Vec<Implementation<dyn ObjectFactory>> {
    vec![
        Implementation::adaptive("neomind.spi.AdaptiveObjectFactory", || {
            Arc::new(AdaptiveObjectFactory::new()) as Arc<dyn ObjectFactory>
        }),
        Implementation::regular("neomind.spi.SpiObjectFactory", || {
            Arc::new(SpiObjectFactory) as Arc<dyn ObjectFactory>
        })
        .with_priority(-10),
        Implementation::regular("neomind.spi.ProvidedObjectFactory", || {
            Arc::new(ProvidedObjectFactory) as Arc<dyn ObjectFactory>
        }),
    ]
}

/// Delegates to every other factory by ascending priority; first hit wins.
pub struct AdaptiveObjectFactory {
    factories: OnceCell<Vec<Arc<dyn ObjectFactory>>>,
}

impl AdaptiveObjectFactory {
    pub fn new() -> Self {
        Self {
            factories: OnceCell::new(),
        }
    }
}

impl Default for AdaptiveObjectFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for AdaptiveObjectFactory {}

impl ObjectFactory for AdaptiveObjectFactory {
    fn get_object(
        &self,
        system: &ExtensionSystem,
        ty: &DependencyType,
        name: Option<&str>,
    ) -> Result<Option<AnyObject>> {
        let factories = self.factories.get_or_try_init(|| {
            let registry = system.registry::<dyn ObjectFactory>()?;
            let mut ordered = Vec::new();
            for name in registry.supported_names()? {
                let priority = registry
                    .descriptor(&name)?
                    .map(|d| d.implementation().priority())
                    .unwrap_or(0);
                ordered.push((priority, name));
            }
            ordered.sort();
            ordered
                .iter()
                .map(|(_, name)| registry.get(name))
                .collect::<Result<Vec<_>>>()
        })?;

        for factory in factories {
            if let Some(object) = factory.get_object(system, ty, name)? {
                return Ok(Some(object));
            }
        }
        Ok(None)
    }
}

/// Supplies the adaptive instance of extension point dependencies.
pub struct SpiObjectFactory;

impl Extension for SpiObjectFactory {}

impl ObjectFactory for SpiObjectFactory {
    fn get_object(
        &self,
        system: &ExtensionSystem,
        ty: &DependencyType,
        _name: Option<&str>,
    ) -> Result<Option<AnyObject>> {
        ty.adaptive_instance(system)
    }
}

/// Supplies objects registered on the system.
pub struct ProvidedObjectFactory;

impl Extension for ProvidedObjectFactory {}

impl ObjectFactory for ProvidedObjectFactory {
    fn get_object(
        &self,
        system: &ExtensionSystem,
        ty: &DependencyType,
        name: Option<&str>,
    ) -> Result<Option<AnyObject>> {
        Ok(system.provided(ty, name))
    }
}

/// Handed to [`Extension::inject`] to pull dependencies.
///
/// ```rust,ignore
/// impl Extension for CachedProtocol {
///     fn inject(&self, injector: &Injector<'_>) {
///         injector.inject("codec", |codec: Arc<dyn Codec>| {
///             *self.codec.write() = Some(codec);
///             Ok(())
///         });
///     }
/// }
/// ```
pub struct Injector<'a> {
    system: &'a ExtensionSystem,
    factory: &'a dyn ObjectFactory,
    mode: InjectionMode,
    target: &'static str,
}

impl<'a> Injector<'a> {
    pub(crate) fn new(
        system: &'a ExtensionSystem,
        factory: &'a dyn ObjectFactory,
        mode: InjectionMode,
        target: &'static str,
    ) -> Self {
        Self {
            system,
            factory,
            mode,
            target,
        }
    }

    pub fn mode(&self) -> InjectionMode {
        self.mode
    }

    /// Name of the extension point being injected.
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Inject an extension point dependency using the configured mode.
    ///
    /// Returns whether `assign` ran and succeeded.
    pub fn inject<U, F>(&self, property: &str, assign: F) -> bool
    where
        U: ExtensionPoint + ?Sized,
        F: FnOnce(Arc<U>) -> anyhow::Result<()>,
    {
        self.inject_by(property, self.mode, assign)
    }

    /// Inject an extension point dependency using `mode`.
    pub fn inject_by<U, F>(&self, property: &str, mode: InjectionMode, assign: F) -> bool
    where
        U: ExtensionPoint + ?Sized,
        F: FnOnce(Arc<U>) -> anyhow::Result<()>,
    {
        self.wire(DependencyType::extension::<U>(), property, mode, assign)
    }

    /// Inject a plain object registered with [`ExtensionSystem::provide`].
    pub fn inject_object<U, F>(&self, property: &str, assign: F) -> bool
    where
        U: ?Sized + Send + Sync + 'static,
        F: FnOnce(Arc<U>) -> anyhow::Result<()>,
    {
        self.wire(DependencyType::object::<U>(), property, self.mode, assign)
    }

    fn wire<U, F>(&self, ty: DependencyType, property: &str, mode: InjectionMode, assign: F) -> bool
    where
        U: ?Sized + Send + Sync + 'static,
        F: FnOnce(Arc<U>) -> anyhow::Result<()>,
    {
        let name = match mode {
            InjectionMode::ByName => Some(property),
            InjectionMode::ByType => None,
        };

        let object = match self.factory.get_object(self.system, &ty, name) {
            Ok(Some(object)) => object,
            Ok(None) => {
                trace!(target_point = %self.target, property = %property, dependency = %ty.name(), "No object to inject");
                return false;
            }
            Err(e) => {
                error!(
                    target_point = %self.target,
                    property = %property,
                    dependency = %ty.name(),
                    error = %e,
                    "Failed to resolve dependency for injection"
                );
                return false;
            }
        };

        let Some(value) = downcast::<U>(&object) else {
            error!(target_point = %self.target, property = %property, dependency = %ty.name(), "Injected object has an unexpected type");
            return false;
        };

        match assign(value) {
            Ok(()) => {
                debug!(target_point = %self.target, property = %property, dependency = %ty.name(), "Injected dependency");
                true
            }
            Err(e) => {
                error!(
                    target_point = %self.target,
                    property = %property,
                    error = %format!("{:#}", e),
                    "Failed to inject via property"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_mode_parsing() {
        assert_eq!("name".parse::<InjectionMode>().unwrap(), InjectionMode::ByName);
        assert_eq!(" TYPE ".parse::<InjectionMode>().unwrap(), InjectionMode::ByType);
        assert!("field".parse::<InjectionMode>().is_err());
    }

    #[test]
    fn test_injection_mode_serde() {
        #[derive(Deserialize)]
        struct Holder {
            mode: InjectionMode,
        }
        let parsed: Holder = toml::from_str("mode = \"type\"").unwrap();
        assert_eq!(parsed.mode, InjectionMode::ByType);
        assert_eq!(InjectionMode::default(), InjectionMode::ByName);
    }

    #[test]
    fn test_builtin_declarations_match_catalog() {
        let classes: Vec<_> = builtin_implementations()
            .iter()
            .map(|i| i.class().to_string())
            .collect();
        for line in BUILTIN_DECLARATIONS.lines() {
            let (_, class) = line.split_once('=').unwrap();
            assert!(classes.iter().any(|c| c == class));
        }
    }
}
