//! The extension system: owner of every registry, the catalog and the
//! resource locators.
//!
//! There is no process-wide singleton; each [`ExtensionSystem`] is an
//! independent context and cheap to clone.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::holder::InstanceTable;
use super::implementation::{Catalog, Implementation};
use super::injector::{self, InjectionMode, ObjectFactory};
use super::loader::{self, BundledLocator, DescriptorTable, DirectoryLocator, LoadingStrategy, ResourceLocator};
use super::registry::ExtensionRegistry;
use super::types::{erase, AnyObject, DependencyType, ExtensionPoint};
use crate::config::{directories, SpiConfig};
use crate::error::{ExtensionError, Result};
use crate::url::Context;

type AnyRegistry = Arc<dyn Any + Send + Sync>;

pub(crate) struct SystemInner {
    config: SpiConfig,
    locators: Vec<Arc<dyn ResourceLocator>>,
    catalog: Catalog,
    registries: RwLock<HashMap<TypeId, AnyRegistry>>,
    instances: InstanceTable,
    provided: RwLock<HashMap<TypeId, Vec<(String, AnyObject)>>>,
}

/// Handle to an extension system.
#[derive(Clone)]
pub struct ExtensionSystem {
    inner: Arc<SystemInner>,
}

impl ExtensionSystem {
    pub fn builder() -> ExtensionSystemBuilder {
        ExtensionSystemBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    /// The registry of extension point `T`, created on first request.
    pub fn registry<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<ExtensionRegistry<T>>> {
        let id = TypeId::of::<T>();
        if let Some(registry) = self.inner.registries.read().get(&id) {
            return downcast_registry::<T>(registry);
        }

        validate_extension_point::<T>()?;
        let mut registries = self.inner.registries.write();
        let registry = registries.entry(id).or_insert_with(|| {
            debug!(extension = %T::NAME, "Creating extension registry");
            ExtensionRegistry::<T>::new(Arc::downgrade(&self.inner)) as AnyRegistry
        });
        downcast_registry::<T>(registry)
    }

    /// Shorthand for `registry::<T>()?.get(name)`.
    pub fn get<T: ExtensionPoint + ?Sized>(&self, name: &str) -> Result<Arc<T>> {
        self.registry::<T>()?.get(name)
    }

    pub fn adaptive<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<T>> {
        self.registry::<T>()?.adaptive()
    }

    pub fn default_extension<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<T>> {
        self.registry::<T>()?.default_extension()
    }

    pub fn supported_names<T: ExtensionPoint + ?Sized>(&self) -> Result<BTreeSet<String>> {
        self.registry::<T>()?.supported_names()
    }

    pub fn loaded_names<T: ExtensionPoint + ?Sized>(&self) -> Result<BTreeSet<String>> {
        Ok(self.registry::<T>()?.loaded_names())
    }

    pub fn active<T: ExtensionPoint + ?Sized>(
        &self,
        context: &dyn Context,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        self.registry::<T>()?.active(context, group)
    }

    /// Make `value` injectable under `name`.
    pub fn provide<U: ?Sized + Send + Sync + 'static>(&self, name: impl Into<String>, value: Arc<U>) {
        let name = name.into();
        let mut provided = self.inner.provided.write();
        let objects = provided.entry(TypeId::of::<U>()).or_default();
        let object = erase(value);
        match objects.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = object,
            None => objects.push((name.clone(), object)),
        }
        debug!(name = %name, ty = %std::any::type_name::<U>(), "Object provided for injection");
    }

    /// A provided object of type `ty`: the one named `name`, or the only one
    /// of that type when no name is given.
    pub fn provided(&self, ty: &DependencyType, name: Option<&str>) -> Option<AnyObject> {
        let provided = self.inner.provided.read();
        let objects = provided.get(&ty.id())?;
        match name {
            Some(name) => objects
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, object)| Arc::clone(object)),
            None if objects.len() == 1 => Some(Arc::clone(&objects[0].1)),
            None => {
                debug!(ty = %ty.name(), candidates = objects.len(), "Ambiguous provided object");
                None
            }
        }
    }

    pub fn config(&self) -> &SpiConfig {
        &self.inner.config
    }

    pub fn injection_mode(&self) -> InjectionMode {
        self.inner.config.injection
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub(crate) fn instances(&self) -> &InstanceTable {
        &self.inner.instances
    }

    pub(crate) fn discover<T: ExtensionPoint + ?Sized>(&self) -> Result<DescriptorTable<T>> {
        loader::discover::<T>(
            &self.inner.catalog,
            &self.inner.locators,
            &self.inner.config.strategies,
        )
    }
}

impl Default for ExtensionSystem {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ExtensionSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionSystem")
            .field("config", &self.inner.config)
            .field("locators", &self.inner.locators)
            .field("catalog", &self.inner.catalog.len())
            .field("registries", &self.inner.registries.read().len())
            .finish()
    }
}

fn downcast_registry<T: ExtensionPoint + ?Sized>(
    registry: &AnyRegistry,
) -> Result<Arc<ExtensionRegistry<T>>> {
    Arc::clone(registry)
        .downcast::<ExtensionRegistry<T>>()
        .map_err(|_| ExtensionError::InvalidExtensionPoint {
            extension: T::NAME.to_string(),
            reason: "registry has an unexpected type".to_string(),
        })
}

fn validate_extension_point<T: ExtensionPoint + ?Sized>() -> Result<()> {
    let name = T::NAME;
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
        Some("name must not contain whitespace or path separators")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ExtensionError::InvalidExtensionPoint {
            extension: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Builder for [`ExtensionSystem`].
pub struct ExtensionSystemBuilder {
    config: SpiConfig,
    locators: Vec<Arc<dyn ResourceLocator>>,
    bundled: BundledLocator,
    catalog: Catalog,
}

impl ExtensionSystemBuilder {
    pub fn new() -> Self {
        Self {
            config: SpiConfig::default(),
            locators: Vec::new(),
            bundled: BundledLocator::new("application"),
            catalog: Catalog::new(),
        }
    }

    /// Replace the configuration. Resource directories in it are searched
    /// after bundled resources.
    pub fn config(mut self, config: SpiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strategies(mut self, strategies: Vec<LoadingStrategy>) -> Self {
        self.config.strategies = strategies;
        self
    }

    pub fn strategy(mut self, strategy: LoadingStrategy) -> Self {
        self.config.strategies.push(strategy);
        self
    }

    pub fn injection_mode(mut self, mode: InjectionMode) -> Self {
        self.config.injection = mode;
        self
    }

    /// Search declaration resources under `root`.
    pub fn resource_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.resource_dirs.push(root.into());
        self
    }

    pub fn locator(mut self, locator: Arc<dyn ResourceLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    /// Add a bundled declaration resource, e.g. from `include_str!`.
    pub fn bundled(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.bundled.insert(path, content);
        self
    }

    /// Make an implementation resolvable by its class string.
    pub fn implementation<T: ExtensionPoint + ?Sized>(mut self, implementation: Implementation<T>) -> Self {
        self.catalog.register(implementation);
        self
    }

    pub fn build(self) -> ExtensionSystem {
        let Self {
            mut config,
            locators: extra,
            bundled,
            mut catalog,
        } = self;

        if !config.strategies.iter().any(|s| s.directory == directories::INTERNAL) {
            warn!("No internal loading strategy configured, adding it for built-in extensions");
            config.strategies.insert(0, LoadingStrategy::internal());
        }

        for implementation in injector::builtin_implementations() {
            catalog.register(implementation);
        }
        let builtin = BundledLocator::new("neomind-spi").with_resource(
            format!("{}{}", directories::INTERNAL, <dyn ObjectFactory as ExtensionPoint>::NAME),
            injector::BUILTIN_DECLARATIONS,
        );

        let mut locators: Vec<Arc<dyn ResourceLocator>> = vec![Arc::new(builtin)];
        if !bundled.is_empty() {
            locators.push(Arc::new(bundled));
        }
        for dir in &config.resource_dirs {
            locators.push(Arc::new(DirectoryLocator::new(dir.clone())));
        }
        locators.extend(extra);

        info!(
            strategies = config.strategies.len(),
            locators = locators.len(),
            implementations = catalog.len(),
            injection = ?config.injection,
            "Extension system initialized"
        );

        ExtensionSystem {
            inner: Arc::new(SystemInner {
                config,
                locators,
                catalog,
                registries: RwLock::new(HashMap::new()),
                instances: InstanceTable::new(),
                provided: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl Default for ExtensionSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::types::Extension;

    trait Blank: Extension {}
    impl ExtensionPoint for dyn Blank {
        const NAME: &'static str = " ";
    }

    trait Pathy: Extension {}
    impl ExtensionPoint for dyn Pathy {
        const NAME: &'static str = "../etc/passwd";
    }

    trait Fine: Extension {}
    impl ExtensionPoint for dyn Fine {
        const NAME: &'static str = "test.Fine";
    }

    #[test]
    fn test_invalid_extension_points() {
        let system = ExtensionSystem::default();
        assert!(matches!(
            system.registry::<dyn Blank>().unwrap_err(),
            ExtensionError::InvalidExtensionPoint { .. }
        ));
        assert!(matches!(
            system.registry::<dyn Pathy>().unwrap_err(),
            ExtensionError::InvalidExtensionPoint { .. }
        ));
    }

    #[test]
    fn test_registry_is_shared() {
        let system = ExtensionSystem::default();
        let a = system.registry::<dyn Fine>().unwrap();
        let b = system.clone().registry::<dyn Fine>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.supported_names().unwrap().is_empty());
    }

    #[test]
    fn test_builtin_object_factories_discovered() {
        let system = ExtensionSystem::default();
        let names = system.supported_names::<dyn ObjectFactory>().unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["provided", "spi"]);
        assert!(system.adaptive::<dyn ObjectFactory>().is_ok());
    }

    #[test]
    fn test_internal_strategy_is_always_present() {
        let system = ExtensionSystem::builder()
            .strategies(vec![LoadingStrategy::standard()])
            .build();
        assert_eq!(system.config().strategies[0].directory, directories::INTERNAL);
    }

    #[test]
    fn test_provided_lookup() {
        let system = ExtensionSystem::default();
        system.provide("greeting", Arc::new(String::from("hello")));
        let ty = DependencyType::object::<String>();

        let by_name = system.provided(&ty, Some("greeting")).unwrap();
        assert_eq!(*crate::extension::types::downcast::<String>(&by_name).unwrap(), "hello");
        assert!(system.provided(&ty, Some("other")).is_none());
        assert!(system.provided(&ty, None).is_some());

        system.provide("farewell", Arc::new(String::from("bye")));
        assert!(system.provided(&ty, None).is_none());
    }
}
