//! Per-extension-point registry.
//!
//! One registry exists per extension point and system. Discovery runs once,
//! on first use; instances are created lazily per name, exactly once even
//! under concurrent first requests, then injected, wrapped and initialized.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::activate;
use super::adaptive::AdaptiveDispatcher;
use super::holder::{Holder, HolderMap};
use super::implementation::{Implementation, RoleKind};
use super::injector::{Injector, ObjectFactory};
use super::loader::{DescriptorTable, ExtensionDescriptor};
use super::system::{ExtensionSystem, SystemInner};
use super::types::ExtensionPoint;
use super::wrapper;
use crate::error::{Diagnostic, ExtensionError, Result};
use crate::url::Context;

/// Name that resolves to the default extension.
pub const DEFAULT_ALIAS: &str = "true";

/// Registry of the implementations of extension point `T`.
pub struct ExtensionRegistry<T: ?Sized> {
    system: Weak<SystemInner>,
    this: Weak<ExtensionRegistry<T>>,
    table: OnceCell<RwLock<Arc<DescriptorTable<T>>>>,
    /// Fully decorated instances.
    instances: HolderMap<Arc<T>>,
    /// Instances requested without wrappers.
    origins: HolderMap<Arc<T>>,
    adaptive: RwLock<Arc<Holder<Result<Arc<T>>>>>,
    object_factory: OnceCell<Option<Arc<dyn ObjectFactory>>>,
}

impl<T: ExtensionPoint + ?Sized> ExtensionRegistry<T> {
    pub(crate) fn new(system: Weak<SystemInner>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            system,
            this: this.clone(),
            table: OnceCell::new(),
            instances: HolderMap::new(),
            origins: HolderMap::new(),
            adaptive: RwLock::new(Arc::new(Holder::new())),
            object_factory: OnceCell::new(),
        })
    }

    /// Name of the extension point.
    pub fn extension_point(&self) -> &'static str {
        T::NAME
    }

    fn system(&self) -> Result<ExtensionSystem> {
        self.system
            .upgrade()
            .map(ExtensionSystem::from_inner)
            .ok_or(ExtensionError::SystemDropped)
    }

    fn table_lock(&self) -> Result<&RwLock<Arc<DescriptorTable<T>>>> {
        self.table.get_or_try_init(|| {
            let system = self.system()?;
            let table = system.discover::<T>()?;
            info!(
                extension = %T::NAME,
                extensions = table.len(),
                wrappers = table.wrappers().len(),
                adaptive = table.adaptive().is_some(),
                diagnostics = table.diagnostics().len(),
                "Extension point loaded"
            );
            Ok(RwLock::new(Arc::new(table)))
        })
    }

    fn table(&self) -> Result<Arc<DescriptorTable<T>>> {
        Ok(Arc::clone(&self.table_lock()?.read()))
    }

    /// The wrapped extension named `name`.
    ///
    /// `"true"` resolves to the default extension.
    pub fn get(&self, name: &str) -> Result<Arc<T>> {
        self.get_with(name, true)
    }

    /// The extension named `name`, optionally without wrappers.
    pub fn get_with(&self, name: &str, wrap: bool) -> Result<Arc<T>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ExtensionError::IllegalArgument(format!(
                "extension name of {} is blank",
                T::NAME
            )));
        }
        if name == DEFAULT_ALIAS {
            return self.default_extension();
        }

        if let Some(instance) = self.cached(name, wrap) {
            return Ok(instance);
        }

        // The holder is taken under the table lock so that it always matches
        // the table it will be filled from.
        let holders = if wrap { &self.instances } else { &self.origins };
        let (table, holder) = {
            let current = self.table_lock()?.read();
            if !current.contains(name) {
                return Err(no_such_extension(&**current, name));
            }
            (Arc::clone(&*current), holders.holder(name))
        };
        holder
            .get_or_try_init(|| self.create(&table, name, wrap))
            .map(Arc::clone)
    }

    /// The extension named `name`, or the default one when it does not exist.
    pub fn get_or_default(&self, name: &str) -> Result<Arc<T>> {
        let name = name.trim();
        if !name.is_empty() && self.has_extension(name)? {
            self.get(name)
        } else {
            self.default_extension()
        }
    }

    /// The default extension.
    pub fn default_extension(&self) -> Result<Arc<T>> {
        let table = self.table()?;
        match table.default_name() {
            Some(name) if name != DEFAULT_ALIAS => self.get(name),
            _ => Err(ExtensionError::NoDefaultExtension {
                extension: T::NAME.to_string(),
            }),
        }
    }

    pub fn default_name(&self) -> Result<Option<String>> {
        Ok(self.table()?.default_name().map(str::to_string))
    }

    pub fn has_extension(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ExtensionError::IllegalArgument(format!(
                "extension name of {} is blank",
                T::NAME
            )));
        }
        Ok(self.table()?.contains(name))
    }

    /// Every discovered name, sorted.
    pub fn supported_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.table()?.names())
    }

    /// Names with a decorated instance created so far, sorted.
    ///
    /// Names only ever requested through `get_with(name, false)` are not
    /// included.
    pub fn loaded_names(&self) -> BTreeSet<String> {
        self.instances.populated_keys().into_iter().collect()
    }

    fn cached(&self, name: &str, wrap: bool) -> Option<Arc<T>> {
        let holders = if wrap { &self.instances } else { &self.origins };
        holders.get(name).and_then(|holder| holder.get().cloned())
    }

    /// The wrapped instance of `name` if it has been created.
    pub fn loaded(&self, name: &str) -> Option<Arc<T>> {
        self.cached(name, true)
    }

    pub fn descriptor(&self, name: &str) -> Result<Option<ExtensionDescriptor<T>>> {
        Ok(self.table()?.get(name).cloned())
    }

    /// Declaration lines rejected during discovery.
    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>> {
        Ok(self.table()?.diagnostics().to_vec())
    }

    /// The adaptive instance.
    ///
    /// Created once; a failure is remembered and returned to every later
    /// caller until the adaptive implementation is replaced.
    pub fn adaptive(&self) -> Result<Arc<T>> {
        let holder = Arc::clone(&self.adaptive.read());
        holder
            .get_or_init(|| {
                let result = self.create_adaptive();
                if let Err(e) = &result {
                    error!(extension = %T::NAME, error = %e, "Failed to create adaptive instance");
                }
                result
            })
            .clone()
    }

    /// Extensions active in `context` for `group`.
    pub fn active(&self, context: &dyn Context, group: Option<&str>) -> Result<Vec<Arc<T>>> {
        self.active_with(context, &[], group)
    }

    /// Extensions active in `context`, adjusted by explicitly requested names.
    pub fn active_with(
        &self,
        context: &dyn Context,
        values: &[&str],
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        let table = self.table()?;
        activate::select(self, table.activations(), context, values, group)
    }

    /// Like [`active_with`](Self::active_with), reading the requested names
    /// from the comma-separated parameter `key` of `context`.
    pub fn active_for_key(
        &self,
        context: &dyn Context,
        key: &str,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        let values: Vec<&str> = context
            .parameter(key)
            .map(|v| v.split(',').collect())
            .unwrap_or_default();
        self.active_with(context, &values, group)
    }

    /// Register an implementation at runtime. `name` falls back to the
    /// implementation's own name and is ignored for adaptive and wrapper
    /// roles.
    pub fn add_extension(&self, name: Option<&str>, implementation: Implementation<T>) -> Result<()> {
        let class = implementation.class().to_string();
        let adaptive = implementation.kind() == RoleKind::Adaptive;
        self.update_table(|table| table.add(name, implementation))?;
        if adaptive {
            *self.adaptive.write() = Arc::new(Holder::new());
        }
        info!(extension = %T::NAME, name = ?name, class = %class, "Extension added");
        Ok(())
    }

    /// Replace an implementation at runtime, dropping cached instances.
    pub fn replace_extension(
        &self,
        name: Option<&str>,
        implementation: Implementation<T>,
    ) -> Result<()> {
        let class = implementation.class().to_string();
        let adaptive = implementation.kind() == RoleKind::Adaptive;
        let resolved = name.or(implementation.name()).map(|n| n.trim().to_string());
        self.update_table(|table| {
            table.replace(name, implementation)?;
            // Dropped while the new table is still unpublished.
            if let Some(name) = resolved.as_deref().filter(|_| !adaptive) {
                self.instances.remove(name);
                self.origins.remove(name);
            }
            Ok(())
        })?;

        if adaptive {
            *self.adaptive.write() = Arc::new(Holder::new());
        }
        info!(extension = %T::NAME, name = ?resolved, class = %class, "Extension replaced");
        Ok(())
    }

    fn update_table<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut DescriptorTable<T>) -> Result<()>,
    {
        let lock = self.table_lock()?;
        let mut current = lock.write();
        let mut next = (**current).clone();
        update(&mut next)?;
        *current = Arc::new(next);
        Ok(())
    }

    fn create(&self, table: &DescriptorTable<T>, name: &str, wrap: bool) -> Result<Arc<T>> {
        let descriptor = table
            .get(name)
            .ok_or_else(|| no_such_extension(table, name))?;
        let implementation = descriptor.implementation();
        let constructor =
            implementation
                .constructor()
                .ok_or_else(|| ExtensionError::Instantiation {
                    extension: T::NAME.to_string(),
                    name: name.to_string(),
                    class: implementation.class().to_string(),
                    reason: "no zero-argument constructor".to_string(),
                })?;

        let system = self.system()?;
        let raw = system
            .instances()
            .get_or_create::<T>(name, implementation.class(), constructor)?;
        self.inject(&system, &raw);

        let instance = if wrap {
            wrapper::decorate(name, raw, table.wrappers(), |w| self.inject(&system, w))?
        } else {
            raw
        };

        instance
            .initialize()
            .map_err(|e| ExtensionError::Initialization {
                extension: T::NAME.to_string(),
                name: name.to_string(),
                reason: format!("{:#}", e),
            })?;

        debug!(extension = %T::NAME, name = %name, class = %implementation.class(), wrapped = wrap, "Extension instance ready");
        Ok(instance)
    }

    fn create_adaptive(&self) -> Result<Arc<T>> {
        let table = self.table()?;
        let system = self.system()?;

        let instance = match table.adaptive() {
            Some(implementation) => {
                let constructor =
                    implementation
                        .constructor()
                        .ok_or_else(|| ExtensionError::Instantiation {
                            extension: T::NAME.to_string(),
                            name: "adaptive".to_string(),
                            class: implementation.class().to_string(),
                            reason: "no zero-argument constructor".to_string(),
                        })?;
                system
                    .instances()
                    .get_or_create::<T>("adaptive", implementation.class(), constructor)?
            }
            None => {
                let dispatcher = AdaptiveDispatcher::new(
                    self.this.clone(),
                    T::adaptive_methods(),
                    table.default_name().map(str::to_string),
                )?;
                T::adaptive(dispatcher).ok_or_else(|| ExtensionError::NoAdaptiveMethod {
                    extension: T::NAME.to_string(),
                })?
            }
        };

        self.inject(&system, &instance);
        instance
            .initialize()
            .map_err(|e| ExtensionError::Initialization {
                extension: T::NAME.to_string(),
                name: "adaptive".to_string(),
                reason: format!("{:#}", e),
            })?;
        debug!(extension = %T::NAME, "Adaptive instance ready");
        Ok(instance)
    }

    fn inject(&self, system: &ExtensionSystem, instance: &Arc<T>) {
        let Some(factory) = self.object_factory(system) else {
            return;
        };
        let injector = Injector::new(system, factory.as_ref(), system.injection_mode(), T::NAME);
        instance.inject(&injector);
    }

    /// The adaptive object factory; `None` for the factory's own registry.
    fn object_factory(&self, system: &ExtensionSystem) -> Option<Arc<dyn ObjectFactory>> {
        if TypeId::of::<T>() == TypeId::of::<dyn ObjectFactory>() {
            return None;
        }
        self.object_factory
            .get_or_init(|| {
                match system
                    .registry::<dyn ObjectFactory>()
                    .and_then(|registry| registry.adaptive())
                {
                    Ok(factory) => Some(factory),
                    Err(e) => {
                        error!(extension = %T::NAME, error = %e, "Object factory unavailable, injection disabled");
                        None
                    }
                }
            })
            .clone()
    }
}

fn no_such_extension<T: ExtensionPoint + ?Sized>(
    table: &DescriptorTable<T>,
    name: &str,
) -> ExtensionError {
    ExtensionError::NoSuchExtension {
        extension: T::NAME.to_string(),
        name: name.to_string(),
        causes: table.causes_for(name),
    }
}

impl<T: ExtensionPoint + ?Sized> fmt::Debug for ExtensionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extension", &T::NAME)
            .field("loaded", &self.table.get().is_some())
            .field("instances", &self.loaded_names())
            .finish()
    }
}
