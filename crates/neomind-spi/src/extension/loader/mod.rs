//! Discovery: turning declaration resources into a descriptor table.
//!
//! For each loading strategy, in order, every locator is searched for
//! `<directory><extension point name>`. Each resource is parsed once and
//! every declaration line is resolved against the catalog:
//!
//! - unresolvable lines become diagnostics and discovery continues
//! - a second distinct adaptive implementation is fatal
//! - a name claimed by two classes with equal priority is fatal
//! - wrappers are collected, never named

pub mod declaration;
pub mod locator;
pub mod strategy;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

pub use declaration::Declaration;
pub use locator::{BundledLocator, DirectoryLocator, Resource, ResourceLocator, ResourceOrigin};
pub use strategy::LoadingStrategy;

use super::activate::ActiveDescriptor;
use super::implementation::{Catalog, Implementation, RoleKind};
use super::types::ExtensionPoint;
use crate::error::{Diagnostic, ExtensionError, Result};

/// A named extension as discovered.
pub struct ExtensionDescriptor<T: ?Sized> {
    name: String,
    implementation: Arc<Implementation<T>>,
    seq: usize,
}

impl<T: ?Sized> ExtensionDescriptor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn implementation(&self) -> &Arc<Implementation<T>> {
        &self.implementation
    }

    pub fn class(&self) -> &str {
        self.implementation.class()
    }

    /// Position in declaration order.
    pub fn seq(&self) -> usize {
        self.seq
    }
}

impl<T: ?Sized> Clone for ExtensionDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            implementation: Arc::clone(&self.implementation),
            seq: self.seq,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("class", &self.class())
            .field("seq", &self.seq)
            .finish()
    }
}

/// Everything known about one extension point after discovery.
///
/// Immutable once published; programmatic additions build a modified copy.
pub struct DescriptorTable<T: ?Sized> {
    extension: &'static str,
    extensions: BTreeMap<String, ExtensionDescriptor<T>>,
    /// First name each class was registered under.
    canonical: HashMap<String, String>,
    adaptive: Option<Arc<Implementation<T>>>,
    wrappers: Vec<Arc<Implementation<T>>>,
    activations: Vec<ActiveDescriptor>,
    default_name: Option<String>,
    diagnostics: Vec<Diagnostic>,
    next_seq: usize,
}

impl<T: ?Sized> Clone for DescriptorTable<T> {
    fn clone(&self) -> Self {
        Self {
            extension: self.extension,
            extensions: self.extensions.clone(),
            canonical: self.canonical.clone(),
            adaptive: self.adaptive.clone(),
            wrappers: self.wrappers.clone(),
            activations: self.activations.clone(),
            default_name: self.default_name.clone(),
            diagnostics: self.diagnostics.clone(),
            next_seq: self.next_seq,
        }
    }
}

impl<T: ?Sized> fmt::Debug for DescriptorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("extension", &self.extension)
            .field("names", &self.extensions.keys().collect::<Vec<_>>())
            .field("adaptive", &self.adaptive.as_ref().map(|a| a.class().to_string()))
            .field("wrappers", &self.wrappers.len())
            .field("default_name", &self.default_name)
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

impl<T: ExtensionPoint + ?Sized> DescriptorTable<T> {
    /// An empty table, validating the extension point's default name.
    pub fn new() -> Result<Self> {
        Ok(Self {
            extension: T::NAME,
            extensions: BTreeMap::new(),
            canonical: HashMap::new(),
            adaptive: None,
            wrappers: Vec::new(),
            activations: Vec::new(),
            default_name: parse_default_name::<T>()?,
            diagnostics: Vec::new(),
            next_seq: 0,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionDescriptor<T>> {
        self.extensions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.extensions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn adaptive(&self) -> Option<&Arc<Implementation<T>>> {
        self.adaptive.as_ref()
    }

    pub fn wrappers(&self) -> &[Arc<Implementation<T>>] {
        &self.wrappers
    }

    pub fn activations(&self) -> &[ActiveDescriptor] {
        &self.activations
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The first name `class` was registered under.
    pub fn canonical_name(&self, class: &str) -> Option<&str> {
        self.canonical.get(class).map(String::as_str)
    }

    /// Diagnostics whose line concerns `name`.
    pub fn causes_for(&self, name: &str) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.concerns(name))
            .cloned()
            .collect()
    }

    fn insert_adaptive(&mut self, implementation: Arc<Implementation<T>>) -> Result<()> {
        match &self.adaptive {
            Some(existing) if existing.class() == implementation.class() => Ok(()),
            Some(existing) => Err(ExtensionError::MultipleAdaptive {
                extension: T::NAME.to_string(),
                existing: existing.class().to_string(),
                incoming: implementation.class().to_string(),
            }),
            None => {
                debug!(extension = %T::NAME, class = %implementation.class(), "Registered adaptive implementation");
                self.adaptive = Some(implementation);
                Ok(())
            }
        }
    }

    fn insert_wrapper(&mut self, implementation: Arc<Implementation<T>>) {
        if self.wrappers.iter().any(|w| w.class() == implementation.class()) {
            return;
        }
        debug!(extension = %T::NAME, class = %implementation.class(), "Registered wrapper");
        self.wrappers.push(implementation);
    }

    fn insert_named(
        &mut self,
        name: &str,
        implementation: Arc<Implementation<T>>,
        overridden: bool,
    ) -> Result<()> {
        if let Some(existing) = self.extensions.get(name) {
            if existing.class() == implementation.class() {
                return Ok(());
            }
            let replace = overridden
                || match implementation.priority().cmp(&existing.implementation.priority()) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => {
                        return Err(ExtensionError::DuplicateExtension {
                            extension: T::NAME.to_string(),
                            name: name.to_string(),
                            existing: existing.class().to_string(),
                            incoming: implementation.class().to_string(),
                        })
                    }
                };
            if !replace {
                debug!(
                    extension = %T::NAME,
                    name = %name,
                    kept = %existing.class(),
                    ignored = %implementation.class(),
                    "Keeping higher-precedence extension"
                );
                return Ok(());
            }
            debug!(
                extension = %T::NAME,
                name = %name,
                replaced = %existing.class(),
                class = %implementation.class(),
                "Overriding extension"
            );
        }

        self.canonical
            .entry(implementation.class().to_string())
            .or_insert_with(|| name.to_string());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.extensions.insert(
            name.to_string(),
            ExtensionDescriptor {
                name: name.to_string(),
                implementation,
                seq,
            },
        );
        Ok(())
    }

    fn refresh_activations(&mut self) {
        let mut activations: Vec<ActiveDescriptor> = self
            .extensions
            .values()
            .filter(|d| self.canonical_name(d.class()) == Some(d.name()))
            .filter_map(|d| {
                d.implementation.activation().map(|activation| ActiveDescriptor {
                    name: d.name.clone(),
                    activation: activation.clone(),
                    seq: d.seq,
                })
            })
            .collect();
        activations.sort_by_key(|a| a.seq);
        self.activations = activations;
    }

    /// Register an implementation at runtime.
    pub(crate) fn add(&mut self, name: Option<&str>, implementation: Implementation<T>) -> Result<()> {
        let implementation = Arc::new(implementation);
        match implementation.kind() {
            RoleKind::Adaptive => {
                if self.adaptive.is_some() {
                    return Err(ExtensionError::AlreadyExists {
                        extension: T::NAME.to_string(),
                        name: "adaptive".to_string(),
                    });
                }
                self.adaptive = Some(implementation);
            }
            RoleKind::Wrapper => self.insert_wrapper(implementation),
            RoleKind::Regular => {
                let name = regular_name(name, &implementation)?;
                if self.extensions.contains_key(&name) {
                    return Err(ExtensionError::AlreadyExists {
                        extension: T::NAME.to_string(),
                        name,
                    });
                }
                self.insert_named(&name, implementation, true)?;
            }
        }
        self.refresh_activations();
        Ok(())
    }

    /// Replace an existing implementation at runtime.
    pub(crate) fn replace(
        &mut self,
        name: Option<&str>,
        implementation: Implementation<T>,
    ) -> Result<()> {
        let implementation = Arc::new(implementation);
        match implementation.kind() {
            RoleKind::Adaptive => {
                if self.adaptive.is_none() {
                    return Err(ExtensionError::IllegalArgument(format!(
                        "adaptive extension of {} does not exist",
                        T::NAME
                    )));
                }
                self.adaptive = Some(implementation);
            }
            RoleKind::Wrapper => {
                return Err(ExtensionError::IllegalArgument(format!(
                    "wrapper {} cannot replace an extension of {}",
                    implementation.class(),
                    T::NAME
                )))
            }
            RoleKind::Regular => {
                let name = regular_name(name, &implementation)?;
                let Some(existing) = self.extensions.get(&name) else {
                    return Err(ExtensionError::NoSuchExtension {
                        extension: T::NAME.to_string(),
                        name,
                        causes: Vec::new(),
                    });
                };
                let seq = existing.seq;
                self.canonical
                    .entry(implementation.class().to_string())
                    .or_insert_with(|| name.clone());
                self.extensions.insert(
                    name.clone(),
                    ExtensionDescriptor {
                        name,
                        implementation,
                        seq,
                    },
                );
            }
        }
        self.refresh_activations();
        Ok(())
    }
}

fn regular_name<T: ExtensionPoint + ?Sized>(
    name: Option<&str>,
    implementation: &Implementation<T>,
) -> Result<String> {
    let name = name
        .or(implementation.name())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ExtensionError::IllegalArgument(format!(
                "extension name of {} for {} is blank",
                implementation.class(),
                T::NAME
            ))
        })?;
    if implementation.constructor().is_none() {
        return Err(ExtensionError::IllegalArgument(format!(
            "class {} of {} has no zero-argument constructor",
            implementation.class(),
            T::NAME
        )));
    }
    Ok(name.to_string())
}

fn parse_default_name<T: ExtensionPoint + ?Sized>() -> Result<Option<String>> {
    let Some(value) = T::DEFAULT.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let names = declaration::split_names(value);
    if names.len() > 1 {
        return Err(ExtensionError::MultipleDefaults {
            extension: T::NAME.to_string(),
            names: value.to_string(),
        });
    }
    Ok(names.into_iter().next())
}

enum LineError {
    /// Configuration error aborting discovery.
    Fatal(ExtensionError),
    /// Recorded as a diagnostic; discovery continues.
    Rejected(String),
}

/// Discover the implementations of `T`.
pub(crate) fn discover<T: ExtensionPoint + ?Sized>(
    catalog: &Catalog,
    locators: &[Arc<dyn ResourceLocator>],
    strategies: &[LoadingStrategy],
) -> Result<DescriptorTable<T>> {
    let mut table = DescriptorTable::<T>::new()?;

    for strategy in strategies {
        let path = strategy.resource_path(T::NAME);
        let mut seen = HashSet::new();

        for locator in locator::search_order(locators, strategy.prefer_bundled) {
            let resources = match locator.find(&path) {
                Ok(resources) => resources,
                Err(e) => {
                    error!(extension = %T::NAME, path = %path, error = %e, "Failed to read extension resources");
                    continue;
                }
            };

            for resource in resources {
                if !seen.insert(resource.location.clone()) {
                    continue;
                }
                debug!(extension = %T::NAME, location = %resource.location, "Loading extension declarations");

                for declaration in declaration::parse(&resource.content) {
                    if strategy.is_excluded(&declaration.class) {
                        debug!(extension = %T::NAME, class = %declaration.class, "Skipping excluded class");
                        continue;
                    }
                    match load_declaration(&mut table, catalog, &declaration, strategy.overridden) {
                        Ok(()) => {}
                        Err(LineError::Fatal(e)) => {
                            error!(extension = %T::NAME, line = %declaration.line, error = %e, "Extension configuration error");
                            return Err(e);
                        }
                        Err(LineError::Rejected(cause)) => {
                            warn!(
                                extension = %T::NAME,
                                location = %resource.location,
                                line = %declaration.line,
                                cause = %cause,
                                "Failed to load extension declaration"
                            );
                            table
                                .diagnostics
                                .push(Diagnostic::new(declaration.line.clone(), cause));
                        }
                    }
                }
            }
        }
    }

    table.refresh_activations();
    Ok(table)
}

fn load_declaration<T: ExtensionPoint + ?Sized>(
    table: &mut DescriptorTable<T>,
    catalog: &Catalog,
    declaration: &Declaration,
    overridden: bool,
) -> std::result::Result<(), LineError> {
    let implementation = catalog
        .resolve::<T>(&declaration.class)
        .map_err(LineError::Rejected)?;

    match implementation.kind() {
        RoleKind::Adaptive => table.insert_adaptive(implementation).map_err(LineError::Fatal),
        RoleKind::Wrapper => {
            table.insert_wrapper(implementation);
            Ok(())
        }
        RoleKind::Regular => {
            if implementation.constructor().is_none() {
                return Err(LineError::Rejected(format!(
                    "class {} has no zero-argument constructor",
                    declaration.class
                )));
            }
            let names = if declaration.names.is_empty() {
                let name = implementation
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| declaration::derive_name(&declaration.class, T::NAME));
                if name.is_empty() {
                    return Err(LineError::Rejected(format!(
                        "no extension name for class {}",
                        declaration.class
                    )));
                }
                vec![name]
            } else {
                declaration.names.clone()
            };
            for name in names {
                table
                    .insert_named(&name, Arc::clone(&implementation), overridden)
                    .map_err(LineError::Fatal)?;
            }
            Ok(())
        }
    }
}
