//! Implementations known to the runtime and the catalog resolving them.
//!
//! Declaration resources name implementations by class string. The
//! [`Catalog`] maps those strings to [`Implementation`] values registered in
//! code, carrying the constructor and the role metadata.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::activate::Activation;
use super::types::ExtensionPoint;
use super::wrapper::WrapperFilter;

/// Zero-argument constructor of a regular or adaptive implementation.
pub type Constructor<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Constructor of a wrapper, taking the instance it decorates.
pub type WrapperConstructor<T> = Arc<dyn Fn(Arc<T>) -> Arc<T> + Send + Sync>;

/// Role tag of an implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Regular,
    Adaptive,
    Wrapper,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Regular => write!(f, "regular"),
            RoleKind::Adaptive => write!(f, "adaptive"),
            RoleKind::Wrapper => write!(f, "wrapper"),
        }
    }
}

/// How an implementation is constructed, by role.
pub enum Role<T: ?Sized> {
    /// A named extension. `None` when there is no zero-argument constructor.
    Regular(Option<Constructor<T>>),
    /// The hand-written adaptive implementation of the extension point.
    Adaptive(Constructor<T>),
    /// A decorator taking the extension point itself.
    Wrapper(WrapperConstructor<T>),
}

impl<T: ?Sized> Role<T> {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Regular(_) => RoleKind::Regular,
            Role::Adaptive(_) => RoleKind::Adaptive,
            Role::Wrapper(_) => RoleKind::Wrapper,
        }
    }
}

/// An implementation of extension point `T`.
pub struct Implementation<T: ?Sized> {
    class: String,
    role: Role<T>,
    name: Option<String>,
    priority: Option<i32>,
    activation: Option<Activation>,
    filter: WrapperFilter,
}

impl<T: ?Sized + 'static> Implementation<T> {
    fn with_role(class: impl Into<String>, role: Role<T>) -> Self {
        Self {
            class: class.into(),
            role,
            name: None,
            priority: None,
            activation: None,
            filter: WrapperFilter::default(),
        }
    }

    /// A regular implementation built by `constructor`.
    pub fn regular<F>(class: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self::with_role(class, Role::Regular(Some(Arc::new(constructor))))
    }

    /// A regular implementation that cannot be constructed without arguments.
    pub fn without_constructor(class: impl Into<String>) -> Self {
        Self::with_role(class, Role::Regular(None))
    }

    /// The adaptive implementation of the extension point.
    pub fn adaptive<F>(class: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self::with_role(class, Role::Adaptive(Arc::new(constructor)))
    }

    /// A wrapper decorating another instance of the extension point.
    pub fn wrapper<F>(class: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::with_role(class, Role::Wrapper(Arc::new(constructor)))
    }

    /// Name used when a declaration line carries only the class.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lower values take precedence on name conflicts and wrap outermost.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    /// Only wrap extensions with one of these names.
    pub fn with_matches(mut self, names: &[&str]) -> Self {
        self.filter = self.filter.with_matches(names);
        self
    }

    /// Never wrap extensions with one of these names.
    pub fn with_mismatches(mut self, names: &[&str]) -> Self {
        self.filter = self.filter.with_mismatches(names);
        self
    }
}

impl<T: ?Sized> Implementation<T> {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn role(&self) -> &Role<T> {
        &self.role
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn declared_priority(&self) -> Option<i32> {
        self.priority
    }

    /// Effective priority, 0 when none was declared.
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(0)
    }

    pub fn activation(&self) -> Option<&Activation> {
        self.activation.as_ref()
    }

    pub fn filter(&self) -> &WrapperFilter {
        &self.filter
    }

    pub(crate) fn constructor(&self) -> Option<&Constructor<T>> {
        match &self.role {
            Role::Regular(constructor) => constructor.as_ref(),
            Role::Adaptive(constructor) => Some(constructor),
            Role::Wrapper(_) => None,
        }
    }

    pub(crate) fn wrapper_constructor(&self) -> Option<&WrapperConstructor<T>> {
        match &self.role {
            Role::Wrapper(constructor) => Some(constructor),
            _ => None,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Implementation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("class", &self.class)
            .field("role", &self.kind())
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("activation", &self.activation)
            .finish()
    }
}

#[derive(Clone)]
struct CatalogEntry {
    point: TypeId,
    point_name: &'static str,
    implementation: Arc<dyn Any + Send + Sync>,
}

/// Class string to implementation table, shared by every extension point.
#[derive(Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its class string.
    pub fn register<T: ExtensionPoint + ?Sized>(&mut self, implementation: Implementation<T>) {
        let class = implementation.class().to_string();
        let entry = CatalogEntry {
            point: TypeId::of::<T>(),
            point_name: T::NAME,
            implementation: Arc::new(implementation),
        };
        if self.entries.insert(class.clone(), entry).is_some() {
            tracing::warn!(extension = %T::NAME, class = %class, "Implementation class registered twice, keeping the latest");
        }
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entries.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a class string for extension point `T`.
    ///
    /// The error is the diagnostic cause: the class is unknown, or it
    /// implements a different extension point.
    pub(crate) fn resolve<T: ExtensionPoint + ?Sized>(
        &self,
        class: &str,
    ) -> std::result::Result<Arc<Implementation<T>>, String> {
        let entry = self
            .entries
            .get(class)
            .ok_or_else(|| format!("class {} not found", class))?;
        if entry.point != TypeId::of::<T>() {
            return Err(format!(
                "class {} is not a subtype of {} (it implements {})",
                class,
                T::NAME,
                entry.point_name
            ));
        }
        Arc::clone(&entry.implementation)
            .downcast::<Implementation<T>>()
            .map_err(|_| format!("class {} is not a subtype of {}", class, T::NAME))
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<_> = self.entries.keys().collect();
        classes.sort();
        f.debug_struct("Catalog").field("classes", &classes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::types::Extension;

    trait Sink: Extension {}
    impl ExtensionPoint for dyn Sink {
        const NAME: &'static str = "test.Sink";
    }

    trait Source: Extension {}
    impl ExtensionPoint for dyn Source {
        const NAME: &'static str = "test.Source";
    }

    struct NullSink;
    impl Extension for NullSink {}
    impl Sink for NullSink {}

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register(
            Implementation::<dyn Sink>::regular("test.NullSink", || Arc::new(NullSink) as Arc<dyn Sink>)
                .with_priority(3),
        );
        catalog.register(Implementation::<dyn Sink>::wrapper("test.SinkWrapper", |inner| inner));
        catalog
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("test.NullSink"));

        let sink = catalog.resolve::<dyn Sink>("test.NullSink").unwrap();
        assert_eq!(sink.kind(), RoleKind::Regular);
        assert_eq!(sink.priority(), 3);
        assert!(sink.constructor().is_some());

        let wrapper = catalog.resolve::<dyn Sink>("test.SinkWrapper").unwrap();
        assert_eq!(wrapper.kind(), RoleKind::Wrapper);
        assert_eq!(wrapper.priority(), 0);
        assert!(wrapper.declared_priority().is_none());
        assert!(wrapper.constructor().is_none());
        assert!(wrapper.wrapper_constructor().is_some());
    }

    #[test]
    fn test_resolve_failures() {
        let catalog = catalog();
        let err = catalog.resolve::<dyn Sink>("test.Missing").unwrap_err();
        assert!(err.contains("not found"));

        let err = catalog.resolve::<dyn Source>("test.NullSink").unwrap_err();
        assert!(err.contains("is not a subtype of test.Source"));
        assert!(err.contains("test.Sink"));
    }

    #[test]
    fn test_without_constructor() {
        let implementation = Implementation::<dyn Sink>::without_constructor("test.ArgsSink");
        assert_eq!(implementation.kind(), RoleKind::Regular);
        assert!(implementation.constructor().is_none());
    }
}
