//! Core extension traits and type-erased handles.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::adaptive::{AdaptiveDispatcher, AdaptiveMethod};
use super::injector::Injector;
use super::system::ExtensionSystem;
use crate::error::Result;

/// A type-erased shared object. Always holds an `Arc<U>` for some `U`.
pub type AnyObject = Arc<dyn Any + Send + Sync>;

/// Erase a shared object so it can cross the object-factory boundary.
pub fn erase<U: ?Sized + Send + Sync + 'static>(value: Arc<U>) -> AnyObject {
    Arc::new(value)
}

/// Recover a shared object erased with [`erase`].
pub fn downcast<U: ?Sized + Send + Sync + 'static>(object: &AnyObject) -> Option<Arc<U>> {
    object.downcast_ref::<Arc<U>>().cloned()
}

/// Behaviour shared by every extension instance.
///
/// Both hooks are optional. `inject` is called on a freshly constructed
/// instance (and on every wrapper around it) so it can pull dependencies
/// through the [`Injector`]; `initialize` runs once the instance is fully
/// decorated.
pub trait Extension: Send + Sync + 'static {
    /// Wire dependencies. Failures are logged by the injector, never fatal.
    fn inject(&self, _injector: &Injector<'_>) {}

    /// Lifecycle hook run after construction and decoration.
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Marks a trait object type as a pluggable extension point.
///
/// ```rust,ignore
/// pub trait Protocol: Extension {
///     fn export(&self, url: &Url) -> Result<String>;
/// }
///
/// impl ExtensionPoint for dyn Protocol {
///     const NAME: &'static str = "neomind.rpc.Protocol";
///     const DEFAULT: Option<&'static str> = Some("neomind");
///
///     fn adaptive_methods() -> Vec<AdaptiveMethod> {
///         vec![AdaptiveMethod::new("export").keys(&["protocol"]).context_argument(0)]
///     }
///
///     fn adaptive(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
///         Some(Arc::new(AdaptiveProtocol { dispatcher }))
///     }
/// }
/// ```
pub trait ExtensionPoint: Extension {
    /// Fully-qualified name; declaration resources are looked up by it.
    const NAME: &'static str;

    /// Name of the default extension. Must name exactly one extension.
    const DEFAULT: Option<&'static str> = None;

    /// Methods of the extension point and how their runtime context is found.
    fn adaptive_methods() -> Vec<AdaptiveMethod> {
        Vec::new()
    }

    /// Build the call-time dispatching implementation.
    fn adaptive(_dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        None
    }
}

/// The last segment of a dotted name.
pub fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[derive(Clone, Copy)]
struct ExtensionHooks {
    adaptive: fn(&ExtensionSystem) -> Result<AnyObject>,
    has_extensions: fn(&ExtensionSystem) -> Result<bool>,
}

fn adaptive_of<U: ExtensionPoint + ?Sized>(system: &ExtensionSystem) -> Result<AnyObject> {
    let instance = system.registry::<U>()?.adaptive()?;
    Ok(erase(instance))
}

fn has_extensions_of<U: ExtensionPoint + ?Sized>(system: &ExtensionSystem) -> Result<bool> {
    Ok(!system.registry::<U>()?.supported_names()?.is_empty())
}

/// Runtime description of a dependency's type.
#[derive(Clone, Copy)]
pub struct DependencyType {
    id: TypeId,
    name: &'static str,
    extension: Option<ExtensionHooks>,
}

impl DependencyType {
    /// A dependency on an extension point.
    pub fn extension<U: ExtensionPoint + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<U>(),
            name: U::NAME,
            extension: Some(ExtensionHooks {
                adaptive: adaptive_of::<U>,
                has_extensions: has_extensions_of::<U>,
            }),
        }
    }

    /// A dependency on a plain shared object.
    pub fn object<U: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<U>(),
            name: std::any::type_name::<U>(),
            extension: None,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_extension_point(&self) -> bool {
        self.extension.is_some()
    }

    /// The adaptive instance of the extension point, if it is one and has
    /// at least one supported extension.
    pub(crate) fn adaptive_instance(&self, system: &ExtensionSystem) -> Result<Option<AnyObject>> {
        let Some(hooks) = self.extension else {
            return Ok(None);
        };
        if !(hooks.has_extensions)(system)? {
            return Ok(None);
        }
        (hooks.adaptive)(system).map(Some)
    }
}

impl fmt::Debug for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyType")
            .field("name", &self.name)
            .field("extension_point", &self.is_extension_point())
            .finish()
    }
}
