//! Adaptive dispatch: choosing the concrete extension per call.
//!
//! An extension point describes its methods with [`AdaptiveMethod`]: which
//! context keys name the extension and where the runtime context comes from.
//! The registry validates that description and hands an
//! [`AdaptiveDispatcher`] to [`ExtensionPoint::adaptive`], where a small
//! hand-written implementation forwards each call:
//!
//! ```text
//! caller ──▶ adaptive impl ──select(method, ctx)──▶ dispatcher
//!                  │                                     │ keys → name
//!                  │                                     ▼
//!                  └──────── forward call ◀──── registry.get(name)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use super::registry::ExtensionRegistry;
use super::types::{simple_name, ExtensionPoint};
use crate::error::{ExtensionError, Result};
use crate::url::{Context, PROTOCOL_KEY};

/// Where an adaptive method finds its runtime context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSource {
    /// The argument at this index is itself a context.
    Argument(usize),
    /// The argument at `argument` exposes the context through `accessor`.
    Accessor {
        argument: usize,
        accessor: &'static str,
    },
    /// No argument provides a context.
    Missing,
}

/// Dispatch description of one extension point method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveMethod {
    name: &'static str,
    adaptive: bool,
    keys: Vec<String>,
    context: ContextSource,
    invocation: bool,
}

impl AdaptiveMethod {
    /// A method dispatched by context.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            adaptive: true,
            keys: Vec::new(),
            context: ContextSource::Missing,
            invocation: false,
        }
    }

    /// A method the adaptive instance does not support.
    pub fn unsupported(name: &'static str) -> Self {
        Self {
            adaptive: false,
            ..Self::new(name)
        }
    }

    /// Keys naming the extension, tried in order. When empty, a key derived
    /// from the extension point's simple name is used.
    pub fn keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn context_argument(mut self, index: usize) -> Self {
        self.context = ContextSource::Argument(index);
        self
    }

    pub fn context_accessor(mut self, argument: usize, accessor: &'static str) -> Self {
        self.context = ContextSource::Accessor { argument, accessor };
        self
    }

    /// Keys are resolved scoped to the invoked method name first.
    pub fn with_invocation(mut self) -> Self {
        self.invocation = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn key_list(&self) -> &[String] {
        &self.keys
    }

    pub fn context(&self) -> &ContextSource {
        &self.context
    }

    pub fn is_invocation_aware(&self) -> bool {
        self.invocation
    }
}

/// `FooBarBaz` → `foo.bar.baz`.
pub fn derive_key(simple_name: &str) -> String {
    let mut key = String::with_capacity(simple_name.len() + 4);
    for (i, ch) in simple_name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                key.push('.');
            }
            key.push(ch.to_ascii_lowercase());
        } else {
            key.push(ch);
        }
    }
    key
}

/// Resolves the extension for each call on an adaptive instance.
pub struct AdaptiveDispatcher<T: ?Sized> {
    registry: Weak<ExtensionRegistry<T>>,
    methods: HashMap<&'static str, AdaptiveMethod>,
    default_name: Option<String>,
}

impl<T: ExtensionPoint + ?Sized> AdaptiveDispatcher<T> {
    /// Validate `methods` and build the dispatcher.
    pub(crate) fn new(
        registry: Weak<ExtensionRegistry<T>>,
        methods: Vec<AdaptiveMethod>,
        default_name: Option<String>,
    ) -> Result<Self> {
        if !methods.iter().any(AdaptiveMethod::is_adaptive) {
            return Err(ExtensionError::NoAdaptiveMethod {
                extension: T::NAME.to_string(),
            });
        }

        let mut table = HashMap::with_capacity(methods.len());
        for mut method in methods {
            if method.adaptive {
                if method.context == ContextSource::Missing {
                    return Err(ExtensionError::CannotAdapt {
                        extension: T::NAME.to_string(),
                        method: method.name.to_string(),
                    });
                }
                if method.keys.is_empty() {
                    method.keys = vec![derive_key(simple_name(T::NAME))];
                }
            }
            table.insert(method.name, method);
        }

        Ok(Self {
            registry,
            methods: table,
            default_name,
        })
    }

    /// The extension serving `method` for `context`.
    pub fn select(&self, method: &str, context: Option<&dyn Context>) -> Result<Arc<T>> {
        let name = self.extension_name(method, context, None)?;
        self.fetch(&name)
    }

    /// Like [`select`](Self::select), resolving keys scoped to
    /// `invocation_method` first.
    pub fn select_for_invocation(
        &self,
        method: &str,
        context: Option<&dyn Context>,
        invocation_method: &str,
    ) -> Result<Arc<T>> {
        let name = self.extension_name(method, context, Some(invocation_method))?;
        self.fetch(&name)
    }

    /// Resolve the extension name for a call, without fetching it.
    ///
    /// Keys are tried in order; `protocol` reads the context's protocol. The
    /// default name is the fallback.
    pub fn extension_name(
        &self,
        method: &str,
        context: Option<&dyn Context>,
        invocation_method: Option<&str>,
    ) -> Result<String> {
        let spec = self
            .methods
            .get(method)
            .filter(|m| m.adaptive)
            .ok_or_else(|| self.unsupported(method))?;
        let context = context.ok_or_else(|| ExtensionError::MissingContext {
            extension: T::NAME.to_string(),
            method: method.to_string(),
        })?;

        let scoped = invocation_method.filter(|_| spec.invocation);
        for key in &spec.keys {
            let value = if key == PROTOCOL_KEY {
                context.protocol()
            } else if let Some(invoked) = scoped {
                context.method_parameter(invoked, key)
            } else {
                context.parameter(key)
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                return Ok(value.to_string());
            }
        }

        self.default_name
            .clone()
            .ok_or_else(|| ExtensionError::NameNotResolved {
                extension: T::NAME.to_string(),
                method: method.to_string(),
                keys: spec.keys.clone(),
                context: context.describe(),
            })
    }

    /// Error for calling a method the adaptive instance does not dispatch.
    pub fn unsupported(&self, method: &str) -> ExtensionError {
        ExtensionError::Unsupported {
            extension: T::NAME.to_string(),
            method: method.to_string(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&AdaptiveMethod> {
        self.methods.get(name)
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    fn fetch(&self, name: &str) -> Result<Arc<T>> {
        let registry = self.registry.upgrade().ok_or(ExtensionError::SystemDropped)?;
        tracing::trace!(extension = %T::NAME, name = %name, "Adaptive dispatch");
        registry.get(name)
    }
}

impl<T: ?Sized> fmt::Debug for AdaptiveDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("AdaptiveDispatcher")
            .field("methods", &methods)
            .field("default_name", &self.default_name)
            .finish()
    }
}
