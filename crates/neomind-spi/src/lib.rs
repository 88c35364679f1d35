//! Pluggable extension runtime for NeoMind.
//!
//! Components declare extension points as traits and resolve named
//! implementations at runtime, with dependency injection, wrapper chains,
//! call-time (adaptive) dispatch and context-driven activation.

pub mod config;
pub mod error;
pub mod extension;
pub mod logging;
pub mod url;

pub use config::SpiConfig;
pub use error::{Diagnostic, ExtensionError, Result};
pub use extension::{
    Extension, ExtensionPoint, ExtensionRegistry, ExtensionSystem, ExtensionSystemBuilder,
    Implementation,
};
pub use url::{Context, Url};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{directories, env_vars, SpiConfig};

    // Error handling
    pub use crate::error::{Diagnostic, ExtensionError, Result};

    // Extension system
    pub use crate::extension::{
        Activation, AdaptiveDispatcher, AdaptiveMethod, Extension, ExtensionPoint,
        ExtensionRegistry, ExtensionSystem, Implementation, InjectionMode, Injector,
        LoadingStrategy,
    };

    // Runtime context
    pub use crate::url::{Context, Url};

    pub use std::sync::Arc;
}
