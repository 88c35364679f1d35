//! Extension system.
//!
//! Extension points are traits; implementations are registered in a catalog
//! by class string and bound to names by declaration resources. Each point
//! gets a lazily built registry that creates, injects, decorates and caches
//! its instances.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    ExtensionSystem                     │
//! │  - Catalog (class string → Implementation)            │
//! │  - Resource locators + loading strategies              │
//! │  - Raw instance table, provided objects                │
//! └───────────────────────────────────────────────────────┘
//!                           │ registry::<dyn P>()
//!                           ▼
//! ┌───────────────────────────────────────────────────────┐
//! │                 ExtensionRegistry<dyn P>               │
//! │  discover ──▶ DescriptorTable (names, wrappers,        │
//! │               adaptive, activations, diagnostics)      │
//! │  get(name) ──▶ create ─▶ inject ─▶ wrap ─▶ initialize  │
//! │  adaptive() ──▶ AdaptiveDispatcher ──▶ get(name)       │
//! │  active(ctx, group) ──▶ ordered subset                 │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Declarations
//!
//! A resource at `<strategy directory><extension point name>` lists one
//! implementation per line:
//!
//! ```text
//! # comment
//! http=neomind.rpc.HttpProtocol
//! grpc, grpcs = neomind.rpc.GrpcProtocol
//! neomind.rpc.LoggingProtocolWrapper
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use neomind_spi::prelude::*;
//!
//! let system = ExtensionSystem::builder()
//!     .implementation(Implementation::<dyn Protocol>::regular("neomind.rpc.HttpProtocol", || {
//!         Arc::new(HttpProtocol) as Arc<dyn Protocol>
//!     }))
//!     .bundled("spi/neomind.rpc.Protocol", "http=neomind.rpc.HttpProtocol")
//!     .build();
//!
//! let http = system.get::<dyn Protocol>("http")?;
//! let adaptive = system.adaptive::<dyn Protocol>()?;
//! ```

pub mod activate;
pub mod adaptive;
pub mod holder;
pub mod implementation;
pub mod injector;
pub mod loader;
pub mod registry;
pub mod system;
pub mod types;
pub mod wrapper;

pub use activate::{Activation, ActiveDescriptor};
pub use adaptive::{AdaptiveDispatcher, AdaptiveMethod, ContextSource};
pub use implementation::{Catalog, Constructor, Implementation, Role, RoleKind, WrapperConstructor};
pub use injector::{
    AdaptiveObjectFactory, InjectionMode, Injector, ObjectFactory, ProvidedObjectFactory,
    SpiObjectFactory,
};
pub use loader::{
    BundledLocator, DescriptorTable, DirectoryLocator, ExtensionDescriptor, LoadingStrategy,
    Resource, ResourceLocator, ResourceOrigin,
};
pub use registry::ExtensionRegistry;
pub use system::{ExtensionSystem, ExtensionSystemBuilder};
pub use types::{AnyObject, DependencyType, Extension, ExtensionPoint};
pub use wrapper::WrapperFilter;
