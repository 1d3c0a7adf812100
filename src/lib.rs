//! Hierarchical dependency-injection registry
//!
//! Services are registered under [`Identifier`]s, produced lazily on first
//! resolution and cached for the lifetime of the [`Registry`]. Registries
//! can be layered: a child consults its parents for anything it does not
//! bind itself, and a service can carry an override scope that shadows some
//! of its dependencies without affecting its siblings.
//!
//! ```ignore
//! use std::sync::Arc;
//! use di_registry::{deps, Identifier, Registry};
//!
//! let registry = Registry::named("app");
//! let url = Identifier::<String>::token("URL");
//! let client = Identifier::service(|url: Arc<String>| HttpClient::new(&url));
//!
//! registry.register_constant(&url, "http://a/".to_string())?;
//! registry.register_service(&client, deps![url])?;
//! let client = registry.resolve(&client)?;
//! ```

pub mod config;
pub mod errors;
pub mod identifier;
pub mod logging;
pub mod provider;
pub mod registry;

// Re-export commonly used items for convenience
pub use config::{DuplicatePolicy, RegistryConfig};
pub use errors::{ConfigError, RegistryError};
pub use identifier::{Arguments, Constructor, Dependency, Identifier, Injectable, Key, ParameterType};
pub use provider::{Implements, Provider, ProviderKind};
pub use registry::{Registry, RegistryStats, Resolver};
