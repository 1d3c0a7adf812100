//! Error types for the registry

use thiserror::Error;

/// Failures raised by registration and resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A service reference was supplied where a token is required
    #[error("'{identifier}' is not a token; constants and interfaces must be keyed by a token")]
    InvalidIdentifier { identifier: String },

    /// A token was supplied where a constructor is required
    #[error("'{identifier}' is not a service reference and cannot construct a value")]
    InvalidService { identifier: String },

    /// Dependency list length differs from the constructor's parameter count
    #[error("service '{service}' takes {expected} parameter(s) but {actual} dependencies were declared")]
    ArityMismatch {
        service: String,
        expected: usize,
        actual: usize,
    },

    /// The identifier already has a provider in this registry
    #[error("'{identifier}' is already registered in registry '{registry}'")]
    DuplicateRegistration { identifier: String, registry: String },

    /// A dependency could not be resolved while producing a service
    #[error("service '{service}' could not resolve dependency '{dependency}': {source}")]
    UnresolvedDependency {
        service: String,
        dependency: String,
        #[source]
        source: Box<RegistryError>,
    },

    /// No cache entry, local provider or parent satisfied the identifier
    #[error("service '{identifier}' was not found in registry '{registry}' or its parents")]
    ServiceNotFound { identifier: String, registry: String },

    /// A stored value is not of the type the identifier promises
    #[error("type mismatch for '{identifier}': expected {expected}, found {actual}")]
    TypeMismatch {
        identifier: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Failure raised by a custom producer or an override builder
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl RegistryError {
    /// True when the identifier itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::ServiceNotFound { .. })
    }

    /// Innermost error of an `UnresolvedDependency` chain.
    pub fn root_cause(&self) -> &RegistryError {
        let mut current = self;
        while let RegistryError::UnresolvedDependency { source, .. } = current {
            current = &**source;
        }
        current
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for '{field}'")]
    InvalidValue { field: String, value: String },
}
