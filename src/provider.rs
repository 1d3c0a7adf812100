//! Providers: the production rule bound to one identifier

use std::fmt;
use std::sync::Arc;

use crate::errors::RegistryError;
use crate::identifier::{Arguments, Dependency, Identifier, Injectable, Instance};
use crate::registry::{Registry, Resolver};

/// Producer function of a custom provider
pub type ProduceFn<T> = Arc<dyn Fn(&Resolver<'_>) -> Result<Arc<T>, RegistryError> + Send + Sync>;

type ConstructFn<T> = Arc<dyn Fn(Arguments) -> Result<Arc<T>, RegistryError> + Send + Sync>;

/// Upcast from a concrete service to the type an interface token exposes.
///
/// Every type implements it for itself. Implement it for trait objects with
/// [`implements!`](crate::implements).
pub trait Implements<T: ?Sized>: Injectable {
    fn upcast(self: Arc<Self>) -> Arc<T>;
}

impl<S: Injectable> Implements<S> for S {
    fn upcast(self: Arc<Self>) -> Arc<S> {
        self
    }
}

/// Declare that a concrete service can stand in for a trait object.
///
/// ```ignore
/// implements!(ConsoleLogger => dyn Logger);
/// ```
#[macro_export]
macro_rules! implements {
    ($service:ty => $interface:ty) => {
        impl $crate::Implements<$interface> for $service {
            fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$interface> {
                self
            }
        }
    };
}

/// Provider variant, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Constant,
    Service,
    Interface,
    Custom,
}

/// Constructor plus its dependency list and optional override scope
pub struct ServiceBinding<T: ?Sized> {
    service: String,
    construct: ConstructFn<T>,
    dependencies: Vec<Dependency>,
    overrides: Option<Registry>,
}

impl<T: ?Sized + Injectable> ServiceBinding<T> {
    fn new<S>(
        service: &Identifier<S>,
        construct: ConstructFn<T>,
        dependencies: Vec<Dependency>,
        overrides: Option<Registry>,
    ) -> Result<Self, RegistryError>
    where
        S: ?Sized + Injectable,
    {
        let parameters = service.parameter_types().ok_or_else(|| RegistryError::InvalidService {
            identifier: service.to_string(),
        })?;
        if parameters.len() != dependencies.len() {
            return Err(RegistryError::ArityMismatch {
                service: service.to_string(),
                expected: parameters.len(),
                actual: dependencies.len(),
            });
        }
        for (parameter, dependency) in parameters.iter().zip(&dependencies) {
            if parameter.type_id != dependency.type_id() {
                return Err(RegistryError::TypeMismatch {
                    identifier: dependency.to_string(),
                    expected: parameter.type_name,
                    actual: dependency.type_name(),
                });
            }
        }

        Ok(Self {
            service: service.to_string(),
            construct,
            dependencies,
            overrides,
        })
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn overrides(&self) -> Option<&Registry> {
        self.overrides.as_ref()
    }

    fn produce(&self, resolver: &Resolver<'_>) -> Result<Arc<T>, RegistryError> {
        match &self.overrides {
            Some(scope) => self.construct_with(&Resolver::scoped(scope, resolver)),
            None => self.construct_with(resolver),
        }
    }

    fn construct_with(&self, resolver: &Resolver<'_>) -> Result<Arc<T>, RegistryError> {
        let mut values = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            let value = resolver
                .resolve_dependency(dependency)
                .map_err(|source| RegistryError::UnresolvedDependency {
                    service: self.service.clone(),
                    dependency: dependency.to_string(),
                    source: Box::new(source),
                })?;
            values.push((dependency.clone(), value));
        }

        (self.construct)(Arguments::new(self.service.clone(), values))
    }
}

/// How one identifier's value is produced
pub enum Provider<T: ?Sized> {
    /// Precomputed value
    Constant(Arc<T>),
    /// Service reference constructed from its dependencies
    Service(ServiceBinding<T>),
    /// Token bound to a separately supplied service reference
    Interface(ServiceBinding<T>),
    /// Arbitrary producer, no validation
    Custom(ProduceFn<T>),
}

impl<T: ?Sized + Injectable> Provider<T> {
    pub fn constant(value: Arc<T>) -> Self {
        Provider::Constant(value)
    }

    /// Validates that `service` is a service reference whose parameters match
    /// `dependencies` in count and type.
    pub fn service(
        service: &Identifier<T>,
        dependencies: Vec<Dependency>,
        overrides: Option<Registry>,
    ) -> Result<Self, RegistryError> {
        let service_fn = service
            .service_fn()
            .ok_or_else(|| RegistryError::InvalidService {
                identifier: service.to_string(),
            })?
            .clone();
        let construct: ConstructFn<T> = Arc::new(move |args: Arguments| service_fn.construct(args));

        ServiceBinding::new(service, construct, dependencies, overrides).map(Provider::Service)
    }

    /// Like [`Provider::service`], for a token whose value is built by a
    /// different service reference.
    pub fn interface<S>(
        token: &Identifier<T>,
        service: &Identifier<S>,
        dependencies: Vec<Dependency>,
        overrides: Option<Registry>,
    ) -> Result<Self, RegistryError>
    where
        S: Implements<T>,
    {
        if !token.is_token() {
            return Err(RegistryError::InvalidIdentifier {
                identifier: token.to_string(),
            });
        }
        let service_fn = service
            .service_fn()
            .ok_or_else(|| RegistryError::InvalidService {
                identifier: service.to_string(),
            })?
            .clone();
        let construct: ConstructFn<T> =
            Arc::new(move |args: Arguments| service_fn.construct(args).map(<S as Implements<T>>::upcast));

        ServiceBinding::new(service, construct, dependencies, overrides).map(Provider::Interface)
    }

    pub fn custom<F>(produce: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        Provider::Custom(Arc::new(produce))
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Constant(_) => ProviderKind::Constant,
            Provider::Service(_) => ProviderKind::Service,
            Provider::Interface(_) => ProviderKind::Interface,
            Provider::Custom(_) => ProviderKind::Custom,
        }
    }

    /// Produce one value, resolving dependencies through `resolver`.
    pub fn produce(&self, resolver: &Resolver<'_>) -> Result<Arc<T>, RegistryError> {
        match self {
            Provider::Constant(value) => Ok(Arc::clone(value)),
            Provider::Service(binding) | Provider::Interface(binding) => binding.produce(resolver),
            Provider::Custom(produce) => produce(resolver),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Constant(_) => f.write_str("Provider::Constant"),
            Provider::Service(binding) | Provider::Interface(binding) => {
                let name = if matches!(self, Provider::Service(_)) {
                    "Provider::Service"
                } else {
                    "Provider::Interface"
                };
                f.debug_struct(name)
                    .field("service", &binding.service)
                    .field("dependencies", &binding.dependencies)
                    .field("overrides", &binding.overrides.is_some())
                    .finish()
            }
            Provider::Custom(_) => f.write_str("Provider::Custom"),
        }
    }
}

/// Type-erased provider as stored in a registry
pub(crate) trait ErasedProvider: Send + Sync {
    fn produce_erased(&self, resolver: &Resolver<'_>) -> Result<Instance, RegistryError>;

    fn kind(&self) -> ProviderKind;
}

impl<T: ?Sized + Injectable> ErasedProvider for Provider<T> {
    fn produce_erased(&self, resolver: &Resolver<'_>) -> Result<Instance, RegistryError> {
        self.produce(resolver).map(Instance::new)
    }

    fn kind(&self) -> ProviderKind {
        Provider::kind(self)
    }
}
