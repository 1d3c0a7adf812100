use std::any::type_name;
use std::sync::Arc;

use super::Registry;
use crate::errors::RegistryError;
use crate::identifier::{Dependency, Identifier, Injectable, Instance, Key};

/// The registry view a provider resolves its dependencies through.
///
/// A root resolver is a registry on its own. A scoped resolver belongs to an
/// override scope and falls back to the resolver of the caller once the
/// scope (and its own parents) cannot answer. The fallback lives only as
/// long as the production that created it.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a Registry,
    fallback: Option<&'a Resolver<'a>>,
}

impl<'a> Resolver<'a> {
    pub fn root(registry: &'a Registry) -> Self {
        Self::new(registry, None)
    }

    pub fn scoped(registry: &'a Registry, fallback: &'a Resolver<'a>) -> Self {
        Self::new(registry, Some(fallback))
    }

    pub(crate) fn new(registry: &'a Registry, fallback: Option<&'a Resolver<'a>>) -> Self {
        Self { registry, fallback }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn fallback(&self) -> Option<&'a Resolver<'a>> {
        self.fallback
    }

    pub fn resolve<T: ?Sized + Injectable>(&self, id: &Identifier<T>) -> Result<Arc<T>, RegistryError> {
        let instance = self.resolve_dependency(&id.dependency())?;
        instance.downcast::<T>().ok_or_else(|| RegistryError::TypeMismatch {
            identifier: id.to_string(),
            expected: type_name::<T>(),
            actual: instance.type_name(),
        })
    }

    pub fn has<T: ?Sized + Injectable>(&self, id: &Identifier<T>) -> bool {
        self.contains(id.key())
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.registry.contains(key) || self.fallback.is_some_and(|fallback| fallback.contains(key))
    }

    pub(crate) fn lookup(&self, dependency: &Dependency) -> Result<Option<Instance>, RegistryError> {
        self.registry.lookup(dependency, self.fallback)
    }

    pub(crate) fn resolve_dependency(&self, dependency: &Dependency) -> Result<Instance, RegistryError> {
        self.lookup(dependency)?
            .ok_or_else(|| RegistryError::ServiceNotFound {
                identifier: dependency.to_string(),
                registry: self.registry.display_name(),
            })
    }
}
