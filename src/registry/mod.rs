//! The registry: provider table, instance cache and parent chain
//!
//! Resolution order for an identifier:
//! 1. this registry's cache
//! 2. this registry's provider, producing and caching a value
//! 3. the parents, in the order they were added
//! 4. the caller's resolver, when resolving inside an override scope
//!
//! Values are produced at most once per registry and never evicted.

mod resolver;
mod stats;

pub use resolver::Resolver;
pub use stats::RegistryStats;

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, trace, warn};

use crate::config::{DuplicatePolicy, RegistryConfig};
use crate::errors::RegistryError;
use crate::identifier::{Dependency, Identifier, Injectable, Instance, Key};
use crate::provider::{ErasedProvider, Implements, Provider};
use stats::InnerStats;

/// Write-once cache cell.
///
/// The lock is held for the whole production so concurrent first requests
/// construct the value once. It is re-entrant: a production may resolve
/// other identifiers through this registry on the same thread.
struct InstanceSlot {
    value: ReentrantMutex<RefCell<Option<Instance>>>,
}

impl InstanceSlot {
    fn new() -> Self {
        Self {
            value: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    fn get(&self) -> Option<Instance> {
        let guard = self.value.lock();
        let value = guard.borrow().clone();
        value
    }
}

struct RegistryInner {
    config: RegistryConfig,
    providers: DashMap<Key, Arc<dyn ErasedProvider>>,
    instances: DashMap<Key, Arc<InstanceSlot>>,
    parents: RwLock<Vec<Registry>>,
    stats: InnerStats,
}

/// Dependency-injection registry
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Registry with a name used in diagnostics
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(RegistryConfig::named(name))
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                providers: DashMap::new(),
                instances: DashMap::new(),
                parents: RwLock::new(Vec::new()),
                stats: InnerStats::default(),
            }),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.config.name.as_deref()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub(crate) fn display_name(&self) -> String {
        self.name().unwrap_or("<anonymous>").to_string()
    }

    /// Two handles to the same registry
    pub fn ptr_eq(a: &Registry, b: &Registry) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // ---- registration ----

    /// Bind a token to a fixed value.
    pub fn register_constant<T: Injectable>(&self, token: &Identifier<T>, value: T) -> Result<(), RegistryError> {
        self.register_shared(token, Arc::new(value))
    }

    /// Bind a token to an already shared value; `resolve` hands back this
    /// exact `Arc`.
    pub fn register_shared<T: ?Sized + Injectable>(
        &self,
        token: &Identifier<T>,
        value: Arc<T>,
    ) -> Result<(), RegistryError> {
        if !token.is_token() {
            return Err(RegistryError::InvalidIdentifier {
                identifier: token.to_string(),
            });
        }
        self.insert_provider(token, Provider::constant(value))
    }

    /// Register a service reference under itself.
    pub fn register_service<T: ?Sized + Injectable>(
        &self,
        service: &Identifier<T>,
        dependencies: Vec<Dependency>,
    ) -> Result<(), RegistryError> {
        let provider = Provider::service(service, dependencies, None)?;
        self.insert_provider(service, provider)
    }

    /// Register a service reference with an override scope. `builder`
    /// receives the empty scope and binds whatever this service should see
    /// instead of the caller's bindings.
    pub fn register_service_with<T, B>(
        &self,
        service: &Identifier<T>,
        dependencies: Vec<Dependency>,
        builder: B,
    ) -> Result<(), RegistryError>
    where
        T: ?Sized + Injectable,
        B: FnOnce(&Registry) -> Result<(), RegistryError>,
    {
        let scope = self.override_scope(service, builder)?;
        let provider = Provider::service(service, dependencies, Some(scope))?;
        self.insert_provider(service, provider)
    }

    /// Register `service` as the implementation behind `token`.
    pub fn register_interface<T, S>(
        &self,
        token: &Identifier<T>,
        service: &Identifier<S>,
        dependencies: Vec<Dependency>,
    ) -> Result<(), RegistryError>
    where
        T: ?Sized + Injectable,
        S: Implements<T>,
    {
        let provider = Provider::interface(token, service, dependencies, None)?;
        self.insert_provider(token, provider)
    }

    pub fn register_interface_with<T, S, B>(
        &self,
        token: &Identifier<T>,
        service: &Identifier<S>,
        dependencies: Vec<Dependency>,
        builder: B,
    ) -> Result<(), RegistryError>
    where
        T: ?Sized + Injectable,
        S: Implements<T>,
        B: FnOnce(&Registry) -> Result<(), RegistryError>,
    {
        let scope = self.override_scope(token, builder)?;
        let provider = Provider::interface(token, service, dependencies, Some(scope))?;
        self.insert_provider(token, provider)
    }

    /// Register an arbitrary producer. Nothing is validated.
    pub fn register_provider<T, F>(&self, id: &Identifier<T>, produce: F) -> Result<(), RegistryError>
    where
        T: ?Sized + Injectable,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        self.insert_provider(id, Provider::custom(produce))
    }

    fn override_scope<T, B>(&self, id: &Identifier<T>, builder: B) -> Result<Registry, RegistryError>
    where
        T: ?Sized + Injectable,
        B: FnOnce(&Registry) -> Result<(), RegistryError>,
    {
        let config = RegistryConfig {
            name: Some(format!("{}/overrides[{}]", self.display_name(), id)),
            duplicate_policy: self.inner.config.duplicate_policy,
        };
        let scope = Registry::with_config(config);
        builder(&scope)?;
        Ok(scope)
    }

    fn insert_provider<T: ?Sized + Injectable>(
        &self,
        id: &Identifier<T>,
        provider: Provider<T>,
    ) -> Result<(), RegistryError> {
        let kind = provider.kind();
        let provider: Arc<dyn ErasedProvider> = Arc::new(provider);

        match self.inner.providers.entry(id.key()) {
            Entry::Occupied(mut entry) => match self.inner.config.duplicate_policy {
                DuplicatePolicy::Reject => Err(RegistryError::DuplicateRegistration {
                    identifier: id.to_string(),
                    registry: self.display_name(),
                }),
                DuplicatePolicy::Replace => {
                    warn!(registry = %self.display_name(), identifier = %id, ?kind, "replacing provider");
                    entry.insert(provider);
                    Ok(())
                }
            },
            Entry::Vacant(entry) => {
                debug!(registry = %self.display_name(), identifier = %id, ?kind, "registered provider");
                entry.insert(provider);
                Ok(())
            }
        }
    }

    // ---- parents ----

    /// Add a parent. Adding the same registry twice has no effect. Cycles
    /// are not detected.
    pub fn add_parent(&self, parent: &Registry) {
        let mut parents = self.inner.parents.write();
        if parents.iter().any(|existing| Registry::ptr_eq(existing, parent)) {
            return;
        }
        debug!(registry = %self.display_name(), parent = %parent.display_name(), "added parent");
        parents.push(parent.clone());
    }

    pub fn add_parents<'p, I>(&self, parents: I)
    where
        I: IntoIterator<Item = &'p Registry>,
    {
        for parent in parents {
            self.add_parent(parent);
        }
    }

    pub fn parents(&self) -> Vec<Registry> {
        self.inner.parents.read().clone()
    }

    // ---- resolution ----

    /// Resolve `id` from the cache, a local provider or a parent.
    pub fn resolve<T: ?Sized + Injectable>(&self, id: &Identifier<T>) -> Result<Arc<T>, RegistryError> {
        Resolver::root(self).resolve(id)
    }

    /// Like `resolve`, but an identifier that is bound nowhere yields
    /// `Ok(None)`. Production failures are still errors.
    pub fn try_resolve<T: ?Sized + Injectable>(
        &self,
        id: &Identifier<T>,
    ) -> Result<Option<Arc<T>>, RegistryError> {
        match self.resolve(id) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Whether `id` is cached, provided locally or known to a parent.
    /// Never produces anything.
    pub fn has<T: ?Sized + Injectable>(&self, id: &Identifier<T>) -> bool {
        self.contains(id.key())
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.inner.providers.contains_key(&key)
            || self.cached(key).is_some()
            || self.parents().iter().any(|parent| parent.contains(key))
    }

    pub(crate) fn lookup<'a>(
        &'a self,
        dependency: &Dependency,
        fallback: Option<&'a Resolver<'a>>,
    ) -> Result<Option<Instance>, RegistryError> {
        let stats = &self.inner.stats;
        stats.record_resolution();
        let key = dependency.key();

        if let Some(value) = self.cached(key) {
            stats.record_cache_hit();
            return Ok(Some(value));
        }

        let provider = self.inner.providers.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(provider) = provider {
            let resolver = Resolver::new(self, fallback);
            return self.produce(dependency, &*provider, &resolver).map(Some);
        }

        // a parent that fails only wins if no later parent succeeds
        let mut first_error = None;
        for parent in self.parents() {
            stats.record_parent_delegation();
            trace!(registry = %self.display_name(), parent = %parent.display_name(), identifier = %dependency, "delegating to parent");
            match parent.lookup(dependency, None) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(err) => {
                    debug!(registry = %self.display_name(), parent = %parent.display_name(), identifier = %dependency, error = %err, "parent failed, trying next parent");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        match fallback {
            Some(fallback) => fallback.lookup(dependency),
            None => Ok(None),
        }
    }

    fn produce(
        &self,
        dependency: &Dependency,
        provider: &dyn ErasedProvider,
        resolver: &Resolver<'_>,
    ) -> Result<Instance, RegistryError> {
        let slot = Arc::clone(
            self.inner
                .instances
                .entry(dependency.key())
                .or_insert_with(|| Arc::new(InstanceSlot::new()))
                .value(),
        );
        let guard = slot.value.lock();

        // another thread finished while this one waited for the lock
        if let Some(value) = guard.borrow().as_ref() {
            self.inner.stats.record_cache_hit();
            return Ok(value.clone());
        }

        debug!(registry = %self.display_name(), identifier = %dependency, kind = ?provider.kind(), "producing service");
        match provider.produce_erased(resolver) {
            Ok(value) => {
                self.inner.stats.record_production();
                let mut cell = guard.borrow_mut();
                let value = cell.get_or_insert(value).clone();
                Ok(value)
            }
            Err(err) => {
                self.inner.stats.record_failure();
                debug!(registry = %self.display_name(), identifier = %dependency, error = %err, "production failed");
                Err(err)
            }
        }
    }

    fn cached(&self, key: Key) -> Option<Instance> {
        let slot = self.inner.instances.get(&key).map(|entry| Arc::clone(entry.value()))?;
        slot.get()
    }

    // ---- introspection ----

    pub fn stats(&self) -> RegistryStats {
        self.inner.stats.snapshot()
    }

    pub fn provider_count(&self) -> usize {
        self.inner.providers.len()
    }

    /// Number of values produced and cached by this registry
    pub fn instance_count(&self) -> usize {
        let slots: Vec<Arc<InstanceSlot>> = self
            .inner
            .instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        slots.iter().filter(|slot| slot.get().is_some()).count()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name())
            .field("providers", &self.provider_count())
            .field("parents", &self.inner.parents.read().len())
            .finish()
    }
}
