use std::sync::atomic::{AtomicU64, Ordering};

/// Internal counters (atomic)
#[derive(Default)]
pub(crate) struct InnerStats {
    total_resolutions: AtomicU64,
    cache_hits: AtomicU64,
    productions: AtomicU64,
    parent_delegations: AtomicU64,
    failures: AtomicU64,
}

impl InnerStats {
    pub(crate) fn record_resolution(&self) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_production(&self) {
        self.productions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parent_delegation(&self) {
        self.parent_delegations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            total_resolutions: self.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            productions: self.productions.load(Ordering::Relaxed),
            parent_delegations: self.parent_delegations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Registry statistics
///
/// Counters are per registry: a lookup that is delegated to a parent is
/// counted once here and once more by the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Lookups that reached this registry, dependency lookups included
    pub total_resolutions: u64,
    /// Lookups answered from this registry's cache
    pub cache_hits: u64,
    /// Values produced by this registry's providers
    pub productions: u64,
    /// Times a parent was consulted
    pub parent_delegations: u64,
    /// Failed productions
    pub failures: u64,
}

impl RegistryStats {
    /// Share of lookups answered from the cache
    pub fn hit_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_resolutions as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} resolutions, {:.1}% cache hit rate, {} produced, {} delegated to parents, {} failed",
            self.total_resolutions,
            self.hit_rate() * 100.0,
            self.productions,
            self.parent_delegations,
            self.failures
        )
    }
}
