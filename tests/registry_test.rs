//! Registry integration tests: lookup order, parents, memoization

#![allow(clippy::uninlined_format_args)]

use di_registry::{deps, implements, Identifier, Registry, RegistryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Leaf service without dependencies
#[derive(Debug)]
struct Logger {
    prefix: String,
}

/// Service depending on a logger
#[derive(Debug)]
struct Reporter {
    logger: Arc<Logger>,
}

trait Storage: Send + Sync {
    fn backend(&self) -> String;
}

struct MemoryStorage;

impl Storage for MemoryStorage {
    fn backend(&self) -> String {
        "memory".to_string()
    }
}

struct DiskStorage {
    root: Arc<String>,
}

impl Storage for DiskStorage {
    fn backend(&self) -> String {
        format!("disk:{}", self.root)
    }
}

implements!(MemoryStorage => dyn Storage);
implements!(DiskStorage => dyn Storage);

#[test]
fn test_child_shadows_parent_binding() {
    let root = Registry::named("R");
    let url = Identifier::<String>::token("URL");
    root.register_constant(&url, "http://a/".to_string()).unwrap();

    let child = Registry::named("C");
    child.add_parent(&root);
    child.register_constant(&url, "http://b/".to_string()).unwrap();

    let sibling = Registry::named("D");
    sibling.add_parent(&root);

    assert_eq!(child.resolve(&url).unwrap().as_str(), "http://b/");
    assert_eq!(sibling.resolve(&url).unwrap().as_str(), "http://a/");
    assert_eq!(root.resolve(&url).unwrap().as_str(), "http://a/");
}

#[test]
fn test_parent_cache_is_shared_with_children() {
    let root = Registry::named("root");
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let logger = Identifier::service(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Logger {
            prefix: "app".to_string(),
        }
    });
    root.register_service(&logger, deps![]).unwrap();

    let first_child = Registry::named("first");
    let second_child = Registry::named("second");
    first_child.add_parent(&root);
    second_child.add_parent(&root);

    let from_first = first_child.resolve(&logger).unwrap();
    let from_second = second_child.resolve(&logger).unwrap();
    let from_root = root.resolve(&logger).unwrap();

    assert!(Arc::ptr_eq(&from_first, &from_root));
    assert!(Arc::ptr_eq(&from_second, &from_root));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(first_child.instance_count(), 0);
    assert_eq!(root.instance_count(), 1);
}

#[test]
fn test_reporter_shares_logger_instance() {
    let registry = Registry::new();
    let logger = Identifier::service(|| Logger {
        prefix: "app".to_string(),
    });
    let reporter = Identifier::service(|logger: Arc<Logger>| Reporter { logger });
    registry.register_service(&logger, deps![]).unwrap();
    registry.register_service(&reporter, deps![logger]).unwrap();

    let reporter = registry.resolve(&reporter).unwrap();
    assert!(Arc::ptr_eq(&reporter.logger, &registry.resolve(&logger).unwrap()));
    assert_eq!(reporter.logger.prefix, "app");
}

#[test]
fn test_dependencies_passed_in_declared_order() {
    let registry = Registry::new();
    let first = Identifier::<String>::token("first");
    let second = Identifier::<String>::token("second");
    let third = Identifier::<String>::token("third");
    registry.register_constant(&first, "1".to_string()).unwrap();
    registry.register_constant(&second, "2".to_string()).unwrap();
    registry.register_constant(&third, "3".to_string()).unwrap();

    let joined = Identifier::service(|a: Arc<String>, b: Arc<String>, c: Arc<String>| {
        format!("{}{}{}", a, b, c)
    });
    registry.register_service(&joined, deps![third, first, second]).unwrap();

    assert_eq!(registry.resolve(&joined).unwrap().as_str(), "312");
}

#[test]
fn test_arity_mismatch_fails_at_registration() {
    let registry = Registry::new();
    let a = Identifier::<u32>::token("a");
    let b = Identifier::<u32>::token("b");
    let c = Identifier::<u32>::token("c");
    let foo = Identifier::service(|a: Arc<u32>, b: Arc<u32>| *a + *b);

    for list in [deps![a], deps![a, b, c], deps![]] {
        let err = registry.register_service(&foo, list).unwrap_err();
        assert!(matches!(err, RegistryError::ArityMismatch { expected: 2, .. }));
    }
    assert!(!registry.has(&foo));
}

#[test]
fn test_has_follows_parent_chain() {
    let grandparent = Registry::named("grandparent");
    let parent = Registry::named("parent");
    let child = Registry::named("child");
    parent.add_parent(&grandparent);
    child.add_parent(&parent);

    let url = Identifier::<String>::token("URL");
    let port = Identifier::<u16>::token("port");
    assert!(!child.has(&url));

    grandparent.register_constant(&url, "http://a/".to_string()).unwrap();
    assert!(child.has(&url));
    assert!(!child.has(&port));
    assert_eq!(child.resolve(&url).unwrap().as_str(), "http://a/");
}

#[test]
fn test_parents_added_after_registration() {
    let child = Registry::named("child");
    let url = Identifier::<String>::token("URL");
    let length = Identifier::service(|url: Arc<String>| url.len());
    child.register_service(&length, deps![url]).unwrap();

    assert!(child.resolve(&length).is_err());

    let parent = Registry::named("parent");
    parent.register_constant(&url, "http://late/".to_string()).unwrap();
    child.add_parent(&parent);

    assert_eq!(*child.resolve(&length).unwrap(), "http://late/".len());
}

#[test]
fn test_first_parent_in_registration_order_wins() {
    let first = Registry::named("first");
    let second = Registry::named("second");
    let url = Identifier::<String>::token("URL");
    first.register_constant(&url, "http://first/".to_string()).unwrap();
    second.register_constant(&url, "http://second/".to_string()).unwrap();

    let child = Registry::named("child");
    child.add_parents([&first, &second]);

    assert_eq!(child.resolve(&url).unwrap().as_str(), "http://first/");
}

#[test]
fn test_failing_parent_falls_through_to_next_parent() {
    let url = Identifier::<String>::token("URL");
    let length = Identifier::service(|url: Arc<String>| url.len());

    // binds `length` but cannot build it
    let broken = Registry::named("broken");
    broken.register_service(&length, deps![url]).unwrap();

    let good = Registry::named("good");
    good.register_constant(&url, "abc".to_string()).unwrap();
    good.register_service(&length, deps![url]).unwrap();

    let child = Registry::named("child");
    child.add_parents([&broken, &good]);

    assert_eq!(*child.resolve(&length).unwrap(), 3);
    assert_eq!(good.instance_count(), 2);
    assert_eq!(broken.instance_count(), 0);
}

#[test]
fn test_first_parent_error_kept_when_no_parent_succeeds() {
    let url = Identifier::<String>::token("URL");
    let port = Identifier::<u16>::token("port");
    let length = Identifier::service(|url: Arc<String>| url.len());
    let doubled = Identifier::service(|port: Arc<u16>| *port * 2);

    let missing_url = Registry::named("missing-url");
    missing_url.register_service(&length, deps![url]).unwrap();
    let unrelated = Registry::named("unrelated");
    unrelated.register_service(&doubled, deps![port]).unwrap();
    let also_broken = Registry::named("also-broken");
    also_broken.register_service(&length, deps![url]).unwrap();

    let child = Registry::named("child");
    child.add_parents([&unrelated, &missing_url, &also_broken]);

    let err = child.resolve(&length).unwrap_err();
    assert!(matches!(err, RegistryError::UnresolvedDependency { .. }));
    assert!(matches!(
        err.root_cause(),
        RegistryError::ServiceNotFound { registry, .. } if registry == "missing-url"
    ));

    // no parent binds it at all: plain not-found from the child
    let err = child.resolve(&url).unwrap_err();
    assert!(matches!(err, RegistryError::ServiceNotFound { ref registry, .. } if registry == "child"));
}

#[test]
fn test_dependency_type_checked_at_registration() {
    let registry = Registry::new();
    let port = Identifier::<u32>::token("port");
    let wide = Identifier::service(|port: Arc<u64>| *port);

    let err = registry.register_service(&wide, deps![port]).unwrap_err();
    assert_eq!(err.to_string(), "type mismatch for 'port': expected u64, found u32");
    assert!(!registry.has(&wide));

    let storage = Identifier::<dyn Storage>::token("Storage");
    let disk = Identifier::service(|root: Arc<String>| DiskStorage { root });
    let err = registry.register_interface(&storage, &disk, deps![port]).unwrap_err();
    assert!(matches!(err, RegistryError::TypeMismatch { expected, .. } if expected == "alloc::string::String"));
}

#[test]
fn test_missing_dependency_reports_chain() {
    let registry = Registry::named("root");
    let url = Identifier::<String>::token("URL");
    let logger = Identifier::service(|url: Arc<String>| Logger {
        prefix: url.to_string(),
    });
    let reporter = Identifier::service(|logger: Arc<Logger>| Reporter { logger });
    registry.register_service(&logger, deps![url]).unwrap();
    registry.register_service(&reporter, deps![logger]).unwrap();

    let err = registry.resolve(&reporter).unwrap_err();
    match &err {
        RegistryError::UnresolvedDependency { service, dependency, .. } => {
            assert_eq!(service, "Reporter");
            assert_eq!(dependency, "Logger");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(
        err.root_cause(),
        RegistryError::ServiceNotFound { identifier, .. } if identifier == "URL"
    ));
    assert_eq!(registry.instance_count(), 0);
}

#[test]
fn test_interface_bindings_swap_implementations() {
    let storage = Identifier::<dyn Storage>::token("Storage");
    let memory = Identifier::service(|| MemoryStorage);
    let root_dir = Identifier::<String>::token("root");
    let disk = Identifier::service(|root: Arc<String>| DiskStorage { root });

    let dev = Registry::named("dev");
    dev.register_interface(&storage, &memory, deps![]).unwrap();

    let prod = Registry::named("prod");
    prod.register_constant(&root_dir, "/var/data".to_string()).unwrap();
    prod.register_interface(&storage, &disk, deps![root_dir]).unwrap();

    assert_eq!(dev.resolve(&storage).unwrap().backend(), "memory");
    assert_eq!(prod.resolve(&storage).unwrap().backend(), "disk:/var/data");
    // the implementation itself stays unregistered
    assert!(!prod.has(&disk));
}

#[test]
fn test_interface_requires_token_and_service() {
    let registry = Registry::new();
    let storage = Identifier::<dyn Storage>::token("Storage");
    let other_token = Identifier::<MemoryStorage>::token("memory");
    let memory = Identifier::service(|| MemoryStorage);

    let err = registry.register_interface(&storage, &other_token, deps![]).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidService { .. }));

    let err = registry.register_interface(&memory, &memory, deps![]).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidIdentifier { .. }));
}

#[test]
fn test_register_service_rejects_tokens() {
    let registry = Registry::new();
    let token = Identifier::<Logger>::token("Logger");
    let err = registry.register_service(&token, deps![]).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidService { .. }));
}

#[test]
fn test_custom_provider_can_alias_other_services() {
    let registry = Registry::new();
    let logger = Identifier::service(|| Logger {
        prefix: "app".to_string(),
    });
    let alias = Identifier::<Logger>::token("default-logger");
    registry.register_service(&logger, deps![]).unwrap();

    let target = logger.clone();
    registry
        .register_provider(&alias, move |resolver| resolver.resolve(&target))
        .unwrap();

    assert!(Arc::ptr_eq(
        &registry.resolve(&alias).unwrap(),
        &registry.resolve(&logger).unwrap()
    ));
}

#[test]
fn test_custom_provider_failure_passes_through() {
    let registry = Registry::new();
    let flaky = Identifier::<String>::token("flaky");
    registry
        .register_provider(&flaky, |_| Err(anyhow::anyhow!("upstream unavailable").into()))
        .unwrap();

    let err = registry.resolve(&flaky).unwrap_err();
    assert!(matches!(err, RegistryError::Custom(_)));
    assert_eq!(err.to_string(), "upstream unavailable");
    assert!(registry.has(&flaky));
}

#[test]
fn test_concurrent_first_resolution_constructs_once() {
    let registry = Registry::named("shared");
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let logger = Identifier::service(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(5));
        Logger {
            prefix: "app".to_string(),
        }
    });
    let reporter = Identifier::service(|logger: Arc<Logger>| Reporter { logger });
    registry.register_service(&logger, deps![]).unwrap();
    registry.register_service(&reporter, deps![logger]).unwrap();

    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            let reporter = reporter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.resolve(&reporter).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results {
        assert!(Arc::ptr_eq(result, &results[0]));
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
}
