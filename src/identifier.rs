//! Service identifiers
//!
//! Two flavors share one key space:
//! - tokens, opaque keys for values and interfaces
//! - service references, constructors that double as their own key
//!
//! Identity is the [`Key`] minted when the identifier is created. Labels are
//! carried for diagnostics only and never take part in comparisons.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::RegistryError;

/// Type-erased cached value. The concrete payload is always an `Arc<T>`.
#[derive(Clone)]
pub(crate) struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub(crate) fn new<T: ?Sized + Injectable>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn downcast<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Name of the type the value was stored as
    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Anything that can be stored in a registry.
pub trait Injectable: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// Unique identity of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Uuid);

impl Key {
    fn new() -> Self {
        Key(Uuid::new_v4())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the first group is enough to tell anonymous identifiers apart in logs
        let simple = self.0.simple().to_string();
        write!(f, "#{}", &simple[..8])
    }
}

/// Positional arguments handed to a constructor, already resolved.
pub struct Arguments {
    service: String,
    /// Parameter count of the constructor consuming these arguments
    arity: usize,
    supplied: usize,
    values: std::vec::IntoIter<(Dependency, Instance)>,
}

impl Arguments {
    pub(crate) fn new(service: String, values: Vec<(Dependency, Instance)>) -> Self {
        Self {
            service,
            arity: values.len(),
            supplied: values.len(),
            values: values.into_iter(),
        }
    }

    fn with_arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Take the next argument as `Arc<A>`.
    pub fn next<A: ?Sized + Injectable>(&mut self) -> Result<Arc<A>, RegistryError> {
        let (dependency, value) = self.values.next().ok_or_else(|| RegistryError::ArityMismatch {
            service: self.service.clone(),
            expected: self.arity,
            actual: self.supplied,
        })?;

        value.downcast::<A>().ok_or_else(|| RegistryError::TypeMismatch {
            identifier: dependency.to_string(),
            expected: type_name::<A>(),
            actual: value.type_name(),
        })
    }
}

/// Type of one constructor parameter, checked against the dependency bound
/// to that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ParameterType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// A callable that builds `S` from positional `Arc` parameters.
///
/// Implemented for functions and closures taking up to eight `Arc<_>`
/// parameters. `ARITY` and `parameter_types` describe the declared
/// parameters, used to validate dependency lists at registration.
pub trait Constructor<S, Args>: Send + Sync + 'static {
    const ARITY: usize;

    fn parameter_types() -> Vec<ParameterType>;

    fn construct(&self, args: &mut Arguments) -> Result<S, RegistryError>;
}

macro_rules! impl_constructor {
    ($arity:expr $(, $param:ident)*) => {
        impl<F, S, $($param,)*> Constructor<S, ($(Arc<$param>,)*)> for F
        where
            F: Fn($(Arc<$param>),*) -> S + Send + Sync + 'static,
            $($param: ?Sized + Injectable,)*
        {
            const ARITY: usize = $arity;

            fn parameter_types() -> Vec<ParameterType> {
                vec![$(ParameterType::of::<$param>()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn construct(&self, args: &mut Arguments) -> Result<S, RegistryError> {
                $(let $param = args.next::<$param>()?;)*
                Ok(self($($param),*))
            }
        }
    };
}

impl_constructor!(0);
impl_constructor!(1, A);
impl_constructor!(2, A, B);
impl_constructor!(3, A, B, C);
impl_constructor!(4, A, B, C, D);
impl_constructor!(5, A, B, C, D, E);
impl_constructor!(6, A, B, C, D, E, G);
impl_constructor!(7, A, B, C, D, E, G, H);
impl_constructor!(8, A, B, C, D, E, G, H, I);

/// Constructor privately bound to a service reference.
pub(crate) struct ServiceFn<T: ?Sized> {
    parameters: Vec<ParameterType>,
    construct: Box<dyn Fn(Arguments) -> Result<Arc<T>, RegistryError> + Send + Sync>,
}

impl<T: ?Sized> ServiceFn<T> {
    pub(crate) fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn parameters(&self) -> &[ParameterType] {
        &self.parameters
    }

    pub(crate) fn construct(&self, args: Arguments) -> Result<Arc<T>, RegistryError> {
        (self.construct)(args)
    }
}

enum IdentifierKind<T: ?Sized> {
    Token,
    Service(Arc<ServiceFn<T>>),
}

/// Key naming a service of type `T`.
pub struct Identifier<T: ?Sized> {
    key: Key,
    label: Option<Arc<str>>,
    kind: IdentifierKind<T>,
}

impl<T: ?Sized + Injectable> Identifier<T> {
    /// Create a labelled token. Every call yields a distinct identifier.
    pub fn token(label: impl Into<String>) -> Self {
        Self {
            key: Key::new(),
            label: Some(Arc::from(label.into())),
            kind: IdentifierKind::Token,
        }
    }

    /// Create a token without a label.
    pub fn anonymous() -> Self {
        Self {
            key: Key::new(),
            label: None,
            kind: IdentifierKind::Token,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind, IdentifierKind::Token)
    }

    pub fn is_service(&self) -> bool {
        matches!(self.kind, IdentifierKind::Service(_))
    }

    /// Declared parameter count of a service reference; `None` for tokens.
    pub fn arity(&self) -> Option<usize> {
        self.service_fn().map(|service| service.arity())
    }

    /// Declared parameter types of a service reference; `None` for tokens.
    pub fn parameter_types(&self) -> Option<&[ParameterType]> {
        self.service_fn().map(|service| service.parameters())
    }

    /// Type-erased form used in dependency lists.
    pub fn dependency(&self) -> Dependency {
        Dependency::from(self)
    }

    pub(crate) fn service_fn(&self) -> Option<&Arc<ServiceFn<T>>> {
        match &self.kind {
            IdentifierKind::Token => None,
            IdentifierKind::Service(service) => Some(service),
        }
    }
}

impl<S: Injectable> Identifier<S> {
    /// Create a service reference labelled with the type name of `S`.
    pub fn service<Args, C>(constructor: C) -> Self
    where
        C: Constructor<S, Args>,
    {
        Self::service_named(short_type_name::<S>(), constructor)
    }

    /// Create a service reference with an explicit label.
    pub fn service_named<Args, C>(label: impl Into<String>, constructor: C) -> Self
    where
        C: Constructor<S, Args>,
    {
        let service = ServiceFn {
            parameters: C::parameter_types(),
            construct: Box::new(move |args: Arguments| {
                let mut args = args.with_arity(C::ARITY);
                constructor.construct(&mut args).map(Arc::new)
            }),
        };

        Self {
            key: Key::new(),
            label: Some(Arc::from(label.into())),
            kind: IdentifierKind::Service(Arc::new(service)),
        }
    }
}

impl<T: ?Sized> Clone for Identifier<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            label: self.label.clone(),
            kind: match &self.kind {
                IdentifierKind::Token => IdentifierKind::Token,
                IdentifierKind::Service(service) => IdentifierKind::Service(Arc::clone(service)),
            },
        }
    }
}

impl<T: ?Sized> PartialEq for Identifier<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: ?Sized> Eq for Identifier<T> {}

impl<T: ?Sized> Hash for Identifier<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: ?Sized> fmt::Display for Identifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, self.label.as_deref(), self.key)
    }
}

impl<T: ?Sized> fmt::Debug for Identifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IdentifierKind::Token => "Token",
            IdentifierKind::Service(_) => "ServiceRef",
        };
        f.debug_struct("Identifier")
            .field("kind", &kind)
            .field("label", &self.label)
            .field("key", &self.key)
            .finish()
    }
}

/// Type-erased identifier, as listed in a service's dependencies.
#[derive(Clone)]
pub struct Dependency {
    key: Key,
    label: Option<Arc<str>>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Dependency {
    pub fn key(&self) -> Key {
        self.key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the value this identifier resolves to.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl<T: ?Sized + Injectable> From<&Identifier<T>> for Dependency {
    fn from(id: &Identifier<T>) -> Self {
        Self {
            key: id.key,
            label: id.label.clone(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl<T: ?Sized + Injectable> From<Identifier<T>> for Dependency {
    fn from(id: Identifier<T>) -> Self {
        Dependency::from(&id)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Dependency {}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, self.label.as_deref(), self.key)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("label", &self.label)
            .field("key", &self.key)
            .field("type", &self.type_name)
            .finish()
    }
}

fn describe(f: &mut fmt::Formatter<'_>, label: Option<&str>, key: Key) -> fmt::Result {
    match label {
        Some(label) => write!(f, "{}", label),
        None => write!(f, "<anonymous {}>", key),
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    // keep generics intact, strip the module path of the outer type only
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(index) => full[index + 2..].to_string(),
        None => full.to_string(),
    }
}

/// Build a dependency list from identifiers.
///
/// ```ignore
/// registry.register_service(&reporter, deps![logger, url])?;
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        ::std::vec::Vec::<$crate::Dependency>::new()
    };
    ($($id:expr),+ $(,)?) => {
        vec![$($crate::Dependency::from(&$id)),+]
    };
}
