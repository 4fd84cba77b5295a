use std::{
    any::{Any, TypeId, type_name},
    cell::RefCell,
    collections::HashMap,
    fmt,
    sync::Arc,
};

use once_cell::sync::OnceCell;
use thiserror::Error;

/// Boxed error returned by binding factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Factory<T> = Arc<dyn Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no binding registered for {name}")]
    NotBound { name: &'static str },

    #[error("binding for {name} holds an unexpected type")]
    TypeMismatch { name: &'static str },

    #[error("circular dependency detected while resolving {name}")]
    CircularDependency { name: &'static str },

    #[error("failed to build {name}: {source}")]
    Build {
        name: &'static str,
        source: BoxError,
    },
}

/// How a binding produces its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// A new instance on every resolution.
    Transient,
    /// Built by its factory on first resolution, then shared.
    Singleton,
    /// Registered already built.
    Instance,
}

enum Binding<T: ?Sized> {
    Transient(Factory<T>),
    Singleton {
        factory: Factory<T>,
        instance: OnceCell<Arc<T>>,
    },
    Instance(Arc<T>),
}

struct Entry {
    name: &'static str,
    lifetime: Lifetime,
    binding: Box<dyn Any + Send + Sync>,
}

/// Dependency-injection registry.
///
/// Each binding is keyed by the `TypeId` of the type it is resolved as, which is
/// usually a trait object (`dyn DbInterface`) or a concrete service type. The
/// registry is filled during bootstrap through `&mut self` and is read-only once
/// shared behind an `Arc`.
///
/// ``` rust
/// use std::sync::Arc;
/// use handlr::core::container::Container;
///
/// #[derive(Debug)]
/// struct Clock(u64);
///
/// let mut container = Container::new();
/// container.singleton::<Clock, _>(|_| Ok(Arc::new(Clock(42))));
/// assert_eq!(container.get::<Clock>().unwrap().0, 42);
/// ```
#[derive(Default)]
pub struct Container {
    entries: HashMap<TypeId, Entry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `T` to a factory invoked on every resolution.
    pub fn bind<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.insert(Lifetime::Transient, Binding::Transient(Arc::new(factory)))
    }

    /// Binds `T` to a factory invoked once, on first resolution.
    pub fn singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.insert(
            Lifetime::Singleton,
            Binding::Singleton {
                factory: Arc::new(factory),
                instance: OnceCell::new(),
            },
        )
    }

    /// Registers an already built instance of `T`.
    pub fn instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(Lifetime::Instance, Binding::Instance(instance))
    }

    fn insert<T>(&mut self, lifetime: Lifetime, binding: Binding<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = type_name::<T>();
        let previous = self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                name,
                lifetime,
                binding: Box::new(binding),
            },
        );
        if previous.is_some() {
            tracing::debug!(binding = name, "replaced existing container binding");
        }
        self
    }

    /// Resolves `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = type_name::<T>();
        let entry = self
            .entries
            .get(&TypeId::of::<T>())
            .ok_or(ContainerError::NotBound { name })?;
        let binding = entry
            .binding
            .downcast_ref::<Binding<T>>()
            .ok_or(ContainerError::TypeMismatch { name })?;

        match binding {
            Binding::Instance(instance) => Ok(instance.clone()),
            Binding::Transient(factory) => self.build::<T>(name, factory),
            Binding::Singleton { factory, instance } => {
                if let Some(built) = instance.get() {
                    return Ok(built.clone());
                }
                // the guard must be taken before the cell, re-entering a cell deadlocks
                let _guard = ResolutionGuard::enter(TypeId::of::<T>(), name)?;
                instance
                    .get_or_try_init(|| Self::run_factory(self, name, factory))
                    .cloned()
            }
        }
    }

    pub fn has<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Lists registered bindings as `(type name, lifetime)`, sorted by name.
    pub fn bindings(&self) -> Vec<(&'static str, Lifetime)> {
        let mut bindings: Vec<_> = self
            .entries
            .values()
            .map(|entry| (entry.name, entry.lifetime))
            .collect();
        bindings.sort_by_key(|(name, _)| *name);
        bindings
    }

    fn build<T>(&self, name: &'static str, factory: &Factory<T>) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let _guard = ResolutionGuard::enter(TypeId::of::<T>(), name)?;
        Self::run_factory(self, name, factory)
    }

    fn run_factory<T>(
        &self,
        name: &'static str,
        factory: &Factory<T>,
    ) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        factory(self).map_err(|source| match source.downcast::<ContainerError>() {
            Ok(inner) if matches!(*inner, ContainerError::CircularDependency { .. }) => *inner,
            Ok(inner) => ContainerError::Build {
                name,
                source: inner,
            },
            Err(source) => ContainerError::Build { name, source },
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.bindings())
            .finish()
    }
}

thread_local! {
    static RESOLVING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as being resolved on the current thread until dropped.
struct ResolutionGuard(TypeId);

impl ResolutionGuard {
    fn enter(type_id: TypeId, name: &'static str) -> Result<Self, ContainerError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&type_id) {
                return Err(ContainerError::CircularDependency { name });
            }
            stack.push(type_id);
            Ok(Self(type_id))
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(position);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: std::fmt::Debug + Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[derive(Debug)]
    struct Counter(usize);

    #[test]
    fn test_bind_resolves_interface_to_implementation() {
        let mut container = Container::new();
        container.bind::<dyn Greeter, _>(|_| Ok(Arc::new(English)));

        let greeter = container.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn test_bind_builds_a_new_instance_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut container = Container::new();
        container.bind::<Counter, _>(move |_| {
            Ok(Arc::new(Counter(seen.fetch_add(1, Ordering::SeqCst))))
        });

        let first = container.get::<Counter>().unwrap();
        let second = container.get::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_is_built_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut container = Container::new();
        container.singleton::<Counter, _>(move |_| {
            Ok(Arc::new(Counter(seen.fetch_add(1, Ordering::SeqCst))))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let first = container.get::<Counter>().unwrap();
        let second = container.get::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instance_returns_registered_value() {
        let counter = Arc::new(Counter(7));
        let mut container = Container::new();
        container.instance(counter.clone());

        assert!(Arc::ptr_eq(&container.get::<Counter>().unwrap(), &counter));
    }

    #[test]
    fn test_factories_resolve_their_dependencies() {
        let mut container = Container::new();
        container.instance(Arc::new(Counter(3)));
        container.bind::<String, _>(|c| {
            let counter = c.get::<Counter>()?;
            Ok(Arc::new(format!("count={}", counter.0)))
        });

        assert_eq!(container.get::<String>().unwrap().as_str(), "count=3");
    }

    #[test]
    fn test_missing_binding() {
        let container = Container::new();
        let err = container.get::<dyn Greeter>().unwrap_err();
        assert!(matches!(err, ContainerError::NotBound { .. }));
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn test_factory_errors_are_wrapped() {
        let mut container = Container::new();
        container.bind::<Counter, _>(|_| Err("database offline".into()));

        let err = container.get::<Counter>().unwrap_err();
        match err {
            ContainerError::Build { name, source } => {
                assert!(name.ends_with("Counter"));
                assert_eq!(source.to_string(), "database offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_circular_singletons_are_detected() {
        let mut container = Container::new();
        container.singleton::<Counter, _>(|c| {
            let text = c.get::<String>()?;
            Ok(Arc::new(Counter(text.len())))
        });
        container.singleton::<String, _>(|c| {
            let counter = c.get::<Counter>()?;
            Ok(Arc::new(counter.0.to_string()))
        });

        let err = container.get::<Counter>().unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { .. }));

        // a failed resolution leaves nothing behind on the stack
        container.instance(Arc::new(English));
        assert!(container.get::<English>().is_ok());
    }

    #[test]
    fn test_bindings_lists_registrations() {
        let mut container = Container::new();
        container
            .bind::<dyn Greeter, _>(|_| Ok(Arc::new(English)))
            .instance(Arc::new(Counter(1)));

        assert!(container.has::<dyn Greeter>());
        assert!(!container.has::<String>());
        let lifetimes: Vec<Lifetime> = container.bindings().into_iter().map(|(_, l)| l).collect();
        assert_eq!(lifetimes.len(), 2);
        assert!(lifetimes.contains(&Lifetime::Transient));
        assert!(lifetimes.contains(&Lifetime::Instance));
    }
}
