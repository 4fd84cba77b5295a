use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

/// Identifier returned when a listener is registered.
pub type ListenerId = u64;

/// Listener ordering: higher priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

/// Whether dispatch continues after a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

pub trait Event: Any + fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

type Listener = Arc<dyn Fn(&dyn Event) -> Propagation + Send + Sync>;

struct Registration {
    id: ListenerId,
    priority: Priority,
    listener: Listener,
}

/// Synchronous, name-keyed event dispatcher shared through the container.
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<HashMap<&'static str, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for events named `event_name`.
    pub fn listen<F>(&self, event_name: &'static str, priority: Priority, listener: F) -> ListenerId
    where
        F: Fn(&dyn Event) -> Propagation + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let registered = listeners.entry(event_name).or_default();
        registered.push(Registration {
            id,
            priority,
            listener: Arc::new(listener),
        });
        // stable: equal priorities keep registration order
        registered.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    /// Registers a listener for a concrete event type, dispatched under `name`.
    pub fn on<E, F>(&self, event_name: &'static str, priority: Priority, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&E) -> Propagation + Send + Sync + 'static,
    {
        self.listen(event_name, priority, move |event| {
            match event.as_any().downcast_ref::<E>() {
                Some(typed) => listener(typed),
                None => Propagation::Continue,
            }
        })
    }

    /// Removes a listener. Returns false when the id is unknown.
    pub fn forget(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut found = false;
        for registered in listeners.values_mut() {
            let before = registered.len();
            registered.retain(|registration| registration.id != id);
            found |= registered.len() < before;
        }
        listeners.retain(|_, registered| !registered.is_empty());
        found
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(event_name)
            .is_some_and(|registered| !registered.is_empty())
    }

    /// Runs the listeners for `event` in priority order until one stops propagation.
    pub fn dispatch(&self, event: &dyn Event) -> Propagation {
        // listeners may register or dispatch further events, so the lock is not held
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(event.name())
            .map(|registered| registered.iter().map(|r| r.listener.clone()).collect())
            .unwrap_or_default();

        tracing::trace!(event = event.name(), listeners = listeners.len(), "dispatching event");
        for listener in listeners {
            if listener(event) == Propagation::Stop {
                return Propagation::Stop;
            }
        }
        Propagation::Continue
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&'static str, usize> = self
            .listeners
            .read()
            .map(|listeners| listeners.iter().map(|(k, v)| (*k, v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("EventManager").field("listeners", &counts).finish()
    }
}
