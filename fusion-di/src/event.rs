//! Synchronous event bus used for lifecycle notifications. Listeners are keyed by the exact
//! event type they declare - an event is never dispatched to listeners of other types, including
//! its "supertypes".

use crate::bean::DEFAULT_PRIORITY;
use crate::container::Container;
use crate::error::BeanError;
use fxhash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Emitted once the container has started.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Start;

/// Emitted when the container starts closing, before any context is released.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stop;

pub type ListenerPtr = Arc<dyn ListenerDescriptor>;

/// Callback registered for a single event type.
pub trait ListenerDescriptor: Send + Sync {
    /// Exact type of events this listener receives.
    fn event_type(&self) -> TypeId;

    /// Listeners are called in ascending priority order.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn on_event(&self, container: &Container, event: &dyn Any) -> Result<(), BeanError>;
}

type ListenerFn<E> = Arc<dyn Fn(&Container, &E) -> Result<(), BeanError> + Send + Sync>;

/// Closure-backed [ListenerDescriptor] for events of type `E`.
pub struct FnListener<E> {
    priority: i32,
    callback: ListenerFn<E>,
    _event: PhantomData<fn(&E)>,
}

impl<E: Any> FnListener<E> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Container, &E) -> Result<(), BeanError> + Send + Sync + 'static,
    {
        Self {
            priority: DEFAULT_PRIORITY,
            callback: Arc::new(callback),
            _event: PhantomData,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<E: Any> ListenerDescriptor for FnListener<E> {
    fn event_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn on_event(&self, container: &Container, event: &dyn Any) -> Result<(), BeanError> {
        match event.downcast_ref::<E>() {
            Some(event) => (self.callback)(container, event),
            None => Ok(()),
        }
    }
}

/// Listeners grouped by event type, each group kept sorted by priority.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: FxHashMap<TypeId, Vec<ListenerPtr>>,
}

impl ListenerRegistry {
    pub fn register(&mut self, listener: ListenerPtr) {
        let listeners = self.listeners.entry(listener.event_type()).or_default();
        // stable insertion keeps registration order among equal priorities
        let position = listeners.partition_point(|registered| {
            registered.priority() <= listener.priority()
        });
        listeners.insert(position, listener);
    }

    pub fn register_all<I: IntoIterator<Item = ListenerPtr>>(&mut self, listeners: I) {
        for listener in listeners {
            self.register(listener);
        }
    }

    /// Calls every listener of the event's type on the calling thread. The first failing
    /// listener stops the dispatch and its error is returned.
    pub fn emit<E: Any>(&self, container: &Container, event: &E) -> Result<(), BeanError> {
        let Some(listeners) = self.listeners.get(&TypeId::of::<E>()) else {
            return Ok(());
        };

        trace!(
            event = type_name::<E>(),
            listeners = listeners.len(),
            "Emitting event."
        );

        for listener in listeners {
            listener.on_event(container, event)?;
        }

        Ok(())
    }

    pub fn listeners(&self, event_type: TypeId) -> &[ListenerPtr] {
        self.listeners
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
