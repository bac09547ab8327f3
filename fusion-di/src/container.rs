//! The [Container] ties together the bean registry, contexts, listeners and configuration. It is
//! created by a [ContainerBuilder], which collects registrations, merges auto-discovered
//! [modules](crate::module) and emits a [Start] event. Closing the container emits [Stop] and
//! releases every context.
//!
//! The container is a cheap handle - clones share the same state - and is safe to use from
//! multiple threads once started.

use crate::bean::{BeanDescriptor, BeanPtr};
use crate::bean_registry::{BeanRegistry, Candidate};
use crate::bean_type::BeanType;
use crate::configuration::{Configuration, ConfigurationBean};
use crate::error::BeanError;
use crate::event::{ListenerDescriptor, ListenerPtr, ListenerRegistry, Start, Stop};
use crate::instance::{bean_value, close_all, BeanInstancePtr, CompositeInstance, Instance};
use crate::module::{InventoryModuleLoader, ModuleLoaderPtr};
use crate::scope::{ApplicationContext, Context, ContextPtr, ContextRegistry, DefaultContext};
use derivative::Derivative;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Options used when starting a container.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ContainerConfiguration {
    /// Skip merging beans, listeners and contexts provided by discovered modules.
    pub disable_auto_discovery: bool,

    /// Source of discoverable modules.
    #[derivative(Debug = "ignore")]
    pub loader: ModuleLoaderPtr,
}

impl Default for ContainerConfiguration {
    fn default() -> Self {
        Self {
            disable_auto_discovery: false,
            loader: Arc::new(InventoryModuleLoader),
        }
    }
}

impl ContainerConfiguration {
    pub fn with_auto_discovery(mut self, enabled: bool) -> Self {
        self.disable_auto_discovery = !enabled;
        self
    }

    pub fn with_loader(mut self, loader: ModuleLoaderPtr) -> Self {
        self.loader = loader;
        self
    }
}

/// Builder for [Container] with sensible defaults - both built-in contexts are always present.
#[derive(Default)]
pub struct ContainerBuilder {
    configuration: ContainerConfiguration,
    beans: Vec<BeanPtr>,
    listeners: Vec<ListenerPtr>,
    contexts: Vec<ContextPtr>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(mut self, configuration: ContainerConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn register_bean<B: BeanDescriptor + 'static>(mut self, bean: B) -> Self {
        self.beans.push(Arc::new(bean));
        self
    }

    pub fn register_beans<I: IntoIterator<Item = BeanPtr>>(mut self, beans: I) -> Self {
        self.beans.extend(beans);
        self
    }

    pub fn register_listener<L: ListenerDescriptor + 'static>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn register_listeners<I: IntoIterator<Item = ListenerPtr>>(mut self, listeners: I) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Adds a context, replacing any other registered for the same scope.
    pub fn register_context<C: Context + 'static>(mut self, context: C) -> Self {
        self.contexts.push(Arc::new(context));
        self
    }

    pub fn register_contexts<I: IntoIterator<Item = ContextPtr>>(mut self, contexts: I) -> Self {
        self.contexts.extend(contexts);
        self
    }

    /// Merges discovered modules, installs built-in beans and emits [Start].
    pub fn start(self) -> Result<Container, BeanError> {
        let Self {
            configuration,
            mut beans,
            mut listeners,
            contexts: custom_contexts,
        } = self;

        let mut contexts = ContextRegistry::default();
        contexts.register(Arc::new(DefaultContext));
        contexts.register(Arc::new(ApplicationContext::default()));
        for context in custom_contexts {
            contexts.register(context);
        }

        if configuration.disable_auto_discovery {
            debug!("Auto-discovery disabled.");
        } else {
            for module in configuration.loader.modules() {
                beans.extend(module.beans());
                listeners.extend(module.listeners());
                for context in module.contexts() {
                    contexts.register(context);
                }
            }
        }

        let mut bean_registry = BeanRegistry::default();
        bean_registry.register_all(beans);

        if !bean_registry.contains(&BeanType::of::<Configuration>()) {
            bean_registry.register(Arc::new(ConfigurationBean));
        }

        let mut listener_registry = ListenerRegistry::default();
        listener_registry.register_all(listeners);

        debug!(
            beans = bean_registry.len(),
            listeners = listener_registry.len(),
            contexts = contexts.len(),
            "Starting container."
        );

        let container = Container {
            inner: Arc::new(ContainerInner {
                beans: bean_registry,
                contexts,
                listeners: listener_registry,
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        };

        if let Err(error) = container.emit(&Start) {
            if let Err(close_error) = container.close_contexts() {
                debug!(%close_error, "Failed to release contexts after failed start.");
            }

            container.inner.closed.store(true, Ordering::Release);
            return Err(error);
        }

        Ok(container)
    }
}

struct ContainerInner {
    beans: BeanRegistry,
    contexts: ContextRegistry,
    listeners: ListenerRegistry,
    closing: AtomicBool,
    closed: AtomicBool,
}

/// Running container. See module documentation for details.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Looks up the best bean exposed as `T`. A missing bean is not an error - the returned
    /// instance holds a null value instead.
    pub fn lookup<T: ?Sized + 'static>(&self) -> Result<Instance<T>, BeanError> {
        self.lookup_type(&BeanType::of::<T>())
    }

    /// Looks up a bean by an explicit, possibly parameterized, type. Resolved values are viewed as
    /// `T`.
    pub fn lookup_type<T: ?Sized + 'static>(
        &self,
        bean_type: &BeanType,
    ) -> Result<Instance<T>, BeanError> {
        self.ensure_open()?;

        let candidate = self.inner.beans.lookup(bean_type);
        trace!(requested = %bean_type, bean = %candidate.bean.exposed_type(), "Looking up bean.");

        self.instantiate(&candidate)
            .map(|instance| Instance::new(instance, candidate.cast))
    }

    /// Like [Container::lookup], but returns `None` when no bean matches.
    pub fn lookup_optional<T: ?Sized + 'static>(&self) -> Result<Option<Instance<T>>, BeanError> {
        self.ensure_open()?;

        self.inner
            .beans
            .lookups(&BeanType::of::<T>())
            .into_iter()
            .next()
            .map(|candidate| {
                self.instantiate(&candidate)
                    .map(|instance| Instance::new(instance, candidate.cast))
            })
            .transpose()
    }

    /// Looks up all beans exposed as `T`, ordered by priority.
    pub fn lookups<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Instance<Vec<Arc<T>>>, BeanError> {
        self.lookups_with::<T, _, _>(|values| values)
    }

    /// Looks up all beans exposed as `T`, ordered by priority, and post-processes their values.
    /// Closing the result releases every looked up instance.
    pub fn lookups_with<T, R, F>(&self, post_processor: F) -> Result<Instance<R>, BeanError>
    where
        T: ?Sized + 'static,
        R: Send + Sync + 'static,
        F: FnOnce(Vec<Arc<T>>) -> R,
    {
        self.lookups_type_with(&BeanType::of::<T>(), post_processor)
    }

    pub fn lookups_type_with<T, R, F>(
        &self,
        bean_type: &BeanType,
        post_processor: F,
    ) -> Result<Instance<R>, BeanError>
    where
        T: ?Sized + 'static,
        R: Send + Sync + 'static,
        F: FnOnce(Vec<Arc<T>>) -> R,
    {
        self.ensure_open()?;

        let mut instances: Vec<BeanInstancePtr> = vec![];
        let mut values = vec![];

        for candidate in self.inner.beans.lookups(bean_type) {
            let value = self.instantiate(&candidate).and_then(|instance| {
                instances.push(instance.clone());
                Instance::<T>::new(instance, candidate.cast).instance()
            });

            match value {
                Ok(value) => values.push(value),
                Err(error) => {
                    instances.reverse();
                    let failures = close_all(&instances);
                    if !failures.is_empty() {
                        debug!(
                            failures = failures.len(),
                            "Failed to release partially looked up beans."
                        );
                    }

                    return Err(error);
                }
            }
        }

        instances.reverse();
        let value = bean_value(Arc::new(post_processor(values)));
        Ok(Instance::new(
            Arc::new(CompositeInstance::new(value, instances)),
            None,
        ))
    }

    /// Looks up a bean and records it as a dependent of a bean under construction.
    pub fn lookup_into<T: ?Sized + 'static>(
        &self,
        dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<Instance<T>, BeanError> {
        let instance = self.lookup::<T>()?;
        dependents.push(instance.erased());
        Ok(instance)
    }

    /// Looks up all beans of a type and records the result as a dependent of a bean under
    /// construction.
    pub fn lookups_into<T: ?Sized + Send + Sync + 'static>(
        &self,
        dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<Instance<Vec<Arc<T>>>, BeanError> {
        let instance = self.lookups::<T>()?;
        dependents.push(instance.erased());
        Ok(instance)
    }

    /// Dispatches an event to all listeners registered for its exact type.
    pub fn emit<E: Any>(&self, event: &E) -> Result<(), BeanError> {
        self.inner.listeners.emit(self, event)
    }

    /// Emits [Stop] and releases every context. All contexts are closed even when some fail;
    /// failures are reported together afterwards. Closing an already closed container does
    /// nothing.
    pub fn close(&self) -> Result<(), BeanError> {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!("Closing container.");

        let mut errors = vec![];
        if let Err(error) = self.emit(&Stop) {
            errors.push(error);
        }

        if let Err(error) = self.close_contexts() {
            errors.push(error);
        }

        self.inner.closed.store(true, Ordering::Release);
        BeanError::aggregate(errors)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Shortcut for looking up the [Configuration] bean.
    pub fn configuration(&self) -> Result<Arc<Configuration>, BeanError> {
        self.lookup::<Configuration>()?.instance()
    }

    /// Creates a reference which doesn't keep the container alive.
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn close_contexts(&self) -> Result<(), BeanError> {
        let errors = self
            .inner
            .contexts
            .iter()
            .filter_map(|context| {
                context.close().err().map(|error| {
                    debug!(scope = context.scope(), %error, "Failed to close context.");
                    error
                })
            })
            .collect();

        BeanError::aggregate(errors)
    }

    fn instantiate(&self, candidate: &Candidate) -> Result<BeanInstancePtr, BeanError> {
        let context = self
            .inner
            .contexts
            .get(candidate.scope)
            .ok_or_else(|| BeanError::UnrecognizedScope(candidate.scope.to_string()))?;

        context.get_or_create(self, &candidate.bean)
    }

    #[inline]
    fn ensure_open(&self) -> Result<(), BeanError> {
        if self.is_closed() {
            Err(BeanError::ContainerClosed)
        } else {
            Ok(())
        }
    }
}

/// Non-owning reference to a [Container], held by instances and contexts.
#[derive(Clone, Default)]
pub struct WeakContainer {
    inner: Weak<ContainerInner>,
}

impl WeakContainer {
    pub fn upgrade(&self) -> Option<Container> {
        self.inner.upgrade().map(|inner| Container { inner })
    }
}
