//! One of the basic blocks of dependency injection is a bean - a unit of injectable application
//! logic, described by a [BeanDescriptor]. Descriptors are usually produced ahead of time by code
//! generation, but can also be written by hand or built from closures with [FnBean].
//!
//! A descriptor creates values through the [Container] it is given, and must push every instance
//! it looks up while doing so into the provided dependents list, in acquisition order. Dependents
//! are released in reverse order when the created instance is released.
//!
//! ```
//! use fusion_di::bean::FnBean;
//! use fusion_di::container::ContainerBuilder;
//! use fusion_di::scope::APPLICATION;
//! use std::sync::Arc;
//!
//! struct Repository;
//!
//! struct Service {
//!     repository: Arc<Repository>,
//! }
//!
//! let container = ContainerBuilder::new()
//!     .register_bean(FnBean::new(|_, _| Ok(Arc::new(Repository))).with_scope(APPLICATION))
//!     .register_bean(FnBean::new(|container, dependents| {
//!         let repository = container.lookup_into::<Repository>(dependents)?.instance()?;
//!         Ok(Arc::new(Service { repository }))
//!     }))
//!     .start()
//!     .unwrap();
//!
//! let service = container.lookup::<Service>().unwrap().instance().unwrap();
//! ```

use crate::bean_type::{BeanType, Supertype};
use crate::container::Container;
use crate::error::BeanError;
use crate::instance::{bean_value, null_value, BeanInstancePtr, BeanValue};
use crate::scope::{ProxyTarget, DEFAULT};
use fxhash::FxHashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Priority used when a descriptor does not declare one.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Metadata key which, set to `"true"`, makes the application scope expose a proxy of the bean
/// before its real value exists.
pub const LAZY: &str = "fusion.lazy";

/// Out-of-band flags consumed by contexts.
pub type BeanMetadata = FxHashMap<String, String>;

pub type BeanPtr = Arc<dyn BeanDescriptor>;

/// Describes a single injectable unit.
pub trait BeanDescriptor: Send + Sync {
    /// Type this bean is requested by.
    fn exposed_type(&self) -> BeanType;

    /// Other types this bean can be requested as.
    fn supertypes(&self) -> Vec<Supertype> {
        vec![]
    }

    /// Marker of the context governing the lifecycle of this bean.
    fn scope(&self) -> &'static str {
        DEFAULT
    }

    /// Orders beans exposing the same type - lower comes first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn metadata(&self) -> BeanMetadata {
        BeanMetadata::default()
    }

    /// Creates a new value. Every instance looked up in the process must be pushed to
    /// `dependents` in the order it was acquired.
    fn create(
        &self,
        container: &Container,
        dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<BeanValue, BeanError>;

    /// Tears down a value created by this descriptor.
    fn destroy(&self, _container: &Container, _value: &BeanValue) -> Result<(), BeanError> {
        Ok(())
    }

    /// Creates a stand-in value forwarding to the real one, which becomes available through
    /// `target`. Required for beans flagged with [LAZY].
    fn proxy(&self, _target: ProxyTarget) -> Option<BeanValue> {
        None
    }
}

/// Checks if given bean asks for a lazy proxy.
pub fn is_lazy(bean: &dyn BeanDescriptor) -> bool {
    bean.metadata()
        .get(LAZY)
        .map(|value| value == "true")
        .unwrap_or(false)
}

/// Descriptor returned when no registered bean matches a lookup. Produces a null value instead of
/// failing the lookup.
#[derive(Clone, Debug)]
pub struct NullBean {
    requested: BeanType,
}

impl NullBean {
    pub fn new(requested: BeanType) -> Self {
        Self { requested }
    }
}

impl BeanDescriptor for NullBean {
    fn exposed_type(&self) -> BeanType {
        self.requested.clone()
    }

    fn create(
        &self,
        _container: &Container,
        _dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<BeanValue, BeanError> {
        Ok(null_value())
    }
}

type CreateFn<T> = Arc<
    dyn Fn(&Container, &mut Vec<BeanInstancePtr>) -> Result<Arc<T>, BeanError> + Send + Sync,
>;

type DestroyFn<T> = Arc<dyn Fn(&Container, Arc<T>) -> Result<(), BeanError> + Send + Sync>;

type ProxyFn<T> = Arc<dyn Fn(ProxyTarget) -> Arc<T> + Send + Sync>;

/// Closure-backed [BeanDescriptor] exposing values of type `T`.
pub struct FnBean<T: ?Sized> {
    exposed_type: BeanType,
    supertypes: Vec<Supertype>,
    scope: &'static str,
    priority: i32,
    metadata: BeanMetadata,
    create: CreateFn<T>,
    destroy: Option<DestroyFn<T>>,
    proxy: Option<ProxyFn<T>>,
    _type: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> FnBean<T> {
    /// Creates a default-scoped bean exposed as `T`.
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&Container, &mut Vec<BeanInstancePtr>) -> Result<Arc<T>, BeanError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            exposed_type: BeanType::of::<T>(),
            supertypes: vec![],
            scope: DEFAULT,
            priority: DEFAULT_PRIORITY,
            metadata: BeanMetadata::default(),
            create: Arc::new(create),
            destroy: None,
            proxy: None,
            _type: PhantomData,
        }
    }

    /// Exposes the bean under a parameterized type instead of plain `T`.
    pub fn with_type(mut self, exposed_type: BeanType) -> Self {
        self.exposed_type = exposed_type;
        self
    }

    pub fn with_scope(mut self, scope: &'static str) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_supertype(mut self, supertype: Supertype) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn with_metadata<K: ToString, V: ToString>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&Container, Arc<T>) -> Result<(), BeanError> + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(destroy));
        self
    }

    /// Marks the bean as [LAZY] and sets the factory of its proxy.
    pub fn with_proxy<F>(mut self, proxy: F) -> Self
    where
        F: Fn(ProxyTarget) -> Arc<T> + Send + Sync + 'static,
    {
        self.proxy = Some(Arc::new(proxy));
        self.with_metadata(LAZY, true)
    }
}

impl<T: ?Sized + Send + Sync + 'static> BeanDescriptor for FnBean<T> {
    fn exposed_type(&self) -> BeanType {
        self.exposed_type.clone()
    }

    fn supertypes(&self) -> Vec<Supertype> {
        self.supertypes.clone()
    }

    fn scope(&self) -> &'static str {
        self.scope
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn metadata(&self) -> BeanMetadata {
        self.metadata.clone()
    }

    fn create(
        &self,
        container: &Container,
        dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<BeanValue, BeanError> {
        (self.create)(container, dependents).map(bean_value)
    }

    fn destroy(&self, container: &Container, value: &BeanValue) -> Result<(), BeanError> {
        match (&self.destroy, value.downcast_ref::<Arc<T>>()) {
            (Some(destroy), Some(value)) => destroy(container, value.clone()),
            _ => Ok(()),
        }
    }

    fn proxy(&self, target: ProxyTarget) -> Option<BeanValue> {
        self.proxy.as_ref().map(|proxy| bean_value(proxy(target)))
    }
}
