use crate::bean::{is_lazy, BeanPtr};
use crate::container::{Container, WeakContainer};
use crate::error::BeanError;
use crate::instance::{close_all, BeanInstance, BeanInstancePtr, BeanValue};
use crate::scope::{Context, DefaultContext, APPLICATION};
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::any::type_name;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

type BeanKey = usize;

#[inline]
fn bean_key(bean: &BeanPtr) -> BeanKey {
    Arc::as_ptr(bean) as *const () as usize
}

#[derive(Default)]
struct ApplicationState {
    instances: DashMap<BeanKey, Arc<ApplicationHolder>>,
    locks: DashMap<BeanKey, Arc<Mutex<()>>>,
    closed: AtomicBool,
}

impl ApplicationState {
    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Context for instances shared for the whole lifetime of a container. Each bean is created
/// lazily, exactly once, even when looked up concurrently or recursively while being created.
///
/// A lookup returns a holder immediately - the value itself is created on first access. A failed
/// creation leaves the holder empty, so the next access through any handle tries again. Beans
/// flagged as [lazy](crate::bean::LAZY) expose a proxy instead, which lets mutually dependent
/// beans use each other during construction.
#[derive(Default)]
pub struct ApplicationContext {
    state: Arc<ApplicationState>,
}

impl ApplicationContext {
    fn holder(
        &self,
        container: &Container,
        bean: &BeanPtr,
    ) -> Result<Arc<ApplicationHolder>, BeanError> {
        if self.state.is_closed() {
            return Err(BeanError::ContainerClosed);
        }

        let key = bean_key(bean);
        if let Some(holder) = self.find(key) {
            return Ok(holder);
        }

        let lock = self.state.locks.entry(key).or_default().clone();
        let _guard = lock.lock();

        if let Some(holder) = self.find(key) {
            return Ok(holder);
        }

        let holder = ApplicationHolder::new(bean.clone(), container, &self.state)?;
        self.state.instances.insert(key, holder.clone());

        trace!(bean = %bean.exposed_type(), "Registered application holder.");
        Ok(holder)
    }

    #[inline]
    fn find(&self, key: BeanKey) -> Option<Arc<ApplicationHolder>> {
        self.state
            .instances
            .get(&key)
            .map(|holder| holder.value().clone())
    }
}

impl Context for ApplicationContext {
    #[inline]
    fn scope(&self) -> &'static str {
        APPLICATION
    }

    fn get_or_create(
        &self,
        container: &Container,
        bean: &BeanPtr,
    ) -> Result<BeanInstancePtr, BeanError> {
        self.holder(container, bean)
            .map(|holder| holder as BeanInstancePtr)
    }

    fn close(&self) -> Result<(), BeanError> {
        // set before releasing, so constructions finishing later release themselves
        self.state.closed.store(true, Ordering::Release);

        let holders: Vec<_> = self
            .state
            .instances
            .iter()
            .map(|holder| holder.value().clone())
            .collect();

        let realized: Vec<_> = holders
            .iter()
            .filter_map(|holder| holder.release())
            .collect();

        debug!(
            holders = holders.len(),
            realized = realized.len(),
            "Closing application context."
        );

        let errors = close_all(&realized);

        self.state.instances.clear();
        self.state.locks.clear();

        BeanError::aggregate(errors)
    }
}

/// Placeholder stored in the context before the real value exists.
struct ApplicationHolder {
    bean: BeanPtr,
    container: WeakContainer,
    state: Weak<ApplicationState>,
    realized: RwLock<Option<BeanInstancePtr>>,
    // re-entrant, so a same-thread recursive access is reported instead of deadlocking
    factory_lock: ReentrantMutex<Cell<bool>>,
    proxy: Option<BeanValue>,
}

impl ApplicationHolder {
    fn new(
        bean: BeanPtr,
        container: &Container,
        state: &Arc<ApplicationState>,
    ) -> Result<Arc<Self>, BeanError> {
        let lazy = is_lazy(bean.as_ref());
        let holder = Arc::new_cyclic(|this: &Weak<ApplicationHolder>| {
            let proxy = if lazy {
                bean.proxy(ProxyTarget {
                    holder: this.clone(),
                })
            } else {
                None
            };

            Self {
                bean: bean.clone(),
                container: container.downgrade(),
                state: Arc::downgrade(state),
                realized: RwLock::new(None),
                factory_lock: ReentrantMutex::new(Cell::new(false)),
                proxy,
            }
        });

        if lazy && holder.proxy.is_none() {
            return Err(BeanError::MissingProxy(bean.exposed_type().to_string()));
        }

        Ok(holder)
    }

    fn is_closed(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| state.is_closed())
            .unwrap_or(true)
    }

    fn realize(&self) -> Result<BeanInstancePtr, BeanError> {
        if let Some(instance) = self.realized.read().as_ref() {
            return Ok(instance.clone());
        }

        let under_construction = self.factory_lock.lock();
        if let Some(instance) = self.realized.read().as_ref() {
            return Ok(instance.clone());
        }

        if self.is_closed() {
            return Err(BeanError::ContainerClosed);
        }

        if under_construction.replace(true) {
            return Err(BeanError::DependencyCycle(
                self.bean.exposed_type().to_string(),
            ));
        }

        let result = match self.container.upgrade() {
            Some(container) => DefaultContext.get_or_create(&container, &self.bean),
            None => Err(BeanError::ContainerClosed),
        };

        under_construction.set(false);

        // failures are not stored, so the next access retries
        let instance = result?;

        let mut realized = self.realized.write();
        if self.is_closed() {
            drop(realized);
            if let Err(error) = instance.close() {
                debug!(%error, "Failed to release bean created while closing.");
            }

            return Err(BeanError::ContainerClosed);
        }

        *realized = Some(instance.clone());
        Ok(instance)
    }

    #[inline]
    fn release(&self) -> Option<BeanInstancePtr> {
        self.realized.write().take()
    }
}

impl BeanInstance for ApplicationHolder {
    fn bean(&self) -> Option<BeanPtr> {
        Some(self.bean.clone())
    }

    fn value(&self) -> Result<BeanValue, BeanError> {
        match &self.proxy {
            Some(proxy) => Ok(proxy.clone()),
            None => self.realize()?.value(),
        }
    }

    // released only when the whole context closes
    fn close(&self) -> Result<(), BeanError> {
        Ok(())
    }
}

/// Handle given to proxy factories, resolving the real value of a lazy bean on demand.
#[derive(Clone)]
pub struct ProxyTarget {
    holder: Weak<ApplicationHolder>,
}

impl ProxyTarget {
    /// Returns the real value, creating it on first use.
    pub fn resolve<T: ?Sized + 'static>(&self) -> Result<Arc<T>, BeanError> {
        let holder = self.holder.upgrade().ok_or(BeanError::ContainerClosed)?;
        let value = holder.realize()?.value()?;

        value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| BeanError::IncompatibleBean {
                requested: type_name::<T>().to_string(),
                bean: holder.bean.exposed_type().to_string(),
            })
    }
}
