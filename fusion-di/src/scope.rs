//! Bean instances are managed by [Context]s - one per scope marker - which decide when to create,
//! reuse and release an instance. There are two built-in ones: [DefaultContext] creating a fresh
//! instance on each lookup, and [ApplicationContext] keeping a single instance per bean for the
//! lifetime of the container. Other, specialized contexts can be registered on the
//! [ContainerBuilder](crate::container::ContainerBuilder).
//!
//! Note: a bean's scope is read once, when the bean is registered. Mixing scopes has the usual
//! consequences, e.g. a [DEFAULT] bean injected into an [APPLICATION] one lives as long as the
//! application bean does.

mod application;

pub use application::{ApplicationContext, ProxyTarget};

use crate::bean::BeanPtr;
use crate::container::{Container, WeakContainer};
use crate::error::BeanError;
use crate::instance::{close_all, BeanInstance, BeanInstancePtr, BeanValue};
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Marker of the [DefaultContext].
pub const DEFAULT: &str = "DEFAULT";

/// Marker of the [ApplicationContext].
pub const APPLICATION: &str = "APPLICATION";

pub type ContextPtr = Arc<dyn Context>;

/// Realizes the lifecycle rules of a single scope.
pub trait Context: Send + Sync {
    /// Marker of the scope handled by this context.
    fn scope(&self) -> &'static str;

    /// Returns an instance of the given bean, creating it if needed.
    fn get_or_create(
        &self,
        container: &Container,
        bean: &BeanPtr,
    ) -> Result<BeanInstancePtr, BeanError>;

    /// Releases everything held by this context.
    fn close(&self) -> Result<(), BeanError> {
        Ok(())
    }
}

/// Context creating a new instance on each request. Stateful beans usually belong here.
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct DefaultContext;

impl Context for DefaultContext {
    #[inline]
    fn scope(&self) -> &'static str {
        DEFAULT
    }

    fn get_or_create(
        &self,
        container: &Container,
        bean: &BeanPtr,
    ) -> Result<BeanInstancePtr, BeanError> {
        let mut dependents = vec![];
        let value = match bean.create(container, &mut dependents) {
            Ok(value) => value,
            Err(error) => {
                dependents.reverse();
                let errors = close_all(&dependents);
                if !errors.is_empty() {
                    debug!(
                        bean = %bean.exposed_type(),
                        failures = errors.len(),
                        "Failed to release dependents of a bean which could not be created."
                    );
                }

                return Err(error);
            }
        };

        // last acquired gets released first
        dependents.reverse();

        Ok(Arc::new(DefaultInstance {
            bean: bean.clone(),
            value,
            dependents,
            container: container.downgrade(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Instance owning its value and the dependents acquired while creating it.
struct DefaultInstance {
    bean: BeanPtr,
    value: BeanValue,
    dependents: Vec<BeanInstancePtr>,
    container: WeakContainer,
    closed: AtomicBool,
}

impl BeanInstance for DefaultInstance {
    fn bean(&self) -> Option<BeanPtr> {
        Some(self.bean.clone())
    }

    fn value(&self) -> Result<BeanValue, BeanError> {
        Ok(self.value.clone())
    }

    fn close(&self) -> Result<(), BeanError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors = vec![];

        match self.container.upgrade() {
            Some(container) => {
                if let Err(error) = self.bean.destroy(&container, &self.value) {
                    errors.push(error);
                }
            }
            None => errors.push(BeanError::ContainerClosed),
        }

        errors.extend(close_all(&self.dependents));
        BeanError::aggregate(errors)
    }
}

/// Contexts known to a container, keyed by scope marker. Registering a context for an already
/// known marker replaces the previous one.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    contexts: Vec<ContextPtr>,
    by_scope: FxHashMap<&'static str, usize>,
}

impl ContextRegistry {
    pub fn register(&mut self, context: ContextPtr) {
        let scope = context.scope();
        match self.by_scope.get(scope) {
            Some(index) => {
                debug!(scope, "Replacing context.");
                self.contexts[*index] = context;
            }
            None => {
                self.by_scope.insert(scope, self.contexts.len());
                self.contexts.push(context);
            }
        }
    }

    #[inline]
    pub fn get(&self, scope: &str) -> Option<&ContextPtr> {
        self.by_scope
            .get(scope)
            .and_then(|index| self.contexts.get(*index))
    }

    /// Iterates contexts in registration order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ContextPtr> {
        self.contexts.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
