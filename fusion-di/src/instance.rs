//! Resolved bean values and the handles used to release them.
//!
//! Contexts produce type-erased [BeanInstance]s. Callers work with the typed [Instance] wrapper,
//! which applies the cast selected during lookup and exposes the value as an `Arc<T>`.

use crate::bean::BeanPtr;
use crate::bean_type::CastFunction;
use crate::error::BeanError;
use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type-erased bean value. The payload is always an `Arc<T>` for the type `T` the value is
/// exposed as, or [NullValue] when no bean matched a lookup.
pub type BeanValue = Arc<dyn Any + Send + Sync>;

/// Erased instance shared between contexts, dependents lists and typed handles.
pub type BeanInstancePtr = Arc<dyn BeanInstance>;

/// Marker payload of a null bean.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NullValue;

/// Wraps a value into its erased form.
#[inline]
pub fn bean_value<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> BeanValue {
    Arc::new(value)
}

#[inline]
pub fn null_value() -> BeanValue {
    Arc::new(NullValue)
}

#[inline]
pub fn is_null(value: &BeanValue) -> bool {
    value.is::<NullValue>()
}

/// A resolved bean together with the means to release it.
pub trait BeanInstance: Send + Sync {
    /// Descriptor of the bean this instance was created from. Synthetic instances have none.
    fn bean(&self) -> Option<BeanPtr>;

    /// Returns the value, constructing it first for deferred instances.
    fn value(&self) -> Result<BeanValue, BeanError>;

    /// Releases this instance. Releasing an already released instance does nothing.
    fn close(&self) -> Result<(), BeanError>;
}

/// Typed handle to a resolved bean.
pub struct Instance<T: ?Sized> {
    inner: BeanInstancePtr,
    cast: Option<CastFunction>,
    _type: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Clone for Instance<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            cast: self.cast,
            _type: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static> Instance<T> {
    pub fn new(inner: BeanInstancePtr, cast: Option<CastFunction>) -> Self {
        Self {
            inner,
            cast,
            _type: PhantomData,
        }
    }

    #[inline]
    pub fn bean(&self) -> Option<BeanPtr> {
        self.inner.bean()
    }

    /// Returns the underlying erased instance, e.g. to record it as a dependent.
    #[inline]
    pub fn erased(&self) -> BeanInstancePtr {
        self.inner.clone()
    }

    /// Returns the value of this instance. Fails with [BeanError::NullInstance] if no bean
    /// matched the original lookup.
    pub fn instance(&self) -> Result<Arc<T>, BeanError> {
        self.optional()?
            .ok_or_else(|| BeanError::NullInstance(type_name::<T>().to_string()))
    }

    /// Like [Instance::instance], but returns `None` for a null bean.
    pub fn optional(&self) -> Result<Option<Arc<T>>, BeanError> {
        let value = self.inner.value()?;
        if is_null(&value) {
            return Ok(None);
        }

        let value = match self.cast {
            Some(cast) => cast(value).map_err(|_| self.incompatible())?,
            None => value,
        };

        value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .map(Some)
            .ok_or_else(|| self.incompatible())
    }

    /// Releases the instance according to its scope rules.
    #[inline]
    pub fn close(&self) -> Result<(), BeanError> {
        self.inner.close()
    }

    fn incompatible(&self) -> BeanError {
        BeanError::IncompatibleBean {
            requested: type_name::<T>().to_string(),
            bean: self
                .inner
                .bean()
                .map(|bean| bean.exposed_type().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Synthetic instance holding a value computed from other instances, which are released
/// together with it.
pub(crate) struct CompositeInstance {
    value: BeanValue,
    instances: Vec<BeanInstancePtr>,
    closed: AtomicBool,
}

impl CompositeInstance {
    pub(crate) fn new(value: BeanValue, instances: Vec<BeanInstancePtr>) -> Self {
        Self {
            value,
            instances,
            closed: AtomicBool::new(false),
        }
    }
}

impl BeanInstance for CompositeInstance {
    fn bean(&self) -> Option<BeanPtr> {
        None
    }

    fn value(&self) -> Result<BeanValue, BeanError> {
        Ok(self.value.clone())
    }

    fn close(&self) -> Result<(), BeanError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        BeanError::aggregate(close_all(&self.instances))
    }
}

/// Closes every instance, collecting failures instead of stopping at the first one.
pub(crate) fn close_all(instances: &[BeanInstancePtr]) -> Vec<BeanError> {
    instances
        .iter()
        .filter_map(|instance| instance.close().err())
        .collect()
}
