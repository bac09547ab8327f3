//! Auto-discovery of beans, listeners and contexts defined by other crates. Instead of scanning,
//! each crate registers a [FusionModule] at link time with [fusion_module!](crate::fusion_module),
//! and the container merges all of them on start, unless disabled in
//! [ContainerConfiguration](crate::container::ContainerConfiguration).
//!
//! ```
//! use fusion_di::bean::{BeanPtr, FnBean};
//! use fusion_di::fusion_module;
//! use fusion_di::module::FusionModule;
//! use std::sync::Arc;
//!
//! struct Clock;
//!
//! struct ClockModule;
//!
//! impl FusionModule for ClockModule {
//!     fn beans(&self) -> Vec<BeanPtr> {
//!         vec![Arc::new(FnBean::new(|_, _| Ok(Arc::new(Clock))))]
//!     }
//! }
//!
//! fusion_module!(ClockModule);
//! ```

use crate::bean::BeanPtr;
use crate::event::ListenerPtr;
use crate::scope::ContextPtr;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

pub type ModulePtr = Box<dyn FusionModule>;

pub type ModuleLoaderPtr = Arc<dyn ModuleLoader>;

/// Provider of beans, listeners and contexts contributed by a single crate.
pub trait FusionModule: Send + Sync {
    fn beans(&self) -> Vec<BeanPtr> {
        vec![]
    }

    fn listeners(&self) -> Vec<ListenerPtr> {
        vec![]
    }

    fn contexts(&self) -> Vec<ContextPtr> {
        vec![]
    }
}

/// Source of discoverable modules.
#[cfg_attr(test, automock)]
pub trait ModuleLoader: Send + Sync {
    fn modules(&self) -> Vec<ModulePtr>;
}

/// Loads modules registered with [fusion_module!](crate::fusion_module).
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct InventoryModuleLoader;

impl ModuleLoader for InventoryModuleLoader {
    fn modules(&self) -> Vec<ModulePtr> {
        inventory::iter::<internal::ModuleRegisterer>
            .into_iter()
            .map(|registerer| (registerer.register)())
            .collect()
    }
}

/// Registers a [FusionModule] for auto-discovery.
#[macro_export]
macro_rules! fusion_module {
    ($module:expr) => {
        const _: () = {
            fn register() -> $crate::module::ModulePtr {
                Box::new($module)
            }

            $crate::module::internal::submit! {
                $crate::module::internal::ModuleRegisterer {
                    register
                }
            };
        };
    };
}

#[doc(hidden)]
pub mod internal {
    use crate::module::ModulePtr;
    use inventory::collect;
    pub use inventory::submit;

    pub struct ModuleRegisterer {
        pub register: fn() -> ModulePtr,
    }

    collect!(ModuleRegisterer);
}
