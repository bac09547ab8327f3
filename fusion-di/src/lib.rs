//! Runtime core of a dependency injection framework for beans described ahead of time.
//!
//! Beans are registered as [BeanDescriptor](bean::BeanDescriptor)s, either explicitly on a
//! [ContainerBuilder](container::ContainerBuilder) or by auto-discovered
//! [modules](module::FusionModule). The started [Container](container::Container) resolves
//! lookups by type and priority, and routes instantiation to the [Context](scope::Context) of
//! the bean's scope:
//!
//! * [DEFAULT](scope::DEFAULT) - a new instance for every lookup
//! * [APPLICATION](scope::APPLICATION) - a single, lazily created instance per container
//!
//! Lifecycle notifications are delivered by a synchronous [event] bus, and beans can read
//! layered settings through the [Configuration](configuration::Configuration) bean.

pub mod bean;
pub mod bean_registry;
pub mod bean_type;
pub mod configuration;
pub mod container;
mod error;
pub mod event;
pub mod instance;
pub mod module;
pub mod scope;

pub use error::{BeanError, ConfigurationError, ErrorPtr};
