//! Configuration is a read-through chain of [ConfigurationSource]s - the first source answering a
//! key wins. Sources are regular beans exposed as `dyn ConfigurationSource`, ordered by their
//! bean priority, followed by two built-in fallbacks: [EnvironmentSource] and then
//! [SystemPropertiesSource].
//!
//! The resulting [Configuration] is itself an application-scoped bean, installed when the
//! container starts (unless one is registered explicitly):
//!
//! ```
//! use fusion_di::configuration::{Configuration, ConfigurationSource};
//! use fusion_di::bean::FnBean;
//! use fusion_di::container::ContainerBuilder;
//! use std::sync::Arc;
//!
//! struct StaticSource;
//!
//! impl ConfigurationSource for StaticSource {
//!     fn get(&self, key: &str) -> Option<String> {
//!         (key == "app.name").then(|| "demo".to_string())
//!     }
//! }
//!
//! let container = ContainerBuilder::new()
//!     .register_bean(FnBean::<dyn ConfigurationSource>::new(|_, _| {
//!         Ok(Arc::new(StaticSource) as Arc<dyn ConfigurationSource>)
//!     }))
//!     .start()
//!     .unwrap();
//!
//! let configuration = container.lookup::<Configuration>().unwrap().instance().unwrap();
//! assert_eq!(configuration.get("app.name").as_deref(), Some("demo"));
//! ```

use crate::bean::{BeanDescriptor, DEFAULT_PRIORITY};
use crate::bean_type::BeanType;
use crate::container::Container;
use crate::error::{BeanError, ConfigurationError};
use crate::instance::{bean_value, BeanInstancePtr, BeanValue};
use crate::scope::APPLICATION;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// Source of raw configuration values.
#[cfg_attr(test, automock)]
pub trait ConfigurationSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

pub type ConfigurationSourcePtr = Arc<dyn ConfigurationSource>;

/// Ordered chain of sources. Immutable once created.
#[derive(Clone)]
pub struct Configuration {
    sources: Vec<ConfigurationSourcePtr>,
}

impl Configuration {
    pub fn new(sources: Vec<ConfigurationSourcePtr>) -> Self {
        Self { sources }
    }

    /// Returns the value from the first source knowing the key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    pub fn get_or<T: ToString>(&self, key: &str, default: T) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Returns a value which must be present.
    pub fn required(&self, key: &str) -> Result<String, ConfigurationError> {
        self.get(key)
            .ok_or_else(|| ConfigurationError::MissingRequiredParameter {
                key: key.to_string(),
            })
    }

    /// Returns a value converted with [FromStr], if present.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|error: T::Err| ConfigurationError::InvalidValue {
                        key: key.to_string(),
                        reason: error.to_string(),
                        value,
                    })
            })
            .transpose()
    }

    #[inline]
    pub fn sources(&self) -> &[ConfigurationSourcePtr] {
        &self.sources
    }
}

/// Reads process environment variables. A key is tried verbatim first, then upper-cased with
/// every non-alphanumeric character replaced by `_`, so `app.http-port` also matches
/// `APP_HTTP_PORT`.
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct EnvironmentSource;

impl EnvironmentSource {
    fn normalize(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl ConfigurationSource for EnvironmentSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().or_else(|| {
            let normalized = Self::normalize(key);
            if normalized == key {
                None
            } else {
                env::var(normalized).ok()
            }
        })
    }
}

static SYSTEM_PROPERTIES: Lazy<RwLock<FxHashMap<String, String>>> = Lazy::new(Default::default);

/// Sets a process-wide property, visible through [SystemPropertiesSource].
pub fn set_system_property<K: ToString, V: ToString>(key: K, value: V) {
    SYSTEM_PROPERTIES
        .write()
        .insert(key.to_string(), value.to_string());
}

pub fn system_property(key: &str) -> Option<String> {
    SYSTEM_PROPERTIES.read().get(key).cloned()
}

pub fn clear_system_property(key: &str) -> Option<String> {
    SYSTEM_PROPERTIES.write().remove(key)
}

/// Reads process-wide properties set with [set_system_property].
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct SystemPropertiesSource;

impl ConfigurationSource for SystemPropertiesSource {
    #[inline]
    fn get(&self, key: &str) -> Option<String> {
        system_property(key)
    }
}

/// Built-in descriptor of the [Configuration] bean.
#[derive(Default, Copy, Clone, Debug)]
pub(crate) struct ConfigurationBean;

impl BeanDescriptor for ConfigurationBean {
    fn exposed_type(&self) -> BeanType {
        BeanType::of::<Configuration>()
    }

    fn scope(&self) -> &'static str {
        APPLICATION
    }

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn create(
        &self,
        container: &Container,
        dependents: &mut Vec<BeanInstancePtr>,
    ) -> Result<BeanValue, BeanError> {
        let sources = container
            .lookups_into::<dyn ConfigurationSource>(dependents)?
            .instance()?;

        let sources = sources
            .iter()
            .cloned()
            .chain([
                Arc::new(EnvironmentSource) as ConfigurationSourcePtr,
                Arc::new(SystemPropertiesSource) as ConfigurationSourcePtr,
            ])
            .collect();

        Ok(bean_value(Arc::new(Configuration::new(sources))))
    }
}
