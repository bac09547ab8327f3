use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Shared pointer to any error raised by bean factories, listeners or runners.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Errors related to creating, looking up and releasing beans.
#[derive(Error, Clone, Debug)]
pub enum BeanError {
    #[error("Bean of type '{0}' resolved to a null instance - no matching bean is registered.")]
    NullInstance(String),
    #[error("Bean '{bean}' cannot be used as '{requested}'.")]
    IncompatibleBean { requested: String, bean: String },
    #[error("Unrecognized scope: {0}")]
    UnrecognizedScope(String),
    #[error("Detected dependency cycle while constructing bean: {0}")]
    DependencyCycle(String),
    #[error("Bean '{0}' is marked as lazy but provides no proxy.")]
    MissingProxy(String),
    #[error("Container is closed.")]
    ContainerClosed,
    #[error("Error creating bean: {0}")]
    Factory(ErrorPtr),
    #[error("Listener error: {0}")]
    Listener(ErrorPtr),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Teardown failed with {} error(s): [{}]", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Teardown(Vec<BeanError>),
}

impl BeanError {
    /// Wraps any error raised by a bean factory.
    pub fn factory<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Factory(Arc::new(error))
    }

    /// Returns individual failures carried by an aggregate [BeanError::Teardown], or the error
    /// itself otherwise.
    pub fn causes(&self) -> Vec<&BeanError> {
        match self {
            Self::Teardown(causes) => causes.iter().collect(),
            other => vec![other],
        }
    }

    /// Turns collected teardown failures into a single result. Nested aggregates are flattened,
    /// so the outermost error always lists every original cause.
    pub fn aggregate(errors: Vec<BeanError>) -> Result<(), BeanError> {
        if errors.is_empty() {
            return Ok(());
        }

        let causes = errors
            .into_iter()
            .flat_map(|error| match error {
                Self::Teardown(causes) => causes,
                other => vec![other],
            })
            .collect();

        Err(Self::Teardown(causes))
    }
}

/// Errors related to reading configuration values.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ConfigurationError {
    #[error("Missing required parameter: {key}")]
    MissingRequiredParameter { key: String },
    #[error("Invalid value '{value}' for parameter {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use crate::error::{BeanError, ConfigurationError};

    #[test]
    fn should_flatten_nested_aggregates() {
        let error = BeanError::aggregate(vec![
            BeanError::ContainerClosed,
            BeanError::Teardown(vec![
                BeanError::NullInstance("a".to_string()),
                BeanError::MissingProxy("b".to_string()),
            ]),
        ])
        .unwrap_err();

        assert_eq!(error.causes().len(), 3);
        assert!(error.to_string().starts_with("Teardown failed with 3 error(s)"));
    }

    #[test]
    fn should_not_aggregate_empty_errors() {
        assert!(BeanError::aggregate(vec![]).is_ok());
    }

    #[test]
    fn should_convert_configuration_error() {
        let error: BeanError = ConfigurationError::MissingRequiredParameter {
            key: "port".to_string(),
        }
        .into();

        assert!(matches!(
            error,
            BeanError::Configuration(ConfigurationError::MissingRequiredParameter { .. })
        ));
    }
}
