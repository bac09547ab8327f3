//! Main entrypoint for applications. The [Launcher] reads [LauncherConfig], optionally installs a
//! tracing logger, starts a container with the process arguments registered as beans, runs all
//! [ApplicationRunner]s and finally closes the container.

use crate::args::{Args, ArgsConfigurationSource};
use crate::config::LauncherConfig;
use crate::runner::{ApplicationRunner, ErrorPtr};
use fusion_di::bean::FnBean;
use fusion_di::configuration::ConfigurationSource;
use fusion_di::container::{Container, ContainerBuilder};
use fusion_di::scope::APPLICATION;
use fusion_di::{BeanError, ConfigurationError};
use itertools::Itertools;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Bean priority of the arguments configuration source, placing it before sources registered
/// with the default priority.
pub const ARGS_SOURCE_PRIORITY: i32 = 0;

#[derive(Clone, Error, Debug)]
pub enum LauncherError {
    #[error("Error reading launcher configuration: {0}")]
    Config(ErrorPtr),
    #[error("Error reading arguments: {0}")]
    Args(ErrorPtr),
    #[error("Container error: {0}")]
    Container(#[from] BeanError),
    #[error("Runner error: {0}")]
    Runner(ErrorPtr),
}

impl LauncherError {
    /// Returns the name of a required configuration parameter whose absence caused this error,
    /// so callers can print usage information instead of a generic failure.
    pub fn missing_parameter(&self) -> Option<&str> {
        let configuration_error = match self {
            Self::Container(BeanError::Configuration(error)) => Some(error),
            Self::Container(BeanError::Factory(error)) | Self::Runner(error) => {
                error.downcast_ref::<ConfigurationError>()
            }
            _ => None,
        };

        match configuration_error {
            Some(ConfigurationError::MissingRequiredParameter { key }) => Some(key),
            _ => None,
        }
    }
}

fn convert_error<E: std::error::Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Bootstraps the application from given arguments. See module documentation for details.
pub struct Launcher {
    args: Vec<String>,
    builder: ContainerBuilder,
    config: Option<LauncherConfig>,
}

impl Launcher {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            builder: ContainerBuilder::new(),
            config: None,
        }
    }

    /// Creates a launcher for the arguments of the current process.
    pub fn from_env() -> Self {
        Self::new(Args::from_env().to_vec())
    }

    /// Uses given builder, with any beans already registered, to create the container.
    pub fn with_container_builder(mut self, builder: ContainerBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Uses given config instead of reading it from the environment.
    pub fn with_config(mut self, config: LauncherConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn run(self) -> Result<(), LauncherError> {
        let config = match self.config {
            Some(config) => config,
            None => LauncherConfig::init_from_environment()
                .map_err(|error| LauncherError::Config(convert_error(error)))?,
        };

        if config.install_tracing_logger {
            install_tracing_logger();
        }

        let container = Self::start_container(self.builder, self.args, config)?;
        let result = Self::run_runners(&container);

        match (result, container.close()) {
            (Ok(()), close_result) => close_result.map_err(LauncherError::Container),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(close_error)) => {
                warn!(%close_error, "Error closing container after failed run.");
                Err(error)
            }
        }
    }

    fn start_container(
        builder: ContainerBuilder,
        args: Vec<String>,
        config: LauncherConfig,
    ) -> Result<Container, LauncherError> {
        let source: Arc<dyn ConfigurationSource> = Arc::new(
            ArgsConfigurationSource::new(&args)
                .map_err(|error| LauncherError::Args(convert_error(error)))?,
        );
        let args = Arc::new(Args::new(args));
        let config = Arc::new(config);

        info!("Starting container...");

        builder
            .register_bean(FnBean::new(move |_, _| Ok(args.clone())).with_scope(APPLICATION))
            .register_bean(FnBean::new(move |_, _| Ok(config.clone())).with_scope(APPLICATION))
            .register_bean(
                FnBean::<dyn ConfigurationSource>::new(move |_, _| Ok(source.clone()))
                    .with_scope(APPLICATION)
                    .with_priority(ARGS_SOURCE_PRIORITY),
            )
            .start()
            .map_err(LauncherError::Container)
    }

    fn run_runners(container: &Container) -> Result<(), LauncherError> {
        info!("Searching for application runners...");

        let runners = container.lookups::<dyn ApplicationRunner>()?;
        let ordered = runners
            .instance()?
            .iter()
            .cloned()
            .sorted_by_key(|runner| Reverse(runner.priority()))
            .collect_vec();

        info!(runners = ordered.len(), "Running application runners...");

        let result = ordered
            .iter()
            .try_for_each(|runner| runner.run().map_err(LauncherError::Runner));

        if let Err(error) = runners.close() {
            debug!(%error, "Error releasing application runners.");
        }

        result
    }
}

fn install_tracing_logger() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    if result.is_err() {
        debug!("Tracing logger already installed.");
    }
}
