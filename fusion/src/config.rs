//! [LauncherConfig] controls the [Launcher](crate::launcher::Launcher) itself. Unless one is
//! given through `Launcher::with_config`, it is read from `fusion.json` and `FUSION_*`
//! environment variables before the container starts. `install_tracing_logger` decides whether
//! the launcher installs the fmt subscriber with an `EnvFilter`, and the config ends up in the
//! container as an APPLICATION bean next to the process arguments.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "FUSION";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "fusion.json";

/// Framework configuration used by the [Launcher](crate::launcher::Launcher).
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LauncherConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
        }
    }
}

impl From<OptionalLauncherConfig> for LauncherConfig {
    fn from(value: OptionalLauncherConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
        }
    }
}

impl LauncherConfig {
    pub fn with_tracing_logger(mut self, install: bool) -> Self {
        self.install_tracing_logger = install;
        self
    }

    /// Reads the config from [CONFIG_FILE], if present, and the environment.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalLauncherConfig>())
            .map(|config| config.into())
    }
}

#[derive(Deserialize)]
struct OptionalLauncherConfig {
    install_tracing_logger: Option<bool>,
}
