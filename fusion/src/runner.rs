//! Runners executing actual application logic.

pub use fusion_di::ErrorPtr;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

pub type ApplicationRunnerPtr = Arc<dyn ApplicationRunner>;

/// Runs application logic. Runners are registered as beans exposing `dyn ApplicationRunner` and
/// are run by the [Launcher](crate::launcher::Launcher) one after another.
#[cfg_attr(test, automock)]
pub trait ApplicationRunner: Send + Sync {
    /// Runs any application code.
    fn run(&self) -> Result<(), ErrorPtr>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}
