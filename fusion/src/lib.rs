//! Application launcher based on [fusion_di] dependency injection.
//!
//! Traditional applications start in the `main()` function and explicitly initialize and pass
//! around their services. With dependency injection in place, services form a bean graph managed
//! by a container, which in turn requires an entrypoint creating the container and running the
//! actual business logic. This crate provides such entrypoint in the form of
//! [Launcher](launcher::Launcher), which also exposes process arguments as configuration and
//! configures supporting infrastructure, e.g. logging.
//!
//! ```no_run
//! use fusion::launcher::Launcher;
//!
//! if let Err(error) = Launcher::from_env().run() {
//!     match error.missing_parameter() {
//!         Some(key) => eprintln!("Usage: missing required parameter --{key} <value>"),
//!         None => eprintln!("{error}"),
//!     }
//! }
//! ```

pub mod args;
pub mod config;
pub mod launcher;
pub mod runner;
