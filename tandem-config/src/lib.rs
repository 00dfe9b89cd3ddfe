//! Configuration for Tandem
//!
//! Options reach the supervisor as loosely-typed maps (defaults from the
//! entry point, overrides from the caller). They are merged here, checked
//! against a deny-list, then parsed into [`SupervisorOptions`].

pub mod error;
pub mod loader;
pub mod options;
pub mod utils;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use options::{default_worker_executable, merge_options, OptionsMap, SupervisorOptions};
pub use validation::Validatable;
