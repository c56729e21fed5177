//! Configuration for the dispatcher
//!
//! YAML files or programmatic building, with a small set of environment
//! overrides applied on load.

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::ConfigBuilder;
pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests;

use crate::errors::RunlaneError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<RunlaneConfig, RunlaneError> {
    ConfigLoader::from_file(path).await
}

/// Create a new configuration builder
pub fn config() -> ConfigBuilder {
    ConfigBuilder::new()
}
