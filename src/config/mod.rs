//! Configuration loading, environment overrides, and validation.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

use crate::common::error::ConfigError;

pub use types::Config;

/// Load the config file, apply environment overrides, and validate.
pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config = parser::load_config(path)?;
    let config = env::apply_env_overrides(config);
    validate::validate(&config)?;
    Ok(config)
}
