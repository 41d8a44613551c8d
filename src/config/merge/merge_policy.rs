//! Merge rules: the built-in `MetanodeConfig::default()` is the lowest layer
//! and every later source overrides it key by key.

use crate::config::MetanodeConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the serialized default configuration, so the merged
/// result never depends on a second copy of the default values.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&MetanodeConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
