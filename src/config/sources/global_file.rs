//! Global config file source: `<user config dir>/metanode/config.toml`
//! (`$XDG_CONFIG_HOME/metanode/config.toml` on Linux).

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path to the global config file, if a home directory can be determined.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "metanode").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the global config file at `path` to the builder if it exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: Option<&Path>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = path else {
        return Ok(builder);
    };
    if !path.exists() {
        debug!(config_path = %path.display(), "No global configuration file");
        return Ok(builder);
    }
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Ok(builder.add_source(File::from(canonical).required(false)))
}
