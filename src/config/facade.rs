//! Loading entry points over the merge policy and file sources.

use super::merge::builder_with_defaults;
use super::sources::{global_file, workspace_file};
use super::MetanodeConfig;
use config::{ConfigBuilder, ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, workspace `config/{METANODE_ENV}.toml`,
    /// `METANODE__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<MetanodeConfig, ConfigError> {
        let global = Self::global_config_path();
        Self::load_with_global(workspace_root, global.as_deref())
    }

    /// [`load`](Self::load) with an explicit global file location.
    pub fn load_with_global(
        workspace_root: &Path,
        global_path: Option<&Path>,
    ) -> Result<MetanodeConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder, global_path)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = Self::finish(builder)?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load from a single file over the defaults, with environment overrides.
    pub fn load_from_file(path: &Path) -> Result<MetanodeConfig, ConfigError> {
        let builder = builder_with_defaults()?.add_source(File::from(path.to_path_buf()));
        Self::finish(builder)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn finish(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<MetanodeConfig, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("METANODE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
