//! Workspace config files under `<workspace>/config/`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_VAR: &str = "METANODE_ENV";
const DEFAULT_ENV: &str = "development";

/// Environment selecting the env-specific file, `development` when unset.
pub fn env_name() -> String {
    std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_ENV.to_string())
}

/// Existing workspace files in merge order: `config.toml`, then `{env}.toml`.
pub fn workspace_files(workspace_root: &Path, env: &str) -> Vec<PathBuf> {
    let dir = workspace_root.join("config");
    [dir.join("config.toml"), dir.join(format!("{}.toml", env))]
        .into_iter()
        .filter(|path| path.is_file())
        .collect()
}

/// Layer the workspace files onto `builder`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let env = env_name();
    let files = workspace_files(workspace_root, &env);
    debug!(env = %env, files = files.len(), "Workspace configuration files");
    Ok(files.into_iter().fold(builder, |builder, path| {
        builder.add_source(File::from(path).required(false))
    }))
}
