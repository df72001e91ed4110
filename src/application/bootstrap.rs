use crate::infrastructure::config::{ensure_default_configs, load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DATABASE_FILE: &str = "goaltracker.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: AppConfig,
}

/// Creates the workspace layout, default config and schema. Safe to run on every start.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    initialize_database(&database_path)?;
    debug!(workspace = %workspace_root.display(), "workspace ready");

    Ok(BootstrapResult {
        config_dir,
        database_path,
        config,
    })
}
