use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

/// Overrides the whole config file path; also read by `--config`.
pub const ENV_CONFIG_FILE: &str = "DUSTFADE_CONFIG";
/// Overrides the directory the default config file lives in.
pub const ENV_CONFIG_DIR: &str = "DUSTFADE_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "dustfade";
const APPLICATION: &str = "dustfade";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env_override(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir: dir });
        }
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

fn env_override(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
