use std::fs;
use std::path::{Path, PathBuf};

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigError, ConfigLayer};

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join("pixelroom.toml")
}

pub fn load_user_config() -> Result<Option<ConfigLayer>, ConfigError> {
    load_layer(&config_path())
}

pub fn load_project_config(project_dir: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    load_layer(&project_config_path(project_dir))
}

fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// User config, then `pixelroom.toml` in the working directory, then env.
pub fn load() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().ok();
    load_from(&config_path(), cwd.as_deref())
}

pub fn load_from(user_path: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let user = load_layer(user_path)?;
    let project = match project_dir {
        Some(dir) => load_project_config(dir)?,
        None => None,
    };
    let mut config = merge_layers(user, project);
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Like [`load_from`], but falls back to defaults (plus env) on any failure.
pub fn load_or_default(user_path: &Path, project_dir: Option<&Path>) -> Config {
    match load_from(user_path, project_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            if let Err(e) = cfg.validate() {
                tracing::warn!("env overrides rejected, using plain defaults: {e}");
                cfg = Config::default();
            }
            cfg
        }
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| write_error(dir, e.to_string()))?;
    }
    let contents = toml::to_string_pretty(cfg)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = path
        .parent()
        .ok_or_else(|| write_error(path, "config path missing parent directory".to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| write_error(dir, format!("failed to create temp file: {e}")))?;
    fs::write(temp.path(), data)
        .map_err(|e| write_error(temp.path(), format!("failed to write temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| write_error(path, format!("failed to persist: {e}")))?;
    Ok(())
}

fn write_error(path: &Path, reason: String) -> ConfigError {
    ConfigError::Write {
        path: path.to_path_buf(),
        reason,
    }
}
