//! XDG directory helpers for config/log locations.

use std::cell::RefCell;
use std::path::PathBuf;

/// Base directory for configuration files.
///
/// Uses `PIXELROOM_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/pixelroom`
/// or `~/.config/pixelroom`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = thread_local_config_dir_override() {
        return dir;
    }

    if let Ok(dir) = std::env::var("PIXELROOM_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".config"))
        .join("pixelroom")
}

/// Base directory for persistent data.
///
/// Uses `PIXELROOM_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/pixelroom` or
/// `~/.local/share/pixelroom`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PIXELROOM_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".local").join("share"))
        .join("pixelroom")
}

/// Default directory for rolling log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

#[doc(hidden)]
pub struct ConfigDirOverride {
    prev: Option<PathBuf>,
}

impl ConfigDirOverride {
    pub fn new(path: Option<PathBuf>) -> Self {
        let prev = CONFIG_DIR_OVERRIDE.with(|cell| cell.replace(path));
        Self { prev }
    }
}

impl Drop for ConfigDirOverride {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CONFIG_DIR_OVERRIDE.with(|cell| {
            cell.replace(prev);
        });
    }
}

/// Point [`config_dir`] somewhere else on this thread until the guard drops.
#[doc(hidden)]
pub fn override_config_dir_for_tests(path: Option<PathBuf>) -> ConfigDirOverride {
    ConfigDirOverride::new(path)
}

fn thread_local_config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.with(|cell| cell.borrow().clone())
}

thread_local! {
    static CONFIG_DIR_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}
