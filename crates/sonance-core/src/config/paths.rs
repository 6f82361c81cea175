//! Default locations for sonance files

use std::path::PathBuf;

/// `~/.config/sonance` (platform config dir), or `./sonance` without one
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonance")
}

/// Path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// Directory searched for the accelerator module when none is configured
pub fn default_module_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonance")
        .join("modules")
}
