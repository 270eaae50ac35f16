//! Default filesystem locations for config and logs.

use std::io;
use std::path::PathBuf;

/// `<platform config dir>/dirbridge/config.xml`, unless
/// `DIRBRIDGE_CONFIG` points somewhere explicit.
pub fn default_config_path() -> io::Result<PathBuf> {
    if let Ok(explicit) = std::env::var(super::CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(explicit));
    }
    dirs::config_dir()
        .map(|d| d.join("dirbridge").join("config.xml"))
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no platform config directory")
        })
}

/// `<platform cache dir>/dirbridge/dirbridge.log`.
pub fn default_log_path() -> io::Result<PathBuf> {
    dirs::cache_dir()
        .map(|d| d.join("dirbridge").join("dirbridge.log"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no platform cache directory"))
}
