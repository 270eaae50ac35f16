//! XML config file loading and template creation.
//!
//! The file is small and flat:
//!
//! ```xml
//! <config>
//!   <location>http://server:8080/bridge/team-data</location>
//!   <location>/mnt/team/data</location>
//!   <userName>Alice</userName>
//!   <userId>alice</userId>
//!   <logLevel>normal</logLevel>
//! </config>
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{default_config_path, Config, LogLevel};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "config")]
struct ConfigXml {
    #[serde(rename = "location", default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<String>,
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    user_name: Option<String>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(rename = "defaultServer", default, skip_serializing_if = "Option::is_none")]
    default_server: Option<String>,
    #[serde(rename = "cacheBase", default, skip_serializing_if = "Option::is_none")]
    cache_base: Option<String>,
    #[serde(rename = "logLevel", default, skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(rename = "logFile", default, skip_serializing_if = "Option::is_none")]
    log_file: Option<String>,
}

/// Outcome of the startup config check.
pub enum LoadResult {
    Loaded(Config),
    /// No config existed; a commented template was written for the user to
    /// fill in.
    CreatedTemplate(PathBuf),
    /// Nothing found and nothing creatable; run on defaults.
    Defaults(Config),
}

/// Load the config file, or create a template at the default location when
/// none exists yet.
pub fn load_config_from_xml() -> io::Result<LoadResult> {
    let path = match default_config_path() {
        Ok(p) => p,
        Err(_) => return Ok(LoadResult::Defaults(Config::default())),
    };
    if !path.exists() {
        if std::env::var(super::CONFIG_ENV_VAR).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            ));
        }
        create_template_config(&path)?;
        return Ok(LoadResult::CreatedTemplate(path));
    }

    let text = fs::read_to_string(&path)?;
    let parsed: ConfigXml = quick_xml::de::from_str(&text)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    debug!(path = %path.display(), "loaded config");

    let mut cfg = Config::default();
    cfg.locations = parsed.locations;
    if let Some(v) = parsed.user_name {
        cfg.user_name = v;
    }
    if let Some(v) = parsed.user_id {
        cfg.user_id = v;
    }
    if let Some(v) = parsed.default_server {
        cfg.default_server = Some(v);
    }
    if let Some(v) = parsed.cache_base {
        cfg.cache_base = Some(PathBuf::from(v));
    }
    if let Some(v) = parsed.log_level.as_deref().and_then(LogLevel::parse) {
        cfg.log_level = v;
    }
    if let Some(v) = parsed.log_file {
        cfg.log_file = Some(PathBuf::from(v));
    }
    Ok(LoadResult::Loaded(cfg))
}

/// Write a starting-point config the user can edit.
pub fn create_template_config(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let template = "\
<!-- dirbridge configuration.
     List candidate locations in preference order; server URLs and
     filesystem paths may be mixed. -->
<config>
  <location>http://server:8080/bridge/team-data</location>
  <location>/mnt/team/data</location>
  <userName>Your Name</userName>
  <userId>yourid</userId>
  <logLevel>normal</logLevel>
</config>
";
    fs::write(path, template)
}
