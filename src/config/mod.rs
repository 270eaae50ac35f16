//! Configuration: types, default paths and XML loading.
//! CLI flags always override values loaded from the config file.

pub mod paths;
pub mod types;
pub mod xml;

pub use paths::{default_config_path, default_log_path};
pub use types::{Config, LogLevel};
pub use xml::{create_template_config, load_config_from_xml, LoadResult};

/// Environment variable naming an explicit config file location.
pub const CONFIG_ENV_VAR: &str = "DIRBRIDGE_CONFIG";
