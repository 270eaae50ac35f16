//! CLI definition and parsing.
//! Global flags override config values (which are loaded from XML if
//! present); subcommands pick the operation.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use dirbridge::config::{Config, LogLevel};

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Keep a working directory in sync with its authoritative copy"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Candidate target location (repeatable; URL or path). Overrides the
    /// config file's location list.
    #[arg(long, short = 'l', value_name = "LOCATION", global = true)]
    pub location: Vec<String>,

    /// Override the cache directory used for bridged targets.
    #[arg(long, value_hint = ValueHint::DirPath, global = true)]
    pub cache_base: Option<PathBuf>,

    /// Name sent with lock requests (defaults to the config, then $USER).
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Enable debug logging (shorthand for --log-level debug).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level: quiet, normal, info, debug.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Print where the config file is looked for, then exit.
    #[arg(long, global = true)]
    pub print_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull the target's content into the working directory.
    SyncDown,
    /// Lock the target, push local changes, release.
    SyncUp,
    /// Show the chosen location, lifecycle state and file count.
    Status,
    /// Snapshot the collection (server-side where possible).
    Backup {
        /// Label recorded in the backup name.
        #[arg(default_value = "manual")]
        qualifier: String,
    },
    /// Probe candidate server URLs and report versions and round-trip
    /// times.
    Probe,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug, then --log-level, then the config default.
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in place). No-ops for unset
    /// flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if !self.location.is_empty() {
            cfg.locations = self.location.clone();
        }
        if let Some(base) = &self.cache_base {
            cfg.cache_base = Some(base.clone());
        }
        if let Some(user) = &self.user {
            cfg.user_name = user.clone();
            cfg.user_id = user.clone();
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_beats_log_level() {
        let args = Args::parse_from(["dirbridge", "--debug", "--log-level", "quiet", "status"]);
        assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
    }

    #[test]
    fn locations_override_config() {
        let args = Args::parse_from([
            "dirbridge",
            "-l",
            "http://a/x",
            "-l",
            "/mnt/b",
            "sync-down",
        ]);
        let mut cfg = Config::default();
        cfg.locations = vec!["http://old/x".into()];
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.locations, ["http://a/x", "/mnt/b"]);
    }

    #[test]
    fn backup_has_a_default_qualifier() {
        let args = Args::parse_from(["dirbridge", "backup"]);
        match args.command {
            Command::Backup { qualifier } => assert_eq!(qualifier, "manual"),
            _ => panic!("expected backup"),
        }
    }
}
