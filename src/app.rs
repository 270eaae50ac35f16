//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler,
//! and drives the requested operation on a working directory.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use dirbridge::collection::{DefaultStrategy, FileCollection, ResourceCollection};
use dirbridge::config::{self, load_config_from_xml, LoadResult};
use dirbridge::errors::LockError;
use dirbridge::output as out;
use dirbridge::select::{DirectoryContext, ServerSelector, MIN_SERVER_VERSION};
use dirbridge::shutdown;
use dirbridge::workdir::WorkingDirectory;

use crate::cli::{Args, Command};
use crate::logging::init_tracing;

pub fn run(args: Args) -> Result<()> {
    if args.print_config {
        print_config_location();
        return Ok(());
    }

    let mut cfg = match load_config_from_xml().context("loading configuration")? {
        LoadResult::Loaded(cfg) => cfg,
        LoadResult::Defaults(cfg) => cfg,
        LoadResult::CreatedTemplate(path) => {
            out::print_success(&format!(
                "A template dirbridge config was written to: {}",
                path.display()
            ));
            out::print_info(
                "Edit it to list your target locations, then re-run this command. \
                 To use a different file set DIRBRIDGE_CONFIG.",
            );
            return Ok(());
        }
    };
    args.apply_overrides(&mut cfg);

    let _log_guard = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json)?;
    shutdown::install_signal_handler()
        .context("installing signal handler")?;

    if cfg.locations.is_empty() {
        bail!("no target locations given; pass --location or edit the config file");
    }

    let mut ctx = DirectoryContext::new(&cfg.user_name, &cfg.user_id);
    if let Some(base) = &cfg.cache_base {
        ctx = ctx.with_cache_base(base);
    }
    if let Some(server) = &cfg.default_server {
        ctx = ctx.with_default_server(server);
    }
    let ctx = Arc::new(ctx);

    match &args.command {
        Command::SyncDown => sync_down(&ctx, &cfg.locations),
        Command::SyncUp => sync_up(&ctx, &cfg.locations, &cfg.user_name),
        Command::Status => status(&ctx, &cfg.locations),
        Command::Backup { qualifier } => backup(&ctx, &cfg.locations, qualifier),
        Command::Probe => probe(&cfg.locations),
    }
}

fn print_config_location() {
    if let Ok(explicit) = std::env::var(config::CONFIG_ENV_VAR) {
        out::print_info(&format!("Using DIRBRIDGE_CONFIG (explicit):\n  {explicit}"));
        return;
    }
    match config::default_config_path() {
        Ok(path) => {
            out::print_info(&format!("Default dirbridge config path:\n  {}", path.display()));
            if path.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet; one will be created on first run.");
            }
        }
        Err(e) => out::print_error(&format!("Could not determine a config path: {e}")),
    }
}

fn sync_down(ctx: &Arc<DirectoryContext>, locations: &[String]) -> Result<()> {
    let wd = ctx.working_directory(locations)?;
    info!(target = %wd.target(), "syncing down");
    wd.prepare().context("preparing working directory")?;
    out::print_success(&format!(
        "working directory is up to date with {}",
        wd.target()
    ));
    out::print_user(&wd.directory().display().to_string());
    wd.dispose()?;
    Ok(())
}

fn sync_up(ctx: &Arc<DirectoryContext>, locations: &[String], owner: &str) -> Result<()> {
    let wd = ctx.working_directory(locations)?;
    wd.prepare().context("preparing working directory")?;

    match wd.acquire_write_lock(owner) {
        Ok(()) => {}
        Err(LockError::AlreadyLocked { owner }) => {
            let holder = owner.unwrap_or_else(|| "another process".into());
            bail!("the target is locked by {holder}");
        }
        Err(LockError::SentMessage { response }) => {
            bail!("the lock holder replied: {response}");
        }
        Err(e) => return Err(e).context("acquiring the write lock"),
    }

    let result = wd.flush_data().context("pushing local changes");
    wd.release_write_lock();
    let changed = result?;
    if changed {
        out::print_success("local changes pushed");
    } else {
        out::print_info("nothing to push; target already matches");
    }
    wd.dispose()?;
    Ok(())
}

fn status(ctx: &Arc<DirectoryContext>, locations: &[String]) -> Result<()> {
    let wd = ctx.working_directory(locations)?;
    out::print_field("target", &wd.target());
    out::print_field("directory", &wd.directory().display().to_string());
    out::print_field("state", &format!("{:?}", wd.state()));

    let files = FileCollection::new(wd.directory(), Arc::new(DefaultStrategy::new()));
    match files.validate() {
        Ok(()) => out::print_field("files", &files.list_resource_names().len().to_string()),
        Err(_) => out::print_field("files", "(directory not yet created)"),
    }
    Ok(())
}

fn backup(ctx: &Arc<DirectoryContext>, locations: &[String], qualifier: &str) -> Result<()> {
    let wd = ctx.working_directory(locations)?;
    wd.prepare().context("preparing working directory")?;
    wd.backup(qualifier).context("writing backup")?;
    out::print_success(&format!("backup complete ({qualifier})"));
    wd.dispose()?;
    Ok(())
}

fn probe(locations: &[String]) -> Result<()> {
    let urls: Vec<&String> = locations
        .iter()
        .filter(|l| ServerSelector::is_url_format(l))
        .collect();
    if urls.is_empty() {
        bail!("no server URLs among the configured locations");
    }

    let selector = ServerSelector::new(MIN_SERVER_VERSION);
    let mut any = false;
    for url in urls {
        match selector.probe(url) {
            Some(p) => {
                any = true;
                out::print_user(&format!(
                    "{}  version {}  {} ms",
                    p.url,
                    p.version,
                    p.rtt.as_millis()
                ));
            }
            None => out::print_warn(&format!("{url}  no answer")),
        }
    }
    if !any {
        bail!("no candidate server responded");
    }
    Ok(())
}
