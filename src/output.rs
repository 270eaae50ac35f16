//! User-facing terminal lines. Log records go through `tracing`; these
//! helpers cover the few things a person reads directly or scripts
//! against, colored only when stdout/stderr is a TTY.

use owo_colors::OwoColorize;

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Aligned `label: value` line for the status report.
pub fn print_field(label: &str, value: &str) {
    let tag = format!("{:<10}", format!("{label}:"));
    if is_tty() {
        println!("{} {}", tag.bold(), value);
    } else {
        println!("{tag} {value}");
    }
}

/// Plain user-facing line (no prefix), for primary outputs such as the
/// working directory path, which users may script against.
pub fn print_user(msg: &str) {
    println!("{}", msg);
}
