//! Log backend for the CLI.
//!
//! Two modes: quiet (results only) and debug (everything); they are mutually
//! exclusive. Successful logins go through [`success`], which prints even in
//! quiet mode. Per-attempt records go through [`verbose`], toggled
//! independently with `-v`.
//!
//! The progress renderer registers a line writer via
//! [`set_progress_printer`] that clears the active status line before each
//! log line, so the two never collide on the terminal.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use chrono::Local;
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);

type ProgressPrinter = Box<dyn Fn(&str) + Send + Sync>;

lazy_static::lazy_static! {
    static ref PRINTER: Mutex<Option<ProgressPrinter>> = Mutex::new(None);
}

struct CliLogger;

static LOGGER: CliLogger = CliLogger;

impl Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            Level::Error => "[!]".red().to_string(),
            Level::Warn => "[!]".yellow().to_string(),
            Level::Info => "[*]".to_string(),
            Level::Debug | Level::Trace => "[DEBUG]".to_string(),
        };
        print_line(&format!("{} {} {}", timestamp(), prefix, record.args()));
    }

    fn flush(&self) {}
}

/// Initializes the global logger. Errors if both quiet and debug are requested.
pub fn init(quiet: bool, debug: bool) -> Result<()> {
    if quiet && debug {
        bail!("cannot enable both quiet and debug modes simultaneously");
    }
    QUIET.store(quiet, Ordering::Relaxed);

    let level = if quiet {
        LevelFilter::Error
    } else if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // Double init only happens in tests; the second call is a no-op.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
    Ok(())
}

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Registers the callback that prints a line with the active progress bar
/// cleared out of the way. Pass `None` to deregister when the renderer
/// stops.
pub fn set_progress_printer(printer: Option<ProgressPrinter>) {
    *PRINTER.lock().unwrap() = printer;
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_line(line: &str) {
    if let Some(print) = PRINTER.lock().unwrap().as_ref() {
        print(line);
        return;
    }
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}

/// Reports a successful login. In quiet mode only the bare message is printed.
pub fn success(msg: &str) {
    if QUIET.load(Ordering::Relaxed) {
        print_line(msg);
    } else {
        print_line(&format!("{} {} {}", timestamp(), "[+]".green(), msg));
    }
}

/// Records a single attempt with its outcome tag. Only printed with `-v`.
pub fn verbose(msg: &str) {
    if !VERBOSE.load(Ordering::Relaxed) {
        return;
    }
    print_line(&format!("{} [VERBOSE] {}", timestamp(), msg));
}
