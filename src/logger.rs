//! Session logger: routes the `log` facade into a file in the OS data directory.
//!
//! The file is **truncated at each launch**, so it only holds the most recent
//! session. `RUST_LOG` picks the filter (default `info`).
//!
//! Log location:
//!   Windows:  `%APPDATA%\cellview\cellview.log`
//!   Linux:    `~/.local/share/cellview/cellview.log`
//!   macOS:    `~/Library/Application Support/cellview/cellview.log`
//!
//! If the file cannot be opened, output goes to stderr instead.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Path of the current session log, once `init` opened it.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the logger and the panic hook. Later calls do nothing.
pub fn init() {
    init_with(log_file_path());
}

/// Like `init`, but logging to `path`.
pub fn init_with(path: PathBuf) {
    if LOG_PATH.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();

    let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path);
    let to_file = match file {
        Ok(f) => {
            builder.target(env_logger::Target::Pipe(Box::new(f)));
            true
        }
        Err(e) => {
            // not fatal, stderr still works
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            builder.target(env_logger::Target::Stderr);
            false
        }
    };
    if builder.try_init().is_err() {
        return;
    }
    if to_file {
        let _ = LOG_PATH.set(path.clone());
        log::info!("=== cellview session started ===");
        log::info!("Log file: {}", path.display());
    }

    // mirror panics into the log, then run the default handler
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC: {}", info);
        log::logger().flush();
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("cellview").join("cellview.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
