//! Run log for bminfra.
//!
//! Every line carries the level and, while a step is executing, the
//! `task#step` it belongs to, so guard decisions and child commands in
//! the log can be traced back to the taskfile:
//!
//! ```text
//! [14:02:11.348] [INFO] [start_minikube#2] 'minikube' already exists, skipping init
//! ```
//!
//! Debug mode can be enabled with `--debug` flag or `BMINFRA_DEBUG=1` env var;
//! `BMINFRA_DEBUG=trace` also records raw enumeration output.
//! Each run truncates the log.

use std::cell::RefCell;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

pub const LOG_FILE: &str = "bminfra.log";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

thread_local! {
    static STEP: RefCell<Option<String>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Start logging to `dir/bminfra.log`, normally `Config::bminfra_dir()`.
pub fn init(dir: &Path, debug: bool) -> std::io::Result<()> {
    let env = std::env::var("BMINFRA_DEBUG").unwrap_or_default();
    let level = if env.eq_ignore_ascii_case("trace") {
        LogLevel::Trace
    } else if debug || env == "1" || env.eq_ignore_ascii_case("true") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    std::fs::write(&path, "")?;
    LOG_PATH.set(path).ok();
    Ok(())
}

/// Path of the active log file, if logging was initialized.
pub fn path() -> Option<&'static Path> {
    LOG_PATH.get().map(|p| p.as_path())
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn is_debug() -> bool {
    level() >= LogLevel::Debug
}

/// Tags log lines with `task#step` until dropped.
#[must_use]
pub struct StepScope {
    previous: Option<String>,
}

pub fn step_scope(task: &str, step: usize) -> StepScope {
    let previous = STEP.with(|s| s.replace(Some(format!("{}#{}", task, step))));
    StepScope { previous }
}

impl Drop for StepScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        STEP.with(|s| *s.borrow_mut() = previous);
    }
}

pub fn current_step() -> Option<String> {
    STEP.with(|s| s.borrow().clone())
}

fn format_line(level: LogLevel, step: Option<&str>, msg: fmt::Arguments<'_>) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    match step {
        Some(step) => format!("[{}] [{}] [{}] {}", timestamp, level.as_str(), step, msg),
        None => format!("[{}] [{}] {}", timestamp, level.as_str(), msg),
    }
}

/// Append one line at `level`. Used through the `blog*` macros.
pub fn write(level: LogLevel, msg: fmt::Arguments<'_>) {
    if level > self::level() {
        return;
    }
    let Some(path) = LOG_PATH.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", format_line(level, current_step().as_deref(), msg));
    }
}

#[macro_export]
macro_rules! blog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! blog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! blog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// Only written in debug mode.
#[macro_export]
macro_rules! blog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

/// Raw command output; only written with `BMINFRA_DEBUG=trace`.
#[macro_export]
macro_rules! blog_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}
