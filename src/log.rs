//! # Per-instance log levels and the logging shim.
//!
//! Every instance carries a [`LevelCell`] (an atomic level shared with the
//! orchestrator) so that level changes propagate to live instances without
//! locking. Diagnostics are forwarded to [`tracing`] only when the
//! instance's effective level enables them.
//!
//! ## Rules
//! - The orchestrator owns level **policy** (global default, per-class
//!   overrides); instances own only the cell it writes into.
//! - Level checks are cheap (`Relaxed` atomic load) and never allocate on
//!   the disabled path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity of an instance's diagnostics.
///
/// Ordered from silent to most verbose; a message is emitted when its level
/// is less than or equal to the instance's effective level.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// No diagnostics at all.
    Off = 0,
    /// Hard failures only.
    Error = 1,
    /// Misuse, leaks, and timeouts (the default).
    Warn = 2,
    /// Lifecycle transitions.
    Info = 3,
    /// Bookkeeping detail (bindings, timers).
    Debug = 4,
    /// Everything.
    Trace = 5,
}

impl LogLevel {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl Default for LogLevel {
    /// [`LogLevel::Warn`]: misuse and diagnostics visible, bookkeeping quiet.
    fn default() -> Self {
        LogLevel::Warn
    }
}

/// Shared mutable level slot, written by the orchestrator and read by the
/// owning instance on every log call.
pub(crate) type LevelCell = Arc<AtomicU8>;

pub(crate) fn new_cell(level: LogLevel) -> LevelCell {
    Arc::new(AtomicU8::new(level as u8))
}

pub(crate) fn cell_level(cell: &LevelCell) -> LogLevel {
    LogLevel::from_u8(cell.load(Ordering::Relaxed))
}

pub(crate) fn set_cell(cell: &LevelCell, level: LogLevel) {
    cell.store(level as u8, Ordering::Relaxed);
}

/// Identity + level context threaded through an instance's subcomponents
/// (destroy machine, timers, proxies) so their diagnostics carry the
/// owning instance's class and short id.
#[derive(Clone)]
pub(crate) struct LogContext {
    pub class: Arc<str>,
    pub id: Arc<str>,
    level: LevelCell,
}

impl LogContext {
    pub fn new(class: Arc<str>, id: Arc<str>, level: LevelCell) -> Self {
        Self { class, id, level }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= cell_level(&self.level)
    }

    pub fn error(&self, msg: &str) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(class = %self.class, instance = %self.id, "{msg}");
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(class = %self.class, instance = %self.id, "{msg}");
        }
    }

    pub fn info(&self, msg: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(class = %self.class, instance = %self.id, "{msg}");
        }
    }

    pub fn debug(&self, msg: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(class = %self.class, instance = %self.id, "{msg}");
        }
    }
}
