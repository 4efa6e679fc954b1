//! Logging collaborator for the settings loader.
//!
//! The loader never makes decisions based on the sink's behavior; the logger
//! here is a thin severity-filtered forwarder onto `tracing`. It never fails
//! and never blocks.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing_subscriber::EnvFilter;

/// Log severity, lowest to highest.
///
/// `Fatal` is forwarded to `tracing::error!` with a `fatal` marker field;
/// the process decides for itself whether to die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

fn severity_from_u8(val: u8) -> Severity {
    match val {
        0 => Severity::Debug,
        1 => Severity::Info,
        2 => Severity::Warn,
        3 => Severity::Error,
        _ => Severity::Fatal,
    }
}

/// Atomic minimum-severity filter, adjustable at runtime.
pub struct SeverityFilter(AtomicU8);

impl SeverityFilter {
    /// Create a new filter with the given minimum severity.
    pub fn new(min: Severity) -> Self {
        Self(AtomicU8::new(min as u8))
    }

    /// Get the current minimum severity.
    pub fn get(&self) -> Severity {
        severity_from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Set the minimum severity.
    pub fn set(&self, min: Severity) {
        self.0.store(min as u8, Ordering::Relaxed);
    }

    /// Check whether a message at the given severity passes the filter.
    pub fn should_log(&self, severity: Severity) -> bool {
        severity as u8 >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for SeverityFilter {
    fn default() -> Self {
        Self::new(Severity::Debug)
    }
}

impl std::fmt::Debug for SeverityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SeverityFilter").field(&self.get()).finish()
    }
}

/// Severity-filtered logger forwarding to `tracing`.
#[derive(Clone, Debug)]
pub struct Logger {
    filter: Arc<SeverityFilter>,
    name: Option<String>,
}

impl Logger {
    /// Create a new logger with default settings.
    pub fn new() -> Self {
        Self {
            filter: Arc::new(SeverityFilter::default()),
            name: None,
        }
    }

    /// Set the severity filter.
    pub fn with_filter(mut self, filter: Arc<SeverityFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Set the logger name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Log a message at the given severity.
    pub fn log(&self, severity: Severity, message: &str) {
        if !self.filter.should_log(severity) {
            return;
        }
        let name = self.name.as_deref().unwrap_or("settings");
        match severity {
            Severity::Debug => tracing::debug!(logger = %name, "{}", message),
            Severity::Info => tracing::info!(logger = %name, "{}", message),
            Severity::Warn => tracing::warn!(logger = %name, "{}", message),
            Severity::Error => tracing::error!(logger = %name, "{}", message),
            Severity::Fatal => tracing::error!(logger = %name, fatal = true, "{}", message),
        }
    }

    /// Log a debug message.
    pub fn debug(&self, msg: &str) {
        self.log(Severity::Debug, msg);
    }

    /// Log an info message.
    pub fn info(&self, msg: &str) {
        self.log(Severity::Info, msg);
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        self.log(Severity::Warn, msg);
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        self.log(Severity::Error, msg);
    }

    /// Log a fatal message.
    pub fn fatal(&self, msg: &str) {
        self.log(Severity::Fatal, msg);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a process-wide `tracing` subscriber writing to stderr.
///
/// Filtering honors `RUST_LOG`; falls back to `info`. Safe to call more than
/// once, later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
