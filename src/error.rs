//! Error types for TierScale
//!
//! Startup and configuration errors are fatal, task errors stay attached to
//! the handle of the task that produced them, and metrics errors are
//! recovered locally by the monitor.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for TierScale operations
#[derive(Error, Debug)]
pub enum TierScaleError {
    /// Malformed or missing configuration / hardware facts
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error while reading a config file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A submitted task returned an error
    #[error("Task '{name}' failed: {message}")]
    TaskFailed { name: String, message: String },

    /// A submitted task panicked
    #[error("Task '{name}' panicked: {message}")]
    TaskPanicked { name: String, message: String },

    /// Task was cancelled through its handle
    #[error("Task '{name}' was cancelled")]
    Cancelled { name: String },

    /// Submission after shutdown
    #[error("Scheduler closed")]
    SchedulerClosed,

    /// Bounded queue is full and the policy rejects new work
    #[error("Task queue full ({capacity} slots), rejected task '{name}'")]
    QueueFull { name: String, capacity: usize },

    /// Worker thread could not be spawned or joined
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Platform metrics API is missing
    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// `start` called twice on the same monitor
    #[error("Performance monitor already started")]
    MonitorAlreadyStarted,
}

impl TierScaleError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a task failure from the error returned by a task body.
    ///
    /// The whole `anyhow` chain is kept in the message.
    pub fn task_failed(name: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::TaskFailed {
            name: name.into(),
            message: format!("{:#}", err),
        }
    }

    /// Is this an error produced by (or on behalf of) a single task?
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            Self::TaskFailed { .. } | Self::TaskPanicked { .. } | Self::Cancelled { .. }
        )
    }

    /// Name of the task this error belongs to, if any
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { name, .. }
            | Self::TaskPanicked { name, .. }
            | Self::Cancelled { name }
            | Self::QueueFull { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Check if the caller can reasonably try again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::MetricsUnavailable(_) | Self::TaskFailed { .. }
        )
    }
}

/// Result type alias for TierScale operations
pub type Result<T> = std::result::Result<T, TierScaleError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| TierScaleError::io(path, e))
    }
}
