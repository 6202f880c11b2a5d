//! Error types and exit codes for vecbench
//!
//! Exit codes:
//! - 0: Success
//! - 1: Generic failure (backend, level or sweep failure)
//! - 2: Usage error (bad flags/args, invalid configuration)
//! - 3: Data error (missing or malformed dataset/config file)

mod macros;

use std::time::Duration;

use thiserror::Error;

/// Exit codes for the vecbench binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success (0)
    Success = 0,
    /// Generic failure (1)
    Failure = 1,
    /// Usage error - bad flags/args (2)
    Usage = 2,
    /// Data error - unreadable dataset or config (3)
    Data = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

/// A single search call failed.
///
/// The harness never retries; retries belong to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("session error: {0}")]
    Session(String),
}

/// Failures of the start barrier protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    #[error("only {registered} of {expected} workers registered within {waited:?}")]
    Timeout {
        expected: usize,
        registered: usize,
        waited: Duration,
    },

    #[error("worker {worker_id} withdrew before start: {reason}")]
    Withdrawn { worker_id: usize, reason: String },

    #[error("start barrier aborted by coordinator")]
    Aborted,
}

/// Why a single worker stopped without a result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),
}

/// Failure of one concurrency level. Never affects results of earlier levels.
#[derive(Error, Debug)]
pub enum LevelError {
    #[error("barrier timeout at concurrency {concurrency}: {source}")]
    BarrierTimeout {
        concurrency: usize,
        #[source]
        source: BarrierError,
    },

    #[error("worker {worker_id} failed at concurrency {concurrency}: {source}")]
    WorkerFailed {
        concurrency: usize,
        worker_id: usize,
        #[source]
        source: WorkerError,
    },

    #[error("worker {worker_id} panicked at concurrency {concurrency}")]
    WorkerPanicked { concurrency: usize, worker_id: usize },

    #[error("{missing} worker(s) did not finish within {limit:?} at concurrency {concurrency}")]
    WorkerTimeout {
        concurrency: usize,
        missing: usize,
        limit: Duration,
    },

    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("concurrency {concurrency} interrupted")]
    Interrupted { concurrency: usize },

    #[error("run window of {limit:?} at concurrency {concurrency} is out of clock range")]
    WindowOverflow { concurrency: usize, limit: Duration },
}

/// Errors that can occur during vecbench operations
#[derive(Error, Debug)]
pub enum BenchError {
    // Usage errors (exit code 2)
    #[error("{0}")]
    UsageError(String),

    #[error("invalid {context}: {value}")]
    InvalidValue { context: String, value: String },

    // Data errors (exit code 3)
    #[error("{context} not found: {value}")]
    NotFound { context: String, value: String },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic failures (exit code 1)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("test dataset already released")]
    DatasetReleased,

    #[error("sweep aborted at concurrency {concurrency} before any level succeeded: {source}")]
    SweepAborted {
        concurrency: usize,
        #[source]
        source: LevelError,
    },

    #[error("sweep interrupted before any level succeeded")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl BenchError {
    /// Create an error for an invalid value or configuration
    pub fn invalid_value(context: &str, value: impl std::fmt::Display) -> Self {
        BenchError::InvalidValue {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an error for a missing file or entity
    pub fn not_found(context: &str, value: impl std::fmt::Display) -> Self {
        BenchError::NotFound {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            BenchError::UsageError(_) | BenchError::InvalidValue { .. } => ExitCode::Usage,

            BenchError::NotFound { .. } | BenchError::Toml(_) | BenchError::Json(_) => {
                ExitCode::Data
            }

            BenchError::Io(_)
            | BenchError::DatasetReleased
            | BenchError::SweepAborted { .. }
            | BenchError::Interrupted
            | BenchError::Other(_) => ExitCode::Failure,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            BenchError::UsageError(_) => "usage_error",
            BenchError::InvalidValue { .. } => "invalid_value",
            BenchError::NotFound { .. } => "not_found",
            BenchError::Toml(_) => "toml_error",
            BenchError::Json(_) => "json_error",
            BenchError::Io(_) => "io_error",
            BenchError::DatasetReleased => "dataset_released",
            BenchError::SweepAborted { .. } => "sweep_aborted",
            BenchError::Interrupted => "interrupted",
            BenchError::Other(_) => "other",
        }
    }

    /// Convert error to JSON representation for structured error output.
    pub fn to_json(&self) -> serde_json::Value {
        let mut error_obj = serde_json::json!({
            "code": self.exit_code() as i32,
            "type": self.error_type(),
            "message": self.to_string(),
        });

        if let BenchError::SweepAborted {
            concurrency,
            source,
        } = self
        {
            error_obj["concurrency"] = serde_json::json!(concurrency);
            error_obj["cause"] = serde_json::json!(source.to_string());
        }

        serde_json::json!({ "error": error_obj })
    }
}

/// Result type alias for vecbench operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            BenchError::invalid_value("k", 0).exit_code(),
            ExitCode::Usage
        );
        assert_eq!(
            BenchError::not_found("dataset file", "q.json").exit_code(),
            ExitCode::Data
        );
        assert_eq!(BenchError::DatasetReleased.exit_code(), ExitCode::Failure);
    }

    #[test]
    fn test_sweep_aborted_json_carries_cause() {
        let err = BenchError::SweepAborted {
            concurrency: 5,
            source: LevelError::WorkerFailed {
                concurrency: 5,
                worker_id: 2,
                source: WorkerError::Search(SearchError::Transport("reset".into())),
            },
        };

        let json = err.to_json();
        assert_eq!(json["error"]["type"], "sweep_aborted");
        assert_eq!(json["error"]["code"], 1);
        assert_eq!(json["error"]["concurrency"], 5);
        assert!(json["error"]["cause"]
            .as_str()
            .unwrap()
            .contains("transport error: reset"));
    }

    #[test]
    fn test_worker_timeout_message() {
        let err = LevelError::WorkerTimeout {
            concurrency: 10,
            missing: 1,
            limit: Duration::from_secs(3),
        };
        let message = err.to_string();
        assert!(message.contains("1 worker(s)"));
        assert!(message.contains("concurrency 10"));
    }
}
