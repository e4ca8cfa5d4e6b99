use std::any::Any;
use std::io;

use thiserror::Error;

/// Errors that can occur when partitioning, executing or benchmarking a parallel loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller asked for something that cannot be executed, such as zero threads or
    /// a zero chunk size. Detected before any work starts.
    #[error("invalid configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The per-index function panicked on one of the workers.
    #[error("worker {thread_index} failed while executing the loop body: {message}")]
    ExecutionFailure {
        /// Index of the worker that observed the failure.
        thread_index: usize,

        /// The panic message, if the payload carried one.
        message: String,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker {thread_index}")]
    ThreadSpawn {
        /// Index of the worker that could not be started.
        thread_index: usize,

        /// The underlying error reported by the operating system.
        source: io::Error,
    },

    /// A sweep configuration document could not be parsed.
    #[error("invalid sweep configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid(problem: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            problem: problem.into(),
        }
    }

    pub(crate) fn from_panic(thread_index: usize, payload: &(dyn Any + Send)) -> Self {
        Self::ExecutionFailure {
            thread_index,
            message: panic_message(payload),
        }
    }
}

/// A specialized `Result` type for parallel loop operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic payload was not a string".to_string()
    }
}
