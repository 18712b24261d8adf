//! Crate-wide error type.
//!
//! Configuration problems are reported by the builder before any simulation
//! starts; everything else aborts the current replicate and surfaces a
//! diagnostic. There are no retries and no partial runs.

use thiserror::Error;

/// Errors produced by configuration validation and the simulation engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (bad migration matrix, inconsistent sample
    /// sizes, unordered event times, empty recombination map, ...).
    /// Always raised before the simulation begins.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A non-finite value turned up mid-simulation, or the event rate
    /// dropped to zero while lineages remain. Indicates pathological
    /// parameters such as a zero-size population with extant lineages.
    #[error("numeric error at time {time}: {message}")]
    Numeric { time: f64, message: String },

    /// The object pool refused an allocation because its configured block
    /// budget is exhausted.
    #[error("out of memory: {message}")]
    OutOfMemory { message: String },

    /// Cooperative cancellation was signalled; in-flight state has been
    /// discarded.
    #[error("simulation cancelled")]
    Cancelled,

    /// An internal invariant was violated. This is a bug, not a user error.
    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn numeric(time: f64, message: impl Into<String>) -> Self {
        Self::Numeric {
            time,
            message: message.into(),
        }
    }

    pub(crate) fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
