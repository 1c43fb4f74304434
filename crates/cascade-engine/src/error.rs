//! Error types for the Run Engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup, the run itself, and report
//! emission.

/// Top-level error for the Run Engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cascade_core::config::ConfigError,
    },

    /// The world could not be built from the configuration.
    #[error("world build error: {source}")]
    Build {
        /// The underlying configuration error.
        #[from]
        source: cascade_core::config::ConfigurationError,
    },

    /// The run loop failed.
    #[error("run error: {source}")]
    Run {
        /// The underlying world error.
        #[from]
        source: cascade_core::world::WorldError,
    },

    /// Report serialization failed.
    #[error("report serialization error: {source}")]
    Report {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Report file output failed.
    #[error("report write error: {message}")]
    Io {
        /// Description of the write failure.
        message: String,
    },
}
