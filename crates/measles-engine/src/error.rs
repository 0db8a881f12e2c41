//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup and the run itself.

/// Top-level error for the engine binary.
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
        source: measles_core::ConfigError,
    },

    /// Building or running the model failed.
    #[error("model error: {source}")]
    Model {
        /// The underlying model error.
        #[from]
        source: measles_core::ModelError,
    },

    /// The run report could not be serialised.
    #[error("report error: {source}")]
    Report {
        /// The underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
}
