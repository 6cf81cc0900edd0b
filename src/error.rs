//! Error handling for pixelweave
//!
//! This module defines the crate error type and a Result alias used
//! throughout the controller.

use thiserror::Error;

/// Main error type for pixelweave operations
#[derive(Error, Debug)]
pub enum PixelWeaveError {
    /// The instrument program could not be launched
    #[error("Failed to spawn instrument '{program}': {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Errors related to configuration loading or validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to loading the geometry model
    #[error("Model error: {0}")]
    Model(String),

    /// An output descriptor could not be turned into a working sink
    #[error("Output '{output}' error: {message}")]
    Output { output: String, message: String },

    /// Invalid pixel-to-channel mapping for a network output
    #[error("Invalid channel mapping for universe {universe}: {message}")]
    ChannelMapping { universe: u16, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PixelWeaveError>,
    },
}

impl PixelWeaveError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PixelWeaveError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an output error for the named sink
    pub fn output(output: impl Into<String>, message: impl Into<String>) -> Self {
        PixelWeaveError::Output {
            output: output.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for PixelWeaveError {
    fn from(err: serde_json::Error) -> Self {
        PixelWeaveError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PixelWeaveError {
    fn from(err: toml::de::Error) -> Self {
        PixelWeaveError::Config(err.to_string())
    }
}

/// Result type alias for pixelweave operations
pub type Result<T> = std::result::Result<T, PixelWeaveError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PixelWeaveError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PixelWeaveError::Io(e).with_context(f()))
    }
}
