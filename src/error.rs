//! Error handling for lumass-core
//!
//! This module defines the crate-level error type and a Result alias used by
//! the outer layers (configuration, serialisation, plugin loading). Model
//! execution errors live in `model::error` and are wrapped here.

use crate::model::ModelError;
use thiserror::Error;

/// Main error type for lumass-core operations
#[derive(Error, Debug)]
pub enum LumassError {
    /// Errors raised while building or executing a model
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to reading or writing model documents
    #[error("Serialisation error: {0}")]
    Serialisation(String),

    /// Errors related to loading process plugins
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LumassError>,
    },
}

impl LumassError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LumassError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The model error at the bottom of a context chain, if any.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            LumassError::Model(e) => Some(e),
            LumassError::WithContext { source, .. } => source.model_error(),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for LumassError {
    fn from(err: quick_xml::Error) -> Self {
        LumassError::Serialisation(err.to_string())
    }
}

/// Result type alias for lumass-core operations
pub type Result<T> = std::result::Result<T, LumassError>;

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

impl<T> ResultExt<T> for std::result::Result<T, ModelError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LumassError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LumassError::from(e).with_context(f()))
    }
}

impl<T> ResultExt<T> for std::io::Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LumassError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LumassError::from(e).with_context(f()))
    }
}
