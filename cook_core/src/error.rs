//! Error types for the cook_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cook_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Requested recipe does not exist in the catalog
    #[error("Recipe not found: {0}")]
    RecipeNotFound(String),

    /// The recipe cannot be cooked through because a step is missing
    #[error("Recipe step not found: {0}")]
    MissingStep(String),

    /// End-of-session update for a log entry that was never started
    #[error("Preparation log not found: {0}")]
    LogNotFound(String),

    /// Session lifecycle error
    #[error("Session error: {0}")]
    Session(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a translation collaborator.
///
/// Callers treat every variant the same way: the untranslated text is used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("translation service unavailable: {0}")]
    Unavailable(String),

    #[error("translation failed: {0}")]
    Failed(String),
}
