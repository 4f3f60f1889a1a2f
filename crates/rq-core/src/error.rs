//! # AppError
//!
//! Centralized error handling for the rusty-qa content pipeline.

use thiserror::Error;

/// The primary error type for all rq-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., User, Post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., revision summary too long, empty session key)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource already exists (e.g., duplicate username)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Failure reported by a port adapter (database, renderer, subscriber).
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A specialized Result type for rusty-qa logic.
pub type Result<T> = std::result::Result<T, AppError>;
