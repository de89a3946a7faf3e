// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for AZ Interface

use thiserror::Error;

/// Result type alias for AZ Interface operations
pub type Result<T> = std::result::Result<T, AzError>;

/// AZ Interface error types
#[derive(Error, Debug)]
pub enum AzError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Subscriber on '{topic}' failed: {reason}")]
    Subscriber { topic: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl AzError {
    /// Shorthand for a missing or malformed field
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for an unknown record id
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// True for errors the caller can fix by correcting input or refreshing
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}
