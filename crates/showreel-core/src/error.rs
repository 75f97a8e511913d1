//! Unified error types for showreel

use thiserror::Error;

/// Unified error type for all showreel operations
#[derive(Error, Debug)]
pub enum ShowreelError {
    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser binary not found: {0}")]
    BrowserNotFound(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    // Selector resolution errors
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element has no bounding box: {selector}")]
    NoBoundingBox { selector: String },

    // Overlay errors
    #[error("Overlay error: {0}")]
    Overlay(String),

    // Recording errors
    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Screenshot errors
    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backend test-support API errors
    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl ShowreelError {
    /// Errors that come from a broken test script rather than the environment
    pub fn is_selector_error(&self) -> bool {
        matches!(
            self,
            ShowreelError::ElementNotFound { .. } | ShowreelError::NoBoundingBox { .. }
        )
    }
}

/// Result type alias using ShowreelError
pub type Result<T> = std::result::Result<T, ShowreelError>;
