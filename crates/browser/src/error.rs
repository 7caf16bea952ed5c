//! Error types for the browser crate

use dom::DomError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Document error: {0}")]
    Dom(#[from] DomError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to fetch {address}: {reason}")]
    Fetch { address: String, reason: String },

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Upstream connection lost: {0}")]
    UpstreamLost(String),

    #[error("No page loaded")]
    NoPage,

    #[error("No link numbered {0}")]
    NoSuchLink(usize),

    #[error("Not listening for collaborators")]
    NotListening,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Result type for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;
