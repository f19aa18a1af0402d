//! Error types for fb2speech operations.

use thiserror::Error;

/// Errors that can abort compiling or voicing a book.
///
/// Malformed markup is never an error: the document compiler tolerates it.
/// Everything listed here stops the run, leaving clips already on disk
/// in place for a later resume.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Synthesis failed: {status} {message}\n\"{request}\"")]
    Synthesis {
        status: u16,
        message: String,
        request: String,
    },

    #[error("Synthesis timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("{tool} error: {}", code.map_or_else(|| "terminated by signal".to_string(), |c| c.to_string()))]
    Concat { tool: &'static str, code: Option<i32> },

    #[error("Resume point {0} was never reached; parts directory does not match this book")]
    ResumePointNotFound(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
