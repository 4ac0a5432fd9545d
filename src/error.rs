//! Structured error types for folio.
//!
//! Every failure is fatal to the document being produced: there is no
//! best-effort output. Four variants cover the real error sources.

use thiserror::Error;

/// The unified error type returned by all public folio API functions.
#[derive(Debug, Error)]
pub enum FolioError {
    /// A font, image or output file could not be opened, read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported binary structure.
    #[error("Format error: {0}")]
    Format(String),

    /// The API was used in the wrong order.
    #[error("State error: {0}")]
    State(String),

    /// JSON input failed to parse as a valid folio document.
    #[error("Failed to parse document: {source}{}", format_hint(.hint))]
    Parse {
        source: serde_json::Error,
        hint: String,
    },
}

pub type Result<T> = std::result::Result<T, FolioError>;

impl FolioError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        FolioError::Format(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        FolioError::State(msg.into())
    }
}

fn format_hint(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

impl From<serde_json::Error> for FolioError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the folio document schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        FolioError::Parse { source: e, hint }
    }
}
