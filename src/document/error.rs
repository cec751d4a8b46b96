//! Document error types
//!
//! Every operation on the registry or the dispatcher fails with exactly one
//! of these kinds. Failures are scoped to the session that produced them.

use thiserror::Error;

use crate::engine::EngineError;

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Session was never opened, or has been closed
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// A session with this identifier is already open
    #[error("Document already open: {0}")]
    AlreadyOpen(String),

    /// Missing or incorrect password, or the engine cannot decrypt
    #[error("Password error: {0}")]
    PasswordError(String),

    /// 1-based page index outside `1..=page_count`
    #[error("Page index {index} out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { index: usize, page_count: usize },

    /// Document bytes could not be materialized
    #[error("Load error: {0}")]
    LoadError(String),

    /// Page could not be opened or rasterized
    #[error("Render error: {0}")]
    RenderError(String),
}

/// Error discriminant reported across the RPC boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DocumentNotFound,
    AlreadyOpen,
    PasswordError,
    PageIndexOutOfRange,
    LoadError,
    RenderError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DocumentNotFound => "DocumentNotFound",
            ErrorKind::AlreadyOpen => "AlreadyOpen",
            ErrorKind::PasswordError => "PasswordError",
            ErrorKind::PageIndexOutOfRange => "PageIndexOutOfRange",
            ErrorKind::LoadError => "LoadError",
            ErrorKind::RenderError => "RenderError",
        }
    }
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            DocumentError::AlreadyOpen(_) => ErrorKind::AlreadyOpen,
            DocumentError::PasswordError(_) => ErrorKind::PasswordError,
            DocumentError::PageIndexOutOfRange { .. } => ErrorKind::PageIndexOutOfRange,
            DocumentError::LoadError(_) => ErrorKind::LoadError,
            DocumentError::RenderError(_) => ErrorKind::RenderError,
        }
    }

    pub(crate) fn not_found(session_id: &str) -> Self {
        DocumentError::DocumentNotFound(session_id.to_string())
    }

    /// Map an engine failure raised while loading a document
    pub(crate) fn from_load(err: EngineError) -> Self {
        match err {
            EngineError::PasswordRequired | EngineError::IncorrectPassword => {
                DocumentError::PasswordError(err.to_string())
            }
            other => DocumentError::LoadError(other.to_string()),
        }
    }

    /// Map an engine failure raised while opening or rasterizing a page
    pub(crate) fn from_render(err: EngineError) -> Self {
        match err {
            EngineError::PasswordRequired | EngineError::IncorrectPassword => {
                DocumentError::PasswordError(err.to_string())
            }
            other => DocumentError::RenderError(other.to_string()),
        }
    }
}

/// Result type alias for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
