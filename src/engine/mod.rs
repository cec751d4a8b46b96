//! Rasterization engines
//!
//! The registry and dispatcher only see these traits. An engine loads a
//! document, reports whether it is encrypted, opens pages and paints them
//! through an affine transform into a caller-owned RGBA buffer. Pages and
//! documents are closed when dropped.
//!
//! None of these types are thread-safe on their own: a `NativeDocument` and
//! every page opened from it are only touched while the owning handle's lock
//! is held.

use std::path::Path;

use kurbo::Affine;
use thiserror::Error;

use crate::document::{PageSize, PixelBuffer};

#[cfg(feature = "mupdf")]
mod mupdf;
#[cfg(any(test, feature = "test-utils"))]
pub mod synthetic;

#[cfg(feature = "mupdf")]
pub use self::mupdf::MupdfEngine;

/// Whether an engine can open encrypted documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSupport {
    Supported,
    Unsupported,
}

/// How an engine wants document bytes handed to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Parsed straight from memory
    Memory,
    /// Staged to a temporary file that lives until the load returns
    File,
}

impl std::str::FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(InputKind::Memory),
            "file" => Ok(InputKind::File),
            other => Err(format!("unknown engine input kind: {}", other)),
        }
    }
}

/// Capabilities fixed when the engine is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub password: PasswordSupport,
    pub input: InputKind,
}

/// Where a document is loaded from
#[derive(Debug, Clone, Copy)]
pub enum DocumentSource<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

/// Engine-level failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load document: {0}")]
    Load(String),

    #[error("document is encrypted and requires a password")]
    PasswordRequired,

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("failed to open page {0}: {1}")]
    Page(usize, String),

    #[error("rasterization failed: {0}")]
    Raster(String),
}

pub trait RenderEngine: Send + Sync + 'static {
    /// Short engine name, reported by the health endpoint
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> EngineCapabilities;

    fn load(&self, source: DocumentSource<'_>) -> Result<Box<dyn NativeDocument>, EngineError>;
}

pub trait NativeDocument: Send {
    fn needs_password(&self) -> Result<bool, EngineError>;

    /// Returns `Ok(false)` when the password is wrong
    fn authenticate(&mut self, password: &str) -> Result<bool, EngineError>;

    fn page_count(&self) -> Result<usize, EngineError>;

    /// Open the page at 0-based `index`
    fn page(&self, index: usize) -> Result<Box<dyn NativePage + '_>, EngineError>;
}

pub trait NativePage {
    /// Page box in points, after the page's own rotation
    fn size(&self) -> Result<PageSize, EngineError>;

    /// Paint the page into `target` through `transform`, which maps page
    /// space (origin top-left, y down) to target pixel space. Pixels the page
    /// does not cover are left as they are.
    fn rasterize(&self, transform: Affine, target: &mut PixelBuffer) -> Result<(), EngineError>;
}
