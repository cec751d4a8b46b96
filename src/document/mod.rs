//! Document sessions
//!
//! - `registry`: session id to handle mapping, open/close/reload
//! - `handle`: one open document, its lock and FIFO job queue
//! - `geometry`: lazily populated page sizes with viewport fitting
//! - `types`: requests, page sizes and pixel buffers
//! - `error`: the error taxonomy shared by every operation

pub mod error;
pub mod geometry;
pub mod handle;
pub mod registry;
pub mod types;

pub use error::{DocumentError, DocumentResult, ErrorKind};
pub use geometry::GeometryCache;
pub use handle::DocumentHandle;
pub use registry::{DocumentRegistry, RegistryOptions};
pub use types::{
    PageRequest, PageSize, PixelBuffer, RenderRequest, ScaledRequest, SessionId, SessionSummary,
    TileRequest,
};
