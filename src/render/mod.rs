//! Render scheduling
//!
//! - `dispatcher`: validates and queues page, tile and preview renders
//! - `pool`: bounded blocking pool shared by all documents
//! - `transform`: page-to-pixel affine transforms

pub mod dispatcher;
pub mod pool;
pub mod transform;

pub use dispatcher::{RenderDispatcher, RenderOptions};
pub use pool::{PoolError, WorkerPool};
pub use transform::{PageFit, TileTransform};
