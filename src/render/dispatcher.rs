//! Render dispatcher
//!
//! Validates render requests against the session they target, then queues
//! them on that session's handle. Each request produces exactly one result:
//! a `width * height * 4` RGBA buffer or a typed error.

use std::sync::Arc;

use kurbo::Affine;

use super::transform::{page_transform, scaled_transform, PageFit, TileTransform};
use crate::document::{
    DocumentError, DocumentHandle, DocumentRegistry, DocumentResult, PageRequest, PixelBuffer,
    RenderRequest, ScaledRequest, TileRequest,
};

/// Dispatcher settings
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub page_fit: PageFit,
    /// Lower bound on the scale of preview renders
    pub preview_scale_floor: f64,
    /// Largest `width * height` a single render may produce
    pub max_pixels: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_fit: PageFit::Stretch,
            preview_scale_floor: 1.75,
            max_pixels: 64 * 1024 * 1024,
        }
    }
}

/// How the target is derived from the opened page
#[derive(Debug, Clone, Copy)]
enum Plan {
    Page { width: u32, height: u32, fit: PageFit },
    Tile { tile: TileTransform, width: u32, height: u32 },
    Scaled { scale: f64 },
}

#[derive(Clone)]
pub struct RenderDispatcher {
    registry: DocumentRegistry,
    options: RenderOptions,
}

impl RenderDispatcher {
    pub fn new(registry: DocumentRegistry, options: RenderOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Displayed width of every page
    pub async fn pages_width(&self, session_id: &str) -> DocumentResult<Vec<f64>> {
        let handle = self.registry.lookup(session_id)?;
        let sizes = handle.page_sizes().await?;
        Ok(sizes.into_iter().map(|s| s.width).collect())
    }

    /// Displayed height of every page
    pub async fn pages_height(&self, session_id: &str) -> DocumentResult<Vec<f64>> {
        let handle = self.registry.lookup(session_id)?;
        let sizes = handle.page_sizes().await?;
        Ok(sizes.into_iter().map(|s| s.height).collect())
    }

    pub async fn render(&self, session_id: &str, request: RenderRequest) -> DocumentResult<PixelBuffer> {
        match request {
            RenderRequest::FullPage(r) => self.render_page(session_id, r).await,
            RenderRequest::Tile(r) => self.render_tile(session_id, r).await,
            RenderRequest::Scaled(r) => self.render_scaled(session_id, r).await,
        }
    }

    /// Whole page into `width` x `height`
    pub async fn render_page(&self, session_id: &str, request: PageRequest) -> DocumentResult<PixelBuffer> {
        let handle = self.registry.lookup(session_id)?;
        let index = handle.page_index(request.page)?;
        self.check_target(request.width, request.height)?;

        let plan = Plan::Page {
            width: request.width,
            height: request.height,
            fit: self.options.page_fit,
        };
        self.dispatch(handle, index, plan).await
    }

    /// Sub-rectangle of a page, magnified by `scale`
    pub async fn render_tile(&self, session_id: &str, request: TileRequest) -> DocumentResult<PixelBuffer> {
        let handle = self.registry.lookup(session_id)?;
        let index = handle.page_index(request.page)?;
        self.check_target(request.width, request.height)?;
        check_scale(request.scale)?;
        if !request.x.is_finite() || !request.y.is_finite() {
            return Err(DocumentError::RenderError("tile origin must be finite".into()));
        }

        let plan = Plan::Tile {
            tile: TileTransform::new(request.x, request.y, request.scale),
            width: request.width,
            height: request.height,
        };
        self.dispatch(handle, index, plan).await
    }

    /// Whole page at `max(scale, preview_scale_floor)`
    pub async fn render_scaled(&self, session_id: &str, request: ScaledRequest) -> DocumentResult<PixelBuffer> {
        let handle = self.registry.lookup(session_id)?;
        let index = handle.page_index(request.page)?;
        check_scale(request.scale)?;

        let scale = request.scale.max(self.options.preview_scale_floor);
        self.dispatch(handle, index, Plan::Scaled { scale }).await
    }

    async fn dispatch(
        &self,
        handle: Arc<DocumentHandle>,
        index: usize,
        plan: Plan,
    ) -> DocumentResult<PixelBuffer> {
        let session_id = handle.id().to_string();
        let max_pixels = self.options.max_pixels;

        let result = handle
            .submit(move |doc, geometry| {
                let page = doc.page(index).map_err(DocumentError::from_render)?;
                let native = page.size().map_err(DocumentError::from_render)?;
                let fit_factor = geometry.fit_factor(native);

                let (transform, width, height): (Affine, u32, u32) = match plan {
                    Plan::Page { width, height, fit } => {
                        (page_transform(native, fit_factor, width, height, fit), width, height)
                    }
                    Plan::Tile { tile, width, height } => {
                        (tile.for_fitted_page(fit_factor), width, height)
                    }
                    Plan::Scaled { scale } => scaled_transform(native, fit_factor, scale),
                };
                check_pixels(width, height, max_pixels)?;

                let mut buffer = PixelBuffer::white(width, height);
                page.rasterize(transform, &mut buffer)
                    .map_err(DocumentError::from_render)?;

                if !buffer.is_well_formed() {
                    return Err(DocumentError::RenderError(format!(
                        "engine produced {} bytes for a {}x{} target",
                        buffer.data().len(),
                        width,
                        height
                    )));
                }
                Ok(buffer)
            })
            .await;

        match &result {
            Ok(buffer) => tracing::debug!(
                session_id = %session_id,
                page = index + 1,
                width = buffer.width(),
                height = buffer.height(),
                "Rendered"
            ),
            Err(DocumentError::DocumentNotFound(_)) => {
                tracing::warn!(session_id = %session_id, page = index + 1, "Render for closed document")
            }
            Err(e) => tracing::error!(session_id = %session_id, page = index + 1, "Render failed: {}", e),
        }
        result
    }

    fn check_target(&self, width: u32, height: u32) -> DocumentResult<()> {
        if width == 0 || height == 0 {
            return Err(DocumentError::RenderError(format!(
                "target size must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        check_pixels(width, height, self.options.max_pixels)
    }
}

fn check_scale(scale: f64) -> DocumentResult<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(DocumentError::RenderError(format!(
            "scale must be positive, got {}",
            scale
        )));
    }
    Ok(())
}

fn check_pixels(width: u32, height: u32, max_pixels: u64) -> DocumentResult<()> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(DocumentError::RenderError(format!(
            "{}x{} exceeds the {} pixel render limit",
            width, height, max_pixels
        )));
    }
    Ok(())
}
