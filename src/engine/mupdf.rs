//! MuPDF-backed engine
//!
//! Pages are painted through a draw device onto an RGB pixmap the size of the
//! target, pre-cleared to white, then expanded into the RGBA buffer.

use kurbo::Affine;
use mupdf::{Colorspace, Device, Document, Matrix, Page, Pixmap};

use super::{
    DocumentSource, EngineCapabilities, EngineError, InputKind, NativeDocument, NativePage,
    PasswordSupport, RenderEngine,
};
use crate::document::{PageSize, PixelBuffer};

const PDF_MIME: &str = "application/pdf";

pub struct MupdfEngine {
    input: InputKind,
}

impl MupdfEngine {
    pub fn new(input: InputKind) -> Self {
        Self { input }
    }
}

impl Default for MupdfEngine {
    fn default() -> Self {
        Self::new(InputKind::Memory)
    }
}

impl RenderEngine for MupdfEngine {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            password: PasswordSupport::Supported,
            input: self.input,
        }
    }

    fn load(&self, source: DocumentSource<'_>) -> Result<Box<dyn NativeDocument>, EngineError> {
        let doc = match source {
            DocumentSource::Bytes(data) => Document::from_bytes(data, PDF_MIME),
            DocumentSource::Path(path) => {
                let path_str = path.to_string_lossy();
                Document::open(&*path_str)
            }
        }
        .map_err(|e| EngineError::Load(e.to_string()))?;

        Ok(Box::new(MupdfDocument { doc }))
    }
}

struct MupdfDocument {
    doc: Document,
}

// SAFETY: a MupdfDocument is owned by exactly one DocumentHandle and is only
// reached through that handle's mutex, so at most one thread uses it (and
// any page opened from it) at a time. MuPDF objects may move between threads
// as long as access is never concurrent.
unsafe impl Send for MupdfDocument {}

impl NativeDocument for MupdfDocument {
    fn needs_password(&self) -> Result<bool, EngineError> {
        self.doc
            .needs_password()
            .map_err(|e| EngineError::Load(e.to_string()))
    }

    fn authenticate(&mut self, password: &str) -> Result<bool, EngineError> {
        self.doc
            .authenticate(password)
            .map_err(|e| EngineError::Load(e.to_string()))
    }

    fn page_count(&self) -> Result<usize, EngineError> {
        let count = self
            .doc
            .page_count()
            .map_err(|e| EngineError::Load(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    fn page(&self, index: usize) -> Result<Box<dyn NativePage + '_>, EngineError> {
        let page = self
            .doc
            .load_page(index as i32)
            .map_err(|e| EngineError::Page(index, e.to_string()))?;
        Ok(Box::new(MupdfPage { page }))
    }
}

struct MupdfPage {
    page: Page,
}

impl NativePage for MupdfPage {
    fn size(&self) -> Result<PageSize, EngineError> {
        let bounds = self
            .page
            .bounds()
            .map_err(|e| EngineError::Raster(e.to_string()))?;
        Ok(PageSize::new(
            f64::from(bounds.x1 - bounds.x0),
            f64::from(bounds.y1 - bounds.y0),
        ))
    }

    fn rasterize(&self, transform: Affine, target: &mut PixelBuffer) -> Result<(), EngineError> {
        let raster = |e: mupdf::Error| EngineError::Raster(e.to_string());

        // Page space starts at the bounds origin, which is not always (0, 0)
        let bounds = self.page.bounds().map_err(raster)?;
        let ctm = transform * Affine::translate((-f64::from(bounds.x0), -f64::from(bounds.y0)));
        let [a, b, c, d, e, f] = ctm.as_coeffs();
        let matrix = Matrix::new(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32);

        let colorspace = Colorspace::device_rgb();
        let mut pixmap = Pixmap::new_with_w_h(
            &colorspace,
            target.width() as i32,
            target.height() as i32,
            false,
        )
        .map_err(raster)?;
        pixmap.clear_with(0xff).map_err(raster)?;

        {
            let device = Device::from_pixmap(&pixmap).map_err(raster)?;
            self.page.run(&device, &matrix).map_err(raster)?;
            // device closes on drop, before samples are read
        }

        let n = pixmap.n() as usize;
        let samples = pixmap.samples();
        let expected = target.width() as usize * target.height() as usize * n;
        if n < 3 || samples.len() < expected {
            return Err(EngineError::Raster(format!(
                "unexpected pixmap layout: {} components, {} bytes",
                n,
                samples.len()
            )));
        }

        for (dst, src) in target
            .data_mut()
            .chunks_exact_mut(PixelBuffer::BYTES_PER_PIXEL)
            .zip(samples.chunks_exact(n))
        {
            dst[..3].copy_from_slice(&src[..3]);
            dst[3] = 0xff;
        }

        Ok(())
    }
}
