//! Per-document page geometry
//!
//! Native page sizes are read from the engine once, on the first width or
//! height query, and kept for the life of the handle. The viewport width is
//! applied when the table is read, so changing it never touches the engine.

use std::sync::Arc;

use parking_lot::RwLock;

use super::types::PageSize;

#[derive(Default)]
pub struct GeometryCache {
    native: RwLock<Option<Arc<[PageSize]>>>,
    viewport_width: RwLock<Option<f64>>,
}

impl GeometryCache {
    pub fn new(viewport_width: Option<f64>) -> Self {
        Self {
            native: RwLock::new(None),
            viewport_width: RwLock::new(viewport_width),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.native.read().is_some()
    }

    /// Native sizes, if populated
    pub fn native(&self) -> Option<Arc<[PageSize]>> {
        self.native.read().clone()
    }

    /// Store the native table. A table that is already present wins.
    pub(crate) fn fill(&self, sizes: Vec<PageSize>) -> Arc<[PageSize]> {
        let mut slot = self.native.write();
        slot.get_or_insert_with(|| Arc::from(sizes)).clone()
    }

    pub fn viewport_width(&self) -> Option<f64> {
        *self.viewport_width.read()
    }

    pub fn set_viewport_width(&self, width: Option<f64>) {
        *self.viewport_width.write() = width;
    }

    /// Factor applied to a page of `native` size: `viewport / native.width`
    /// when the viewport is narrower than the page, otherwise 1.
    pub fn fit_factor(&self, native: PageSize) -> f64 {
        match self.viewport_width() {
            Some(viewport) if viewport < native.width => viewport / native.width,
            _ => 1.0,
        }
    }

    /// Size callers see for a page of `native` size
    pub fn displayed(&self, native: PageSize) -> PageSize {
        native.scaled(self.fit_factor(native))
    }

    /// Displayed sizes of every page, if populated
    pub fn page_sizes(&self) -> Option<Vec<PageSize>> {
        let native = self.native()?;
        Some(native.iter().map(|&size| self.displayed(size)).collect())
    }
}
