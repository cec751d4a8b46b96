//! Document types
//!
//! Session identifiers, page geometry, render requests and the RGBA buffer
//! every render produces.

use serde::{Deserialize, Serialize};

/// Opaque caller-supplied session identifier
pub type SessionId = String;

/// Page dimensions in points (72 points = 1 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Uniformly scaled copy
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

/// Render the whole page into a `width` x `height` buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRequest {
    /// 1-based page index
    pub page: usize,
    pub width: u32,
    pub height: u32,
}

/// Render the sub-rectangle starting at `(x, y)` in displayed page
/// coordinates, magnified by `scale`, into a `width` x `height` buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    /// 1-based page index
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// Render the whole page at `scale`; output size follows the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledRequest {
    /// 1-based page index
    pub page: usize,
    pub scale: f64,
}

/// Any render submitted to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderRequest {
    FullPage(PageRequest),
    Tile(TileRequest),
    Scaled(ScaledRequest),
}

/// Opened session, as reported by listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub page_count: usize,
}

/// RGBA8 pixel buffer, row-major, top row first
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Opaque white buffer
    pub fn white(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![255; width as usize * height as usize * Self::BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// True when the byte length matches `width * height * 4`
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = self.offset(x, y);
        let mut px = [0; 4];
        px.copy_from_slice(&self.data[offset..offset + Self::BYTES_PER_PIXEL]);
        px
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let offset = self.offset(x, y);
        self.data[offset..offset + Self::BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// True when every pixel is opaque white
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 255)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
