//! Page-to-pixel transforms
//!
//! All transforms map native page space (points, origin top-left) to target
//! pixel space. The viewport fit factor is folded in first, so tile origins
//! and preview scales are expressed in displayed page coordinates.

use std::str::FromStr;

use kurbo::Affine;

use crate::document::PageSize;

/// How a full page fills its target rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFit {
    /// Independent x/y scale; the page covers the whole target
    #[default]
    Stretch,
    /// Uniform scale, anchored top-left; leftover area stays white
    Contain,
}

impl FromStr for PageFit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stretch" => Ok(PageFit::Stretch),
            "contain" => Ok(PageFit::Contain),
            other => Err(format!("unknown page fit: {}", other)),
        }
    }
}

/// Sub-region extraction: translate by `(-origin_x, -origin_y)`, then scale
/// uniformly by `scale`. Coefficients `[s, 0, 0, s, -x*s, -y*s]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub scale: f64,
}

impl TileTransform {
    pub fn new(origin_x: f64, origin_y: f64, scale: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            scale,
        }
    }

    pub fn affine(&self) -> Affine {
        Affine::scale(self.scale) * Affine::translate((-self.origin_x, -self.origin_y))
    }

    /// Transform for a page displayed at `fit_factor` times its native size
    pub fn for_fitted_page(&self, fit_factor: f64) -> Affine {
        self.affine() * Affine::scale(fit_factor)
    }
}

/// Full page into a `width` x `height` target
pub fn page_transform(
    native: PageSize,
    fit_factor: f64,
    width: u32,
    height: u32,
    fit: PageFit,
) -> Affine {
    let displayed = native.scaled(fit_factor);
    let sx = f64::from(width) / displayed.width;
    let sy = f64::from(height) / displayed.height;
    let to_target = match fit {
        PageFit::Stretch => Affine::scale_non_uniform(sx, sy),
        PageFit::Contain => Affine::scale(sx.min(sy)),
    };
    to_target * Affine::scale(fit_factor)
}

/// Whole page magnified by `scale`, and the target size that holds it
pub fn scaled_transform(native: PageSize, fit_factor: f64, scale: f64) -> (Affine, u32, u32) {
    let displayed = native.scaled(fit_factor);
    let width = (displayed.width * scale).ceil().max(1.0) as u32;
    let height = (displayed.height * scale).ceil().max(1.0) as u32;
    (Affine::scale(scale * fit_factor), width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_tile_coefficients() {
        let t = TileTransform::new(10.0, 20.0, 2.0);
        assert_eq!(t.affine().as_coeffs(), [2.0, 0.0, 0.0, 2.0, -20.0, -40.0]);
    }

    #[test]
    fn test_tile_origin_maps_to_target_origin() {
        let t = TileTransform::new(100.0, 50.0, 3.0);
        assert!(close(t.affine() * Point::new(100.0, 50.0), Point::ZERO));
        assert!(close(t.affine() * Point::new(101.0, 51.0), Point::new(3.0, 3.0)));
    }

    #[test]
    fn test_identity_tile_is_identity() {
        let t = TileTransform::new(0.0, 0.0, 1.0);
        assert_eq!(t.affine(), Affine::IDENTITY);
    }

    #[test]
    fn test_fitted_tile_uses_displayed_coordinates() {
        // page shown at half size; displayed point (50, 50) is native (100, 100)
        let t = TileTransform::new(50.0, 50.0, 2.0);
        let m = t.for_fitted_page(0.5);
        assert!(close(m * Point::new(100.0, 100.0), Point::ZERO));
        assert!(close(m * Point::new(110.0, 100.0), Point::new(10.0, 0.0)));
    }

    #[test]
    fn test_stretch_fills_any_aspect() {
        let page = PageSize::new(612.0, 792.0);
        let m = page_transform(page, 1.0, 100, 400, PageFit::Stretch);
        assert!(close(m * Point::new(612.0, 792.0), Point::new(100.0, 400.0)));
    }

    #[test]
    fn test_contain_keeps_aspect() {
        let page = PageSize::new(200.0, 100.0);
        let m = page_transform(page, 1.0, 100, 100, PageFit::Contain);
        assert!(close(m * Point::new(200.0, 100.0), Point::new(100.0, 50.0)));
    }

    #[test]
    fn test_scaled_output_size() {
        let (m, w, h) = scaled_transform(PageSize::new(100.0, 50.5), 1.0, 2.0);
        assert_eq!((w, h), (200, 101));
        assert!(close(m * Point::new(100.0, 50.0), Point::new(200.0, 100.0)));

        let (_, w, h) = scaled_transform(PageSize::new(400.0, 200.0), 0.5, 2.0);
        assert_eq!((w, h), (400, 200));
    }

    #[test]
    fn test_page_fit_parse() {
        assert_eq!("Contain".parse::<PageFit>().unwrap(), PageFit::Contain);
        assert_eq!("stretch".parse::<PageFit>().unwrap(), PageFit::Stretch);
        assert!("zoom".parse::<PageFit>().is_err());
    }
}
