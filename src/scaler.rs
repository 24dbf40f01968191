//! Incremental region-based rescaling driven by viewport invalidation.
//!
//! The view hands over the set of destination rectangles that need repaint;
//! each one is resampled independently from the source image at the current
//! zoom. Smooth mode samples a few extra source pixels around every
//! rectangle so filter artifacts never show up at tile seams.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{trace, warn};

use crate::geometry::{Rect, RectF, Region};

/// Extra source pixels sampled on each side so smooth scaling is correct at
/// tile boundaries.
const SMOOTH_MARGIN: i32 = 3;

/// Zoom factors this close to 1.0 take the direct-copy path, avoiding
/// float error and interpolation blur at 100%.
const ZOOM_EPSILON: f64 = 0.001;

/// Resampling quality for scaled tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationMode {
    /// Nearest-neighbor.
    Fast,
    /// Bilinear.
    Smooth,
}

/// One rescaled destination rectangle: premultiplied-alpha pixels plus the
/// destination-space origin of their top-left corner.
#[derive(Debug, Clone)]
pub struct ScaledTile {
    pub origin: (i32, i32),
    pub pixels: RgbaImage,
}

/// Recomputes pixel data for dirty destination rectangles at the current
/// zoom and quality mode. Purely synchronous; holds no cross-thread state.
pub struct ImageScaler {
    image: Option<Arc<RgbaImage>>,
    zoom: f64,
    mode: TransformationMode,
}

impl ImageScaler {
    pub fn new() -> Self {
        Self {
            image: None,
            zoom: 1.0,
            mode: TransformationMode::Fast,
        }
    }

    pub fn set_image(&mut self, image: Option<Arc<RgbaImage>>) {
        self.image = image;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn set_mode(&mut self, mode: TransformationMode) {
        self.mode = mode;
    }

    /// Scales each dirty rectangle of the region, in order, and returns one
    /// tile per rectangle that survives clipping. A no-op without a source
    /// image, with an empty region, or at a non-positive zoom.
    pub fn scale_region(&self, region: &Region) -> Vec<ScaledTile> {
        if region.is_empty() {
            return Vec::new();
        }
        let Some(image) = &self.image else {
            return Vec::new();
        };
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }
        if self.zoom <= 0.0 || !self.zoom.is_finite() {
            warn!(zoom = self.zoom, "ignoring scale request with invalid zoom");
            return Vec::new();
        }
        trace!(
            rects = region.rects().len(),
            zoom = self.zoom,
            mode = ?self.mode,
            "scaling dirty region"
        );
        region
            .rects()
            .iter()
            .filter_map(|rect| self.scale_rect(image, *rect))
            .collect()
    }

    fn scale_rect(&self, image: &RgbaImage, rect: Rect) -> Option<ScaledTile> {
        let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);

        // At 100% the destination maps 1:1 onto the source
        if (self.zoom - 1.0).abs() < ZOOM_EPSILON {
            let clipped = rect.intersected(bounds);
            if clipped.is_empty() {
                return None;
            }
            let pixels = premultiply(copy_rect(image, clipped));
            return Some(ScaledTile {
                origin: (clipped.x, clipped.y),
                pixels,
            });
        }

        // Map the destination rect into source space; partial source pixels
        // at the boundary are included whole by the containing rect
        let source_f = RectF::new(
            rect.x as f64 / self.zoom,
            rect.y as f64 / self.zoom,
            rect.width as f64 / self.zoom,
            rect.height as f64 / self.zoom,
        )
        .intersected(RectF::from(bounds));
        if source_f.is_empty() {
            return None;
        }
        let mut source = source_f.containing_rect();

        if self.mode == TransformationMode::Smooth {
            // Grow by up to the fixed margin on each side that has source
            // pixels available; near an image edge fewer may exist
            let left = source.x.min(SMOOTH_MARGIN);
            let top = source.y.min(SMOOTH_MARGIN);
            let right = (bounds.right() - source.right()).min(SMOOTH_MARGIN);
            let bottom = (bounds.bottom() - source.bottom()).min(SMOOTH_MARGIN);
            source = source.adjusted(-left, -top, right, bottom);
        }

        let dest = RectF::from(source).scaled(self.zoom).containing_rect();

        let filter = match self.mode {
            TransformationMode::Fast => FilterType::Nearest,
            // Do not lock aspect here: X and Y must scale independently or
            // tile boundaries can skip or duplicate rows/columns
            TransformationMode::Smooth => FilterType::Triangle,
        };
        let patch = premultiply(copy_rect(image, source));
        let scaled = imageops::resize(&patch, dest.width as u32, dest.height as u32, filter);

        // Emit exactly the requested rectangle (clipped to the image's
        // destination bounds); any margin only ever improved sampling
        let wanted = rect.intersected(dest);
        if wanted.is_empty() {
            return None;
        }
        let local = wanted.translated(-dest.x, -dest.y);
        let pixels = copy_rect(&scaled, local);
        trace!(?rect, ?source, origin = ?(wanted.x, wanted.y), "scaled tile");
        Some(ScaledTile {
            origin: (wanted.x, wanted.y),
            pixels,
        })
    }
}

impl Default for ImageScaler {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies a sub-rectangle out of an image. The rect must lie within bounds.
fn copy_rect(image: &RgbaImage, rect: Rect) -> RgbaImage {
    imageops::crop_imm(
        image,
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
    )
    .to_image()
}

/// Converts straight alpha to premultiplied alpha, the representation the
/// compositor expects and the one interpolation must run in.
fn premultiply(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as u16;
        if alpha == 255 {
            continue;
        }
        pixel[0] = ((pixel[0] as u16 * alpha) / 255) as u8;
        pixel[1] = ((pixel[1] as u16 * alpha) / 255) as u8;
        pixel[2] = ((pixel[2] as u16 * alpha) / 255) as u8;
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Opaque gradient where every pixel encodes its own coordinates.
    fn gradient(width: u32, height: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, 0, 255])
        }))
    }

    fn scaler(image: Arc<RgbaImage>, zoom: f64, mode: TransformationMode) -> ImageScaler {
        let mut s = ImageScaler::new();
        s.set_image(Some(image));
        s.set_zoom(zoom);
        s.set_mode(mode);
        s
    }

    #[test]
    fn test_zoom_two_fast_nearest_expansion() {
        // 100x100 source, zoom 2.0, dest rect (10,10)-(20,20):
        // source rect is (5,5)-(10,10), tile is its nearest expansion
        let s = scaler(gradient(100, 100), 2.0, TransformationMode::Fast);
        let tiles = s.scale_region(&Region::from(Rect::new(10, 10, 10, 10)));
        assert_eq!(tiles.len(), 1);
        let tile = &tiles[0];
        assert_eq!(tile.origin, (10, 10));
        assert_eq!((tile.pixels.width(), tile.pixels.height()), (10, 10));
        for y in 0..10u32 {
            for x in 0..10u32 {
                let expected = Rgba([(5 + x / 2) as u8, (5 + y / 2) as u8, 0, 255]);
                assert_eq!(*tile.pixels.get_pixel(x, y), expected, "at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_zoom_one_is_direct_copy() {
        let image = gradient(50, 50);
        let s = scaler(Arc::clone(&image), 1.0, TransformationMode::Smooth);
        let tiles = s.scale_region(&Region::from(Rect::new(7, 3, 10, 12)));
        assert_eq!(tiles.len(), 1);
        let tile = &tiles[0];
        assert_eq!(tile.origin, (7, 3));
        assert_eq!((tile.pixels.width(), tile.pixels.height()), (10, 12));
        for y in 0..12u32 {
            for x in 0..10u32 {
                assert_eq!(
                    *tile.pixels.get_pixel(x, y),
                    *image.get_pixel(7 + x, 3 + y)
                );
            }
        }
    }

    #[test]
    fn test_zoom_one_clips_to_source_bounds() {
        let s = scaler(gradient(20, 20), 1.0, TransformationMode::Fast);
        let tiles = s.scale_region(&Region::from(Rect::new(15, 15, 10, 10)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (15, 15));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (5, 5)
        );
    }

    #[test]
    fn test_smooth_tile_near_edge_keeps_requested_size() {
        // Top-left corner: no margin available above or to the left
        let s = scaler(gradient(100, 100), 2.0, TransformationMode::Smooth);
        let tiles = s.scale_region(&Region::from(Rect::new(0, 0, 20, 20)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (0, 0));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (20, 20)
        );

        // Bottom-right corner: no margin available below or to the right
        let tiles = s.scale_region(&Region::from(Rect::new(180, 180, 20, 20)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (180, 180));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (20, 20)
        );
    }

    #[test]
    fn test_smooth_interior_tile_keeps_requested_size() {
        let s = scaler(gradient(100, 100), 1.5, TransformationMode::Smooth);
        let tiles = s.scale_region(&Region::from(Rect::new(30, 45, 17, 11)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (30, 45));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (17, 11)
        );
    }

    #[test]
    fn test_downscale_tile_keeps_requested_size() {
        let s = scaler(gradient(100, 100), 0.25, TransformationMode::Smooth);
        let tiles = s.scale_region(&Region::from(Rect::new(5, 5, 10, 10)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (5, 5));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (10, 10)
        );
    }

    #[test]
    fn test_same_request_is_bit_identical() {
        let s = scaler(gradient(100, 100), 1.7, TransformationMode::Smooth);
        let region = Region::from(Rect::new(12, 9, 25, 25));
        let first = s.scale_region(&region);
        let second = s.scale_region(&region);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].origin, second[0].origin);
        assert_eq!(first[0].pixels.as_raw(), second[0].pixels.as_raw());
    }

    #[test]
    fn test_tiles_follow_region_order() {
        let s = scaler(gradient(100, 100), 2.0, TransformationMode::Fast);
        let region = Region::from(vec![
            Rect::new(40, 40, 10, 10),
            Rect::new(0, 0, 10, 10),
            Rect::new(100, 100, 10, 10),
        ]);
        let tiles = s.scale_region(&region);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[0].origin, (40, 40));
        assert_eq!(tiles[1].origin, (0, 0));
        assert_eq!(tiles[2].origin, (100, 100));
    }

    #[test]
    fn test_rect_outside_source_is_skipped() {
        let s = scaler(gradient(10, 10), 1.0, TransformationMode::Fast);
        let tiles = s.scale_region(&Region::from(Rect::new(500, 500, 10, 10)));
        assert!(tiles.is_empty());

        let s = scaler(gradient(10, 10), 2.0, TransformationMode::Smooth);
        let tiles = s.scale_region(&Region::from(Rect::new(500, 500, 10, 10)));
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_empty_region_is_noop() {
        let s = scaler(gradient(10, 10), 2.0, TransformationMode::Fast);
        assert!(s.scale_region(&Region::new()).is_empty());
    }

    #[test]
    fn test_missing_image_is_noop() {
        let mut s = ImageScaler::new();
        s.set_zoom(2.0);
        assert!(s
            .scale_region(&Region::from(Rect::new(0, 0, 10, 10)))
            .is_empty());
        s.set_image(Some(Arc::new(RgbaImage::new(0, 0))));
        assert!(s
            .scale_region(&Region::from(Rect::new(0, 0, 10, 10)))
            .is_empty());
    }

    #[test]
    fn test_invalid_zoom_is_noop() {
        let region = Region::from(Rect::new(0, 0, 10, 10));
        for zoom in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let s = scaler(gradient(10, 10), zoom, TransformationMode::Fast);
            assert!(s.scale_region(&region).is_empty(), "zoom {zoom}");
        }
    }

    #[test]
    fn test_output_is_premultiplied() {
        let mut image = RgbaImage::new(4, 4);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([200, 100, 50, 128]);
        }
        let s = scaler(Arc::new(image), 1.0, TransformationMode::Fast);
        let tiles = s.scale_region(&Region::from(Rect::new(0, 0, 4, 4)));
        let px = tiles[0].pixels.get_pixel(0, 0);
        assert_eq!(px[0], (200u16 * 128 / 255) as u8);
        assert_eq!(px[1], (100u16 * 128 / 255) as u8);
        assert_eq!(px[2], (50u16 * 128 / 255) as u8);
        assert_eq!(px[3], 128);
    }

    #[test]
    fn test_fractional_zoom_covers_partial_source_pixels() {
        // Dest (10,0)-(15,5) at zoom 3: source spans x in [3.33, 5), which
        // must include columns 3 and 4 whole
        let s = scaler(gradient(100, 100), 3.0, TransformationMode::Fast);
        let tiles = s.scale_region(&Region::from(Rect::new(10, 0, 5, 5)));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].origin, (10, 0));
        assert_eq!(
            (tiles[0].pixels.width(), tiles[0].pixels.height()),
            (5, 5)
        );
        // Every emitted pixel's encoded source column must be 3 or 4
        for x in 0..5u32 {
            let col = tiles[0].pixels.get_pixel(x, 0)[0];
            assert!(col == 3 || col == 4, "column {col} at x={x}");
        }
    }
}
