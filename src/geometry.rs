//! Rectangle and region primitives used by the scaling pipeline.
//!
//! All integer rectangles are half-open: `right()` and `bottom()` name the
//! first excluded column/row, so `width = right - left`.

/// An integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// First excluded column.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// First excluded row.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersection with `other`; degenerate results come back empty.
    pub fn intersected(&self, other: Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    /// Moves each edge by the given delta (left, top, right, bottom).
    pub fn adjusted(&self, dx1: i32, dy1: i32, dx2: i32, dy2: i32) -> Rect {
        Rect::new(
            self.x + dx1,
            self.y + dy1,
            self.width - dx1 + dx2,
            self.height - dy1 + dy2,
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// A real-valued rectangle, used for source-space coordinates under zoom.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn scaled(&self, factor: f64) -> RectF {
        RectF::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    pub fn intersected(&self, other: RectF) -> RectF {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        RectF::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }

    /// Smallest integer rectangle fully covering the real-valued bounds:
    /// floor on the near edges, ceiling on the far edges. A rectangle with
    /// "half" pixels at its boundary therefore includes them whole.
    pub fn containing_rect(&self) -> Rect {
        let left = self.x.floor() as i32;
        let top = self.y.floor() as i32;
        let right = self.right().ceil() as i32;
        let bottom = self.bottom().ceil() as i32;
        Rect::new(left, top, right - left, bottom - top)
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        RectF::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64)
    }
}

/// An ordered set of destination rectangles needing repaint.
///
/// Callers are expected to pass disjoint rectangles; the scaler processes
/// them in order and does not merge or split them.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn push(&mut self, rect: Rect) {
        self.rects.push(rect);
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Self { rects: vec![rect] }
    }
}

impl From<Vec<Rect>> for Region {
    fn from(rects: Vec<Rect>) -> Self {
        Self { rects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_rect_fractional_edges() {
        // (1.2, 1.2) - (4.8, 4.8): partial pixels on every edge are included
        let r = RectF::new(1.2, 1.2, 3.6, 3.6).containing_rect();
        assert_eq!(r, Rect::new(1, 1, 4, 4));
    }

    #[test]
    fn test_containing_rect_integer_edges() {
        let r = RectF::new(5.0, 5.0, 5.0, 5.0).containing_rect();
        assert_eq!(r, Rect::new(5, 5, 5, 5));
    }

    #[test]
    fn test_containing_rect_negative_origin() {
        let r = RectF::new(-1.5, -0.5, 2.0, 2.0).containing_rect();
        assert_eq!(r, Rect::new(-2, -1, 3, 3));
    }

    #[test]
    fn test_intersected_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersected(b), Rect::new(5, 5, 5, 5));
    }

    #[test]
    fn test_intersected_disjoint_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 5, 5);
        assert!(a.intersected(b).is_empty());
    }

    #[test]
    fn test_adjusted_grows_all_sides() {
        let r = Rect::new(10, 10, 5, 5).adjusted(-3, -2, 3, 2);
        assert_eq!(r, Rect::new(7, 8, 11, 9));
        assert_eq!(r.right(), 18);
        assert_eq!(r.bottom(), 17);
    }

    #[test]
    fn test_region_keeps_order() {
        let region = Region::from(vec![Rect::new(0, 0, 1, 1), Rect::new(5, 5, 1, 1)]);
        assert_eq!(region.rects().len(), 2);
        assert_eq!(region.rects()[0].x, 0);
        assert_eq!(region.rects()[1].x, 5);
    }
}
