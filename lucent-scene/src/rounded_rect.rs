//! Rectangles with elliptical corners.

use glam::Vec2;

use crate::Rect;

pub const TOP_LEFT: usize = 0;
pub const TOP_RIGHT: usize = 1;
pub const BOTTOM_RIGHT: usize = 2;
pub const BOTTOM_LEFT: usize = 3;

/// Size of one elliptical corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerSize {
    pub width: f32,
    pub height: f32,
}

impl CornerSize {
    pub const ZERO: CornerSize = CornerSize { width: 0.0, height: 0.0 };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A rectangle with four elliptical corners, indexed clockwise from top-left.
///
/// This is both a clip shape and the wire format of the `ROUNDED_RECT`
/// uniform (bounds as x/y/x2/y2 plus four corner width/height pairs).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundedRect {
    pub bounds: Rect,
    pub corners: [CornerSize; 4],
}

impl RoundedRect {
    pub const fn from_rect(bounds: Rect) -> Self {
        Self { bounds, corners: [CornerSize::ZERO; 4] }
    }

    pub const fn new(bounds: Rect, corners: [CornerSize; 4]) -> Self {
        Self { bounds, corners }
    }

    /// A rounded rect with the same radius on every corner.
    pub fn with_uniform_radius(bounds: Rect, radius: f32) -> Self {
        Self { bounds, corners: [CornerSize::new(radius, radius); 4] }
    }

    pub fn is_rectilinear(&self) -> bool {
        self.corners.iter().all(|c| c.is_zero())
    }

    pub fn has_corner(&self, i: usize) -> bool {
        !self.corners[i].is_zero()
    }

    /// The axis-aligned rect covered by corner `i`.
    pub fn corner_rect(&self, i: usize) -> Rect {
        let c = self.corners[i];
        match i {
            TOP_LEFT => Rect::new(self.bounds.x, self.bounds.y, c.width, c.height),
            TOP_RIGHT => Rect::new(self.bounds.max_x() - c.width, self.bounds.y, c.width, c.height),
            BOTTOM_RIGHT => Rect::new(
                self.bounds.max_x() - c.width,
                self.bounds.max_y() - c.height,
                c.width,
                c.height,
            ),
            BOTTOM_LEFT => {
                Rect::new(self.bounds.x, self.bounds.max_y() - c.height, c.width, c.height)
            }
            _ => unreachable!(),
        }
    }

    /// The largest rect guaranteed inside, i.e. bounds inset past all corners.
    pub fn inner_rect(&self) -> Rect {
        let left = self.corners[TOP_LEFT].width.max(self.corners[BOTTOM_LEFT].width);
        let right = self.corners[TOP_RIGHT].width.max(self.corners[BOTTOM_RIGHT].width);
        let top = self.corners[TOP_LEFT].height.max(self.corners[TOP_RIGHT].height);
        let bottom = self.corners[BOTTOM_LEFT].height.max(self.corners[BOTTOM_RIGHT].height);
        Rect::new(
            self.bounds.x + left,
            self.bounds.y + top,
            self.bounds.width - left - right,
            self.bounds.height - top - bottom,
        )
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        if !self.bounds.contains_point(p) {
            return false;
        }
        for i in 0..4 {
            if !self.has_corner(i) {
                continue;
            }
            let corner = self.corner_rect(i);
            if !corner.contains_point(p) {
                continue;
            }
            // Elliptical test against the corner's center of curvature.
            let c = self.corners[i];
            let center = match i {
                TOP_LEFT => Vec2::new(corner.max_x(), corner.max_y()),
                TOP_RIGHT => Vec2::new(corner.x, corner.max_y()),
                BOTTOM_RIGHT => Vec2::new(corner.x, corner.y),
                BOTTOM_LEFT => Vec2::new(corner.max_x(), corner.y),
                _ => unreachable!(),
            };
            let dx = (p.x - center.x) / c.width;
            let dy = (p.y - center.y) / c.height;
            if dx * dx + dy * dy > 1.0 {
                return false;
            }
        }
        true
    }

    /// A rounded rect is convex, so containing all four rect corners is
    /// containing the rect.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        self.contains_point(Vec2::new(rect.x, rect.y))
            && self.contains_point(Vec2::new(rect.max_x(), rect.y))
            && self.contains_point(Vec2::new(rect.x, rect.max_y()))
            && self.contains_point(Vec2::new(rect.max_x(), rect.max_y()))
    }

    /// Shrinks the bounds by per-edge amounts; negative amounts grow.
    /// Corner sizes shrink with the adjacent edges but never below zero, and
    /// growing a rect does not grow zero corners.
    pub fn shrink(&self, top: f32, right: f32, bottom: f32, left: f32) -> Self {
        let bounds = Rect::new(
            self.bounds.x + left,
            self.bounds.y + top,
            (self.bounds.width - left - right).max(0.0),
            (self.bounds.height - top - bottom).max(0.0),
        );
        let shrink_corner = |c: CornerSize, w: f32, h: f32| {
            if c.is_zero() {
                CornerSize::ZERO
            } else {
                CornerSize::new((c.width - w).max(0.0), (c.height - h).max(0.0))
            }
        };
        Self {
            bounds,
            corners: [
                shrink_corner(self.corners[TOP_LEFT], left, top),
                shrink_corner(self.corners[TOP_RIGHT], right, top),
                shrink_corner(self.corners[BOTTOM_RIGHT], right, bottom),
                shrink_corner(self.corners[BOTTOM_LEFT], left, bottom),
            ],
        }
    }

    /// Shrinks the bounds to the minimum size that still holds all corners.
    pub fn shrink_to_minimum(&mut self) {
        self.bounds.width = (self.corners[TOP_LEFT].width + self.corners[TOP_RIGHT].width)
            .max(self.corners[BOTTOM_LEFT].width + self.corners[BOTTOM_RIGHT].width);
        self.bounds.height = (self.corners[TOP_LEFT].height + self.corners[BOTTOM_LEFT].height)
            .max(self.corners[TOP_RIGHT].height + self.corners[BOTTOM_RIGHT].height);
    }

    /// Packed wire layout of the `ROUNDED_RECT` uniform: bounds as
    /// x/y/x2/y2 followed by the four corner width/height pairs.
    pub fn to_floats(&self) -> [f32; 12] {
        [
            self.bounds.x,
            self.bounds.y,
            self.bounds.max_x(),
            self.bounds.max_y(),
            self.corners[0].width,
            self.corners[0].height,
            self.corners[1].width,
            self.corners[1].height,
            self.corners[2].width,
            self.corners[2].height,
            self.corners[3].width,
            self.corners[3].height,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectilinear() {
        assert!(RoundedRect::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).is_rectilinear());
        assert!(!RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 10.0, 10.0), 2.0)
            .is_rectilinear());
    }

    #[test]
    fn test_contains_point_avoids_corner() {
        let r = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 100.0, 100.0), 10.0);
        // Dead center of the rect.
        assert!(r.contains_point(Vec2::new(50.0, 50.0)));
        // The extreme top-left pixel is cut away by the corner ellipse.
        assert!(!r.contains_point(Vec2::new(0.5, 0.5)));
        // On the corner rect but inside the ellipse.
        assert!(r.contains_point(Vec2::new(9.0, 9.0)));
    }

    #[test]
    fn test_contains_rect() {
        let r = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 100.0, 100.0), 10.0);
        assert!(r.contains_rect(&Rect::new(20.0, 20.0, 60.0, 60.0)));
        assert!(!r.contains_rect(&Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_shrink_grows_with_negative_amounts() {
        let r = RoundedRect::with_uniform_radius(Rect::new(10.0, 10.0, 80.0, 80.0), 4.0);
        let grown = r.shrink(-5.0, -5.0, -5.0, -5.0);
        assert_eq!(grown.bounds, Rect::new(5.0, 5.0, 90.0, 90.0));
        assert_eq!(grown.corners[TOP_LEFT], CornerSize::new(9.0, 9.0));
    }

    #[test]
    fn test_shrink_to_minimum() {
        let mut r = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 100.0, 50.0), 8.0);
        r.shrink_to_minimum();
        assert_eq!(r.bounds.width, 16.0);
        assert_eq!(r.bounds.height, 16.0);
    }

    #[test]
    fn test_inner_rect() {
        let mut r = RoundedRect::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        r.corners[TOP_LEFT] = CornerSize::new(10.0, 20.0);
        r.corners[BOTTOM_RIGHT] = CornerSize::new(5.0, 5.0);
        let inner = r.inner_rect();
        assert_eq!(inner, Rect::new(10.0, 20.0, 85.0, 75.0));
    }
}
