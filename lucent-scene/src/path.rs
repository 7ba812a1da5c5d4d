//! Vector paths, reduced to what the renderer consumes.
//!
//! A path is a list of contours. Each contour is classified at construction
//! so the renderer can pick a specialized draw: rects and rounded rects
//! become inline clips, circles become uniform-radius rounded clips, and
//! only the general case pays for mask rasterization.

use glam::Vec2;
use smallvec::SmallVec;

use crate::{Rect, RoundedRect};

/// Fill rule for [`Path`] fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillRule {
    #[default]
    Winding,
    EvenOdd,
}

/// Stroke parameters. Only what the mask rasterizer needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub width: f32,
    pub miter_limit: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self { width: 1.0, miter_limit: 4.0 }
    }
}

/// One drawing command of a standard contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOp {
    MoveTo(Vec2),
    LineTo(Vec2),
    CubicTo(Vec2, Vec2, Vec2),
    Close,
}

/// A single sub-path, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Contour {
    Rect(Rect),
    RoundedRect(RoundedRect),
    Circle { center: Vec2, radius: f32 },
    Standard(Vec<PathOp>),
}

impl Contour {
    pub fn bounds(&self) -> Rect {
        match self {
            Contour::Rect(r) => *r,
            Contour::RoundedRect(r) => r.bounds,
            Contour::Circle { center, radius } => Rect::new(
                center.x - radius,
                center.y - radius,
                2.0 * radius,
                2.0 * radius,
            ),
            Contour::Standard(ops) => {
                let mut min: Option<Vec2> = None;
                let mut max = Vec2::ZERO;
                let mut add = |p: Vec2| match min {
                    None => {
                        min = Some(p);
                        max = p;
                    }
                    Some(m) => {
                        min = Some(m.min(p));
                        max = max.max(p);
                    }
                };
                for op in ops {
                    match op {
                        PathOp::MoveTo(p) | PathOp::LineTo(p) => add(*p),
                        PathOp::CubicTo(c1, c2, p) => {
                            // Control points over-estimate; good enough for
                            // conservative clip tests.
                            add(*c1);
                            add(*c2);
                            add(*p);
                        }
                        PathOp::Close => {}
                    }
                }
                match min {
                    Some(m) => Rect::new(m.x, m.y, max.x - m.x, max.y - m.y),
                    None => Rect::ZERO,
                }
            }
        }
    }
}

/// An immutable path. Node trees share paths by `Arc`, and the mask cache
/// keys off the `Arc` pointer, so build once and reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    contours: SmallVec<[Contour; 2]>,
    bounds: Rect,
}

impl Path {
    pub fn new(contours: impl IntoIterator<Item = Contour>) -> Self {
        let contours: SmallVec<[Contour; 2]> = contours.into_iter().collect();
        let mut bounds = Rect::ZERO;
        for (i, c) in contours.iter().enumerate() {
            bounds = if i == 0 { c.bounds() } else { bounds.union(&c.bounds()) };
        }
        Self { contours, bounds }
    }

    pub fn rect(rect: Rect) -> Self {
        Self::new([Contour::Rect(rect)])
    }

    pub fn rounded_rect(rect: RoundedRect) -> Self {
        Self::new([Contour::RoundedRect(rect)])
    }

    pub fn circle(center: Vec2, radius: f32) -> Self {
        Self::new([Contour::Circle { center, radius }])
    }

    /// Builds a standard contour from raw ops, upgrading to a rect contour
    /// when the ops trace an axis-aligned rectangle.
    pub fn from_ops(ops: Vec<PathOp>) -> Self {
        if let Some(rect) = classify_rect(&ops) {
            return Self::rect(rect);
        }
        Self::new([Contour::Standard(ops)])
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The single contour, if there is exactly one.
    pub fn single_contour(&self) -> Option<&Contour> {
        if self.contours.len() == 1 { Some(&self.contours[0]) } else { None }
    }
}

/// Recognizes `M a L b L c L d Z` tracing an axis-aligned rectangle.
fn classify_rect(ops: &[PathOp]) -> Option<Rect> {
    let mut points: SmallVec<[Vec2; 4]> = SmallVec::new();
    for (i, op) in ops.iter().enumerate() {
        match (i, op) {
            (0, PathOp::MoveTo(p)) => points.push(*p),
            (_, PathOp::LineTo(p)) if points.len() < 4 => points.push(*p),
            (_, PathOp::Close) if i == ops.len() - 1 => {}
            _ => return None,
        }
    }
    if points.len() != 4 {
        return None;
    }
    let axis_aligned = (0..4).all(|i| {
        let a = points[i];
        let b = points[(i + 1) % 4];
        a.x == b.x || a.y == b.y
    });
    if !axis_aligned {
        return None;
    }
    let min = points.iter().fold(points[0], |m, p| m.min(*p));
    let max = points.iter().fold(points[0], |m, p| m.max(*p));
    Some(Rect::new(min.x, min.y, max.x - min.x, max.y - min.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ops_classifies_rect() {
        let path = Path::from_ops(vec![
            PathOp::MoveTo(Vec2::new(0.0, 0.0)),
            PathOp::LineTo(Vec2::new(10.0, 0.0)),
            PathOp::LineTo(Vec2::new(10.0, 5.0)),
            PathOp::LineTo(Vec2::new(0.0, 5.0)),
            PathOp::Close,
        ]);
        assert_eq!(path.single_contour(), Some(&Contour::Rect(Rect::new(0.0, 0.0, 10.0, 5.0))));
    }

    #[test]
    fn test_from_ops_skewed_quad_stays_standard() {
        let path = Path::from_ops(vec![
            PathOp::MoveTo(Vec2::new(0.0, 0.0)),
            PathOp::LineTo(Vec2::new(10.0, 2.0)),
            PathOp::LineTo(Vec2::new(10.0, 5.0)),
            PathOp::LineTo(Vec2::new(0.0, 5.0)),
            PathOp::Close,
        ]);
        assert!(matches!(path.single_contour(), Some(Contour::Standard(_))));
    }

    #[test]
    fn test_circle_bounds() {
        let path = Path::circle(Vec2::new(5.0, 5.0), 3.0);
        assert_eq!(path.bounds(), Rect::new(2.0, 2.0, 6.0, 6.0));
    }
}
