//! Category-tracked 2D/3D transforms.

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::Rect;

/// How much structure a transform is known to preserve.
///
/// Ordered from weakest to strongest knowledge, so `category >= Affine2d`
/// asks "is this at most scale + translate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformCategory {
    Unknown,
    Any,
    Dim3,
    Dim2,
    Affine2d,
    Translate2d,
    Identity,
}

/// An immutable transform: a 4×4 matrix plus the strongest category the
/// construction path can guarantee. Composition keeps the weakest category
/// of the two operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Mat4,
    category: TransformCategory,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self { matrix: Mat4::IDENTITY, category: TransformCategory::Identity }
    }

    pub fn translate(dx: f32, dy: f32) -> Self {
        if dx == 0.0 && dy == 0.0 {
            return Self::identity();
        }
        Self {
            matrix: Mat4::from_translation(Vec3::new(dx, dy, 0.0)),
            category: TransformCategory::Translate2d,
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        if sx == 1.0 && sy == 1.0 {
            return Self::identity();
        }
        Self {
            matrix: Mat4::from_scale(Vec3::new(sx, sy, 1.0)),
            category: TransformCategory::Affine2d,
        }
    }

    /// Rotation around the z axis, in degrees.
    pub fn rotate(degrees: f32) -> Self {
        if degrees == 0.0 {
            return Self::identity();
        }
        Self {
            matrix: Mat4::from_rotation_z(degrees.to_radians()),
            category: TransformCategory::Dim2,
        }
    }

    /// A general 2D transform from its six coefficients
    /// (column-major: xx, yx, xy, yy, dx, dy).
    pub fn from_2d(xx: f32, yx: f32, xy: f32, yy: f32, dx: f32, dy: f32) -> Self {
        Self {
            matrix: Mat4::from_cols(
                Vec4::new(xx, yx, 0.0, 0.0),
                Vec4::new(xy, yy, 0.0, 0.0),
                Vec4::new(0.0, 0.0, 1.0, 0.0),
                Vec4::new(dx, dy, 0.0, 1.0),
            ),
            category: TransformCategory::Dim2,
        }
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix, category: TransformCategory::Any }
    }

    pub fn category(&self) -> TransformCategory {
        self.category
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// `self` applied after `other` — i.e. `other` operates in `self`'s
    /// local coordinate space.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            matrix: self.matrix * other.matrix,
            category: self.category.min(other.category),
        }
    }

    /// Appends a translation in local coordinates.
    pub fn pre_translate(&self, dx: f32, dy: f32) -> Transform {
        self.then(&Transform::translate(dx, dy))
    }

    pub fn invert(&self) -> Option<Transform> {
        if self.matrix.determinant() == 0.0 {
            return None;
        }
        Some(Transform { matrix: self.matrix.inverse(), category: self.category })
    }

    /// Valid for `category >= Translate2d`.
    pub fn to_translate(&self) -> (f32, f32) {
        (self.matrix.w_axis.x, self.matrix.w_axis.y)
    }

    /// Valid for `category >= Affine2d`: (scale_x, scale_y, dx, dy).
    pub fn to_affine(&self) -> (f32, f32, f32, f32) {
        (self.matrix.x_axis.x, self.matrix.y_axis.y, self.matrix.w_axis.x, self.matrix.w_axis.y)
    }

    /// Valid for `category >= Dim2`: (xx, yx, xy, yy, dx, dy).
    pub fn to_2d(&self) -> (f32, f32, f32, f32, f32, f32) {
        (
            self.matrix.x_axis.x,
            self.matrix.x_axis.y,
            self.matrix.y_axis.x,
            self.matrix.y_axis.y,
            self.matrix.w_axis.x,
            self.matrix.w_axis.y,
        )
    }

    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        (self.matrix * Vec4::new(p.x, p.y, 0.0, 1.0)).xy()
    }

    /// Axis-aligned bounds of the transformed rect.
    pub fn transform_bounds(&self, rect: &Rect) -> Rect {
        let corners = [
            self.transform_point(Vec2::new(rect.x, rect.y)),
            self.transform_point(Vec2::new(rect.max_x(), rect.y)),
            self.transform_point(Vec2::new(rect.x, rect.max_y())),
            self.transform_point(Vec2::new(rect.max_x(), rect.max_y())),
        ];
        let mut min = corners[0];
        let mut max = corners[0];
        for c in &corners[1..] {
            min = min.min(*c);
            max = max.max(*c);
        }
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }
}
