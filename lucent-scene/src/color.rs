//! RGBA colors with straight (non-premultiplied) alpha.

/// An RGBA color with straight alpha, each channel in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Whether the alpha is small enough that drawing can be skipped.
    ///
    /// The threshold matches one 8-bit step out of a 16-bit range, so a color
    /// that would still produce a visible 8-bit pixel is never "clear".
    pub fn is_clear(&self) -> bool {
        self.a < (0x00ff as f32 / 0xffff as f32)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// One stop of a gradient. The field order is the renderer's wire order:
/// gradient shaders consume stops as `5 * N` packed floats, offset first.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ColorStop {
    pub offset: f32,
    pub color: Color,
}

impl ColorStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_clear() {
        assert!(Color::TRANSPARENT.is_clear());
        assert!(Color::new(1.0, 0.0, 0.0, 0.001).is_clear());
        assert!(!Color::new(1.0, 0.0, 0.0, 0.01).is_clear());
        assert!(!Color::WHITE.is_clear());
    }

    #[test]
    fn test_color_stop_layout() {
        // Gradient uniforms are uploaded as packed floats; the layout must
        // stay offset, r, g, b, a.
        assert_eq!(std::mem::size_of::<ColorStop>(), 5 * 4);
        let stop = ColorStop::new(0.25, Color::new(0.1, 0.2, 0.3, 0.4));
        let floats: [f32; 5] = unsafe { std::mem::transmute(stop) };
        assert_eq!(floats, [0.25, 0.1, 0.2, 0.3, 0.4]);
    }
}
