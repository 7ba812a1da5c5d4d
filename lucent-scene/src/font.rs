//! Font and glyph inputs.
//!
//! Shaping happens outside the renderer; what arrives here is a run of
//! positioned glyph ids plus a rasterization hook the glyph atlas calls when
//! a glyph is first seen at a given scale and sub-pixel phase.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed-point unit of glyph advances and offsets (1/1024 of a pixel).
pub const GLYPH_UNITS: i32 = 1024;

/// An integer rectangle, used for glyph ink extents in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A rasterized glyph image: tightly packed premultiplied RGBA pixels.
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

/// Rasterization hook implemented by the embedder's font stack.
pub trait GlyphRasterizer: Send + Sync {
    /// Ink extents of `glyph` at nominal (scale 1.0) size, in pixels.
    fn ink_rect(&self, glyph: u32) -> IntRect;

    /// Renders `glyph` at `scale_1024 / 1024.0` with the given quarter-pixel
    /// phases (0..=3 on each axis) into a white-on-transparent bitmap of
    /// exactly `width`×`height` pixels. Returns `None` when the glyph has no
    /// ink.
    fn rasterize(
        &self,
        glyph: u32,
        scale_1024: u32,
        xshift: u8,
        yshift: u8,
        width: u32,
        height: u32,
    ) -> Option<GlyphBitmap>;
}

static NEXT_FONT_ID: AtomicU64 = AtomicU64::new(1);

/// A font handle: a process-unique id plus the rasterizer for its glyphs.
/// The id is what glyph cache keys store.
pub struct Font {
    id: u64,
    rasterizer: Arc<dyn GlyphRasterizer>,
}

impl Font {
    pub fn new(rasterizer: Arc<dyn GlyphRasterizer>) -> Self {
        Self { id: NEXT_FONT_ID.fetch_add(1, Ordering::Relaxed), rasterizer }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rasterizer(&self) -> &dyn GlyphRasterizer {
        &*self.rasterizer
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Font").field("id", &self.id).finish()
    }
}

/// One glyph of a shaped text run. Geometry fields are in [`GLYPH_UNITS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionedGlyph {
    pub glyph: u32,
    /// Advance width.
    pub width: i32,
    pub x_offset: i32,
    pub y_offset: i32,
    /// Color glyph (emoji); drawn without recoloring.
    pub is_color: bool,
}

impl PositionedGlyph {
    pub fn new(glyph: u32, width: i32) -> Self {
        Self { glyph, width, x_offset: 0, y_offset: 0, is_color: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullRasterizer;

    impl GlyphRasterizer for NullRasterizer {
        fn ink_rect(&self, _glyph: u32) -> IntRect {
            IntRect { x: 0, y: -8, width: 6, height: 8 }
        }

        fn rasterize(
            &self,
            _glyph: u32,
            _scale_1024: u32,
            _xshift: u8,
            _yshift: u8,
            _width: u32,
            _height: u32,
        ) -> Option<GlyphBitmap> {
            None
        }
    }

    #[test]
    fn test_font_ids_are_unique() {
        let r = Arc::new(NullRasterizer);
        let a = Font::new(r.clone());
        let b = Font::new(r);
        assert_ne!(a.id(), b.id());
    }
}
