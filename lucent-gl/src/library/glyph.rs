//! Glyph atlas cache.
//!
//! Keys carry the font, glyph id, quarter-pixel phases (2 bits each axis)
//! and the scale ×1024. Bitmaps are uploaded with a 1-pixel border
//! replicating the edge pixels so bilinear filtering never bleeds a
//! neighbor's texels; a 256-slot front cache short-circuits the hash lookup
//! for runs of repeated glyphs.

use lucent_scene::{Font, IntRect};

use crate::driver::{GlDriver, TextureArea};
use crate::library::texture_library::TextureLibrary;

const FRONT_CACHE_SIZE: usize = 256;
const MAX_GLYPH_SIZE: i32 = 128;

/// Key of a rendered glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GlyphKey {
    pub font_id: u64,
    pub glyph: u32,
    /// Quarter-pixel x phase, 0..=3.
    pub xshift: u8,
    /// Quarter-pixel y phase, 0..=3.
    pub yshift: u8,
    /// Scale ×1024.
    pub scale: u32,
}

impl GlyphKey {
    fn front_index(&self) -> usize {
        ((self.glyph << 2) | self.xshift as u32) as usize & (FRONT_CACHE_SIZE - 1)
    }
}

/// Payload stored per glyph: its ink rect in logical pixels, grown by the
/// 1-pixel border.
#[derive(Debug, Clone, Copy)]
pub struct GlyphValue {
    pub ink_rect: IntRect,
}

/// What the text visitor needs to place one glyph quad.
#[derive(Debug, Clone, Copy)]
pub struct GlyphHit {
    pub texture_id: u32,
    pub area: TextureArea,
    pub ink_rect: IntRect,
}

#[derive(Clone, Copy, Default)]
struct FrontEntry {
    key: GlyphKey,
    hit: GlyphHit,
    valid: bool,
}

impl Default for GlyphHit {
    fn default() -> Self {
        Self { texture_id: 0, area: TextureArea::default(), ink_rect: IntRect::default() }
    }
}

/// See module docs.
pub struct GlyphLibrary {
    library: TextureLibrary<GlyphKey, GlyphValue>,
    front: Box<[FrontEntry; FRONT_CACHE_SIZE]>,
}

impl Default for GlyphLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphLibrary {
    pub fn new() -> Self {
        Self {
            library: TextureLibrary::new(MAX_GLYPH_SIZE),
            front: Box::new([FrontEntry::default(); FRONT_CACHE_SIZE]),
        }
    }

    pub fn begin_frame(&mut self, driver: &mut GlDriver, frame_id: i64) {
        if self.library.begin_frame(driver, frame_id) {
            // Dropped entries may be referenced from the front cache; force
            // the next lookups through the hash table.
            self.front = Box::new([FrontEntry::default(); FRONT_CACHE_SIZE]);
        }
    }

    pub fn n_cached(&self) -> usize {
        self.library.len()
    }

    /// Resolves a glyph to its atlas location, rasterizing on first use.
    /// Returns `None` for glyphs with no ink or failed uploads.
    pub fn lookup_or_add(
        &mut self,
        driver: &mut GlDriver,
        font: &Font,
        key: GlyphKey,
    ) -> Option<GlyphHit> {
        let front = &self.front[key.front_index()];
        if front.valid && front.key == key {
            return if front.hit.texture_id != 0 { Some(front.hit) } else { None };
        }

        let hit = match self.library.lookup(&key) {
            Some((texture_id, area, value)) => {
                GlyphHit { texture_id, area, ink_rect: value.ink_rect }
            }
            None => self.add(driver, font, key),
        };

        self.front[key.front_index()] = FrontEntry { key, hit, valid: true };
        if hit.texture_id != 0 { Some(hit) } else { None }
    }

    fn add(&mut self, driver: &mut GlDriver, font: &Font, key: GlyphKey) -> GlyphHit {
        let mut ink_rect = font.rasterizer().ink_rect(key.glyph);

        // Grow by one logical pixel per side; the border is replicated on
        // upload so bilinear sampling inside the entry stays clean.
        ink_rect.x -= 1;
        ink_rect.y -= 1;
        ink_rect.width += 2;
        ink_rect.height += 2;

        let width = (ink_rect.width as f32 * key.scale as f32 / 1024.0).ceil() as i32;
        let height = (ink_rect.height as f32 * key.scale as f32 / 1024.0).ceil() as i32;

        let packed =
            self.library.pack(driver, key, width, height, 1, GlyphValue { ink_rect });

        if key.scale > 0 && width > 0 && height > 0 {
            if let Some(bitmap) = font.rasterizer().rasterize(
                key.glyph,
                key.scale,
                key.xshift,
                key.yshift,
                width as u32,
                height as u32,
            ) {
                upload_glyph(
                    driver,
                    packed.texture_id,
                    packed.packed_x,
                    packed.packed_y,
                    width,
                    height,
                    &bitmap.pixels,
                );
            }
        }

        GlyphHit { texture_id: packed.texture_id, area: packed.area, ink_rect }
    }
}

/// Uploads a tightly packed RGBA glyph bitmap at (x+1, y+1) and replicates
/// its edge pixels into the 1-pixel border around it.
fn upload_glyph(
    driver: &mut GlDriver,
    texture_id: u32,
    packed_x: i32,
    packed_y: i32,
    width: i32,
    height: i32,
    pixels: &[u8],
) {
    if texture_id == 0 {
        return;
    }
    let (x, y) = (packed_x, packed_y);
    let has_unpack = driver.gl().has_unpack_subimage();
    let queue = driver.queue_mut();

    if has_unpack {
        // Walk the source bitmap with UNPACK_ROW_LENGTH / UNPACK_SKIP_*
        // so every border strip reads straight from the glyph pixels.
        queue.with_bound_texture(texture_id, |gl| {
            use glow::{RGBA, TEXTURE_2D, UNSIGNED_BYTE};
            let sub = |gl: &dyn crate::gl::GlContext, dx: i32, dy: i32, w: i32, h: i32| {
                gl.tex_sub_image_2d(TEXTURE_2D, 0, dx, dy, w, h, RGBA, UNSIGNED_BYTE, pixels)
            };

            gl.pixel_store(glow::UNPACK_ROW_LENGTH, width);
            sub(gl, x + 1, y + 1, width, height);
            // Top edge, left column, top-left corner.
            sub(gl, x + 1, y, width, 1);
            sub(gl, x, y + 1, 1, height);
            sub(gl, x, y, 1, 1);
            // Right column and top-right corner read the last pixel per row.
            gl.pixel_store(glow::UNPACK_SKIP_PIXELS, width - 1);
            sub(gl, x + width + 1, y + 1, 1, height);
            sub(gl, x + width + 1, y, 1, 1);
            // Bottom strip reads the last row.
            gl.pixel_store(glow::UNPACK_SKIP_PIXELS, 0);
            gl.pixel_store(glow::UNPACK_SKIP_ROWS, height - 1);
            sub(gl, x + 1, y + 1 + height, width, 1);
            sub(gl, x, y + 1 + height, 1, 1);
            gl.pixel_store(glow::UNPACK_SKIP_PIXELS, width - 1);
            sub(gl, x + 1 + width, y + 1 + height, 1, 1);

            gl.pixel_store(glow::UNPACK_SKIP_PIXELS, 0);
            gl.pixel_store(glow::UNPACK_SKIP_ROWS, 0);
            gl.pixel_store(glow::UNPACK_ROW_LENGTH, 0);
        });
    } else {
        // No sub-image unpacking: build the padded bitmap in software and
        // upload it whole.
        let stride = width as usize * 4;
        let padded_w = width as usize + 2;
        let padded_h = height as usize + 2;
        let mut padded = vec![0u8; padded_w * padded_h * 4];
        for row in 0..padded_h {
            let src_row = (row.max(1) - 1).min(height as usize - 1);
            for col in 0..padded_w {
                let src_col = (col.max(1) - 1).min(width as usize - 1);
                let src = src_row * stride + src_col * 4;
                let dst = (row * padded_w + col) * 4;
                padded[dst..dst + 4].copy_from_slice(&pixels[src..src + 4]);
            }
        }
        queue.with_bound_texture(texture_id, |gl| {
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                x,
                y,
                padded_w as i32,
                padded_h as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                &padded,
            );
        });
    }
}

/// Quarter-pixel phase of a coordinate, rounding the integer part so phase 0
/// lands on the nearest pixel.
pub fn compute_phase_and_pos(value: f32) -> (u8, f32) {
    let mut pos = value.floor();
    let fraction = value - pos;
    let phase = if fraction < 0.125 {
        0
    } else if fraction < 0.375 {
        1
    } else if fraction < 0.625 {
        2
    } else if fraction < 0.875 {
        3
    } else {
        pos += 1.0;
        0
    };
    (phase, pos)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::Arc;

    use lucent_scene::{GlyphBitmap, GlyphRasterizer};

    use super::*;
    use crate::gl::recording::RecordingContext;

    struct BoxRasterizer;

    impl GlyphRasterizer for BoxRasterizer {
        fn ink_rect(&self, _glyph: u32) -> IntRect {
            IntRect { x: 0, y: -8, width: 6, height: 8 }
        }

        fn rasterize(
            &self,
            _glyph: u32,
            _scale_1024: u32,
            _xshift: u8,
            _yshift: u8,
            width: u32,
            height: u32,
        ) -> Option<GlyphBitmap> {
            Some(GlyphBitmap {
                width,
                height,
                stride: width as usize * 4,
                pixels: vec![255; (width * height * 4) as usize],
            })
        }
    }

    fn fixture() -> (GlDriver, GlyphLibrary, Font) {
        let gl = Rc::new(RecordingContext::new());
        let driver = GlDriver::new(gl, false).unwrap();
        (driver, GlyphLibrary::new(), Font::new(Arc::new(BoxRasterizer)))
    }

    #[test]
    fn test_lookup_or_add_caches() {
        let (mut driver, mut glyphs, font) = fixture();
        let key = GlyphKey { font_id: font.id(), glyph: 65, xshift: 0, yshift: 0, scale: 1024 };

        let first = glyphs.lookup_or_add(&mut driver, &font, key).unwrap();
        assert_ne!(first.texture_id, 0);
        assert_eq!(glyphs.n_cached(), 1);

        let second = glyphs.lookup_or_add(&mut driver, &font, key).unwrap();
        assert_eq!(first.texture_id, second.texture_id);
        assert_eq!(first.area, second.area);
        assert_eq!(glyphs.n_cached(), 1);
    }

    #[test]
    fn test_different_phase_is_a_new_entry() {
        let (mut driver, mut glyphs, font) = fixture();
        let a = GlyphKey { font_id: font.id(), glyph: 65, xshift: 0, yshift: 0, scale: 1024 };
        let b = GlyphKey { xshift: 1, ..a };
        glyphs.lookup_or_add(&mut driver, &font, a);
        glyphs.lookup_or_add(&mut driver, &font, b);
        assert_eq!(glyphs.n_cached(), 2);
    }

    #[test]
    fn test_glyphs_share_one_atlas() {
        let (mut driver, mut glyphs, font) = fixture();
        let mut textures = std::collections::HashSet::new();
        for glyph in 0..16u32 {
            let key =
                GlyphKey { font_id: font.id(), glyph, xshift: 0, yshift: 0, scale: 1024 };
            textures.insert(glyphs.lookup_or_add(&mut driver, &font, key).unwrap().texture_id);
        }
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_ink_rect_is_grown_by_border() {
        let (mut driver, mut glyphs, font) = fixture();
        let key = GlyphKey { font_id: font.id(), glyph: 65, xshift: 0, yshift: 0, scale: 1024 };
        let hit = glyphs.lookup_or_add(&mut driver, &font, key).unwrap();
        assert_eq!(hit.ink_rect, IntRect { x: -1, y: -9, width: 8, height: 10 });
    }

    #[test]
    fn test_compute_phase_and_pos() {
        assert_eq!(compute_phase_and_pos(10.0), (0, 10.0));
        assert_eq!(compute_phase_and_pos(10.26), (1, 10.0));
        assert_eq!(compute_phase_and_pos(10.5), (2, 10.0));
        assert_eq!(compute_phase_and_pos(10.75), (3, 10.0));
        assert_eq!(compute_phase_and_pos(10.9), (0, 11.0));
    }
}
