//! Atlas cache for small external textures ("icons").
//!
//! Keyed by the source texture's pointer identity; the entry holds an `Arc`
//! to the source so the pixels stay valid and the key stays unique while
//! cached.

use std::sync::Arc;

use lucent_scene::{ImageTexture, MemoryFormat, TextureData};

use crate::driver::{GlDriver, TextureArea};
use crate::library::texture_library::TextureLibrary;

/// Largest side an icon can have and still be atlased.
pub const MAX_ICON_SIZE: i32 = 128;

pub struct IconValue {
    /// Keeps the source pixels and the key's identity alive.
    _source: Arc<ImageTexture>,
}

/// See module docs.
pub struct IconLibrary {
    library: TextureLibrary<usize, IconValue>,
}

impl Default for IconLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl IconLibrary {
    pub fn new() -> Self {
        Self { library: TextureLibrary::new(MAX_ICON_SIZE) }
    }

    pub fn can_cache(&self, texture: &ImageTexture) -> bool {
        !texture.is_gl()
            && self.library.can_cache(texture.width as i32, texture.height as i32)
    }

    pub fn begin_frame(&mut self, driver: &mut GlDriver, frame_id: i64) {
        self.library.begin_frame(driver, frame_id);
    }

    pub fn n_cached(&self) -> usize {
        self.library.len()
    }

    /// Returns the atlas location of a small texture, uploading on first
    /// use.
    pub fn lookup_or_add(
        &mut self,
        driver: &mut GlDriver,
        source: &Arc<ImageTexture>,
    ) -> (u32, TextureArea) {
        let key = Arc::as_ptr(source) as usize;
        if let Some((texture_id, area, _)) = self.library.lookup(&key) {
            return (texture_id, area);
        }

        let width = source.width as i32;
        let height = source.height as i32;
        let packed = self.library.pack(
            driver,
            key,
            width,
            height,
            1,
            IconValue { _source: source.clone() },
        );

        if packed.texture_id != 0 {
            let rgba = source_to_premultiplied_rgba(source);
            driver.queue_mut().with_bound_texture(packed.texture_id, |gl| {
                gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    packed.packed_x + 1,
                    packed.packed_y + 1,
                    width,
                    height,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    &rgba,
                );
            });
        }

        (packed.texture_id, packed.area)
    }
}

/// Converts a memory texture to tightly packed premultiplied RGBA.
fn source_to_premultiplied_rgba(source: &ImageTexture) -> Vec<u8> {
    let TextureData::Memory { format, stride, pixels, .. } = &source.data else {
        unreachable!("GL textures never reach the icon library");
    };
    let width = source.width as usize;
    let height = source.height as usize;
    let bgra = matches!(format, MemoryFormat::Bgra8 | MemoryFormat::Bgra8Premultiplied);
    let premultiplied = format.is_premultiplied();

    let mut out = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        let line = &pixels[row * stride..row * stride + width * 4];
        for px in line.chunks_exact(4) {
            let (r, g, b, a) = if bgra {
                (px[2], px[1], px[0], px[3])
            } else {
                (px[0], px[1], px[2], px[3])
            };
            if premultiplied {
                out.extend_from_slice(&[r, g, b, a]);
            } else {
                let mul = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
                out.extend_from_slice(&[mul(r), mul(g), mul(b), a]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use lucent_scene::ColorState;

    use super::*;
    use crate::gl::recording::RecordingContext;

    fn fixture() -> (GlDriver, IconLibrary) {
        let gl = Rc::new(RecordingContext::new());
        (GlDriver::new(gl, false).unwrap(), IconLibrary::new())
    }

    fn icon(width: u32, height: u32, format: MemoryFormat) -> Arc<ImageTexture> {
        Arc::new(ImageTexture::from_memory(
            width,
            height,
            format,
            ColorState::SrgbLinear,
            width as usize * 4,
            vec![128u8; (width * height * 4) as usize],
        ))
    }

    #[test]
    fn test_lookup_or_add_is_cached_by_pointer() {
        let (mut driver, mut icons) = fixture();
        let source = icon(16, 16, MemoryFormat::Rgba8Premultiplied);
        let (texture_a, area_a) = icons.lookup_or_add(&mut driver, &source);
        let (texture_b, area_b) = icons.lookup_or_add(&mut driver, &source);
        assert_eq!(texture_a, texture_b);
        assert_eq!(area_a, area_b);
        assert_eq!(icons.n_cached(), 1);
    }

    #[test]
    fn test_same_pixels_different_arc_is_a_new_entry() {
        let (mut driver, mut icons) = fixture();
        let a = icon(16, 16, MemoryFormat::Rgba8Premultiplied);
        let b = icon(16, 16, MemoryFormat::Rgba8Premultiplied);
        icons.lookup_or_add(&mut driver, &a);
        icons.lookup_or_add(&mut driver, &b);
        assert_eq!(icons.n_cached(), 2);
    }

    #[test]
    fn test_premultiply_on_upload() {
        let source = Arc::new(ImageTexture::from_memory(
            1,
            1,
            MemoryFormat::Rgba8,
            ColorState::SrgbLinear,
            4,
            vec![255, 255, 255, 128],
        ));
        let rgba = source_to_premultiplied_rgba(&source);
        assert_eq!(rgba, vec![128, 128, 128, 128]);
    }

    #[test]
    fn test_bgra_swizzle() {
        let source = Arc::new(ImageTexture::from_memory(
            1,
            1,
            MemoryFormat::Bgra8Premultiplied,
            ColorState::SrgbLinear,
            4,
            vec![10, 20, 30, 255],
        ));
        let rgba = source_to_premultiplied_rgba(&source);
        assert_eq!(rgba, vec![30, 20, 10, 255]);
    }

    #[test]
    fn test_can_cache_respects_size_limit() {
        let (_, icons) = fixture();
        assert!(icons.can_cache(&icon(64, 64, MemoryFormat::Rgba8Premultiplied)));
        assert!(!icons.can_cache(&icon(300, 16, MemoryFormat::Rgba8Premultiplied)));
    }
}
