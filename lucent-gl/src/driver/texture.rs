//! Texture records, cache keys and render targets.

use std::sync::Weak;

use lucent_scene::{ImageTexture, Rect, RoundedRect, BOTTOM_LEFT, BOTTOM_RIGHT, TOP_LEFT, TOP_RIGHT};

/// Normalized sub-rectangle of a texture (u/v space).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextureArea {
    pub x: f32,
    pub y: f32,
    pub x2: f32,
    pub y2: f32,
}

impl TextureArea {
    pub const FULL: TextureArea = TextureArea { x: 0.0, y: 0.0, x2: 1.0, y2: 1.0 };
}

/// One tile of an oversized texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureSlice {
    pub rect: (i32, i32, i32, i32),
    pub texture_id: u32,
}

/// One of the nine regions of a nine-slice decomposition, as source pixels
/// plus normalized texture coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NineSlice {
    pub rect: Rect,
    pub area: TextureArea,
}

impl NineSlice {
    pub fn is_visible(&self) -> bool {
        self.rect.width > 0.0 && self.rect.height > 0.0
    }
}

pub const NINE_SLICE_TOP_LEFT: usize = 0;
pub const NINE_SLICE_TOP_CENTER: usize = 1;
pub const NINE_SLICE_TOP_RIGHT: usize = 2;
pub const NINE_SLICE_LEFT_CENTER: usize = 3;
pub const NINE_SLICE_CENTER: usize = 4;
pub const NINE_SLICE_RIGHT_CENTER: usize = 5;
pub const NINE_SLICE_BOTTOM_LEFT: usize = 6;
pub const NINE_SLICE_BOTTOM_CENTER: usize = 7;
pub const NINE_SLICE_BOTTOM_RIGHT: usize = 8;

/// Cuts a `width`×`height` texture holding `outline` (plus `extra_x/y`
/// blur pixels on each side) into nine regions.
pub fn nine_slice(
    outline: &RoundedRect,
    width: i32,
    height: i32,
    extra_x: i32,
    extra_y: i32,
) -> [NineSlice; 9] {
    let left = outline.corners[TOP_LEFT]
        .width
        .max(outline.corners[BOTTOM_LEFT].width)
        .ceil() as i32
        + extra_x;
    let right = outline.corners[TOP_RIGHT]
        .width
        .max(outline.corners[BOTTOM_RIGHT].width)
        .ceil() as i32
        + extra_x;
    let top = outline.corners[TOP_LEFT]
        .height
        .max(outline.corners[TOP_RIGHT].height)
        .ceil() as i32
        + extra_y;
    let bottom = outline.corners[BOTTOM_LEFT]
        .height
        .max(outline.corners[BOTTOM_RIGHT].height)
        .ceil() as i32
        + extra_y;

    let center_w = (width - left - right).max(0);
    let center_h = (height - top - bottom).max(0);

    let xs = [0, left, left + center_w];
    let ws = [left, center_w, right];
    let ys = [0, top, top + center_h];
    let hs = [top, center_h, bottom];

    let mut slices = [NineSlice::default(); 9];
    for row in 0..3 {
        for col in 0..3 {
            let rect = Rect::new(xs[col] as f32, ys[row] as f32, ws[col] as f32, hs[row] as f32);
            let area = TextureArea {
                x: rect.x / width as f32,
                y: rect.y / height as f32,
                x2: rect.max_x() / width as f32,
                y2: rect.max_y() / height as f32,
            };
            slices[row * 3 + col] = NineSlice { rect, area };
        }
    }
    slices
}

/// Key memoizing an offscreen render (or fallback upload) across frames.
///
/// Floats are stored as bit patterns so the key hashes; the parent rect only
/// participates when the key is for a child rendered relative to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pointer: usize,
    scale_x: u32,
    scale_y: u32,
    filter: u32,
    pointer_is_child: bool,
    parent_rect: [u32; 4],
}

impl TextureKey {
    pub fn new(pointer: usize, scale_x: f32, scale_y: f32, filter: u32) -> Self {
        Self {
            pointer,
            scale_x: scale_x.to_bits(),
            scale_y: scale_y.to_bits(),
            filter,
            pointer_is_child: false,
            parent_rect: [0; 4],
        }
    }

    pub fn for_child(
        pointer: usize,
        scale_x: f32,
        scale_y: f32,
        filter: u32,
        parent_rect: &Rect,
    ) -> Self {
        Self {
            pointer,
            scale_x: scale_x.to_bits(),
            scale_y: scale_y.to_bits(),
            filter,
            pointer_is_child: true,
            parent_rect: [
                parent_rect.x.to_bits(),
                parent_rect.y.to_bits(),
                parent_rect.width.to_bits(),
                parent_rect.height.to_bits(),
            ],
        }
    }
}

/// A GPU texture the driver owns.
pub struct Texture {
    pub id: u32,
    pub width: i32,
    pub height: i32,
    pub format: u32,
    pub min_filter: u32,
    pub mag_filter: u32,
    /// Frame the texture was last drawn from; eviction watermark input.
    pub last_used_in_frame: i64,
    /// Never evicted (atlas backing textures).
    pub permanent: bool,
    /// External source keeping this upload alive. While the `Weak` upgrades
    /// the texture is pinned; once the source drops it ages out normally.
    pub user: Option<Weak<ImageTexture>>,
    /// Pointer key into the external-texture cache, for reverse removal.
    pub external_ptr: Option<usize>,
    /// Cached nine-slice geometry for shadow textures.
    pub nine_slice: Option<[NineSlice; 9]>,
}

impl Texture {
    pub fn new(
        id: u32,
        width: i32,
        height: i32,
        format: u32,
        min_filter: u32,
        mag_filter: u32,
        frame_id: i64,
    ) -> Self {
        Self {
            id,
            width,
            height,
            format,
            min_filter,
            mag_filter,
            last_used_in_frame: frame_id,
            permanent: false,
            user: None,
            external_ptr: None,
            nine_slice: None,
        }
    }

    pub fn in_use(&self) -> bool {
        self.permanent
            || self.user.as_ref().map(|weak| weak.strong_count() > 0).unwrap_or(false)
    }
}

/// A framebuffer with one color-attachment texture, used for offscreen
/// rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub framebuffer_id: u32,
    pub texture_id: u32,
    pub width: i32,
    pub height: i32,
    pub format: u32,
    pub min_filter: u32,
    pub mag_filter: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucent_scene::CornerSize;

    #[test]
    fn test_texture_key_equality() {
        let a = TextureKey::new(0x1000, 2.0, 2.0, glow::NEAREST);
        let b = TextureKey::new(0x1000, 2.0, 2.0, glow::NEAREST);
        assert_eq!(a, b);
        assert_ne!(a, TextureKey::new(0x1000, 1.0, 2.0, glow::NEAREST));
        assert_ne!(a, TextureKey::new(0x1000, 2.0, 2.0, glow::LINEAR));
    }

    #[test]
    fn test_child_key_includes_parent_rect() {
        let rect_a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let rect_b = Rect::new(0.0, 0.0, 20.0, 10.0);
        let a = TextureKey::for_child(0x1000, 1.0, 1.0, glow::NEAREST, &rect_a);
        let b = TextureKey::for_child(0x1000, 1.0, 1.0, glow::NEAREST, &rect_b);
        assert_ne!(a, b);
        assert_ne!(a, TextureKey::new(0x1000, 1.0, 1.0, glow::NEAREST));
    }

    #[test]
    fn test_nine_slice_partition_covers_texture() {
        let outline = RoundedRect::new(
            Rect::new(0.0, 0.0, 100.0, 80.0),
            [CornerSize::new(10.0, 10.0); 4],
        );
        let slices = nine_slice(&outline, 100, 80, 4, 4);

        // No overlap and full coverage along each axis.
        assert_eq!(slices[NINE_SLICE_TOP_LEFT].rect.width, 14.0);
        assert_eq!(slices[NINE_SLICE_TOP_CENTER].rect.x, 14.0);
        assert_eq!(slices[NINE_SLICE_TOP_RIGHT].rect.max_x(), 100.0);
        assert_eq!(slices[NINE_SLICE_BOTTOM_LEFT].rect.max_y(), 80.0);
        assert!(slices[NINE_SLICE_CENTER].is_visible());
        assert_eq!(slices[NINE_SLICE_CENTER].rect, Rect::new(14.0, 14.0, 72.0, 52.0));
    }

    #[test]
    fn test_texture_in_use_tracks_weak_source() {
        use lucent_scene::{ColorState, MemoryFormat};
        use std::sync::Arc;

        let source = Arc::new(ImageTexture::from_memory(
            1,
            1,
            MemoryFormat::Rgba8Premultiplied,
            ColorState::SrgbLinear,
            4,
            vec![0; 4],
        ));
        let mut texture = Texture::new(1, 1, 1, glow::RGBA8, glow::LINEAR, glow::LINEAR, 0);
        texture.user = Some(Arc::downgrade(&source));
        assert!(texture.in_use());
        drop(source);
        assert!(!texture.in_use());
    }
}
