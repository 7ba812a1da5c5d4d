//! External texture sources handed to the renderer.

/// Pixel layout of a memory texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat {
    /// 8-bit RGBA, alpha premultiplied.
    Rgba8Premultiplied,
    /// 8-bit RGBA, straight alpha.
    Rgba8,
    /// 8-bit BGRA, alpha premultiplied.
    Bgra8Premultiplied,
    /// 8-bit BGRA, straight alpha.
    Bgra8,
}

impl MemoryFormat {
    pub fn is_premultiplied(&self) -> bool {
        matches!(self, MemoryFormat::Rgba8Premultiplied | MemoryFormat::Bgra8Premultiplied)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Color space of a texture's pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorState {
    /// Non-linear sRGB; needs a linearize pass before compositing.
    Srgb,
    /// Linear sRGB; usable directly.
    SrgbLinear,
}

/// Backing storage of an [`ImageTexture`].
pub enum TextureData {
    /// CPU pixels to be uploaded.
    Memory {
        format: MemoryFormat,
        color_state: ColorState,
        stride: usize,
        pixels: Vec<u8>,
    },
    /// A texture that already lives on the GPU.
    ///
    /// `share_token` identifies the GL context group the id belongs to; the
    /// renderer only adopts the id when the token matches its own context
    /// (the "shared-with" predicate of the context abstraction).
    Gl {
        id: u32,
        share_token: u64,
        color_state: ColorState,
        premultiplied: bool,
        flipped: bool,
    },
}

/// An immutable external texture. Identity (the `Arc` pointer) keys the
/// renderer's upload caches, so reusing the same `Arc` across frames is what
/// makes the caches effective.
pub struct ImageTexture {
    pub width: u32,
    pub height: u32,
    pub data: TextureData,
}

impl ImageTexture {
    pub fn from_memory(
        width: u32,
        height: u32,
        format: MemoryFormat,
        color_state: ColorState,
        stride: usize,
        pixels: Vec<u8>,
    ) -> Self {
        debug_assert!(stride >= width as usize * format.bytes_per_pixel());
        debug_assert!(pixels.len() >= stride * height as usize);
        Self { width, height, data: TextureData::Memory { format, color_state, stride, pixels } }
    }

    pub fn from_gl(
        width: u32,
        height: u32,
        id: u32,
        share_token: u64,
        color_state: ColorState,
        premultiplied: bool,
        flipped: bool,
    ) -> Self {
        Self {
            width,
            height,
            data: TextureData::Gl { id, share_token, color_state, premultiplied, flipped },
        }
    }

    pub fn is_gl(&self) -> bool {
        matches!(self.data, TextureData::Gl { .. })
    }
}

impl std::fmt::Debug for ImageTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("is_gl", &self.is_gl())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_format_premultiplied() {
        assert!(MemoryFormat::Rgba8Premultiplied.is_premultiplied());
        assert!(!MemoryFormat::Bgra8.is_premultiplied());
    }

    #[test]
    fn test_from_memory() {
        let t = ImageTexture::from_memory(
            2,
            2,
            MemoryFormat::Rgba8,
            ColorState::Srgb,
            8,
            vec![0u8; 16],
        );
        assert!(!t.is_gl());
        assert_eq!(t.width, 2);
    }
}
