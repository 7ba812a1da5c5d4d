//! Batch records and their side arrays.
//!
//! A batch is fixed-size; everything variable (vertices, texture binds,
//! uniform updates) lives in packed side arrays referenced by offset and
//! count. Batches link into an execution-order list through 16-bit indices
//! into the batch array, so the array can reallocate and the reorder pass
//! can unlink/insert in O(1).

use bitflags::bitflags;
use half::f16;

use crate::uniform::UniformInfo;

/// Vertices per emitted quad (two triangles).
pub const VERTICES_PER_QUAD: usize = 6;

/// Largest number of batches a frame can record; 16-bit link indices.
pub const MAX_BATCHES: usize = i16::MAX as usize;

bitflags! {
    /// Buffer bits a clear batch clears.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const COLOR = glow::COLOR_BUFFER_BIT;
        const DEPTH = glow::DEPTH_BUFFER_BIT;
        const STENCIL = glow::STENCIL_BUFFER_BIT;
    }
}

impl ClearMask {
    pub fn all_buffers() -> Self {
        Self::COLOR | Self::DEPTH | Self::STENCIL
    }
}

/// One interleaved vertex: position, uv (or packed second color), color and
/// color2 as half floats. 32 bytes, submitted verbatim to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DrawVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f16; 4],
    pub color2: [f16; 4],
}

impl DrawVertex {
    pub const STRIDE: i32 = std::mem::size_of::<DrawVertex>() as i32;

    pub fn new(position: [f32; 2], uv: [f32; 2], color: [f16; 4]) -> Self {
        Self { position, uv, color, color2: [f16::ZERO; 4] }
    }
}

/// A texture that must sit on a texture unit when a draw executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBind {
    /// Texture unit index (0-based).
    pub unit: u32,
    /// GL texture id.
    pub id: u32,
}

/// A uniform that must be uploaded before a draw executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandUniform {
    pub location: u32,
    pub info: UniformInfo,
}

/// Payload of a draw batch: where its vertices, uniforms and binds live.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawInfo {
    pub framebuffer: u32,
    pub vbo_offset: u32,
    pub vbo_count: u32,
    pub uniform_offset: u32,
    pub uniform_count: u32,
    pub bind_offset: u32,
    pub bind_count: u32,
}

/// What a batch does when executed.
#[derive(Debug, Clone, Copy)]
pub enum BatchPayload {
    Clear { bits: ClearMask, framebuffer: u32 },
    Draw(DrawInfo),
}

/// One recorded unit of GPU work.
#[derive(Debug, Clone, Copy)]
pub struct Batch {
    /// Program id for draws, 0 for clears; part of the merge key.
    pub program: u32,
    pub viewport_width: u16,
    pub viewport_height: u16,
    /// Link to the next batch in execution order; -1 terminates.
    pub next_batch_index: i16,
    /// Link to the previous batch; the reorder pass walks backwards.
    pub prev_batch_index: i16,
    pub payload: BatchPayload,
}

impl Batch {
    pub fn framebuffer(&self) -> u32 {
        match self.payload {
            BatchPayload::Clear { framebuffer, .. } => framebuffer,
            BatchPayload::Draw(draw) => draw.framebuffer,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self.payload, BatchPayload::Draw(_))
    }

    pub fn draw(&self) -> &DrawInfo {
        match &self.payload {
            BatchPayload::Draw(draw) => draw,
            BatchPayload::Clear { .. } => panic!("clear batch has no draw info"),
        }
    }

    pub fn draw_mut(&mut self) -> &mut DrawInfo {
        match &mut self.payload {
            BatchPayload::Draw(draw) => draw,
            BatchPayload::Clear { .. } => panic!("clear batch has no draw info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<DrawVertex>(), 32);
        assert_eq!(DrawVertex::STRIDE, 32);
    }

    #[test]
    fn test_clear_mask_all() {
        let mask = ClearMask::all_buffers();
        assert!(mask.contains(ClearMask::COLOR));
        assert!(mask.contains(ClearMask::DEPTH));
        assert!(mask.contains(ClearMask::STENCIL));
    }

    #[test]
    fn test_batch_framebuffer_accessor() {
        let batch = Batch {
            program: 0,
            viewport_width: 10,
            viewport_height: 10,
            next_batch_index: -1,
            prev_batch_index: -1,
            payload: BatchPayload::Clear { bits: ClearMask::COLOR, framebuffer: 7 },
        };
        assert_eq!(batch.framebuffer(), 7);
        assert!(!batch.is_draw());
    }
}
