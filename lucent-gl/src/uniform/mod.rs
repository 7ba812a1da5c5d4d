//! Deduplicating store for per-program uniform values.
//!
//! Values live in one append-only arena shared by every program. A program
//! registers a fixed table of up to 32 mappings (key → GL location); each
//! write compares against the stored bytes and only lands when the value
//! actually changed. Because offsets identify values, the command queue can
//! byte-compare two draw snapshots to decide whether batches merge.
//!
//! Offsets are in 4-byte slots so they fit the packed 21-bit field of
//! [`UniformInfo`]. Slot 0 is reserved as an all-zero sentinel; a mapping
//! that was never written keeps offset 0 and reads as zeros.

#[cfg(test)]
mod tests;

use glam::Mat4;
use lucent_scene::{Color, RoundedRect};

use crate::gl::GlContext;

/// Maximum mappings per program (keys are 0..31).
pub const MAX_UNIFORMS_PER_PROGRAM: usize = 32;

const APPLY_HASH_SIZE: usize = 512;
/// Slots kept zeroed at the start of the arena for the offset-0 sentinel.
const RESERVED_SLOTS: usize = 4;
const OFFSET_BITS: u32 = 21;

/// Value formats a uniform slot can hold. Each has a fixed per-element byte
/// size; the `-V` forms carry `array_count` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UniformFormat {
    F1 = 1,
    F2,
    F3,
    F4,
    F1v,
    F2v,
    F3v,
    F4v,
    I1,
    I2,
    I3,
    I4,
    Ui1,
    Texture,
    Matrix,
    RoundedRect,
    Color,
}

impl UniformFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::F1,
            2 => Self::F2,
            3 => Self::F3,
            4 => Self::F4,
            5 => Self::F1v,
            6 => Self::F2v,
            7 => Self::F3v,
            8 => Self::F4v,
            9 => Self::I1,
            10 => Self::I2,
            11 => Self::I3,
            12 => Self::I4,
            13 => Self::Ui1,
            14 => Self::Texture,
            15 => Self::Matrix,
            16 => Self::RoundedRect,
            17 => Self::Color,
            _ => return None,
        })
    }

    /// Byte size of a single element of this format.
    pub fn element_size(self) -> usize {
        match self {
            Self::F1 | Self::F1v | Self::I1 | Self::Ui1 | Self::Texture => 4,
            Self::F2 | Self::F2v | Self::I2 => 8,
            Self::F3 | Self::F3v | Self::I3 => 12,
            Self::F4 | Self::F4v | Self::I4 | Self::Color => 16,
            Self::Matrix => 64,
            Self::RoundedRect => 48,
        }
    }
}

/// Packed descriptor of a stored uniform value:
/// initial:1 | format:5 | array_count:5 | offset:21 (in 4-byte slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformInfo(pub u32);

impl UniformInfo {
    pub const INITIAL: UniformInfo = UniformInfo(1);

    pub fn new(initial: bool, format: u32, array_count: u32, offset: u32) -> Self {
        debug_assert!(format < 32);
        debug_assert!(array_count < 32);
        debug_assert!(offset < (1 << OFFSET_BITS));
        Self((initial as u32) | (format << 1) | (array_count << 6) | (offset << 11))
    }

    pub fn initial(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn format_raw(self) -> u32 {
        (self.0 >> 1) & 0x1f
    }

    pub fn format(self) -> Option<UniformFormat> {
        UniformFormat::from_u32(self.format_raw())
    }

    pub fn array_count(self) -> u32 {
        (self.0 >> 6) & 0x1f
    }

    /// Offset into the arena, in 4-byte slots.
    pub fn offset(self) -> u32 {
        self.0 >> 11
    }

    /// Total byte size of the stored value.
    pub fn byte_size(self) -> usize {
        match self.format() {
            Some(format) => format.element_size() * (self.array_count().max(1) as usize),
            None => 0,
        }
    }
}

/// One (key → location) mapping of a program.
#[derive(Debug, Clone, Copy)]
pub struct UniformMapping {
    pub info: UniformInfo,
    pub stamp: u32,
    pub location: i32,
}

/// Per-program uniform table.
#[derive(Debug)]
pub struct UniformProgram {
    pub program_id: u32,
    pub has_attachments: bool,
    pub n_uniforms: u32,
    pub mappings: Vec<UniformMapping>,
}

/// Index of a registered [`UniformProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformProgramId(pub(crate) usize);

/// The store itself. See module docs.
pub struct UniformState {
    programs: Vec<UniformProgram>,
    /// Arena of 4-byte slots; `pos` is the bump pointer in slots.
    values: Vec<u32>,
    pos: usize,
    apply_hash: [u32; APPLY_HASH_SIZE],
}

impl Default for UniformState {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformState {
    pub fn new() -> Self {
        Self {
            programs: Vec::new(),
            values: vec![0; 1024],
            pos: RESERVED_SLOTS,
            apply_hash: [0; APPLY_HASH_SIZE],
        }
    }

    /// Registers a program's mapping table. `locations[key]` is the GL
    /// uniform location for that key, -1 when optimized out.
    pub fn register_program(
        &mut self,
        program_id: u32,
        locations: &[i32],
        has_attachments: bool,
    ) -> UniformProgramId {
        debug_assert!(locations.len() <= MAX_UNIFORMS_PER_PROGRAM);
        let mappings = locations
            .iter()
            .map(|&location| UniformMapping {
                info: UniformInfo::INITIAL,
                stamp: 0,
                location,
            })
            .collect::<Vec<_>>();
        let n_uniforms = locations.iter().filter(|&&l| l >= 0).count() as u32;
        self.programs.push(UniformProgram { program_id, has_attachments, n_uniforms, mappings });
        UniformProgramId(self.programs.len() - 1)
    }

    pub fn program(&self, id: UniformProgramId) -> &UniformProgram {
        &self.programs[id.0]
    }

    pub fn value_bytes(&self, offset_slots: u32, len: usize) -> &[u8] {
        let bytes: &[u8] = bytemuck::cast_slice(&self.values);
        let start = offset_slots as usize * 4;
        &bytes[start..start + len]
    }

    fn alloc(&mut self, size: usize) -> u32 {
        let align_slots = if size > 8 {
            4
        } else if size > 4 {
            2
        } else {
            1
        };
        let pos = (self.pos + align_slots - 1) & !(align_slots - 1);
        let slots = size.div_ceil(4);
        while pos + slots > self.values.len() {
            let new_len = self.values.len() * 2;
            self.values.resize(new_len, 0);
        }
        self.pos = pos + slots;
        debug_assert!(pos < (1 << OFFSET_BITS) as usize);
        pos as u32
    }

    /// Core write path shared by all typed setters. No-ops when the location
    /// is optimized out, the caller's stamp is unchanged, or the bytes equal
    /// the stored value. Writes in place while `initial` is set and the
    /// shape matches; otherwise appends a new slot so earlier snapshots stay
    /// valid.
    fn set_value(
        &mut self,
        prog: UniformProgramId,
        key: usize,
        stamp: u32,
        format: UniformFormat,
        array_count: u32,
        bytes: &[u8],
    ) {
        let mapping = self.programs[prog.0].mappings[key];
        if mapping.location < 0 {
            return;
        }
        if stamp != 0 && stamp == mapping.stamp {
            return;
        }
        let info = mapping.info;
        let shape_matches =
            info.format_raw() == format as u32 && info.array_count() == array_count;
        if shape_matches && info.offset() != 0 {
            let stored = self.value_bytes(info.offset(), bytes.len());
            if stored == bytes {
                if !info.initial() {
                    return;
                }
                // An initial slot holding the right bytes still needs the
                // initial bit cleared so it gets snapshotted.
            } else if info.initial() {
                // In-place overwrite is allowed until the first snapshot.
                let start = info.offset() as usize * 4;
                let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.values);
                dst[start..start + bytes.len()].copy_from_slice(bytes);
            } else {
                let offset = self.alloc(bytes.len());
                let start = offset as usize * 4;
                let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.values);
                dst[start..start + bytes.len()].copy_from_slice(bytes);
                let m = &mut self.programs[prog.0].mappings[key];
                m.info = UniformInfo::new(false, format as u32, array_count, offset);
                m.stamp = stamp;
                return;
            }
            let m = &mut self.programs[prog.0].mappings[key];
            m.info = UniformInfo::new(false, format as u32, array_count, info.offset());
            m.stamp = stamp;
        } else {
            let offset = self.alloc(bytes.len());
            let start = offset as usize * 4;
            let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.values);
            dst[start..start + bytes.len()].copy_from_slice(bytes);
            let m = &mut self.programs[prog.0].mappings[key];
            m.info = UniformInfo::new(false, format as u32, array_count, offset);
            m.stamp = stamp;
        }
    }

    pub fn set_1f(&mut self, prog: UniformProgramId, key: usize, stamp: u32, v: f32) {
        self.set_value(prog, key, stamp, UniformFormat::F1, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_2f(&mut self, prog: UniformProgramId, key: usize, stamp: u32, v0: f32, v1: f32) {
        self.set_value(prog, key, stamp, UniformFormat::F2, 1, bytemuck::bytes_of(&[v0, v1]));
    }

    pub fn set_3f(
        &mut self,
        prog: UniformProgramId,
        key: usize,
        stamp: u32,
        v0: f32,
        v1: f32,
        v2: f32,
    ) {
        self.set_value(prog, key, stamp, UniformFormat::F3, 1, bytemuck::bytes_of(&[v0, v1, v2]))
    }

    pub fn set_4f(
        &mut self,
        prog: UniformProgramId,
        key: usize,
        stamp: u32,
        v: [f32; 4],
    ) {
        self.set_value(prog, key, stamp, UniformFormat::F4, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_1i(&mut self, prog: UniformProgramId, key: usize, stamp: u32, v: i32) {
        self.set_value(prog, key, stamp, UniformFormat::I1, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_2i(&mut self, prog: UniformProgramId, key: usize, stamp: u32, v0: i32, v1: i32) {
        self.set_value(prog, key, stamp, UniformFormat::I2, 1, bytemuck::bytes_of(&[v0, v1]));
    }

    pub fn set_1ui(&mut self, prog: UniformProgramId, key: usize, stamp: u32, v: u32) {
        self.set_value(prog, key, stamp, UniformFormat::Ui1, 1, bytemuck::bytes_of(&v));
    }

    /// `unit` is the texture unit index the sampler uniform should read.
    pub fn set_texture(&mut self, prog: UniformProgramId, key: usize, stamp: u32, unit: u32) {
        self.set_value(prog, key, stamp, UniformFormat::Texture, 1, bytemuck::bytes_of(&unit));
    }

    pub fn set_color(&mut self, prog: UniformProgramId, key: usize, stamp: u32, color: &Color) {
        let v = color.to_array();
        self.set_value(prog, key, stamp, UniformFormat::Color, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_matrix(&mut self, prog: UniformProgramId, key: usize, stamp: u32, matrix: &Mat4) {
        let v = matrix.to_cols_array();
        self.set_value(prog, key, stamp, UniformFormat::Matrix, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_rounded_rect(
        &mut self,
        prog: UniformProgramId,
        key: usize,
        stamp: u32,
        rect: &RoundedRect,
    ) {
        let v = rect.to_floats();
        self.set_value(prog, key, stamp, UniformFormat::RoundedRect, 1, bytemuck::bytes_of(&v));
    }

    pub fn set_1fv(&mut self, prog: UniformProgramId, key: usize, stamp: u32, values: &[f32]) {
        debug_assert!(!values.is_empty());
        self.set_value(
            prog,
            key,
            stamp,
            UniformFormat::F1v,
            values.len() as u32,
            bytemuck::cast_slice(values),
        );
    }

    pub fn set_2fv(&mut self, prog: UniformProgramId, key: usize, stamp: u32, values: &[f32]) {
        self.set_value(
            prog,
            key,
            stamp,
            UniformFormat::F2v,
            (values.len() / 2) as u32,
            bytemuck::cast_slice(values),
        );
    }

    pub fn set_3fv(&mut self, prog: UniformProgramId, key: usize, stamp: u32, values: &[f32]) {
        self.set_value(
            prog,
            key,
            stamp,
            UniformFormat::F3v,
            (values.len() / 3) as u32,
            bytemuck::cast_slice(values),
        );
    }

    pub fn set_4fv(&mut self, prog: UniformProgramId, key: usize, stamp: u32, values: &[f32]) {
        self.set_value(
            prog,
            key,
            stamp,
            UniformFormat::F4v,
            (values.len() / 4) as u32,
            bytemuck::cast_slice(values),
        );
    }

    /// Pushes a recorded value into the GL pipeline. A direct-mapped hash of
    /// the last applied descriptor per (program, location) bucket skips
    /// redundant uploads.
    pub fn apply(&mut self, gl: &dyn GlContext, program_id: u32, location: u32, info: UniformInfo) {
        let index = fmix(program_id, location) as usize % APPLY_HASH_SIZE;
        if self.apply_hash[index] == info.0 {
            return;
        }
        self.apply_hash[index] = info.0;

        let Some(format) = info.format() else { return };
        let len = info.byte_size();
        let bytes = self.value_bytes(info.offset(), len);
        let location = location as i32;
        match format {
            UniformFormat::F1 | UniformFormat::F1v => {
                gl.uniform_1fv(location, bytemuck::cast_slice(bytes))
            }
            UniformFormat::F2 | UniformFormat::F2v => {
                gl.uniform_2fv(location, bytemuck::cast_slice(bytes))
            }
            UniformFormat::F3 | UniformFormat::F3v => {
                gl.uniform_3fv(location, bytemuck::cast_slice(bytes))
            }
            UniformFormat::F4 | UniformFormat::F4v | UniformFormat::Color => {
                gl.uniform_4fv(location, bytemuck::cast_slice(bytes))
            }
            UniformFormat::I1 | UniformFormat::Texture => {
                gl.uniform_1iv(location, bytemuck::cast_slice(bytes))
            }
            UniformFormat::I2 => gl.uniform_2iv(location, bytemuck::cast_slice(bytes)),
            UniformFormat::I3 => gl.uniform_3iv(location, bytemuck::cast_slice(bytes)),
            UniformFormat::I4 => gl.uniform_4iv(location, bytemuck::cast_slice(bytes)),
            UniformFormat::Ui1 => gl.uniform_1uiv(location, bytemuck::cast_slice(bytes)),
            UniformFormat::Matrix => gl.uniform_matrix_4fv(location, bytemuck::cast_slice(bytes)),
            UniformFormat::RoundedRect => {
                // The rounded-rect uniform is declared as vec4[3].
                gl.uniform_4fv(location, bytemuck::cast_slice(bytes))
            }
        }
    }

    /// Resets the arena and the apply hash for the next frame. Mapping
    /// tables (locations) survive; values do not.
    pub fn end_frame(&mut self) {
        for program in &mut self.programs {
            for mapping in &mut program.mappings {
                mapping.info = UniformInfo::INITIAL;
                mapping.stamp = 0;
            }
        }
        self.pos = RESERVED_SLOTS;
        self.values[..RESERVED_SLOTS].fill(0);
        self.apply_hash = [0; APPLY_HASH_SIZE];
    }
}

/// Finalizing mix of (program, location) used to index the apply hash.
fn fmix(program: u32, location: u32) -> u32 {
    let mut h = (program << 16) | location;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
