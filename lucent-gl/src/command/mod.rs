//! The command queue: records draw/clear batches, merges adjacent
//! compatible draws, reorders batches by framebuffer and finally executes
//! them against the GL context.
//!
//! Lifecycle per frame:
//! `begin_frame → (begin_draw / end_draw / split_draw / clear)* → execute →
//! end_frame`. Recording is strictly single-threaded and `begin_draw` /
//! `end_draw` pairs never nest.

mod batch;
#[cfg(test)]
mod tests;

pub use batch::{
    Batch, BatchPayload, ClearMask, CommandBind, CommandUniform, DrawInfo, DrawVertex,
    MAX_BATCHES, VERTICES_PER_QUAD,
};

use std::cell::RefCell;
use std::rc::Rc;

use lucent_scene::Rect;

use crate::attachment::AttachmentState;
use crate::gl::GlContext;
use crate::uniform::{UniformProgramId, UniformState};

/// See module docs.
pub struct CommandQueue {
    gl: Rc<dyn GlContext>,

    /// All recorded batches in recording order. Link indices express the
    /// execution order after reordering.
    batches: Vec<Batch>,

    /// Interleaved vertex data, submitted once per frame.
    vertices: Vec<DrawVertex>,

    /// Desired framebuffer/texture bindings, snapshotted at end_draw.
    pub attachments: AttachmentState,

    /// Uniform store shared with the other command queue of the driver so
    /// program registrations carry across frames.
    pub uniforms: Rc<RefCell<UniformState>>,

    /// Program of the draw currently being recorded.
    program: Option<UniformProgramId>,

    batch_binds: Vec<CommandBind>,
    batch_uniforms: Vec<CommandUniform>,

    max_texture_size: i32,

    tail_batch_index: i16,
    head_batch_index: i16,

    /// Largest framebuffer id seen this frame, sizing the reorder scratch.
    fbo_max: u32,

    pub n_uploads: u32,

    in_frame: bool,
    in_draw: bool,
    /// The current draw is being dropped because the batch limit was hit.
    skip_current_draw: bool,
    have_truncated: bool,
}

impl CommandQueue {
    pub fn new(gl: Rc<dyn GlContext>, uniforms: Option<Rc<RefCell<UniformState>>>) -> Self {
        let max_texture_size = gl.max_texture_size();
        Self {
            gl,
            batches: Vec::with_capacity(128),
            vertices: Vec::with_capacity(1024),
            attachments: AttachmentState::new(),
            uniforms: uniforms.unwrap_or_else(|| Rc::new(RefCell::new(UniformState::new()))),
            program: None,
            batch_binds: Vec::with_capacity(1024),
            batch_uniforms: Vec::with_capacity(2048),
            max_texture_size,
            tail_batch_index: -1,
            head_batch_index: -1,
            fbo_max: 0,
            n_uploads: 0,
            in_frame: false,
            in_draw: false,
            skip_current_draw: false,
            have_truncated: false,
        }
    }

    pub fn gl(&self) -> &Rc<dyn GlContext> {
        &self.gl
    }

    pub fn make_current(&self) {
        self.gl.make_current();
    }

    pub fn max_texture_size(&self) -> i32 {
        self.max_texture_size
    }

    pub fn n_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn batch(&self, index: usize) -> &Batch {
        &self.batches[index]
    }

    pub fn head_batch_index(&self) -> i16 {
        self.head_batch_index
    }

    /// Batch indices in execution (linked-list) order.
    pub fn linked_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.batches.len());
        let mut index = self.head_batch_index;
        while index >= 0 {
            order.push(index as usize);
            index = self.batches[index as usize].next_batch_index;
        }
        order
    }

    pub fn bind(&self, index: usize) -> CommandBind {
        self.batch_binds[index]
    }

    pub fn uniform_ref(&self, index: usize) -> CommandUniform {
        self.batch_uniforms[index]
    }

    pub fn vertex(&self, index: usize) -> DrawVertex {
        self.vertices[index]
    }

    fn will_ignore_batch(&mut self) -> bool {
        if self.batches.len() < MAX_BATCHES {
            return false;
        }
        if !self.have_truncated {
            self.have_truncated = true;
            log::warn!("GL command queue too large, truncating further batches");
        }
        true
    }

    /// Requests `id` as the target framebuffer for subsequent draws.
    /// Returns the previously requested id so callers can restore it.
    pub fn bind_framebuffer(&mut self, id: u32) -> u32 {
        self.attachments.bind_framebuffer(id)
    }

    pub fn begin_frame(&mut self) {
        debug_assert!(self.batches.is_empty());
        self.gl.make_current();
        self.fbo_max = 0;
        self.tail_batch_index = -1;
        self.head_batch_index = -1;
        self.in_frame = true;
    }

    /// Post-frame cleanup, separated from `execute` so the surface swap can
    /// happen as soon as possible.
    pub fn end_frame(&mut self) {
        self.gl.make_current();
        self.uniforms.borrow_mut().end_frame();

        // Unbind any textures still attached so end-of-frame releases can
        // actually free them.
        for unit in 0..self.attachments.textures.len() {
            if self.attachments.textures[unit].id != 0 {
                self.gl.active_texture(unit as u32);
                self.gl.bind_texture(self.attachments.textures[unit].target, 0);
                self.attachments.reset_texture(unit);
            }
        }

        self.batches.clear();
        self.vertices.clear();
        self.batch_binds.clear();
        self.batch_uniforms.clear();
        self.n_uploads = 0;
        self.tail_batch_index = -1;
        self.head_batch_index = -1;
        self.in_frame = false;
    }

    pub fn begin_draw(&mut self, program: UniformProgramId, width: u16, height: u16) {
        debug_assert!(!self.in_draw);
        self.in_draw = true;

        if self.will_ignore_batch() {
            self.skip_current_draw = true;
            self.program = Some(program);
            return;
        }
        self.skip_current_draw = false;
        self.program = Some(program);

        let program_id = self.uniforms.borrow().program(program).program_id;
        self.batches.push(Batch {
            program: program_id,
            viewport_width: width,
            viewport_height: height,
            next_batch_index: -1,
            prev_batch_index: self.tail_batch_index,
            payload: BatchPayload::Draw(DrawInfo {
                framebuffer: 0,
                vbo_offset: self.vertices.len() as u32,
                vbo_count: 0,
                uniform_offset: self.batch_uniforms.len() as u32,
                uniform_count: 0,
                bind_offset: self.batch_binds.len() as u32,
                bind_count: 0,
            }),
        });
    }

    /// Appends one quad's worth of zeroed vertices to the current draw and
    /// returns them for filling in.
    pub fn add_vertices(&mut self) -> &mut [DrawVertex] {
        debug_assert!(self.in_draw);
        let start = self.vertices.len();
        self.vertices.resize(start + VERTICES_PER_QUAD, DrawVertex::new([0.0; 2], [0.0; 2], Default::default()));
        if !self.skip_current_draw {
            self.batches.last_mut().unwrap().draw_mut().vbo_count += VERTICES_PER_QUAD as u32;
        }
        &mut self.vertices[start..start + VERTICES_PER_QUAD]
    }

    /// Reserves `count` quads worth of vertices without growing the current
    /// draw's vertex count; callers account via [`Self::add_tail_vertex_count`].
    pub fn reserve_quads(&mut self, count: usize) -> usize {
        let start = self.vertices.len();
        self.vertices.resize(
            start + count * VERTICES_PER_QUAD,
            DrawVertex::new([0.0; 2], [0.0; 2], Default::default()),
        );
        start
    }

    /// Gives back reserved vertices that ended up unused.
    pub fn retract_vertices(&mut self, count: usize) {
        let len = self.vertices.len();
        self.vertices.truncate(len - count);
    }

    pub fn write_vertices(&mut self, start: usize, data: &[DrawVertex]) {
        self.vertices[start..start + data.len()].copy_from_slice(data);
    }

    pub fn add_tail_vertex_count(&mut self, count: u32) {
        if !self.skip_current_draw {
            self.batches.last_mut().unwrap().draw_mut().vbo_count += count;
        }
    }

    pub fn tail_draw(&self) -> DrawInfo {
        *self.batches.last().unwrap().draw()
    }

    /// Rewrites the in-progress draw's vertex offset. Needed by callers that
    /// reserve all vertices up front and split the draw mid-range: the new
    /// batch must point at the previous batch's end, not the buffer's end.
    pub fn set_tail_vbo_offset(&mut self, offset: u32) {
        if !self.skip_current_draw {
            self.batches.last_mut().unwrap().draw_mut().vbo_offset = offset;
        }
    }

    /// Snapshots the non-zero texture bindings into `batch_binds`.
    fn snapshot_attachments(&mut self) -> (u32, u32) {
        let offset = self.batch_binds.len() as u32;
        for (unit, slot) in self.attachments.textures.iter().enumerate() {
            if slot.id != 0 {
                self.batch_binds.push(CommandBind { unit: unit as u32, id: slot.id });
            }
        }
        (offset, self.batch_binds.len() as u32 - offset)
    }

    /// Snapshots every written uniform of the current program into
    /// `batch_uniforms`.
    fn snapshot_uniforms(&mut self) -> (u32, u32) {
        let offset = self.batch_uniforms.len() as u32;
        let uniforms = self.uniforms.borrow();
        let program = uniforms.program(self.program.unwrap());
        for mapping in &program.mappings {
            if !mapping.info.initial() && mapping.info.format_raw() != 0 && mapping.location >= 0 {
                self.batch_uniforms
                    .push(CommandUniform { location: mapping.location as u32, info: mapping.info });
            }
        }
        (offset, self.batch_uniforms.len() as u32 - offset)
    }

    /// Byte-equality of two draw snapshots: binds element-wise, uniforms by
    /// shape plus arena offset or stored bytes.
    fn snapshots_equal(&self, first: &DrawInfo, second: &DrawInfo) -> bool {
        if first.bind_count != second.bind_count || first.uniform_count != second.uniform_count {
            return false;
        }

        for i in 0..first.bind_count {
            let a = self.batch_binds[(first.bind_offset + i) as usize];
            let b = self.batch_binds[(second.bind_offset + i) as usize];
            if a != b {
                return false;
            }
        }

        let uniforms = self.uniforms.borrow();
        for i in 0..first.uniform_count {
            let a = self.batch_uniforms[(first.uniform_offset + i) as usize];
            let b = self.batch_uniforms[(second.uniform_offset + i) as usize];

            // Same arena offset means the same memory.
            if a.info.offset() == b.info.offset() {
                continue;
            }
            if a.info.format_raw() != b.info.format_raw()
                || a.info.array_count() != b.info.array_count()
            {
                return false;
            }
            let len = a.info.byte_size();
            if uniforms.value_bytes(a.info.offset(), len)
                != uniforms.value_bytes(b.info.offset(), len)
            {
                return false;
            }
        }

        true
    }

    fn enqueue_batch(&mut self) {
        let index = (self.batches.len() - 1) as i16;
        if self.head_batch_index == -1 {
            self.head_batch_index = index;
        }
        if self.tail_batch_index != -1 {
            self.batches[self.tail_batch_index as usize].next_batch_index = index;
        }
        self.tail_batch_index = index;
    }

    pub fn end_draw(&mut self) {
        debug_assert!(self.in_draw);
        self.in_draw = false;

        if self.skip_current_draw {
            self.skip_current_draw = false;
            self.program = None;
            return;
        }

        if self.batches.last().unwrap().draw().vbo_count == 0 {
            self.batches.pop();
            self.program = None;
            return;
        }

        // Snapshot the destination framebuffer and current GPU state.
        let framebuffer = self.attachments.fbo.id;
        self.attachments.fbo.changed = false;
        self.fbo_max = self.fbo_max.max(framebuffer);

        let (uniform_offset, uniform_count) = self.snapshot_uniforms();
        let has_attachments =
            self.uniforms.borrow().program(self.program.unwrap()).has_attachments;
        let (bind_offset, bind_count) =
            if has_attachments { self.snapshot_attachments() } else { (0, 0) };

        {
            let draw = self.batches.last_mut().unwrap().draw_mut();
            draw.framebuffer = framebuffer;
            draw.uniform_offset = uniform_offset;
            draw.uniform_count = uniform_count;
            draw.bind_offset = bind_offset;
            draw.bind_count = bind_count;
        }

        // Chain onto the previous batch when nothing relevant changed.
        let merged = if self.batches.len() > 1 {
            let batch = *self.batches.last().unwrap();
            let last = &self.batches[self.batches.len() - 2];
            last.is_draw()
                && last.program == batch.program
                && last.viewport_width == batch.viewport_width
                && last.viewport_height == batch.viewport_height
                && last.draw().framebuffer == batch.draw().framebuffer
                && last.draw().vbo_offset + last.draw().vbo_count == batch.draw().vbo_offset
                && last.draw().vbo_count + batch.draw().vbo_count <= u16::MAX as u32
                && self.snapshots_equal(last.draw(), batch.draw())
        } else {
            false
        };

        if merged {
            let count = self.batches.pop().unwrap().draw().vbo_count;
            self.batches.last_mut().unwrap().draw_mut().vbo_count += count;
        } else {
            self.enqueue_batch();
        }

        self.program = None;
    }

    /// `end_draw` followed by `begin_draw` with the same program and
    /// viewport. Used to split one conceptual draw into several underlying
    /// draws (different texture per range).
    pub fn split_draw(&mut self) {
        debug_assert!(self.in_draw);
        let program = self.program.unwrap();
        let (width, height) = if self.skip_current_draw {
            (0, 0)
        } else {
            let batch = self.batches.last().unwrap();
            (batch.viewport_width, batch.viewport_height)
        };
        self.end_draw();
        self.begin_draw(program, width, height);
    }

    /// Appends a clear of the current framebuffer. Never merged with draws.
    pub fn clear(&mut self, mask: ClearMask, viewport: &Rect) {
        debug_assert!(!self.in_draw);
        if self.will_ignore_batch() {
            return;
        }
        let mask = if mask.is_empty() { ClearMask::all_buffers() } else { mask };
        let framebuffer = self.attachments.fbo.id;
        self.fbo_max = self.fbo_max.max(framebuffer);
        self.batches.push(Batch {
            program: 0,
            viewport_width: viewport.width as u16,
            viewport_height: viewport.height as u16,
            next_batch_index: -1,
            prev_batch_index: self.tail_batch_index,
            payload: BatchPayload::Clear { bits: mask, framebuffer },
        });
        self.enqueue_batch();
        self.attachments.fbo.changed = false;
    }

    fn unlink(&mut self, index: i16) {
        let (prev, next) = {
            let batch = &self.batches[index as usize];
            (batch.prev_batch_index, batch.next_batch_index)
        };
        if prev >= 0 {
            self.batches[prev as usize].next_batch_index = next;
        } else {
            self.head_batch_index = next;
        }
        if next >= 0 {
            self.batches[next as usize].prev_batch_index = prev;
        } else {
            self.tail_batch_index = prev;
        }
        let batch = &mut self.batches[index as usize];
        batch.prev_batch_index = -1;
        batch.next_batch_index = -1;
    }

    fn insert_before(&mut self, index: i16, sibling: i16) {
        let sibling_prev = self.batches[sibling as usize].prev_batch_index;
        {
            let batch = &mut self.batches[index as usize];
            batch.next_batch_index = sibling;
            batch.prev_batch_index = sibling_prev;
        }
        if sibling_prev >= 0 {
            self.batches[sibling_prev as usize].next_batch_index = index;
        } else {
            self.head_batch_index = index;
        }
        self.batches[sibling as usize].prev_batch_index = index;
    }

    /// Relinks batches so all batches targeting the same framebuffer run
    /// consecutively. Walking in reverse and hoisting each batch to just
    /// before the most recently seen batch of its framebuffer preserves
    /// relative order per target; it is only valid because a framebuffer's
    /// texture is never sampled before the framebuffer is completely drawn.
    fn sort_batches(&mut self) {
        debug_assert!(self.tail_batch_index >= 0);

        let mut seen = vec![-1i32; self.fbo_max as usize + 1];
        let mut index = self.tail_batch_index;

        while index >= 0 {
            let cur = index;
            let (fbo, prev, next) = {
                let batch = &self.batches[index as usize];
                (batch.framebuffer(), batch.prev_batch_index, batch.next_batch_index)
            };
            index = prev;

            if seen[fbo as usize] != -1 && seen[fbo as usize] != next as i32 {
                let mru = seen[fbo as usize] as i16;
                self.unlink(cur);
                self.insert_before(cur, mru);
            }

            seen[fbo as usize] = cur as i32;
        }
    }

    /// Executes every batch. `scissor` is in surface coordinates and only
    /// applies while the bound framebuffer equals `default_framebuffer`.
    pub fn execute(
        &mut self,
        surface_height: u32,
        scale: f32,
        scissor: Option<Rect>,
        default_framebuffer: u32,
    ) {
        debug_assert!(!self.in_draw);

        if self.batches.is_empty() {
            return;
        }

        self.sort_batches();
        self.gl.make_current();

        let gl = self.gl.clone();

        gl.enable(glow::DEPTH_TEST);
        gl.depth_func(glow::LEQUAL);

        // Pre-multiplied alpha.
        gl.enable(glow::BLEND);
        gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
        gl.blend_equation(glow::FUNC_ADD);

        let vao = gl.create_vertex_array();
        gl.bind_vertex_array(vao);

        let vbo = gl.create_buffer();
        gl.bind_array_buffer(vbo);
        gl.buffer_data(bytemuck::cast_slice(&self.vertices));

        // 0 = position, 1 = uv, 2 = color, 3 = color2.
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer(0, 2, glow::FLOAT, false, DrawVertex::STRIDE, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer(1, 2, glow::FLOAT, false, DrawVertex::STRIDE, 8);
        gl.enable_vertex_attrib_array(2);
        gl.vertex_attrib_pointer(2, 4, glow::HALF_FLOAT, false, DrawVertex::STRIDE, 16);
        gl.enable_vertex_attrib_array(3);
        gl.vertex_attrib_pointer(3, 4, glow::HALF_FLOAT, false, DrawVertex::STRIDE, 24);

        let scissor_rect = scissor.map(|r| {
            Rect::new(
                r.x * scale,
                surface_height as f32 - (r.height * scale) - (r.y * scale),
                r.width * scale,
                r.height * scale,
            )
        });

        let mut framebuffer: i64 = -1;
        let mut program: u32 = 0;
        let mut width: u16 = 0;
        let mut height: u16 = 0;
        let mut textures: [i64; 4] = [-1; 4];
        let mut active: i64 = -1;
        let mut scissor_on = false;

        let mut uniforms = self.uniforms.borrow_mut();

        let mut index = self.head_batch_index;
        while index >= 0 {
            let batch = self.batches[index as usize];
            debug_assert_ne!(batch.next_batch_index, index);

            let batch_fbo = batch.framebuffer();
            if framebuffer != batch_fbo as i64 {
                framebuffer = batch_fbo as i64;
                gl.bind_framebuffer(batch_fbo);

                // Scissor only applies to the surface-backed framebuffer.
                let wants_scissor = scissor_rect.is_some() && batch_fbo == default_framebuffer;
                if wants_scissor != scissor_on {
                    scissor_on = wants_scissor;
                    if wants_scissor {
                        gl.enable(glow::SCISSOR_TEST);
                    } else {
                        gl.disable(glow::SCISSOR_TEST);
                    }
                }
                if let (true, Some(r)) = (wants_scissor, scissor_rect) {
                    gl.scissor(r.x as i32, r.y as i32, r.width as i32, r.height as i32);
                }
            }

            if width != batch.viewport_width || height != batch.viewport_height {
                width = batch.viewport_width;
                height = batch.viewport_height;
                gl.viewport(0, 0, width as i32, height as i32);
            }

            match batch.payload {
                BatchPayload::Clear { bits, .. } => {
                    gl.clear_color(0.0, 0.0, 0.0, 0.0);
                    gl.clear(bits.bits());
                }
                BatchPayload::Draw(draw) => {
                    if batch.program != program {
                        program = batch.program;
                        gl.use_program(program);
                    }

                    for i in 0..draw.bind_count {
                        let bind = self.batch_binds[(draw.bind_offset + i) as usize];
                        if textures[bind.unit as usize] != bind.id as i64 {
                            if active != bind.unit as i64 {
                                active = bind.unit as i64;
                                gl.active_texture(bind.unit);
                            }
                            gl.bind_texture(glow::TEXTURE_2D, bind.id);
                            textures[bind.unit as usize] = bind.id as i64;
                        }
                    }

                    for i in 0..draw.uniform_count {
                        let uniform = self.batch_uniforms[(draw.uniform_offset + i) as usize];
                        uniforms.apply(&*gl, program, uniform.location, uniform.info);
                    }

                    gl.draw_arrays_triangles(draw.vbo_offset as i32, draw.vbo_count as i32);
                }
            }

            index = batch.next_batch_index;
        }

        drop(uniforms);

        gl.delete_buffer(vbo);
        gl.delete_vertex_array(vao);
    }

    /// Creates an immediate GL texture of `width`×`height`. Returns 0 when
    /// the size exceeds the context limit.
    pub fn create_texture(
        &mut self,
        width: i32,
        height: i32,
        format: u32,
        min_filter: u32,
        mag_filter: u32,
    ) -> u32 {
        if width > self.max_texture_size || height > self.max_texture_size {
            return 0;
        }

        let gl = &self.gl;
        let texture_id = gl.create_texture();

        gl.active_texture(0);
        gl.bind_texture(glow::TEXTURE_2D, texture_id);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min_filter as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mag_filter as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);

        // Format and type must agree even for a NULL upload, or GLES
        // reports invalid operations.
        let (gl_format, gl_type) = match format {
            glow::RGBA16F => (glow::RGBA, glow::HALF_FLOAT),
            glow::RGBA32F => (glow::RGBA, glow::FLOAT),
            _ => (glow::RGBA, glow::UNSIGNED_BYTE),
        };
        gl.tex_image_2d(glow::TEXTURE_2D, 0, format, width, height, gl_format, gl_type, None);

        // Restore whatever the attachment state thinks is bound on unit 0.
        if self.attachments.textures[0].id != 0 {
            gl.bind_texture(glow::TEXTURE_2D, self.attachments.textures[0].id);
        }

        texture_id
    }

    pub fn create_framebuffer(&self) -> u32 {
        self.gl.create_framebuffer()
    }

    /// Texture + framebuffer + color attachment + completeness check.
    pub fn create_render_target(
        &mut self,
        width: i32,
        height: i32,
        format: u32,
        min_filter: u32,
        mag_filter: u32,
    ) -> Option<(u32, u32)> {
        let texture_id = self.create_texture(width, height, format, min_filter, mag_filter);
        if texture_id == 0 {
            return None;
        }

        let fbo_id = self.gl.create_framebuffer();
        self.gl.bind_framebuffer(fbo_id);
        self.gl.framebuffer_texture_2d(glow::COLOR_ATTACHMENT0, texture_id);
        if !self.gl.check_framebuffer_complete() {
            log::warn!("render target {width}x{height} is incomplete");
            self.gl.delete_framebuffers(&[fbo_id]);
            self.gl.delete_textures(&[texture_id]);
            return None;
        }

        Some((fbo_id, texture_id))
    }

    /// Runs texture-upload GL calls against `texture_id` with the binding
    /// restored afterwards, counting one upload.
    pub fn with_bound_texture(&mut self, texture_id: u32, f: impl FnOnce(&dyn GlContext)) {
        let gl = self.gl.clone();
        gl.bind_texture(glow::TEXTURE_2D, texture_id);
        f(&*gl);
        if self.attachments.textures[0].id != 0 {
            gl.bind_texture(glow::TEXTURE_2D, self.attachments.textures[0].id);
        }
        self.n_uploads += 1;
    }

    /// Uploads tightly packed or strided RGBA/BGRA pixels into a fresh
    /// texture. The caller has verified the size fits.
    pub fn upload_memory_texture(
        &mut self,
        width: i32,
        height: i32,
        bgra: bool,
        stride: usize,
        pixels: &[u8],
        min_filter: u32,
        mag_filter: u32,
    ) -> u32 {
        let texture_id = self.create_texture(width, height, glow::RGBA8, min_filter, mag_filter);
        if texture_id == 0 {
            return 0;
        }

        let gl = self.gl.clone();
        gl.bind_texture(glow::TEXTURE_2D, texture_id);

        let tight_stride = width as usize * 4;
        let needs_repack = (stride != tight_stride && !gl.has_unpack_subimage())
            || (bgra && gl.use_es());

        if needs_repack {
            // Convert in software to a format the context can take directly.
            let mut packed = Vec::with_capacity(tight_stride * height as usize);
            for row in 0..height as usize {
                let line = &pixels[row * stride..row * stride + tight_stride];
                if bgra && gl.use_es() {
                    for px in line.chunks_exact(4) {
                        packed.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                } else {
                    packed.extend_from_slice(line);
                }
            }
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                &packed,
            );
        } else {
            if stride != tight_stride {
                gl.pixel_store(glow::UNPACK_ROW_LENGTH, (stride / 4) as i32);
            }
            let format = if bgra { glow::BGRA } else { glow::RGBA };
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                width,
                height,
                format,
                glow::UNSIGNED_BYTE,
                pixels,
            );
            if stride != tight_stride {
                gl.pixel_store(glow::UNPACK_ROW_LENGTH, 0);
            }
        }

        if self.attachments.textures[0].id != 0 {
            gl.bind_texture(glow::TEXTURE_2D, self.attachments.textures[0].id);
        }

        self.n_uploads += 1;
        texture_id
    }
}
