//! The driver owns every GPU resource that outlives a single frame:
//! textures, framebuffers, the keyed offscreen cache, the program registry
//! and the per-frame deletion pools.
//!
//! Two command queues exist: the driver's own "shared" queue for work
//! triggered outside a frame (program compilation, texture conversion), and
//! the renderer's per-frame queue, swapped in at `begin_frame` and handed
//! back at `after_frame` once pooled GL objects have been deleted in batched
//! calls.

mod texture;
#[cfg(test)]
mod tests;

pub use texture::{
    nine_slice, NineSlice, RenderTarget, Texture, TextureArea, TextureKey, TextureSlice,
    NINE_SLICE_BOTTOM_CENTER, NINE_SLICE_BOTTOM_LEFT, NINE_SLICE_BOTTOM_RIGHT, NINE_SLICE_CENTER,
    NINE_SLICE_LEFT_CENTER, NINE_SLICE_RIGHT_CENTER, NINE_SLICE_TOP_CENTER, NINE_SLICE_TOP_LEFT,
    NINE_SLICE_TOP_RIGHT,
};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use glam::Mat4;
use hashbrown::HashMap;
use lucent_scene::{ColorState, ImageTexture, MemoryFormat, Rect, RoundedRect, ShaderSource, TextureData};

use crate::command::{ClearMask, CommandQueue, DrawVertex};
use crate::error::RenderError;
use crate::gl::GlContext;
use crate::shader::{compile_custom_program, keys, ClipVariant, Program, ProgramKind, Programs};
use crate::uniform::UniformState;

pub const ORTHO_NEAR_PLANE: f32 = -10000.0;
pub const ORTHO_FAR_PLANE: f32 = 10000.0;

/// Orthographic projection covering `viewport`, y growing downwards.
pub fn ortho_projection(viewport: &Rect) -> Mat4 {
    Mat4::orthographic_rh_gl(
        viewport.x,
        viewport.max_x(),
        viewport.y,
        viewport.max_y(),
        ORTHO_NEAR_PLANE,
        ORTHO_FAR_PLANE,
    )
}

bitflags! {
    /// Work needed to make an external texture compositable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Conversion: u32 {
        const LINEARIZE = 1 << 0;
        const PREMULTIPLY = 1 << 1;
        const FLIP = 1 << 2;
    }
}

struct CustomShaderEntry {
    /// Keeps the pointer key stable while cached.
    _shader: Arc<ShaderSource>,
    program: Option<Program>,
}

/// See module docs.
pub struct GlDriver {
    gl: Rc<dyn GlContext>,
    shared_queue: CommandQueue,
    frame_queue: Option<CommandQueue>,

    pub programs: Programs,
    uniforms: Rc<RefCell<UniformState>>,

    textures: HashMap<u32, Texture>,
    key_to_id: HashMap<TextureKey, u32>,
    id_to_key: HashMap<u32, TextureKey>,
    /// External texture pointer → uploaded texture id.
    external: HashMap<usize, u32>,
    /// External texture pointer → tiles for oversized sources.
    slices: HashMap<usize, (Weak<ImageTexture>, Vec<TextureSlice>)>,
    shader_cache: HashMap<usize, CustomShaderEntry>,

    /// Texture ids to delete in one call at `after_frame`.
    texture_pool: Vec<u32>,
    /// Framebuffer ids to delete in one call at `after_frame`.
    autorelease_framebuffers: Vec<u32>,
    /// Render targets released whole, drained at `after_frame`.
    render_targets: Vec<RenderTarget>,

    /// Monotonic counters for the shared uniforms; bumping one invalidates
    /// the per-mapping stamp shortcut so the next draw re-records the value.
    pub stamps: [u32; keys::N_SHARED],

    current_frame_id: i64,
    in_frame: bool,
    debug_shaders: bool,
    warned_foreign_context: bool,
}

fn active_queue<'a>(
    in_frame: bool,
    frame: &'a mut Option<CommandQueue>,
    shared: &'a mut CommandQueue,
) -> &'a mut CommandQueue {
    match frame {
        Some(queue) if in_frame => queue,
        _ => shared,
    }
}

impl GlDriver {
    pub fn new(gl: Rc<dyn GlContext>, debug_shaders: bool) -> Result<Self, RenderError> {
        gl.make_current();

        let uniforms = Rc::new(RefCell::new(UniformState::new()));
        let shared_queue = CommandQueue::new(gl.clone(), Some(uniforms.clone()));
        let programs = Programs::load(&*gl, &mut uniforms.borrow_mut(), debug_shaders)?;

        Ok(Self {
            gl,
            shared_queue,
            frame_queue: None,
            programs,
            uniforms,
            textures: HashMap::new(),
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            external: HashMap::new(),
            slices: HashMap::new(),
            shader_cache: HashMap::new(),
            texture_pool: Vec::new(),
            autorelease_framebuffers: Vec::new(),
            render_targets: Vec::new(),
            stamps: [0; keys::N_SHARED],
            current_frame_id: 0,
            in_frame: false,
            debug_shaders,
            warned_foreign_context: false,
        })
    }

    pub fn gl(&self) -> &Rc<dyn GlContext> {
        &self.gl
    }

    /// Uniform store shared with the renderer's frame queue.
    pub fn uniforms(&self) -> Rc<RefCell<UniformState>> {
        self.uniforms.clone()
    }

    pub fn frame_id(&self) -> i64 {
        self.current_frame_id
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// The queue work should currently record into.
    pub fn queue_mut(&mut self) -> &mut CommandQueue {
        active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue)
    }

    pub fn bump_stamp(&mut self, key: usize) {
        self.stamps[key] = self.stamps[key].wrapping_add(1);
    }

    /// Starts a frame on the renderer-provided queue. Textures unused in the
    /// previous frame are collected before new allocations happen.
    pub fn begin_frame(&mut self, queue: CommandQueue) {
        debug_assert!(!self.in_frame);
        let last_frame_id = self.current_frame_id;

        self.in_frame = true;
        self.current_frame_id += 1;
        self.frame_queue = Some(queue);
        self.frame_queue.as_mut().unwrap().begin_frame();

        self.collect_unused_textures(last_frame_id - 1);
    }

    pub fn end_frame(&mut self) {
        debug_assert!(self.in_frame);
        self.frame_queue.as_mut().unwrap().end_frame();
        self.in_frame = false;
    }

    /// Deletes pooled framebuffers and textures in batched calls and hands
    /// the frame queue back. Runs after the swap to avoid blocking it.
    pub fn after_frame(&mut self) -> CommandQueue {
        debug_assert!(!self.in_frame);

        while let Some(target) = self.render_targets.pop() {
            self.autorelease_framebuffers.push(target.framebuffer_id);
            self.texture_pool.push(target.texture_id);
        }

        if !self.autorelease_framebuffers.is_empty() {
            self.gl.delete_framebuffers(&self.autorelease_framebuffers);
            self.autorelease_framebuffers.clear();
        }

        if !self.texture_pool.is_empty() {
            self.gl.delete_textures(&self.texture_pool);
            self.texture_pool.clear();
        }

        self.frame_queue.take().expect("after_frame without begin_frame")
    }

    fn remove_texture_key(&mut self, texture_id: u32) {
        if let Some(key) = self.id_to_key.remove(&texture_id) {
            self.key_to_id.remove(&key);
        }
    }

    pub fn autorelease_texture(&mut self, texture_id: u32) {
        self.texture_pool.push(texture_id);
    }

    pub fn autorelease_framebuffer(&mut self, framebuffer_id: u32) {
        self.autorelease_framebuffers.push(framebuffer_id);
    }

    /// Evicts every unreferenced, non-permanent texture whose last use is at
    /// or before `watermark`.
    pub fn collect_unused_textures(&mut self, watermark: i64) -> usize {
        let mut evicted = Vec::new();
        for (id, texture) in &self.textures {
            if texture.in_use() {
                continue;
            }
            if texture.last_used_in_frame <= watermark {
                evicted.push((*id, texture.external_ptr));
            }
        }
        for (id, external_ptr) in &evicted {
            self.textures.remove(id);
            self.remove_texture_key(*id);
            if let Some(ptr) = external_ptr {
                self.external.remove(ptr);
            }
            self.texture_pool.push(*id);
        }
        self.slices.retain(|_, (weak, _)| weak.strong_count() > 0);
        evicted.len()
    }

    /// Creates a texture owned and tracked by the driver.
    pub fn create_texture(
        &mut self,
        width: i32,
        height: i32,
        format: u32,
        min_filter: u32,
        mag_filter: u32,
    ) -> u32 {
        let frame_id = self.current_frame_id;
        let queue = active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue);
        let id = queue.create_texture(width, height, format, min_filter, mag_filter);
        if id != 0 {
            self.textures
                .insert(id, Texture::new(id, width, height, format, min_filter, mag_filter, frame_id));
        }
        id
    }

    /// Adopts a texture that was uploaded through the queue directly (the
    /// fallback upload path) so it participates in caching and eviction.
    pub fn register_texture(&mut self, id: u32, width: i32, height: i32, format: u32) {
        let frame_id = self.current_frame_id;
        self.textures
            .insert(id, Texture::new(id, width, height, format, glow::NEAREST, glow::NEAREST, frame_id));
    }

    /// Releases a driver-owned texture back into the deletion pool.
    pub fn release_texture(&mut self, texture_id: u32) {
        self.textures.remove(&texture_id);
        self.remove_texture_key(texture_id);
        self.texture_pool.push(texture_id);
    }

    pub fn mark_texture_permanent(&mut self, texture_id: u32) {
        if let Some(texture) = self.textures.get_mut(&texture_id) {
            texture.permanent = true;
        }
    }

    pub fn texture_mut(&mut self, texture_id: u32) -> Option<&mut Texture> {
        self.textures.get_mut(&texture_id)
    }

    pub fn contains_texture(&self, texture_id: u32) -> bool {
        self.textures.contains_key(&texture_id)
    }

    /// Inserts `texture_id` into the keyed cache with a reverse mapping so
    /// eviction by id can drop the key.
    pub fn cache_texture(&mut self, key: TextureKey, texture_id: u32) {
        debug_assert!(self.textures.contains_key(&texture_id));
        self.key_to_id.insert(key, texture_id);
        self.id_to_key.insert(texture_id, key);
    }

    /// O(1) memoized offscreen lookup; marks the texture used this frame.
    pub fn lookup_texture(&mut self, key: &TextureKey) -> u32 {
        match self.key_to_id.get(key) {
            Some(&id) => match self.textures.get_mut(&id) {
                Some(texture) => {
                    texture.last_used_in_frame = self.current_frame_id;
                    id
                }
                None => 0,
            },
            None => 0,
        }
    }

    pub fn create_render_target(
        &mut self,
        width: i32,
        height: i32,
        format: u32,
        min_filter: u32,
        mag_filter: u32,
    ) -> Option<RenderTarget> {
        let queue = active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue);
        let (framebuffer_id, texture_id) =
            queue.create_render_target(width, height, format, min_filter, mag_filter)?;
        Some(RenderTarget {
            framebuffer_id,
            texture_id,
            width,
            height,
            format,
            min_filter,
            mag_filter,
        })
    }

    /// Releases a render target. With `release_texture` the whole target is
    /// pooled until `after_frame` and 0 is returned; otherwise the texture
    /// becomes a live cached texture whose id is returned, and only the
    /// framebuffer is pooled.
    pub fn release_render_target(&mut self, target: RenderTarget, release_texture: bool) -> u32 {
        if release_texture {
            self.render_targets.push(target);
            0
        } else {
            let texture = Texture::new(
                target.texture_id,
                target.width,
                target.height,
                target.format,
                target.min_filter,
                target.mag_filter,
                self.current_frame_id,
            );
            self.textures.insert(target.texture_id, texture);
            self.autorelease_framebuffers.push(target.framebuffer_id);
            target.texture_id
        }
    }

    /// Runs a conversion pass (premultiply / linearize / flip) from
    /// `source_id` into a fresh cached texture and returns its id.
    fn convert_texture(
        &mut self,
        source_id: u32,
        width: i32,
        height: i32,
        conversion: Conversion,
        min_filter: u32,
        mag_filter: u32,
    ) -> u32 {
        let kind = if conversion.contains(Conversion::LINEARIZE | Conversion::PREMULTIPLY) {
            ProgramKind::LinearizePremultiply
        } else if conversion.contains(Conversion::LINEARIZE) {
            ProgramKind::Linearize
        } else if conversion.contains(Conversion::PREMULTIPLY) {
            ProgramKind::Premultiply
        } else {
            ProgramKind::Blit
        };
        let program = self.programs.get(kind, ClipVariant::None);

        let queue = active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue);
        queue.make_current();

        let Some((fbo_id, texture_id)) =
            queue.create_render_target(width, height, glow::RGBA8, min_filter, mag_filter)
        else {
            return 0;
        };

        let viewport = Rect::from_size(width as f32, height as f32);
        let prev_fbo = queue.bind_framebuffer(fbo_id);
        queue.clear(ClearMask::empty(), &viewport);

        queue.begin_draw(program.uniforms, width as u16, height as u16);
        {
            let mut uniforms = queue.uniforms.borrow_mut();
            uniforms.set_matrix(program.uniforms, keys::PROJECTION, 0, &ortho_projection(&viewport));
            uniforms.set_4f(
                program.uniforms,
                keys::VIEWPORT,
                0,
                [0.0, 0.0, width as f32, height as f32],
            );
            uniforms.set_matrix(program.uniforms, keys::MODELVIEW, 0, &Mat4::IDENTITY);
            uniforms.set_1f(program.uniforms, keys::ALPHA, 0, 1.0);
            uniforms.set_texture(program.uniforms, keys::SOURCE, 0, 0);
        }
        queue.attachments.bind_texture(0, glow::TEXTURE_2D, source_id, glow::NEAREST, glow::NEAREST);

        let flip = conversion.contains(Conversion::FLIP);
        let (min_v, max_v) = if flip { (0.0, 1.0) } else { (1.0, 0.0) };
        let (w, h) = (width as f32, height as f32);
        let vertices = queue.add_vertices();
        vertices[0] = DrawVertex::new([0.0, 0.0], [0.0, min_v], Default::default());
        vertices[1] = DrawVertex::new([0.0, h], [0.0, max_v], Default::default());
        vertices[2] = DrawVertex::new([w, 0.0], [1.0, min_v], Default::default());
        vertices[3] = DrawVertex::new([w, h], [1.0, max_v], Default::default());
        vertices[4] = DrawVertex::new([0.0, h], [0.0, max_v], Default::default());
        vertices[5] = DrawVertex::new([w, 0.0], [1.0, min_v], Default::default());

        queue.end_draw();
        queue.bind_framebuffer(prev_fbo);

        let target = RenderTarget {
            framebuffer_id: fbo_id,
            texture_id,
            width,
            height,
            format: glow::RGBA8,
            min_filter,
            mag_filter,
        };
        self.release_render_target(target, false)
    }

    /// Returns a GL texture id for an external texture, uploading and/or
    /// converting on first use and caching by source identity. Returns 0
    /// when the source cannot be used (foreign context, oversized).
    pub fn load_texture(
        &mut self,
        source: &Arc<ImageTexture>,
        min_filter: u32,
        mag_filter: u32,
    ) -> u32 {
        let ptr = Arc::as_ptr(source) as usize;

        if let Some(&id) = self.external.get(&ptr) {
            if let Some(texture) = self.textures.get_mut(&id) {
                if texture.min_filter == min_filter && texture.mag_filter == mag_filter {
                    texture.last_used_in_frame = self.current_frame_id;
                    return id;
                }
            }
        }

        let (width, height) = (source.width as i32, source.height as i32);

        match &source.data {
            TextureData::Gl { id, share_token, color_state, premultiplied, flipped } => {
                if *share_token != self.gl.share_token() {
                    if !self.warned_foreign_context {
                        self.warned_foreign_context = true;
                        log::warn!("GL texture from an unshared context cannot be used");
                    }
                    return 0;
                }

                let mut conversion = Conversion::empty();
                if *color_state == ColorState::Srgb {
                    conversion |= Conversion::LINEARIZE;
                }
                if !premultiplied {
                    conversion |= Conversion::PREMULTIPLY;
                }
                if *flipped {
                    conversion |= Conversion::FLIP;
                }

                if conversion.is_empty() {
                    // Directly usable; not owned by us, so never cached for
                    // deletion.
                    return *id;
                }

                let converted =
                    self.convert_texture(*id, width, height, conversion, min_filter, mag_filter);
                if converted != 0 {
                    if let Some(texture) = self.textures.get_mut(&converted) {
                        texture.user = Some(Arc::downgrade(source));
                        texture.external_ptr = Some(ptr);
                    }
                    self.external.insert(ptr, converted);
                }
                converted
            }
            TextureData::Memory { format, color_state, stride, pixels } => {
                let bgra =
                    matches!(format, MemoryFormat::Bgra8 | MemoryFormat::Bgra8Premultiplied);
                let queue =
                    active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue);
                let uploaded = queue.upload_memory_texture(
                    width, height, bgra, *stride, pixels, min_filter, mag_filter,
                );
                if uploaded == 0 {
                    return 0;
                }

                let mut conversion = Conversion::empty();
                if *color_state == ColorState::Srgb {
                    conversion |= Conversion::LINEARIZE;
                }
                if !format.is_premultiplied() {
                    conversion |= Conversion::PREMULTIPLY;
                }

                let final_id = if conversion.is_empty() {
                    self.textures.insert(
                        uploaded,
                        Texture::new(
                            uploaded,
                            width,
                            height,
                            glow::RGBA8,
                            min_filter,
                            mag_filter,
                            self.current_frame_id,
                        ),
                    );
                    uploaded
                } else {
                    let converted = self.convert_texture(
                        uploaded, width, height, conversion, min_filter, mag_filter,
                    );
                    self.texture_pool.push(uploaded);
                    converted
                };

                if final_id != 0 {
                    if let Some(texture) = self.textures.get_mut(&final_id) {
                        texture.user = Some(Arc::downgrade(source));
                        texture.external_ptr = Some(ptr);
                    }
                    self.external.insert(ptr, final_id);
                }
                final_id
            }
        }
    }

    /// Tiles an oversized memory texture into uploads no larger than
    /// `max_texture_size / 4` per side.
    pub fn slice_texture(&mut self, source: &Arc<ImageTexture>) -> Vec<TextureSlice> {
        let ptr = Arc::as_ptr(source) as usize;
        if let Some((weak, slices)) = self.slices.get(&ptr) {
            if weak.strong_count() > 0 {
                let slices = slices.clone();
                for slice in &slices {
                    if let Some(texture) = self.textures.get_mut(&slice.texture_id) {
                        texture.last_used_in_frame = self.current_frame_id;
                    }
                }
                return slices;
            }
        }

        let TextureData::Memory { format, stride, pixels, .. } = &source.data else {
            log::warn!("cannot slice a GPU-side texture");
            return Vec::new();
        };
        let bgra = matches!(format, MemoryFormat::Bgra8 | MemoryFormat::Bgra8Premultiplied);

        let frame_id = self.current_frame_id;
        let queue = active_queue(self.in_frame, &mut self.frame_queue, &mut self.shared_queue);
        let tile = (queue.max_texture_size() / 4).max(64);
        let (width, height) = (source.width as i32, source.height as i32);

        let mut slices = Vec::new();
        let mut y = 0;
        while y < height {
            let slice_h = tile.min(height - y);
            let mut x = 0;
            while x < width {
                let slice_w = tile.min(width - x);
                let start = y as usize * stride + x as usize * 4;
                let end = start + (slice_h as usize - 1) * stride + slice_w as usize * 4;
                let texture_id = queue.upload_memory_texture(
                    slice_w,
                    slice_h,
                    bgra,
                    *stride,
                    &pixels[start..end],
                    glow::NEAREST,
                    glow::NEAREST,
                );
                slices.push(TextureSlice { rect: (x, y, slice_w, slice_h), texture_id });
                x += slice_w;
            }
            y += slice_h;
        }

        for slice in &slices {
            let mut texture = Texture::new(
                slice.texture_id,
                slice.rect.2,
                slice.rect.3,
                glow::RGBA8,
                glow::NEAREST,
                glow::NEAREST,
                frame_id,
            );
            texture.user = Some(Arc::downgrade(source));
            self.textures.insert(slice.texture_id, texture);
        }

        self.slices.insert(ptr, (Arc::downgrade(source), slices.clone()));
        slices
    }

    /// Cached nine-slice geometry for a shadow texture.
    pub fn texture_nine_slice(
        &mut self,
        texture_id: u32,
        outline: &RoundedRect,
        extra_x: i32,
        extra_y: i32,
    ) -> [NineSlice; 9] {
        let texture = self.textures.get_mut(&texture_id).expect("unknown shadow texture");
        if let Some(slices) = texture.nine_slice {
            return slices;
        }
        let slices = nine_slice(outline, texture.width, texture.height, extra_x, extra_y);
        texture.nine_slice = Some(slices);
        slices
    }

    /// Returns or compiles the program for a user-supplied shader. The first
    /// failure is diagnosed once; later calls return `None` silently so the
    /// node keeps rendering as the fallback color.
    pub fn lookup_custom_shader(&mut self, shader: &Arc<ShaderSource>) -> Option<Program> {
        let ptr = Arc::as_ptr(shader) as usize;
        if let Some(entry) = self.shader_cache.get(&ptr) {
            return entry.program;
        }

        let result =
            compile_custom_program(&*self.gl, &mut self.uniforms.borrow_mut(), shader, self.debug_shaders);
        let program = match result {
            Ok(program) => Some(program),
            Err(err) => {
                log::warn!("failed to compile custom shader: {err}");
                None
            }
        };
        self.shader_cache.insert(ptr, CustomShaderEntry { _shader: shader.clone(), program });
        program
    }

    #[cfg(test)]
    pub(crate) fn n_textures(&self) -> usize {
        self.textures.len()
    }
}
