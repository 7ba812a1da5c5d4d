//! The GL context surface the renderer draws through.
//!
//! The renderer never talks to a GL loader directly; everything goes through
//! [`GlContext`], which carries exactly the operations the core invokes.
//! Object ids are plain `u32` with 0 meaning "none", matching both GL's name
//! model and the packed batch encoding. Constants are `glow`'s GL constants.
//!
//! [`GlowContext`] is the production implementation. Tests drive the core
//! with a recording fake instead, so everything up to the actual GL calls is
//! exercised without a GPU.

mod native;
#[cfg(test)]
pub(crate) mod recording;

pub use native::GlowContext;

/// The subset of OpenGL (3.2 / ES 2.0+) the renderer requires, plus the
/// context-level queries it performs (make-current, default framebuffer,
/// version, debug groups, share predicate).
///
/// All methods take `&self`; a GL context is inherently a single-threaded
/// mutable object and implementations wrap their own interior state.
pub trait GlContext {
    // Context.
    fn make_current(&self);
    fn default_framebuffer(&self) -> u32;
    fn max_texture_size(&self) -> i32;
    fn use_es(&self) -> bool;
    /// (major, minor) of the underlying context.
    fn version(&self) -> (i32, i32);
    /// Whether `GL_EXT_unpack_subimage` (row-length uploads on ES) works.
    fn has_unpack_subimage(&self) -> bool;
    /// Contexts with equal tokens share object names ("shared-with").
    fn share_token(&self) -> u64;
    fn has_debug(&self) -> bool;
    fn push_debug_group(&self, label: &str);
    fn pop_debug_group(&self);

    // Textures.
    fn create_texture(&self) -> u32;
    fn delete_textures(&self, ids: &[u32]);
    /// `unit` is an index (0-based), not a `GL_TEXTURE0`-relative enum.
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, id: u32);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );
    fn pixel_store(&self, pname: u32, value: i32);

    // Framebuffers.
    fn create_framebuffer(&self) -> u32;
    fn delete_framebuffers(&self, ids: &[u32]);
    fn bind_framebuffer(&self, id: u32);
    fn framebuffer_texture_2d(&self, attachment: u32, texture: u32);
    fn check_framebuffer_complete(&self) -> bool;

    // Buffers and vertex arrays.
    fn create_vertex_array(&self) -> u32;
    fn bind_vertex_array(&self, id: u32);
    fn delete_vertex_array(&self, id: u32);
    fn create_buffer(&self) -> u32;
    fn bind_array_buffer(&self, id: u32);
    fn buffer_data(&self, data: &[u8]);
    fn delete_buffer(&self, id: u32);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );

    // Programs and shaders.
    fn create_program(&self) -> u32;
    fn delete_program(&self, id: u32);
    fn create_shader(&self, kind: u32) -> u32;
    fn shader_source(&self, id: u32, source: &str);
    fn compile_shader(&self, id: u32);
    fn shader_compile_status(&self, id: u32) -> bool;
    fn shader_info_log(&self, id: u32) -> String;
    fn delete_shader(&self, id: u32);
    fn attach_shader(&self, program: u32, shader: u32);
    fn bind_attrib_location(&self, program: u32, index: u32, name: &str);
    fn link_program(&self, program: u32);
    fn link_status(&self, program: u32) -> bool;
    fn program_info_log(&self, program: u32) -> String;
    fn use_program(&self, id: u32);
    /// Returns -1 when the uniform was optimized out.
    fn uniform_location(&self, program: u32, name: &str) -> i32;

    // Uniform uploads. Slices carry `count * N` elements.
    fn uniform_1fv(&self, location: i32, values: &[f32]);
    fn uniform_2fv(&self, location: i32, values: &[f32]);
    fn uniform_3fv(&self, location: i32, values: &[f32]);
    fn uniform_4fv(&self, location: i32, values: &[f32]);
    fn uniform_1iv(&self, location: i32, values: &[i32]);
    fn uniform_2iv(&self, location: i32, values: &[i32]);
    fn uniform_3iv(&self, location: i32, values: &[i32]);
    fn uniform_4iv(&self, location: i32, values: &[i32]);
    fn uniform_1uiv(&self, location: i32, values: &[u32]);
    fn uniform_matrix_4fv(&self, location: i32, values: &[f32]);

    // Draws and fixed-function state.
    fn draw_arrays_triangles(&self, first: i32, count: i32);
    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);
    fn blend_func(&self, src: u32, dst: u32);
    fn blend_equation(&self, mode: u32);
    fn depth_func(&self, func: u32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&self, mask: u32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
}
