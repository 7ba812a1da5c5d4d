//! [`GlContext`] implemented over a [`glow::Context`].

use std::num::NonZeroU32;

use glow::HasContext;

use super::GlContext;

/// Production GL context backed by `glow`.
///
/// The embedder owns context currency; if more than one context exists, pass
/// a `make_current` hook, otherwise `make_current` is a no-op. The
/// `share_token` identifies the share group this context belongs to, used to
/// adopt GL texture ids from [`lucent_scene::ImageTexture`] sources.
pub struct GlowContext {
    gl: glow::Context,
    default_framebuffer: u32,
    share_token: u64,
    make_current: Option<Box<dyn Fn()>>,
    max_texture_size: i32,
    use_es: bool,
    version: (i32, i32),
    has_unpack_subimage: bool,
    has_debug: bool,
}

impl GlowContext {
    pub fn new(
        gl: glow::Context,
        default_framebuffer: u32,
        share_token: u64,
        make_current: Option<Box<dyn Fn()>>,
    ) -> Self {
        let version = gl.version();
        let use_es = version.is_embedded;
        let max_texture_size = unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) };
        let has_unpack_subimage = !use_es
            || version.major >= 3
            || gl.supported_extensions().contains("GL_EXT_unpack_subimage");
        let has_debug = gl.supports_debug();
        let version = (version.major as i32, version.minor as i32);
        Self {
            gl,
            default_framebuffer,
            share_token,
            make_current,
            max_texture_size,
            use_es,
            version,
            has_unpack_subimage,
            has_debug,
        }
    }

    pub fn raw(&self) -> &glow::Context {
        &self.gl
    }
}

fn texture(id: u32) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id).map(glow::NativeTexture)
}

fn framebuffer(id: u32) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id).map(glow::NativeFramebuffer)
}

fn location(location: i32) -> Option<glow::NativeUniformLocation> {
    u32::try_from(location).ok().map(glow::NativeUniformLocation)
}

impl GlContext for GlowContext {
    fn make_current(&self) {
        if let Some(hook) = &self.make_current {
            hook();
        }
    }

    fn default_framebuffer(&self) -> u32 {
        self.default_framebuffer
    }

    fn max_texture_size(&self) -> i32 {
        self.max_texture_size
    }

    fn use_es(&self) -> bool {
        self.use_es
    }

    fn version(&self) -> (i32, i32) {
        self.version
    }

    fn has_unpack_subimage(&self) -> bool {
        self.has_unpack_subimage
    }

    fn share_token(&self) -> u64 {
        self.share_token
    }

    fn has_debug(&self) -> bool {
        self.has_debug
    }

    fn push_debug_group(&self, label: &str) {
        if self.has_debug {
            unsafe {
                self.gl.push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, label);
            }
        }
    }

    fn pop_debug_group(&self) {
        if self.has_debug {
            unsafe { self.gl.pop_debug_group() }
        }
    }

    fn create_texture(&self) -> u32 {
        unsafe { self.gl.create_texture().map(|t| t.0.get()).unwrap_or(0) }
    }

    fn delete_textures(&self, ids: &[u32]) {
        for id in ids {
            if let Some(t) = texture(*id) {
                unsafe { self.gl.delete_texture(t) }
            }
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, id: u32) {
        unsafe { self.gl.bind_texture(target, texture(id)) }
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }

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
    ) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                level,
                internal_format as i32,
                width,
                height,
                0,
                format,
                ty,
                pixels,
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn pixel_store(&self, pname: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(pname, value) }
    }

    fn create_framebuffer(&self) -> u32 {
        unsafe { self.gl.create_framebuffer().map(|f| f.0.get()).unwrap_or(0) }
    }

    fn delete_framebuffers(&self, ids: &[u32]) {
        for id in ids {
            if let Some(f) = framebuffer(*id) {
                unsafe { self.gl.delete_framebuffer(f) }
            }
        }
    }

    fn bind_framebuffer(&self, id: u32) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer(id)) }
    }

    fn framebuffer_texture_2d(&self, attachment: u32, tex: u32) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                glow::TEXTURE_2D,
                texture(tex),
                0,
            )
        }
    }

    fn check_framebuffer_complete(&self) -> bool {
        unsafe {
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE
        }
    }

    fn create_vertex_array(&self) -> u32 {
        unsafe { self.gl.create_vertex_array().map(|v| v.0.get()).unwrap_or(0) }
    }

    fn bind_vertex_array(&self, id: u32) {
        unsafe { self.gl.bind_vertex_array(NonZeroU32::new(id).map(glow::NativeVertexArray)) }
    }

    fn delete_vertex_array(&self, id: u32) {
        if let Some(v) = NonZeroU32::new(id).map(glow::NativeVertexArray) {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    fn create_buffer(&self) -> u32 {
        unsafe { self.gl.create_buffer().map(|b| b.0.get()).unwrap_or(0) }
    }

    fn bind_array_buffer(&self, id: u32) {
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, NonZeroU32::new(id).map(glow::NativeBuffer)) }
    }

    fn buffer_data(&self, data: &[u8]) {
        unsafe { self.gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW) }
    }

    fn delete_buffer(&self, id: u32) {
        if let Some(b) = NonZeroU32::new(id).map(glow::NativeBuffer) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(index, size, data_type, normalized, stride, offset)
        }
    }

    fn create_program(&self) -> u32 {
        unsafe { self.gl.create_program().map(|p| p.0.get()).unwrap_or(0) }
    }

    fn delete_program(&self, id: u32) {
        if let Some(p) = NonZeroU32::new(id).map(glow::NativeProgram) {
            unsafe { self.gl.delete_program(p) }
        }
    }

    fn create_shader(&self, kind: u32) -> u32 {
        unsafe { self.gl.create_shader(kind).map(|s| s.0.get()).unwrap_or(0) }
    }

    fn shader_source(&self, id: u32, source: &str) {
        if let Some(s) = NonZeroU32::new(id).map(glow::NativeShader) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&self, id: u32) {
        if let Some(s) = NonZeroU32::new(id).map(glow::NativeShader) {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn shader_compile_status(&self, id: u32) -> bool {
        match NonZeroU32::new(id).map(glow::NativeShader) {
            Some(s) => unsafe { self.gl.get_shader_compile_status(s) },
            None => false,
        }
    }

    fn shader_info_log(&self, id: u32) -> String {
        match NonZeroU32::new(id).map(glow::NativeShader) {
            Some(s) => unsafe { self.gl.get_shader_info_log(s) },
            None => String::new(),
        }
    }

    fn delete_shader(&self, id: u32) {
        if let Some(s) = NonZeroU32::new(id).map(glow::NativeShader) {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        let (Some(p), Some(s)) = (
            NonZeroU32::new(program).map(glow::NativeProgram),
            NonZeroU32::new(shader).map(glow::NativeShader),
        ) else {
            return;
        };
        unsafe { self.gl.attach_shader(p, s) }
    }

    fn bind_attrib_location(&self, program: u32, index: u32, name: &str) {
        if let Some(p) = NonZeroU32::new(program).map(glow::NativeProgram) {
            unsafe { self.gl.bind_attrib_location(p, index, name) }
        }
    }

    fn link_program(&self, program: u32) {
        if let Some(p) = NonZeroU32::new(program).map(glow::NativeProgram) {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn link_status(&self, program: u32) -> bool {
        match NonZeroU32::new(program).map(glow::NativeProgram) {
            Some(p) => unsafe { self.gl.get_program_link_status(p) },
            None => false,
        }
    }

    fn program_info_log(&self, program: u32) -> String {
        match NonZeroU32::new(program).map(glow::NativeProgram) {
            Some(p) => unsafe { self.gl.get_program_info_log(p) },
            None => String::new(),
        }
    }

    fn use_program(&self, id: u32) {
        unsafe { self.gl.use_program(NonZeroU32::new(id).map(glow::NativeProgram)) }
    }

    fn uniform_location(&self, program: u32, name: &str) -> i32 {
        match NonZeroU32::new(program).map(glow::NativeProgram) {
            Some(p) => unsafe {
                self.gl.get_uniform_location(p, name).map(|l| l.0 as i32).unwrap_or(-1)
            },
            None => -1,
        }
    }

    fn uniform_1fv(&self, loc: i32, values: &[f32]) {
        unsafe { self.gl.uniform_1_f32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_2fv(&self, loc: i32, values: &[f32]) {
        unsafe { self.gl.uniform_2_f32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_3fv(&self, loc: i32, values: &[f32]) {
        unsafe { self.gl.uniform_3_f32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_4fv(&self, loc: i32, values: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_1iv(&self, loc: i32, values: &[i32]) {
        unsafe { self.gl.uniform_1_i32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_2iv(&self, loc: i32, values: &[i32]) {
        unsafe { self.gl.uniform_2_i32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_3iv(&self, loc: i32, values: &[i32]) {
        unsafe { self.gl.uniform_3_i32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_4iv(&self, loc: i32, values: &[i32]) {
        unsafe { self.gl.uniform_4_i32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_1uiv(&self, loc: i32, values: &[u32]) {
        unsafe { self.gl.uniform_1_u32_slice(location(loc).as_ref(), values) }
    }

    fn uniform_matrix_4fv(&self, loc: i32, values: &[f32]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(location(loc).as_ref(), false, values) }
    }

    fn draw_arrays_triangles(&self, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLES, first, count) }
    }

    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }

    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }

    fn blend_func(&self, src: u32, dst: u32) {
        unsafe { self.gl.blend_func(src, dst) }
    }

    fn blend_equation(&self, mode: u32) {
        unsafe { self.gl.blend_equation(mode) }
    }

    fn depth_func(&self, func: u32) {
        unsafe { self.gl.depth_func(func) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }
}
