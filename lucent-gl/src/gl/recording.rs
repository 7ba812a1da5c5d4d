//! A recording fake of [`GlContext`] for driving the renderer in tests.
//!
//! Object creation hands out sequential ids, shader compilation always
//! succeeds, and every draw-relevant call is appended to a log the tests can
//! inspect. Uniform locations are assigned per (program, name) in query
//! order starting at 0.

use std::cell::RefCell;

use hashbrown::HashMap;

use super::GlContext;

/// One observed GL call. Only the calls tests assert on carry payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    BindFramebuffer(u32),
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    UseProgram(u32),
    ActiveTexture(u32),
    BindTexture(u32),
    DrawArrays { first: i32, count: i32 },
    Clear(u32),
    Uniform(i32),
    TexImage2d { width: i32, height: i32 },
    TexSubImage2d { x: i32, y: i32, width: i32, height: i32 },
    BufferData { len: usize },
    Enable(u32),
    Scissored(bool),
}

#[derive(Default)]
struct State {
    next_id: u32,
    locations: HashMap<(u32, String), i32>,
    next_location: HashMap<u32, i32>,
    calls: Vec<GlCall>,
    /// Uniform names reported as optimized out (location -1).
    missing_uniforms: Vec<String>,
    scissor_enabled: bool,
}

/// Recording fake. See module docs.
pub struct RecordingContext {
    state: RefCell<State>,
    max_texture_size: i32,
    use_es: bool,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::with_max_texture_size(4096)
    }

    pub fn with_max_texture_size(max_texture_size: i32) -> Self {
        Self {
            state: RefCell::new(State { next_id: 1, ..State::default() }),
            max_texture_size,
            use_es: false,
        }
    }

    /// Makes `uniform_location` report `name` as optimized out.
    pub fn drop_uniform(&self, name: &str) {
        self.state.borrow_mut().missing_uniforms.push(name.to_string());
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Count of calls matching a predicate.
    pub fn count_calls(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: GlCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn alloc_id(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        id
    }
}

impl GlContext for RecordingContext {
    fn make_current(&self) {}

    fn default_framebuffer(&self) -> u32 {
        0
    }

    fn max_texture_size(&self) -> i32 {
        self.max_texture_size
    }

    fn use_es(&self) -> bool {
        self.use_es
    }

    fn version(&self) -> (i32, i32) {
        (3, 2)
    }

    fn has_unpack_subimage(&self) -> bool {
        true
    }

    fn share_token(&self) -> u64 {
        1
    }

    fn has_debug(&self) -> bool {
        false
    }

    fn push_debug_group(&self, _label: &str) {}

    fn pop_debug_group(&self) {}

    fn create_texture(&self) -> u32 {
        self.alloc_id()
    }

    fn delete_textures(&self, _ids: &[u32]) {}

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, _target: u32, id: u32) {
        self.record(GlCall::BindTexture(id));
    }

    fn tex_parameter_i32(&self, _target: u32, _pname: u32, _value: i32) {}

    fn tex_image_2d(
        &self,
        _target: u32,
        _level: i32,
        _internal_format: u32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        _pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2d { width, height });
    }

    fn tex_sub_image_2d(
        &self,
        _target: u32,
        _level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        _pixels: &[u8],
    ) {
        self.record(GlCall::TexSubImage2d { x, y, width, height });
    }

    fn pixel_store(&self, _pname: u32, _value: i32) {}

    fn create_framebuffer(&self) -> u32 {
        self.alloc_id()
    }

    fn delete_framebuffers(&self, _ids: &[u32]) {}

    fn bind_framebuffer(&self, id: u32) {
        self.record(GlCall::BindFramebuffer(id));
    }

    fn framebuffer_texture_2d(&self, _attachment: u32, _texture: u32) {}

    fn check_framebuffer_complete(&self) -> bool {
        true
    }

    fn create_vertex_array(&self) -> u32 {
        self.alloc_id()
    }

    fn bind_vertex_array(&self, _id: u32) {}

    fn delete_vertex_array(&self, _id: u32) {}

    fn create_buffer(&self) -> u32 {
        self.alloc_id()
    }

    fn bind_array_buffer(&self, _id: u32) {}

    fn buffer_data(&self, data: &[u8]) {
        self.record(GlCall::BufferData { len: data.len() });
    }

    fn delete_buffer(&self, _id: u32) {}

    fn enable_vertex_attrib_array(&self, _index: u32) {}

    fn vertex_attrib_pointer(
        &self,
        _index: u32,
        _size: i32,
        _data_type: u32,
        _normalized: bool,
        _stride: i32,
        _offset: i32,
    ) {
    }

    fn create_program(&self) -> u32 {
        self.alloc_id()
    }

    fn delete_program(&self, _id: u32) {}

    fn create_shader(&self, _kind: u32) -> u32 {
        self.alloc_id()
    }

    fn shader_source(&self, _id: u32, _source: &str) {}

    fn compile_shader(&self, _id: u32) {}

    fn shader_compile_status(&self, _id: u32) -> bool {
        true
    }

    fn shader_info_log(&self, _id: u32) -> String {
        String::new()
    }

    fn delete_shader(&self, _id: u32) {}

    fn attach_shader(&self, _program: u32, _shader: u32) {}

    fn bind_attrib_location(&self, _program: u32, _index: u32, _name: &str) {}

    fn link_program(&self, _program: u32) {}

    fn link_status(&self, _program: u32) -> bool {
        true
    }

    fn program_info_log(&self, _program: u32) -> String {
        String::new()
    }

    fn use_program(&self, id: u32) {
        self.record(GlCall::UseProgram(id));
    }

    fn uniform_location(&self, program: u32, name: &str) -> i32 {
        let mut state = self.state.borrow_mut();
        if state.missing_uniforms.iter().any(|n| n == name) {
            return -1;
        }
        let key = (program, name.to_string());
        if let Some(loc) = state.locations.get(&key) {
            return *loc;
        }
        let next = state.next_location.entry(program).or_insert(0);
        let loc = *next;
        *next += 1;
        state.locations.insert(key, loc);
        loc
    }

    fn uniform_1fv(&self, location: i32, _values: &[f32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_2fv(&self, location: i32, _values: &[f32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_3fv(&self, location: i32, _values: &[f32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_4fv(&self, location: i32, _values: &[f32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_1iv(&self, location: i32, _values: &[i32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_2iv(&self, location: i32, _values: &[i32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_3iv(&self, location: i32, _values: &[i32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_4iv(&self, location: i32, _values: &[i32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_1uiv(&self, location: i32, _values: &[u32]) {
        self.record(GlCall::Uniform(location));
    }

    fn uniform_matrix_4fv(&self, location: i32, _values: &[f32]) {
        self.record(GlCall::Uniform(location));
    }

    fn draw_arrays_triangles(&self, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { first, count });
    }

    fn enable(&self, cap: u32) {
        if cap == glow::SCISSOR_TEST {
            self.state.borrow_mut().scissor_enabled = true;
            self.record(GlCall::Scissored(true));
        } else {
            self.record(GlCall::Enable(cap));
        }
    }

    fn disable(&self, cap: u32) {
        if cap == glow::SCISSOR_TEST {
            self.state.borrow_mut().scissor_enabled = false;
            self.record(GlCall::Scissored(false));
        }
    }

    fn blend_func(&self, _src: u32, _dst: u32) {}

    fn blend_equation(&self, _mode: u32) {}

    fn depth_func(&self, _func: u32) {}

    fn clear_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {}

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Scissor(x, y, width, height));
    }
}
