//! GLSL assembly: profile detection, define blocks and source gluing.
//!
//! A program source file carries both stages, split by `// VERTEX_SHADER`
//! and `// FRAGMENT_SHADER` marker lines. Each stage is assembled as:
//! version line, profile defines, clip defines, shared preamble, per-stage
//! preamble, program section. A program with no vertex section uses the
//! preamble's default vertex main.

use crate::error::RenderError;
use crate::gl::GlContext;

const PREAMBLE: &str = include_str!("../../shaders/preamble.glsl");
const PREAMBLE_VS: &str = include_str!("../../shaders/preamble.vs.glsl");
const PREAMBLE_FS: &str = include_str!("../../shaders/preamble.fs.glsl");

const VERTEX_MARKER: &str = "// VERTEX_SHADER";
const FRAGMENT_MARKER: &str = "// FRAGMENT_SHADER";

/// The GLSL dialect picked for the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlslProfile {
    pub version: &'static str,
    pub gl3: bool,
    pub legacy: bool,
    pub gles: bool,
    pub gles3: bool,
}

impl GlslProfile {
    pub fn detect(gl: &dyn GlContext) -> Self {
        let (major, minor) = gl.version();
        if gl.use_es() {
            if major >= 3 {
                // For OpenGL ES 3.0+, use "300 es" as the shader version.
                Self { version: "300 es", gl3: false, legacy: false, gles: false, gles3: true }
            } else {
                Self { version: "100", gl3: false, legacy: false, gles: true, gles3: false }
            }
        } else if (major, minor) >= (3, 2) {
            Self { version: "150", gl3: true, legacy: false, gles: false, gles3: false }
        } else if major >= 3 {
            Self { version: "130", gl3: false, legacy: true, gles: false, gles3: false }
        } else {
            Self { version: "110", gl3: false, legacy: true, gles: false, gles3: false }
        }
    }

    fn define_block(&self, debug_shaders: bool) -> String {
        let mut block = String::new();
        if debug_shaders {
            block.push_str("#define LUCENT_DEBUG 1\n");
        }
        if self.legacy {
            block.push_str("#define LUCENT_LEGACY 1\n");
        }
        if self.gl3 {
            block.push_str("#define LUCENT_GL3 1\n");
        }
        if self.gles {
            block.push_str("#define LUCENT_GLES 1\n");
        }
        if self.gles3 {
            block.push_str("#define LUCENT_GLES3 1\n");
        }
        block
    }
}

/// Splits a combined program source into (vertex, fragment) sections.
fn split_stages(source: &str) -> (&str, &str) {
    let vertex_at = source.find(VERTEX_MARKER);
    let fragment_at = source.find(FRAGMENT_MARKER);
    match (vertex_at, fragment_at) {
        (Some(v), Some(f)) if v < f => (&source[v..f], &source[f..]),
        (None, Some(f)) => ("", &source[f..]),
        // No markers: the whole file is the fragment stage.
        _ => ("", source),
    }
}

/// See module docs.
pub struct Compiler<'a> {
    gl: &'a dyn GlContext,
    profile: GlslProfile,
    debug_shaders: bool,
}

impl<'a> Compiler<'a> {
    pub fn new(gl: &'a dyn GlContext, debug_shaders: bool) -> Self {
        let profile = GlslProfile::detect(gl);
        Self { gl, profile, debug_shaders }
    }

    pub fn profile(&self) -> GlslProfile {
        self.profile
    }

    fn assemble(&self, clip_defines: &str, stage_preamble: &str, section: &str) -> String {
        let mut out = String::with_capacity(
            64 + PREAMBLE.len() + stage_preamble.len() + section.len() + clip_defines.len(),
        );
        out.push_str(&format!("#version {}\n", self.profile.version));
        out.push_str(&self.profile.define_block(self.debug_shaders));
        out.push_str(clip_defines);
        out.push_str(PREAMBLE);
        out.push('\n');
        out.push_str(stage_preamble);
        out.push('\n');
        out.push_str(section);
        out.push('\n');
        out
    }

    fn compile_stage(&self, name: &str, kind: u32, source: &str) -> Result<u32, RenderError> {
        let shader = self.gl.create_shader(kind);
        self.gl.shader_source(shader, source);
        self.gl.compile_shader(shader);
        if !self.gl.shader_compile_status(shader) {
            let log = self.gl.shader_info_log(shader);
            if self.debug_shaders {
                log::debug!("shader `{name}` failed:\n{source}");
            }
            self.gl.delete_shader(shader);
            return Err(RenderError::ShaderCompile { name: name.to_string(), log });
        }
        Ok(shader)
    }

    /// Compiles and links one program from a combined source file.
    pub fn compile(
        &self,
        name: &str,
        source: &str,
        clip_defines: &str,
        attributes: &[(&str, u32)],
    ) -> Result<u32, RenderError> {
        let (vertex_section, fragment_section) = split_stages(source);

        let vertex = self.assemble(clip_defines, PREAMBLE_VS, vertex_section);
        let fragment = self.assemble(clip_defines, PREAMBLE_FS, fragment_section);

        if self.debug_shaders {
            log::debug!("compiling `{name}`:\n{vertex}\n{fragment}");
        }

        let vs = self.compile_stage(name, glow::VERTEX_SHADER, &vertex)?;
        let fs = match self.compile_stage(name, glow::FRAGMENT_SHADER, &fragment) {
            Ok(fs) => fs,
            Err(err) => {
                self.gl.delete_shader(vs);
                return Err(err);
            }
        };

        let program = self.gl.create_program();
        self.gl.attach_shader(program, vs);
        self.gl.attach_shader(program, fs);
        for (attr, index) in attributes {
            self.gl.bind_attrib_location(program, *index, attr);
        }
        self.gl.link_program(program);

        self.gl.delete_shader(vs);
        self.gl.delete_shader(fs);

        if !self.gl.link_status(program) {
            let log = self.gl.program_info_log(program);
            self.gl.delete_program(program);
            return Err(RenderError::ShaderLink { name: name.to_string(), log });
        }

        Ok(program)
    }
}
