//! Shader program registry: GLSL profile selection, preamble gluing and the
//! built-in program table.
//!
//! Every built-in program is compiled three times from one source — the
//! plain variant plus `NO_CLIP` and `RECT_CLIP` variants — so the render job
//! can pick the cheapest clip path per draw.

mod compiler;

pub use compiler::{Compiler, GlslProfile};

use crate::error::RenderError;
use crate::gl::GlContext;
use crate::uniform::{UniformProgramId, UniformState};

/// Uniform keys. Keys 0..=5 are the shared set every program binds by
/// convention; program-specific keys start at [`keys::FIRST_CUSTOM`] and
/// overlap freely between programs.
pub mod keys {
    pub const ALPHA: usize = 0;
    pub const SOURCE: usize = 1;
    pub const CLIP_RECT: usize = 2;
    pub const VIEWPORT: usize = 3;
    pub const PROJECTION: usize = 4;
    pub const MODELVIEW: usize = 5;
    pub const N_SHARED: usize = 6;

    pub const FIRST_CUSTOM: usize = N_SHARED;

    // blend
    pub const BLEND_SOURCE2: usize = FIRST_CUSTOM;
    pub const BLEND_MODE: usize = FIRST_CUSTOM + 1;

    // blur
    pub const BLUR_RADIUS: usize = FIRST_CUSTOM;
    pub const BLUR_SIZE: usize = FIRST_CUSTOM + 1;
    pub const BLUR_DIR: usize = FIRST_CUSTOM + 2;

    // border / filled_border
    pub const BORDER_WIDTHS: usize = FIRST_CUSTOM;
    pub const BORDER_OUTLINE_RECT: usize = FIRST_CUSTOM + 1;

    // color_matrix
    pub const COLOR_MATRIX_MATRIX: usize = FIRST_CUSTOM;
    pub const COLOR_MATRIX_OFFSET: usize = FIRST_CUSTOM + 1;

    // gradients
    pub const GRADIENT_COLOR_STOPS: usize = FIRST_CUSTOM;
    pub const GRADIENT_NUM_COLOR_STOPS: usize = FIRST_CUSTOM + 1;
    pub const LINEAR_GRADIENT_POINTS: usize = FIRST_CUSTOM + 2;
    pub const LINEAR_GRADIENT_REPEAT: usize = FIRST_CUSTOM + 3;
    pub const RADIAL_GRADIENT_GEOMETRY: usize = FIRST_CUSTOM + 2;
    pub const RADIAL_GRADIENT_RANGE: usize = FIRST_CUSTOM + 3;
    pub const RADIAL_GRADIENT_REPEAT: usize = FIRST_CUSTOM + 4;
    pub const CONIC_GRADIENT_GEOMETRY: usize = FIRST_CUSTOM + 2;

    // cross_fade
    pub const CROSS_FADE_PROGRESS: usize = FIRST_CUSTOM;
    pub const CROSS_FADE_SOURCE2: usize = FIRST_CUSTOM + 1;

    // inset / unblurred outset shadow
    pub const SHADOW_SPREAD: usize = FIRST_CUSTOM;
    pub const SHADOW_OFFSET: usize = FIRST_CUSTOM + 1;
    pub const SHADOW_OUTLINE_RECT: usize = FIRST_CUSTOM + 2;

    // blurred outset shadow
    pub const OUTSET_SHADOW_OUTLINE_RECT: usize = FIRST_CUSTOM;

    // repeat
    pub const REPEAT_CHILD_BOUNDS: usize = FIRST_CUSTOM;
    pub const REPEAT_TEXTURE_RECT: usize = FIRST_CUSTOM + 1;

    // mask
    pub const MASK_SOURCE: usize = FIRST_CUSTOM;

    // custom shaders
    pub const CUSTOM_SIZE: usize = FIRST_CUSTOM;
    pub const CUSTOM_TEXTURE1: usize = FIRST_CUSTOM + 1;
    pub const CUSTOM_TEXTURE2: usize = FIRST_CUSTOM + 2;
    pub const CUSTOM_TEXTURE3: usize = FIRST_CUSTOM + 3;
    pub const CUSTOM_TEXTURE4: usize = FIRST_CUSTOM + 4;
    pub const CUSTOM_ARG0: usize = FIRST_CUSTOM + 5;
}

/// Names of the shared uniforms, in key order.
const SHARED_UNIFORM_NAMES: [&str; keys::N_SHARED] =
    ["u_alpha", "u_source", "u_clip_rect", "u_viewport", "u_projection", "u_modelview"];

/// Attribute bindings provided by the vertex buffer.
const ATTRIBUTES: [(&str, u32); 4] =
    [("aPosition", 0), ("aUv", 1), ("aColor", 2), ("aColor2", 3)];

/// Custom-shader limits.
pub const MAX_CUSTOM_TEXTURES: usize = 4;
pub const MAX_CUSTOM_ARGS: usize = 8;

/// Every built-in program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ProgramKind {
    Blend = 0,
    Blit,
    Blur,
    Border,
    Color,
    ColorMatrix,
    Coloring,
    ConicGradient,
    CrossFade,
    FilledBorder,
    InsetShadow,
    LinearGradient,
    Linearize,
    LinearizePremultiply,
    Mask,
    OutsetShadow,
    Premultiply,
    RadialGradient,
    Repeat,
    UnblurredOutsetShadow,
}

pub const N_PROGRAM_KINDS: usize = 20;

impl ProgramKind {
    pub const ALL: [ProgramKind; N_PROGRAM_KINDS] = [
        ProgramKind::Blend,
        ProgramKind::Blit,
        ProgramKind::Blur,
        ProgramKind::Border,
        ProgramKind::Color,
        ProgramKind::ColorMatrix,
        ProgramKind::Coloring,
        ProgramKind::ConicGradient,
        ProgramKind::CrossFade,
        ProgramKind::FilledBorder,
        ProgramKind::InsetShadow,
        ProgramKind::LinearGradient,
        ProgramKind::Linearize,
        ProgramKind::LinearizePremultiply,
        ProgramKind::Mask,
        ProgramKind::OutsetShadow,
        ProgramKind::Premultiply,
        ProgramKind::RadialGradient,
        ProgramKind::Repeat,
        ProgramKind::UnblurredOutsetShadow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Blend => "blend",
            ProgramKind::Blit => "blit",
            ProgramKind::Blur => "blur",
            ProgramKind::Border => "border",
            ProgramKind::Color => "color",
            ProgramKind::ColorMatrix => "color_matrix",
            ProgramKind::Coloring => "coloring",
            ProgramKind::ConicGradient => "conic_gradient",
            ProgramKind::CrossFade => "cross_fade",
            ProgramKind::FilledBorder => "filled_border",
            ProgramKind::InsetShadow => "inset_shadow",
            ProgramKind::LinearGradient => "linear_gradient",
            ProgramKind::Linearize => "linearize",
            ProgramKind::LinearizePremultiply => "linearize_premultiply",
            ProgramKind::Mask => "mask",
            ProgramKind::OutsetShadow => "outset_shadow",
            ProgramKind::Premultiply => "premultiply",
            ProgramKind::RadialGradient => "radial_gradient",
            ProgramKind::Repeat => "repeat",
            ProgramKind::UnblurredOutsetShadow => "unblurred_outset_shadow",
        }
    }

    fn source(self) -> &'static str {
        match self {
            ProgramKind::Blend => include_str!("../../shaders/blend.glsl"),
            ProgramKind::Blit => include_str!("../../shaders/blit.glsl"),
            ProgramKind::Blur => include_str!("../../shaders/blur.glsl"),
            ProgramKind::Border => include_str!("../../shaders/border.glsl"),
            ProgramKind::Color => include_str!("../../shaders/color.glsl"),
            ProgramKind::ColorMatrix => include_str!("../../shaders/color_matrix.glsl"),
            ProgramKind::Coloring => include_str!("../../shaders/coloring.glsl"),
            ProgramKind::ConicGradient => include_str!("../../shaders/conic_gradient.glsl"),
            ProgramKind::CrossFade => include_str!("../../shaders/cross_fade.glsl"),
            ProgramKind::FilledBorder => include_str!("../../shaders/filled_border.glsl"),
            ProgramKind::InsetShadow => include_str!("../../shaders/inset_shadow.glsl"),
            ProgramKind::LinearGradient => include_str!("../../shaders/linear_gradient.glsl"),
            ProgramKind::Linearize => include_str!("../../shaders/linearize.glsl"),
            ProgramKind::LinearizePremultiply => {
                include_str!("../../shaders/linearize_premultiply.glsl")
            }
            ProgramKind::Mask => include_str!("../../shaders/mask.glsl"),
            ProgramKind::OutsetShadow => include_str!("../../shaders/outset_shadow.glsl"),
            ProgramKind::Premultiply => include_str!("../../shaders/premultiply.glsl"),
            ProgramKind::RadialGradient => include_str!("../../shaders/radial_gradient.glsl"),
            ProgramKind::Repeat => include_str!("../../shaders/repeat.glsl"),
            ProgramKind::UnblurredOutsetShadow => {
                include_str!("../../shaders/unblurred_outset_shadow.glsl")
            }
        }
    }

    /// Names of this program's own uniforms, in key order after the shared
    /// set.
    fn uniform_names(self) -> &'static [&'static str] {
        match self {
            ProgramKind::Blend => &["u_source2", "u_mode"],
            ProgramKind::Blur => &["u_blur_radius", "u_blur_size", "u_blur_dir"],
            ProgramKind::Border | ProgramKind::FilledBorder => &["u_widths", "u_outline_rect"],
            ProgramKind::ColorMatrix => &["u_color_matrix", "u_color_offset"],
            ProgramKind::ConicGradient => {
                &["u_color_stops", "u_num_color_stops", "u_geometry"]
            }
            ProgramKind::CrossFade => &["u_progress", "u_source2"],
            ProgramKind::InsetShadow | ProgramKind::UnblurredOutsetShadow => {
                &["u_spread", "u_offset", "u_outline_rect"]
            }
            ProgramKind::LinearGradient => {
                &["u_color_stops", "u_num_color_stops", "u_points", "u_repeat"]
            }
            ProgramKind::Mask => &["u_mask"],
            ProgramKind::OutsetShadow => &["u_outline_rect"],
            ProgramKind::RadialGradient => {
                &["u_color_stops", "u_num_color_stops", "u_geometry", "u_range", "u_repeat"]
            }
            ProgramKind::Repeat => &["u_child_bounds", "u_texture_rect"],
            ProgramKind::Blit
            | ProgramKind::Color
            | ProgramKind::Coloring
            | ProgramKind::Linearize
            | ProgramKind::LinearizePremultiply
            | ProgramKind::Premultiply => &[],
        }
    }
}

/// Which clip path a compiled variant implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ClipVariant {
    /// Full rounded-rect clip in the fragment shader.
    Rounded = 0,
    /// Rectangular clip only.
    Rect,
    /// No clipping; the draw is known to be fully contained.
    None,
}

/// A compiled, registered program.
#[derive(Debug, Clone, Copy)]
pub struct Program {
    /// GL program id.
    pub id: u32,
    /// Uniform table registered with the shared [`UniformState`].
    pub uniforms: UniformProgramId,
}

/// The table of built-in programs, three clip variants per kind.
pub struct Programs {
    programs: Vec<[Program; 3]>,
}

impl Programs {
    /// Compiles and registers every built-in program.
    pub fn load(
        gl: &dyn GlContext,
        uniforms: &mut UniformState,
        debug_shaders: bool,
    ) -> Result<Programs, RenderError> {
        let compiler = Compiler::new(gl, debug_shaders);
        let mut programs = Vec::with_capacity(N_PROGRAM_KINDS);

        for kind in ProgramKind::ALL {
            let source = kind.source();
            let variants = [
                ("", ClipVariant::Rounded),
                ("#define RECT_CLIP 1\n", ClipVariant::Rect),
                ("#define NO_CLIP 1\n", ClipVariant::None),
            ];
            let mut compiled = [Program { id: 0, uniforms: UniformProgramId(0) }; 3];
            for (defines, variant) in variants {
                let name = format!("{}{}", kind.name(), variant_suffix(variant));
                let id = compiler.compile(&name, source, defines, &ATTRIBUTES)?;
                compiled[variant as usize] =
                    register_program(gl, uniforms, id, kind.uniform_names());
            }
            programs.push(compiled);
        }

        Ok(Programs { programs })
    }

    pub fn get(&self, kind: ProgramKind, variant: ClipVariant) -> Program {
        self.programs[kind as usize][variant as usize]
    }

    pub fn delete_all(&self, gl: &dyn GlContext) {
        for variants in &self.programs {
            for program in variants {
                gl.delete_program(program.id);
            }
        }
    }
}

fn variant_suffix(variant: ClipVariant) -> &'static str {
    match variant {
        ClipVariant::Rounded => "",
        ClipVariant::Rect => "_rect_clip",
        ClipVariant::None => "_no_clip",
    }
}

/// Queries uniform locations in key order and registers the program with the
/// uniform store. Programs that sample `u_source` are flagged so end-of-draw
/// snapshots capture their texture bindings.
pub fn register_program(
    gl: &dyn GlContext,
    uniforms: &mut UniformState,
    program_id: u32,
    custom_names: &[&str],
) -> Program {
    let mut locations = Vec::with_capacity(keys::N_SHARED + custom_names.len());
    for name in SHARED_UNIFORM_NAMES {
        locations.push(gl.uniform_location(program_id, name));
    }
    for name in custom_names {
        locations.push(gl.uniform_location(program_id, name));
    }

    let has_alpha = locations[keys::ALPHA] >= 0;
    let has_attachments = locations[keys::SOURCE] >= 0;
    let uniform_id = uniforms.register_program(program_id, &locations, has_attachments);

    if has_alpha {
        uniforms.set_1f(uniform_id, keys::ALPHA, 0, 1.0);
    }

    Program { id: program_id, uniforms: uniform_id }
}

/// Compiles a user-supplied fragment snippet into a program with the
/// standard uniform set plus `u_size`, `u_texture1..4` and the snippet's own
/// uniforms (declared here from the shader's schema).
pub fn compile_custom_program(
    gl: &dyn GlContext,
    uniforms: &mut UniformState,
    shader: &lucent_scene::ShaderSource,
    debug_shaders: bool,
) -> Result<Program, RenderError> {
    use lucent_scene::ShaderArgKind;

    if shader.uniforms.len() > MAX_CUSTOM_ARGS {
        return Err(RenderError::TooManyShaderArgs {
            given: shader.uniforms.len(),
            max: MAX_CUSTOM_ARGS,
        });
    }

    let compiler = Compiler::new(gl, debug_shaders);
    let mut source = String::from(include_str!("../../shaders/custom_preamble.glsl"));
    for def in &shader.uniforms {
        let glsl_type = match def.kind {
            ShaderArgKind::Float => "float",
            ShaderArgKind::Int => "int",
            ShaderArgKind::UInt | ShaderArgKind::Bool => "uint",
            ShaderArgKind::Vec2 => "vec2",
            ShaderArgKind::Vec3 => "vec3",
            ShaderArgKind::Vec4 => "vec4",
        };
        source.push_str(&format!("uniform {} {};\n", glsl_type, def.name));
    }
    source.push_str(&shader.source);
    source.push_str(include_str!("../../shaders/custom_postamble.glsl"));

    let id = compiler.compile("custom", &source, "#define NO_CLIP 1\n", &ATTRIBUTES)?;

    let mut custom_names: Vec<&str> =
        vec!["u_size", "u_texture1", "u_texture2", "u_texture3", "u_texture4"];
    for def in &shader.uniforms {
        custom_names.push(&def.name);
    }
    Ok(register_program(gl, uniforms, id, &custom_names))
}
