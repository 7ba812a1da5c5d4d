//! Renderer error types.
//!
//! Only construction-time work (shader compilation, program linking) and
//! render-target creation are fallible. Everything else logs at most once
//! per condition and keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to compile shader `{name}`: {log}")]
    ShaderCompile { name: String, log: String },

    #[error("failed to link program `{name}`: {log}")]
    ShaderLink { name: String, log: String },

    #[error("custom shader uses {given} uniforms, at most {max} supported")]
    TooManyShaderArgs { given: usize, max: usize },

    #[error("failed to create {width}x{height} render target")]
    RenderTarget { width: i32, height: i32 },
}
