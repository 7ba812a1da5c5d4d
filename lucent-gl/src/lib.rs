//! A retained-mode OpenGL command queue and renderer for 2D scene graphs.
//!
//! The crate turns a tree of immutable [`lucent_scene`] render nodes into a
//! minimal, correctly ordered sequence of GL draw calls, reusing GPU
//! resources (textures, framebuffers, atlases, uniform state) across frames.
//!
//! Layering, leaves first:
//!
//! 1. [`uniform`] — per-program uniform values in a dedup arena.
//! 2. [`attachment`] — desired framebuffer/texture bindings.
//! 3. [`command`] — batch recording, merging, reordering, execution.
//! 4. [`driver`] — long-lived GPU resources, caches and pools.
//! 5. [`library`] — glyph/icon/shadow/path texture caches over atlases.
//! 6. [`job`] — the tree walker emitting batches.
//!
//! [`GlRenderer`] ties the layers together; embedders construct it over a
//! [`gl::GlContext`] and call [`GlRenderer::render`] per frame.

pub mod attachment;
pub mod command;
pub mod driver;
mod error;
pub mod gl;
pub mod job;
pub mod library;
mod renderer;
pub mod shader;
pub mod uniform;

pub use error::RenderError;
pub use renderer::{GlRenderer, RendererConfig};
