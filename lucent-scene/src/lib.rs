//! Immutable 2D scene model consumed by the lucent GL renderer.
//!
//! A scene is a tree of reference-counted [`RenderNode`]s plus the supporting
//! geometry ([`Rect`], [`RoundedRect`], [`Transform`]) and resource handles
//! (textures, fonts, paths). Nodes never change after construction; renderers
//! key their caches off node identity (the `Arc` pointer).

mod color;
mod font;
mod node;
mod path;
mod rect;
mod rounded_rect;
mod texture;
mod transform;

pub use color::{Color, ColorStop};
pub use font::{Font, GlyphBitmap, GlyphRasterizer, IntRect, PositionedGlyph, GLYPH_UNITS};
pub use node::{
    BlendMode, CanvasPainter, NodeKind, NodeRef, PixelBuffer, RenderNode, ShaderArgKind,
    ShaderSource, ShaderUniformDef, Shadow,
};
pub use path::{Contour, FillRule, Path, PathOp, StrokeStyle};
pub use rect::Rect;
pub use rounded_rect::{CornerSize, RoundedRect, BOTTOM_LEFT, BOTTOM_RIGHT, TOP_LEFT, TOP_RIGHT};
pub use texture::{ColorState, ImageTexture, MemoryFormat, TextureData};
pub use transform::{Transform, TransformCategory};
