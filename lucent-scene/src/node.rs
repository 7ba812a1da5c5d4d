//! The render-node tree.
//!
//! Nodes are immutable and reference counted; constructors compute the
//! node's bounds once. Renderers treat the `Arc` pointer as the node's
//! identity when memoizing offscreen results, so a caller that rebuilds an
//! identical subtree every frame gets no caching. Keep subtrees alive and
//! reuse them.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec4};

use crate::{
    Color, ColorStop, FillRule, Font, ImageTexture, Path, PositionedGlyph, Rect, RoundedRect,
    StrokeStyle, Transform, GLYPH_UNITS,
};

/// Shared handle to a render node.
pub type NodeRef = Arc<RenderNode>;

/// Pixel-mode blend modes of the blend node, matching the blend shader's
/// mode uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum BlendMode {
    Default = 0,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Color,
    Hue,
    Saturation,
    Luminosity,
}

/// One drop shadow of a shadow node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub dx: f32,
    pub dy: f32,
    pub radius: f32,
}

/// An upload-ready pixel buffer produced by a [`CanvasPainter`]:
/// tightly packed premultiplied RGBA.
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

/// Software drawing hook used by canvas nodes and as the renderer's fallback
/// rasterizer. Given a target size in device pixels and the scale that got
/// there, returns the rendered pixels.
pub trait CanvasPainter: Send + Sync {
    fn paint(&self, width: u32, height: u32, scale_x: f32, scale_y: f32) -> Option<PixelBuffer>;
}

/// Type of one uniform of a custom shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderArgKind {
    Float,
    Int,
    UInt,
    Bool,
    Vec2,
    Vec3,
    Vec4,
}

impl ShaderArgKind {
    pub fn size(&self) -> usize {
        match self {
            ShaderArgKind::Float | ShaderArgKind::Int | ShaderArgKind::UInt
            | ShaderArgKind::Bool => 4,
            ShaderArgKind::Vec2 => 8,
            ShaderArgKind::Vec3 => 12,
            ShaderArgKind::Vec4 => 16,
        }
    }
}

/// Declaration of one custom-shader uniform and its offset into the args
/// blob.
#[derive(Debug, Clone)]
pub struct ShaderUniformDef {
    pub name: String,
    pub kind: ShaderArgKind,
    pub offset: usize,
}

/// A user-supplied fragment shader snippet plus its uniform schema.
/// Compiled lazily by the renderer and cached by pointer identity.
pub struct ShaderSource {
    pub source: String,
    pub uniforms: Vec<ShaderUniformDef>,
}

impl ShaderSource {
    pub fn new(source: String, uniforms: Vec<ShaderUniformDef>) -> Self {
        Self { source, uniforms }
    }

    pub fn args_size(&self) -> usize {
        self.uniforms.iter().map(|u| u.offset + u.kind.size()).max().unwrap_or(0)
    }
}

/// What a node draws. See the constructors on [`RenderNode`] for the
/// invariants of each kind.
pub enum NodeKind {
    Color {
        color: Color,
    },
    LinearGradient {
        start: Vec2,
        end: Vec2,
        stops: Vec<ColorStop>,
        repeating: bool,
    },
    RadialGradient {
        center: Vec2,
        hradius: f32,
        vradius: f32,
        start: f32,
        end: f32,
        stops: Vec<ColorStop>,
        repeating: bool,
    },
    ConicGradient {
        center: Vec2,
        angle: f32,
        stops: Vec<ColorStop>,
    },
    Border {
        outline: RoundedRect,
        widths: [f32; 4],
        colors: [Color; 4],
        uniform_color: bool,
    },
    Clip {
        clip: Rect,
        child: NodeRef,
    },
    RoundedClip {
        clip: RoundedRect,
        child: NodeRef,
    },
    Transform {
        transform: Transform,
        child: NodeRef,
    },
    Opacity {
        opacity: f32,
        child: NodeRef,
    },
    Container {
        children: Vec<NodeRef>,
    },
    Shadow {
        shadows: Vec<Shadow>,
        child: NodeRef,
    },
    InsetShadow {
        outline: RoundedRect,
        color: Color,
        dx: f32,
        dy: f32,
        spread: f32,
        blur_radius: f32,
    },
    OutsetShadow {
        outline: RoundedRect,
        color: Color,
        dx: f32,
        dy: f32,
        spread: f32,
        blur_radius: f32,
    },
    Blur {
        radius: f32,
        child: NodeRef,
    },
    CrossFade {
        start: NodeRef,
        end: NodeRef,
        progress: f32,
    },
    Blend {
        bottom: NodeRef,
        top: NodeRef,
        mode: BlendMode,
    },
    ColorMatrix {
        matrix: Mat4,
        offset: Vec4,
        child: NodeRef,
    },
    Text {
        font: Arc<Font>,
        glyphs: Vec<PositionedGlyph>,
        color: Color,
        offset: Vec2,
        has_color_glyphs: bool,
    },
    Texture {
        texture: Arc<ImageTexture>,
    },
    Repeat {
        child: NodeRef,
        child_bounds: Rect,
    },
    Debug {
        child: NodeRef,
        message: String,
    },
    Canvas {
        painter: Arc<dyn CanvasPainter>,
    },
    CustomShader {
        shader: Arc<ShaderSource>,
        args: Vec<u8>,
        children: Vec<NodeRef>,
    },
    Fill {
        path: Arc<Path>,
        fill_rule: FillRule,
        child: NodeRef,
    },
    Stroke {
        path: Arc<Path>,
        style: StrokeStyle,
        child: NodeRef,
    },
}

/// One node of the scene tree: bounds plus the drawing payload.
pub struct RenderNode {
    bounds: Rect,
    kind: NodeKind,
}

impl RenderNode {
    fn wrap(bounds: Rect, kind: NodeKind) -> NodeRef {
        Arc::new(RenderNode { bounds, kind })
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Stable identity used by renderer caches.
    pub fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    /// Whether the node draws nothing because its bounds are empty.
    pub fn is_invisible(&self) -> bool {
        self.bounds.width == 0.0 || self.bounds.height == 0.0
    }

    pub fn color(bounds: Rect, color: Color) -> NodeRef {
        Self::wrap(bounds, NodeKind::Color { color })
    }

    pub fn linear_gradient(
        bounds: Rect,
        start: Vec2,
        end: Vec2,
        stops: Vec<ColorStop>,
        repeating: bool,
    ) -> NodeRef {
        Self::wrap(bounds, NodeKind::LinearGradient { start, end, stops, repeating })
    }

    pub fn radial_gradient(
        bounds: Rect,
        center: Vec2,
        hradius: f32,
        vradius: f32,
        start: f32,
        end: f32,
        stops: Vec<ColorStop>,
        repeating: bool,
    ) -> NodeRef {
        Self::wrap(
            bounds,
            NodeKind::RadialGradient { center, hradius, vradius, start, end, stops, repeating },
        )
    }

    pub fn conic_gradient(bounds: Rect, center: Vec2, angle: f32, stops: Vec<ColorStop>) -> NodeRef {
        Self::wrap(bounds, NodeKind::ConicGradient { center, angle, stops })
    }

    pub fn border(outline: RoundedRect, widths: [f32; 4], colors: [Color; 4]) -> NodeRef {
        let uniform_color = colors[1] == colors[0] && colors[2] == colors[0] && colors[3] == colors[0];
        Self::wrap(outline.bounds, NodeKind::Border { outline, widths, colors, uniform_color })
    }

    pub fn clip(clip: Rect, child: NodeRef) -> NodeRef {
        let bounds = clip.intersection(&child.bounds());
        Self::wrap(bounds, NodeKind::Clip { clip, child })
    }

    pub fn rounded_clip(clip: RoundedRect, child: NodeRef) -> NodeRef {
        let bounds = clip.bounds.intersection(&child.bounds());
        Self::wrap(bounds, NodeKind::RoundedClip { clip, child })
    }

    pub fn transform(transform: Transform, child: NodeRef) -> NodeRef {
        let bounds = transform.transform_bounds(&child.bounds());
        Self::wrap(bounds, NodeKind::Transform { transform, child })
    }

    pub fn opacity(opacity: f32, child: NodeRef) -> NodeRef {
        Self::wrap(child.bounds(), NodeKind::Opacity { opacity, child })
    }

    pub fn container(children: Vec<NodeRef>) -> NodeRef {
        let mut bounds = Rect::ZERO;
        for (i, child) in children.iter().enumerate() {
            bounds = if i == 0 { child.bounds() } else { bounds.union(&child.bounds()) };
        }
        Self::wrap(bounds, NodeKind::Container { children })
    }

    pub fn shadow(child: NodeRef, shadows: Vec<Shadow>) -> NodeRef {
        let mut bounds = child.bounds();
        for shadow in &shadows {
            let b = child
                .bounds()
                .offset(shadow.dx, shadow.dy)
                .inset(-shadow.radius, -shadow.radius);
            bounds = bounds.union(&b);
        }
        Self::wrap(bounds, NodeKind::Shadow { shadows, child })
    }

    pub fn inset_shadow(
        outline: RoundedRect,
        color: Color,
        dx: f32,
        dy: f32,
        spread: f32,
        blur_radius: f32,
    ) -> NodeRef {
        Self::wrap(
            outline.bounds,
            NodeKind::InsetShadow { outline, color, dx, dy, spread, blur_radius },
        )
    }

    pub fn outset_shadow(
        outline: RoundedRect,
        color: Color,
        dx: f32,
        dy: f32,
        spread: f32,
        blur_radius: f32,
    ) -> NodeRef {
        let extra = spread + blur_radius;
        let bounds = outline.bounds.offset(dx, dy).inset(-extra, -extra).union(&outline.bounds);
        Self::wrap(bounds, NodeKind::OutsetShadow { outline, color, dx, dy, spread, blur_radius })
    }

    pub fn blur(radius: f32, child: NodeRef) -> NodeRef {
        let bounds = child.bounds().inset(-radius, -radius);
        Self::wrap(bounds, NodeKind::Blur { radius, child })
    }

    pub fn cross_fade(start: NodeRef, end: NodeRef, progress: f32) -> NodeRef {
        let bounds = start.bounds().union(&end.bounds());
        Self::wrap(bounds, NodeKind::CrossFade { start, end, progress })
    }

    pub fn blend(bottom: NodeRef, top: NodeRef, mode: BlendMode) -> NodeRef {
        let bounds = bottom.bounds().union(&top.bounds());
        Self::wrap(bounds, NodeKind::Blend { bottom, top, mode })
    }

    pub fn color_matrix(matrix: Mat4, offset: Vec4, child: NodeRef) -> NodeRef {
        Self::wrap(child.bounds(), NodeKind::ColorMatrix { matrix, offset, child })
    }

    pub fn text(
        font: Arc<Font>,
        glyphs: Vec<PositionedGlyph>,
        color: Color,
        offset: Vec2,
    ) -> NodeRef {
        let mut bounds = Rect::ZERO;
        let mut x_position = 0i32;
        let has_color_glyphs = glyphs.iter().any(|g| g.is_color);
        for (i, glyph) in glyphs.iter().enumerate() {
            let ink = font.rasterizer().ink_rect(glyph.glyph);
            let gx = offset.x + (x_position + glyph.x_offset) as f32 / GLYPH_UNITS as f32;
            let gy = offset.y + glyph.y_offset as f32 / GLYPH_UNITS as f32;
            let r = Rect::new(
                gx + ink.x as f32,
                gy + ink.y as f32,
                ink.width as f32,
                ink.height as f32,
            );
            bounds = if i == 0 { r } else { bounds.union(&r) };
            x_position += glyph.width;
        }
        Self::wrap(bounds, NodeKind::Text { font, glyphs, color, offset, has_color_glyphs })
    }

    pub fn texture(bounds: Rect, texture: Arc<ImageTexture>) -> NodeRef {
        Self::wrap(bounds, NodeKind::Texture { texture })
    }

    pub fn repeat(bounds: Rect, child: NodeRef, child_bounds: Option<Rect>) -> NodeRef {
        let child_bounds = child_bounds.unwrap_or_else(|| child.bounds());
        Self::wrap(bounds, NodeKind::Repeat { child, child_bounds })
    }

    pub fn debug(child: NodeRef, message: String) -> NodeRef {
        Self::wrap(child.bounds(), NodeKind::Debug { child, message })
    }

    pub fn canvas(bounds: Rect, painter: Arc<dyn CanvasPainter>) -> NodeRef {
        Self::wrap(bounds, NodeKind::Canvas { painter })
    }

    pub fn custom_shader(
        bounds: Rect,
        shader: Arc<ShaderSource>,
        args: Vec<u8>,
        children: Vec<NodeRef>,
    ) -> NodeRef {
        debug_assert!(children.len() <= 4);
        debug_assert!(args.len() >= shader.args_size());
        Self::wrap(bounds, NodeKind::CustomShader { shader, args, children })
    }

    pub fn fill(path: Arc<Path>, fill_rule: FillRule, child: NodeRef) -> NodeRef {
        let bounds = path.bounds().intersection(&child.bounds());
        Self::wrap(bounds, NodeKind::Fill { path, fill_rule, child })
    }

    pub fn stroke(path: Arc<Path>, style: StrokeStyle, child: NodeRef) -> NodeRef {
        let half = style.width / 2.0;
        let bounds = path.bounds().inset(-half, -half).intersection(&child.bounds());
        Self::wrap(bounds, NodeKind::Stroke { path, style, child })
    }
}

impl std::fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            NodeKind::Color { .. } => "Color",
            NodeKind::LinearGradient { .. } => "LinearGradient",
            NodeKind::RadialGradient { .. } => "RadialGradient",
            NodeKind::ConicGradient { .. } => "ConicGradient",
            NodeKind::Border { .. } => "Border",
            NodeKind::Clip { .. } => "Clip",
            NodeKind::RoundedClip { .. } => "RoundedClip",
            NodeKind::Transform { .. } => "Transform",
            NodeKind::Opacity { .. } => "Opacity",
            NodeKind::Container { .. } => "Container",
            NodeKind::Shadow { .. } => "Shadow",
            NodeKind::InsetShadow { .. } => "InsetShadow",
            NodeKind::OutsetShadow { .. } => "OutsetShadow",
            NodeKind::Blur { .. } => "Blur",
            NodeKind::CrossFade { .. } => "CrossFade",
            NodeKind::Blend { .. } => "Blend",
            NodeKind::ColorMatrix { .. } => "ColorMatrix",
            NodeKind::Text { .. } => "Text",
            NodeKind::Texture { .. } => "Texture",
            NodeKind::Repeat { .. } => "Repeat",
            NodeKind::Debug { .. } => "Debug",
            NodeKind::Canvas { .. } => "Canvas",
            NodeKind::CustomShader { .. } => "CustomShader",
            NodeKind::Fill { .. } => "Fill",
            NodeKind::Stroke { .. } => "Stroke",
        };
        f.debug_struct("RenderNode").field("kind", &kind).field("bounds", &self.bounds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_bounds_union() {
        let a = RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        let b = RenderNode::color(Rect::new(10.0, 0.0, 10.0, 10.0), Color::WHITE);
        let c = RenderNode::container(vec![a, b]);
        assert_eq!(c.bounds(), Rect::new(0.0, 0.0, 20.0, 10.0));
    }

    #[test]
    fn test_clip_bounds_intersection() {
        let child = RenderNode::color(Rect::new(0.0, 0.0, 100.0, 100.0), Color::WHITE);
        let clipped = RenderNode::clip(Rect::new(25.0, 25.0, 200.0, 200.0), child);
        assert_eq!(clipped.bounds(), Rect::new(25.0, 25.0, 75.0, 75.0));
    }

    #[test]
    fn test_border_uniform_color_flag() {
        let outline = RoundedRect::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let n = RenderNode::border(outline, [1.0; 4], [Color::BLACK; 4]);
        assert!(matches!(n.kind(), NodeKind::Border { uniform_color: true, .. }));

        let mut colors = [Color::BLACK; 4];
        colors[2] = Color::WHITE;
        let n = RenderNode::border(outline, [1.0; 4], colors);
        assert!(matches!(n.kind(), NodeKind::Border { uniform_color: false, .. }));
    }

    #[test]
    fn test_outset_shadow_bounds_grow() {
        let outline = RoundedRect::from_rect(Rect::new(10.0, 10.0, 20.0, 20.0));
        let n = RenderNode::outset_shadow(outline, Color::BLACK, 2.0, 3.0, 1.0, 4.0);
        assert!(n.bounds().contains_rect(&outline.bounds));
        assert!(n.bounds().width > outline.bounds.width);
    }

    #[test]
    fn test_transform_node_bounds() {
        let child = RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        let n = RenderNode::transform(Transform::translate(5.0, 5.0), child);
        assert_eq!(n.bounds(), Rect::new(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_node_identity_is_pointer() {
        let a = RenderNode::color(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        let c = RenderNode::color(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);
        assert_ne!(a.id(), c.id());
    }
}
