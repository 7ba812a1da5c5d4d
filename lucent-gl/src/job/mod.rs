//! The render job: walks a render-node tree and emits batches into the
//! command queue.
//!
//! A job is stateful per render: it carries the viewport, the projection,
//! the modelview and clip stacks, the implicit offset, and the alpha
//! multiplier. Visitors translate each node kind into draws (or offscreen
//! passes) while the clip stack prunes invisible subtrees early.

mod effects;
mod offscreen;
mod paths;
mod shapes;
mod text;
#[cfg(test)]
mod tests;
mod visitors;

use glam::Mat4;
use half::f16;
use lucent_scene::{Color, NodeRef, Rect, RoundedRect, Transform, TransformCategory};

use crate::command::{ClearMask, DrawVertex};
use crate::driver::{ortho_projection, GlDriver, TextureArea};
use crate::library::{GlyphLibrary, IconLibrary, PathCache, ShadowLibrary};
use crate::shader::{keys, ClipVariant, Program, ProgramKind};

pub(crate) const MAX_GRADIENT_STOPS: usize = 6;
pub(crate) const SHADOW_EXTRA_SIZE: f32 = 4.0;

pub(crate) const FP16_ZERO: [f16; 4] = [f16::ZERO; 4];

pub(crate) fn color_to_half(color: &Color) -> [f16; 4] {
    [
        f16::from_f32(color.r),
        f16::from_f32(color.g),
        f16::from_f32(color.b),
        f16::from_f32(color.a),
    ]
}

/// One frame of the modelview stack.
pub(super) struct Modelview {
    pub transform: Transform,
    pub scale_x: f32,
    pub scale_y: f32,
    pub dx: f32,
    pub dy: f32,
    pub offset_x_before: f32,
    pub offset_y_before: f32,
    pub matrix: Mat4,
}

impl Modelview {
    fn new(transform: Transform) -> Self {
        let matrix = transform.matrix();
        let (scale_x, scale_y, dx, dy) = match transform.category() {
            TransformCategory::Identity => (1.0, 1.0, 0.0, 0.0),
            TransformCategory::Translate2d => {
                let (dx, dy) = transform.to_translate();
                (1.0, 1.0, dx, dy)
            }
            TransformCategory::Affine2d => transform.to_affine(),
            TransformCategory::Dim2 => {
                let (xx, yx, xy, yy, _, _) = transform.to_2d();
                ((xx * xx + yx * yx).sqrt(), (xy * xy + yy * yy).sqrt(), 0.0, 0.0)
            }
            _ => {
                let col1 = matrix.x_axis.truncate();
                let col2 = matrix.y_axis.truncate();
                (col1.length(), col2.length(), 0.0, 0.0)
            }
        };
        Self {
            transform,
            scale_x,
            scale_y,
            dx,
            dy,
            offset_x_before: 0.0,
            offset_y_before: 0.0,
            matrix,
        }
    }
}

/// One frame of the clip stack.
#[derive(Clone)]
pub(super) struct ClipFrame {
    pub rect: RoundedRect,
    pub is_rectilinear: bool,
    pub is_fully_contained: bool,
}

/// Parameters and results of rendering a subtree to a texture.
pub(crate) struct Offscreen {
    pub bounds: Rect,
    pub area: TextureArea,
    pub texture_id: u32,
    pub force_offscreen: bool,
    pub reset_clip: bool,
    pub do_not_cache: bool,
    pub linear_filter: bool,
    /// Whether the texture came from an offscreen render (its v axis is
    /// flipped relative to uploads).
    pub was_offscreen: bool,
}

impl Offscreen {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            area: TextureArea::FULL,
            texture_id: 0,
            force_offscreen: false,
            reset_clip: false,
            do_not_cache: false,
            linear_filter: false,
            was_offscreen: false,
        }
    }
}

/// Software rasterization hook for nodes the GPU path cannot express
/// (many-stop gradients, arbitrary repeats, path masks). Mirrors the canvas
/// painter but receives the node to draw.
pub trait FallbackPainter {
    fn paint_node(
        &self,
        node: &lucent_scene::RenderNode,
        width: u32,
        height: u32,
        scale_x: f32,
        scale_y: f32,
    ) -> Option<lucent_scene::PixelBuffer>;
}

/// See module docs.
pub struct RenderJob<'a> {
    pub(super) driver: &'a mut GlDriver,
    pub(super) glyphs: &'a mut GlyphLibrary,
    pub(super) icons: &'a mut IconLibrary,
    pub(super) shadows: &'a mut ShadowLibrary,
    pub(super) paths: &'a mut PathCache,
    pub(super) fallback: Option<&'a dyn FallbackPainter>,

    pub(super) region: Option<Rect>,
    pub(super) framebuffer: u32,
    pub(super) default_framebuffer: u32,
    pub(super) viewport: Rect,
    pub(super) projection: Mat4,

    pub(super) modelview: Vec<Modelview>,
    pub(super) clip: Vec<ClipFrame>,

    pub(super) alpha: f32,
    pub(super) offset_x: f32,
    pub(super) offset_y: f32,
    pub(super) scale_x: f32,
    pub(super) scale_y: f32,

    pub(super) current_program: Option<Program>,
    pub(super) debug_fallback: bool,
    pub(super) clear_framebuffer: bool,
    pub(super) target_format: u32,
    pub(super) warned_no_fallback: bool,
}

pub struct RenderJobResources<'a> {
    pub driver: &'a mut GlDriver,
    pub glyphs: &'a mut GlyphLibrary,
    pub icons: &'a mut IconLibrary,
    pub shadows: &'a mut ShadowLibrary,
    pub paths: &'a mut PathCache,
    pub fallback: Option<&'a dyn FallbackPainter>,
}

impl<'a> RenderJob<'a> {
    pub fn new(
        resources: RenderJobResources<'a>,
        viewport: Rect,
        scale_factor: f32,
        region: Option<Rect>,
        framebuffer: u32,
        clear_framebuffer: bool,
    ) -> Self {
        let default_framebuffer = resources.driver.gl().default_framebuffer();
        let framebuffer = if framebuffer == 0 { default_framebuffer } else { framebuffer };

        let mut job = Self {
            driver: resources.driver,
            glyphs: resources.glyphs,
            icons: resources.icons,
            shadows: resources.shadows,
            paths: resources.paths,
            fallback: resources.fallback,
            region: None,
            framebuffer,
            default_framebuffer,
            viewport,
            projection: Mat4::IDENTITY,
            modelview: Vec::with_capacity(16),
            clip: Vec::with_capacity(16),
            alpha: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: scale_factor,
            scale_y: scale_factor,
            current_program: None,
            debug_fallback: false,
            clear_framebuffer,
            target_format: glow::RGBA8,
            warned_no_fallback: false,
        };

        job.set_alpha(1.0);
        job.set_projection(ortho_projection(&viewport));
        job.set_modelview(Transform::scale(scale_factor, scale_factor));

        // Initial clip: the whole viewport, or the damage region's extent
        // transformed into framebuffer coordinates.
        let clip_rect = match region {
            Some(region) => {
                let transformed = job.transform_bounds(&region);
                job.region = Some(region);
                transformed
            }
            None => viewport,
        };
        job.push_clip(RoundedRect::from_rect(clip_rect));

        job
    }

    pub fn set_debug_fallback(&mut self, debug_fallback: bool) {
        self.debug_fallback = debug_fallback;
    }

    // ---- alpha ----

    pub(super) fn set_alpha(&mut self, alpha: f32) -> f32 {
        if self.alpha != alpha {
            let prev = self.alpha;
            self.alpha = alpha;
            self.driver.bump_stamp(keys::ALPHA);
            prev
        } else {
            alpha
        }
    }

    // ---- modelview stack ----

    pub(super) fn current_modelview(&self) -> &Modelview {
        self.modelview.last().expect("empty modelview stack")
    }

    /// Pushes a frame without composing; used to reset state for offscreen
    /// passes.
    pub(super) fn set_modelview(&mut self, transform: Transform) {
        self.driver.bump_stamp(keys::MODELVIEW);
        let mut frame = Modelview::new(transform);
        frame.offset_x_before = self.offset_x;
        frame.offset_y_before = self.offset_y;
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.scale_x = frame.scale_x;
        self.scale_y = frame.scale_y;
        self.modelview.push(frame);
    }

    /// Composes `transform` onto the current modelview (after folding the
    /// pending offset) and pushes the result.
    pub(super) fn push_modelview(&mut self, transform: Transform) {
        self.driver.bump_stamp(keys::MODELVIEW);
        let composed = match self.modelview.last() {
            Some(last) => {
                last.transform.pre_translate(self.offset_x, self.offset_y).then(&transform)
            }
            None => transform,
        };
        let mut frame = Modelview::new(composed);
        frame.offset_x_before = self.offset_x;
        frame.offset_y_before = self.offset_y;
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.scale_x = frame.scale_x;
        self.scale_y = frame.scale_y;
        self.modelview.push(frame);
    }

    pub(super) fn pop_modelview(&mut self) {
        self.driver.bump_stamp(keys::MODELVIEW);
        let frame = self.modelview.pop().expect("unbalanced modelview pop");
        self.offset_x = frame.offset_x_before;
        self.offset_y = frame.offset_y_before;
        if let Some(last) = self.modelview.last() {
            self.scale_x = last.scale_x;
            self.scale_y = last.scale_y;
        }
    }

    // ---- clip stack ----

    pub(super) fn current_clip(&self) -> &ClipFrame {
        self.clip.last().expect("empty clip stack")
    }

    pub(super) fn push_clip(&mut self, rect: RoundedRect) {
        self.driver.bump_stamp(keys::CLIP_RECT);
        let is_rectilinear = rect.is_rectilinear();
        self.clip.push(ClipFrame { rect, is_rectilinear, is_fully_contained: false });
    }

    /// Marks descendants as certainly inside the clip so they skip clip
    /// work and select `NO_CLIP` program variants.
    pub(super) fn push_contained_clip(&mut self) {
        self.driver.bump_stamp(keys::CLIP_RECT);
        let bounds = self.current_clip().rect.bounds;
        self.clip.push(ClipFrame {
            rect: RoundedRect::from_rect(bounds),
            is_rectilinear: true,
            is_fully_contained: true,
        });
    }

    pub(super) fn pop_clip(&mut self) {
        self.driver.bump_stamp(keys::CLIP_RECT);
        self.clip.pop().expect("unbalanced clip pop");
    }

    // ---- offsets, viewport, projection ----

    pub(super) fn offset(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    pub(super) fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
        self.driver.bump_stamp(keys::PROJECTION);
    }

    pub(super) fn set_projection_from_rect(&mut self, rect: &Rect) -> Mat4 {
        let prev = self.projection;
        self.set_projection(ortho_projection(rect));
        prev
    }

    pub(super) fn set_projection_for_size(&mut self, width: f32, height: f32) -> Mat4 {
        self.set_projection_from_rect(&Rect::from_size(width, height))
    }

    pub(super) fn set_viewport(&mut self, viewport: Rect) -> Rect {
        let prev = self.viewport;
        self.viewport = viewport;
        self.driver.bump_stamp(keys::VIEWPORT);
        prev
    }

    pub(super) fn set_viewport_for_size(&mut self, width: f32, height: f32) -> Rect {
        self.set_viewport(Rect::from_size(width, height))
    }

    // ---- geometry ----

    /// Node-space rect to framebuffer space through offset + modelview.
    pub(super) fn transform_bounds(&self, rect: &Rect) -> Rect {
        let modelview = self.current_modelview();
        let category = modelview.transform.category();

        if category >= TransformCategory::Affine2d {
            Rect::new(
                (rect.x + self.offset_x) * modelview.scale_x + modelview.dx,
                (rect.y + self.offset_y) * modelview.scale_y + modelview.dy,
                rect.width * modelview.scale_x,
                rect.height * modelview.scale_y,
            )
            .normalize()
        } else {
            let offset_rect = rect.offset(self.offset_x, self.offset_y);
            modelview.transform.transform_bounds(&offset_rect)
        }
    }

    /// Applies only the implicit offset; corners are left untouched because
    /// the draw itself runs under the modelview.
    pub(super) fn transform_rounded_rect(&self, rect: &RoundedRect) -> RoundedRect {
        RoundedRect { bounds: rect.bounds.offset(self.offset_x, self.offset_y), corners: rect.corners }
    }

    /// Clip admission for a node's bounds. Returns false when the subtree is
    /// entirely clipped away; otherwise may push a tightened or
    /// fully-contained clip (signalled through the second flag).
    pub(super) fn update_clip(&mut self, bounds: &Rect) -> (bool, bool) {
        if self.current_clip().is_fully_contained {
            return (true, false);
        }

        let transformed = self.transform_bounds(bounds);
        let clip = self.current_clip().clone();

        if !clip.rect.bounds.intersects(&transformed) {
            return (false, false);
        }

        let mut no_clip = false;
        let mut rect_clip = false;

        if clip.is_rectilinear {
            if clip.rect.bounds.contains_rect(&transformed) {
                no_clip = true;
            } else {
                rect_clip = true;
            }
        } else if clip.rect.contains_rect(&transformed) {
            no_clip = true;
        } else {
            let inner = clip.rect.inner_rect();
            let x_inside = transformed.x >= inner.x && transformed.max_x() <= inner.max_x();
            let y_inside = transformed.y >= inner.y && transformed.max_y() <= inner.max_y();
            if x_inside || y_inside {
                rect_clip = true;
            }
        }

        if no_clip {
            self.push_contained_clip();
            (true, true)
        } else if rect_clip && !clip.is_rectilinear {
            // The clip gets simpler for this node.
            let rect = clip.rect.bounds.intersection(&transformed);
            self.push_clip(RoundedRect::from_rect(rect));
            (true, true)
        } else {
            (true, false)
        }
    }

    // ---- draw recording ----

    pub(super) fn choose_program(&self, kind: ProgramKind) -> Program {
        let clip = self.current_clip();
        let variant = if clip.is_fully_contained {
            ClipVariant::None
        } else if clip.is_rectilinear {
            ClipVariant::Rect
        } else {
            ClipVariant::Rounded
        };
        self.driver.programs.get(kind, variant)
    }

    /// Starts a draw and records the shared uniforms under their stamps.
    pub(super) fn begin_draw(&mut self, program: Program) {
        self.current_program = Some(program);

        let viewport = self.viewport;
        let modelview = self.current_modelview().matrix;
        let projection = self.projection;
        let clip = self.current_clip().rect;
        let alpha = self.alpha;
        let stamps = self.driver.stamps;

        let queue = self.driver.queue_mut();
        queue.begin_draw(
            program.uniforms,
            viewport.width as u16,
            viewport.height as u16,
        );

        let mut uniforms = queue.uniforms.borrow_mut();
        uniforms.set_4f(
            program.uniforms,
            keys::VIEWPORT,
            stamps[keys::VIEWPORT],
            [viewport.x, viewport.y, viewport.width, viewport.height],
        );
        uniforms.set_matrix(program.uniforms, keys::MODELVIEW, stamps[keys::MODELVIEW], &modelview);
        uniforms.set_matrix(program.uniforms, keys::PROJECTION, stamps[keys::PROJECTION], &projection);
        uniforms.set_rounded_rect(program.uniforms, keys::CLIP_RECT, stamps[keys::CLIP_RECT], &clip);
        uniforms.set_1f(program.uniforms, keys::ALPHA, stamps[keys::ALPHA], alpha);
    }

    pub(super) fn end_draw(&mut self) {
        self.driver.queue_mut().end_draw();
        self.current_program = None;
    }

    pub(super) fn split_draw(&mut self) {
        self.driver.queue_mut().split_draw();
    }

    // ---- typed uniform setters for the current program ----

    pub(super) fn program_uniforms(&self) -> crate::uniform::UniformProgramId {
        self.current_program.expect("no current program").uniforms
    }

    pub(super) fn set_uniform_1f(&mut self, key: usize, value: f32) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_1f(program, key, 0, value);
    }

    pub(super) fn set_uniform_2f(&mut self, key: usize, v0: f32, v1: f32) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_2f(program, key, 0, v0, v1);
    }

    pub(super) fn set_uniform_4f(&mut self, key: usize, value: [f32; 4]) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_4f(program, key, 0, value);
    }

    pub(super) fn set_uniform_1i(&mut self, key: usize, value: i32) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_1i(program, key, 0, value);
    }

    pub(super) fn set_uniform_1fv(&mut self, key: usize, values: &[f32]) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_1fv(program, key, 0, values);
    }

    pub(super) fn set_uniform_4fv(&mut self, key: usize, values: &[f32]) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_4fv(program, key, 0, values);
    }

    pub(super) fn set_uniform_matrix(&mut self, key: usize, matrix: &Mat4) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_matrix(program, key, 0, matrix);
    }

    pub(super) fn set_uniform_rounded_rect(&mut self, key: usize, rect: &RoundedRect) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_rounded_rect(program, key, 0, rect);
    }

    pub(super) fn set_uniform_color(&mut self, key: usize, color: &Color) {
        let program = self.program_uniforms();
        self.driver.queue_mut().uniforms.borrow_mut().set_color(program, key, 0, color);
    }

    /// Binds `texture_id` on `unit` with the given filters and points the
    /// sampler uniform at it.
    pub(super) fn set_uniform_texture_with_filter(
        &mut self,
        key: usize,
        unit: u32,
        texture_id: u32,
        min_filter: u32,
        mag_filter: u32,
    ) {
        let program = self.program_uniforms();
        let queue = self.driver.queue_mut();
        queue.attachments.bind_texture(
            unit as usize,
            glow::TEXTURE_2D,
            texture_id,
            min_filter,
            mag_filter,
        );
        queue.uniforms.borrow_mut().set_texture(program, key, 0, unit);
    }

    pub(super) fn set_uniform_texture(&mut self, key: usize, unit: u32, texture_id: u32) {
        self.set_uniform_texture_with_filter(key, unit, texture_id, glow::LINEAR, glow::LINEAR);
    }

    // ---- vertex emission ----

    #[allow(clippy::too_many_arguments)]
    pub(super) fn draw_coords(
        &mut self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        min_u: f32,
        min_v: f32,
        max_u: f32,
        max_v: f32,
        color: [f16; 4],
    ) {
        let vertices = self.driver.queue_mut().add_vertices();
        vertices[0] = DrawVertex::new([min_x, min_y], [min_u, min_v], color);
        vertices[1] = DrawVertex::new([min_x, max_y], [min_u, max_v], color);
        vertices[2] = DrawVertex::new([max_x, min_y], [max_u, min_v], color);
        vertices[3] = DrawVertex::new([max_x, max_y], [max_u, max_v], color);
        vertices[4] = DrawVertex::new([min_x, max_y], [min_u, max_v], color);
        vertices[5] = DrawVertex::new([max_x, min_y], [max_u, min_v], color);
    }

    pub(super) fn draw_with_color(&mut self, x: f32, y: f32, width: f32, height: f32, color: [f16; 4]) {
        let min_x = self.offset_x + x;
        let min_y = self.offset_y + y;
        self.draw_coords(min_x, min_y, min_x + width, min_y + height, 0.0, 0.0, 1.0, 1.0, color);
    }

    pub(super) fn draw_rect_with_color(&mut self, bounds: &Rect, color: [f16; 4]) {
        self.draw_with_color(bounds.x, bounds.y, bounds.width, bounds.height, color);
    }

    pub(super) fn draw_rect(&mut self, bounds: &Rect) {
        self.draw_rect_with_color(bounds, FP16_ZERO);
    }

    /// Quad mapped to an offscreen texture; flips v when the texture was
    /// rendered rather than uploaded.
    pub(super) fn draw_offscreen_with_color(
        &mut self,
        bounds: &Rect,
        offscreen: &Offscreen,
        color: [f16; 4],
    ) {
        let min_x = self.offset_x + bounds.x;
        let min_y = self.offset_y + bounds.y;
        let max_x = min_x + bounds.width;
        let max_y = min_y + bounds.height;
        let (y1, y2) = if offscreen.was_offscreen {
            (offscreen.area.y2, offscreen.area.y)
        } else {
            (offscreen.area.y, offscreen.area.y2)
        };
        self.draw_coords(
            min_x,
            min_y,
            max_x,
            max_y,
            offscreen.area.x,
            y1,
            offscreen.area.x2,
            y2,
            color,
        );
    }

    pub(super) fn draw_offscreen(&mut self, bounds: &Rect, offscreen: &Offscreen) {
        self.draw_offscreen_with_color(bounds, offscreen, FP16_ZERO);
    }

    /// Quad sampling a full offscreen texture (v flipped).
    pub(super) fn draw_offscreen_rect(&mut self, bounds: &Rect) {
        let min_x = self.offset_x + bounds.x;
        let min_y = self.offset_y + bounds.y;
        self.draw_coords(
            min_x,
            min_y,
            min_x + bounds.width,
            min_y + bounds.height,
            0.0,
            1.0,
            1.0,
            0.0,
            FP16_ZERO,
        );
    }

    // ---- frame entry points ----

    /// Walks the tree, then reorders and executes the queue.
    pub fn render(&mut self, root: &NodeRef) {
        let scale = self.scale_x.abs().max(self.scale_y.abs());
        let surface_height = self.viewport.height as u32;
        let viewport = self.viewport;
        let clear = self.clear_framebuffer;
        let framebuffer = self.framebuffer;

        {
            let queue = self.driver.queue_mut();
            queue.make_current();
            queue.bind_framebuffer(framebuffer);
            if clear {
                queue.clear(ClearMask::empty(), &viewport);
            }
        }

        self.visit_node(root);

        // Programs may have been compiled against the shared context while
        // visiting; switch back before submitting.
        let region = self.region;
        let default_framebuffer = self.default_framebuffer;
        let queue = self.driver.queue_mut();
        queue.make_current();
        if queue.n_batches() > 0 {
            queue.execute(surface_height, scale, region, default_framebuffer);
        }
    }

    /// Renders the tree into an intermediate target and blits it y-flipped
    /// to the real framebuffer.
    pub fn render_flipped(&mut self, root: &NodeRef) {
        let viewport = self.viewport;
        let surface_height = viewport.height as u32;
        let scale = self.scale_x.abs().max(self.scale_y.abs());

        let Some((flip_fbo, flip_texture)) = self.driver.queue_mut().create_render_target(
            (viewport.width.max(1.0)) as i32,
            (viewport.height.max(1.0)) as i32,
            self.target_format,
            glow::NEAREST,
            glow::NEAREST,
        ) else {
            return;
        };

        {
            let queue = self.driver.queue_mut();
            queue.bind_framebuffer(flip_fbo);
            queue.clear(ClearMask::empty(), &viewport);
        }

        self.visit_node(root);

        self.set_alpha(1.0);
        let framebuffer = self.framebuffer;
        {
            let queue = self.driver.queue_mut();
            queue.bind_framebuffer(framebuffer);
            queue.clear(ClearMask::empty(), &viewport);
        }
        self.begin_draw(self.choose_program(ProgramKind::Blit));
        self.set_uniform_texture(keys::SOURCE, 0, flip_texture);
        self.draw_rect(&viewport);
        self.end_draw();

        let region = self.region;
        let default_framebuffer = self.default_framebuffer;
        let queue = self.driver.queue_mut();
        queue.execute(surface_height, scale, region, default_framebuffer);

        let gl = queue.gl().clone();
        gl.delete_framebuffers(&[flip_fbo]);
        gl.delete_textures(&[flip_texture]);
    }
}
