//! The renderer facade: owns the driver, the texture libraries and the
//! per-frame command queue, and orchestrates the frame lifecycle around a
//! [`RenderJob`].
//!
//! Frame flow: `render` begins the driver frame (aging caches first), walks
//! the tree, executes the queue and ends the frame. `after_frame` must run
//! once the embedder has swapped buffers — it performs the batched GL
//! deletions; the next `render` call runs it implicitly if the embedder
//! didn't.

use std::rc::Rc;

use lucent_scene::{NodeRef, Rect};

use crate::command::CommandQueue;
use crate::driver::GlDriver;
use crate::error::RenderError;
use crate::gl::GlContext;
use crate::job::{FallbackPainter, RenderJob, RenderJobResources};
use crate::library::{GlyphLibrary, IconLibrary, PathCache, ShadowLibrary};

/// Renderer-wide knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RendererConfig {
    /// Log assembled GLSL and compilation output.
    pub debug_shaders: bool,
    /// Tint fallback-rendered nodes red.
    pub debug_fallback: bool,
}

/// See module docs.
pub struct GlRenderer {
    driver: GlDriver,
    glyphs: GlyphLibrary,
    icons: IconLibrary,
    shadows: ShadowLibrary,
    paths: PathCache,
    /// The frame queue; `None` while a frame is in flight.
    queue: Option<CommandQueue>,
    fallback: Option<Box<dyn FallbackPainter>>,
    config: RendererConfig,
}

impl GlRenderer {
    pub fn new(gl: Rc<dyn GlContext>, config: RendererConfig) -> Result<Self, RenderError> {
        let driver = GlDriver::new(gl.clone(), config.debug_shaders)?;
        let queue = CommandQueue::new(gl, Some(driver.uniforms()));
        Ok(Self {
            driver,
            glyphs: GlyphLibrary::new(),
            icons: IconLibrary::new(),
            shadows: ShadowLibrary::new(),
            paths: PathCache::new(),
            queue: Some(queue),
            fallback: None,
            config,
        })
    }

    /// Installs the software rasterization hook used by canvas nodes'
    /// siblings: many-stop gradients, arbitrary repeats and path masks.
    pub fn set_fallback_painter(&mut self, painter: Box<dyn FallbackPainter>) {
        self.fallback = Some(painter);
    }

    fn begin(&mut self) {
        if self.queue.is_none() {
            // The embedder skipped after_frame; catch up before reusing the
            // queue.
            self.queue = Some(self.driver.after_frame());
        }
        let queue = self.queue.take().unwrap();
        self.driver.begin_frame(queue);

        let frame_id = self.driver.frame_id();
        self.glyphs.begin_frame(&mut self.driver, frame_id);
        self.icons.begin_frame(&mut self.driver, frame_id);
        self.shadows.begin_frame(&mut self.driver, frame_id);
        self.paths.begin_frame(&mut self.driver, frame_id);
    }

    fn job<'a>(
        driver: &'a mut GlDriver,
        glyphs: &'a mut GlyphLibrary,
        icons: &'a mut IconLibrary,
        shadows: &'a mut ShadowLibrary,
        paths: &'a mut PathCache,
        fallback: Option<&'a dyn FallbackPainter>,
        viewport: Rect,
        scale_factor: f32,
        region: Option<Rect>,
        framebuffer: u32,
        clear_framebuffer: bool,
        config: RendererConfig,
    ) -> RenderJob<'a> {
        let mut job = RenderJob::new(
            RenderJobResources { driver, glyphs, icons, shadows, paths, fallback },
            viewport,
            scale_factor,
            region,
            framebuffer,
            clear_framebuffer,
        );
        job.set_debug_fallback(config.debug_fallback);
        job
    }

    /// Renders a frame into `framebuffer` (0 = the context's default).
    /// `region` restricts the scissored area of the surface framebuffer.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        root: &NodeRef,
        viewport: Rect,
        scale_factor: f32,
        region: Option<Rect>,
        framebuffer: u32,
        clear_framebuffer: bool,
    ) {
        self.begin();
        {
            let mut job = Self::job(
                &mut self.driver,
                &mut self.glyphs,
                &mut self.icons,
                &mut self.shadows,
                &mut self.paths,
                self.fallback.as_deref(),
                viewport,
                scale_factor,
                region,
                framebuffer,
                clear_framebuffer,
                self.config,
            );
            job.render(root);
        }
        self.driver.end_frame();
    }

    /// Like [`Self::render`] but flips the final image vertically through an
    /// intermediate render target, for surfaces with a bottom-left origin.
    pub fn render_flipped(
        &mut self,
        root: &NodeRef,
        viewport: Rect,
        scale_factor: f32,
        framebuffer: u32,
    ) {
        self.begin();
        {
            let mut job = Self::job(
                &mut self.driver,
                &mut self.glyphs,
                &mut self.icons,
                &mut self.shadows,
                &mut self.paths,
                self.fallback.as_deref(),
                viewport,
                scale_factor,
                None,
                framebuffer,
                false,
                self.config,
            );
            job.render_flipped(root);
        }
        self.driver.end_frame();
    }

    /// Post-swap cleanup: deletes pooled framebuffers and textures in
    /// batched calls. Call after presenting the frame.
    pub fn after_frame(&mut self) {
        if self.queue.is_none() {
            self.queue = Some(self.driver.after_frame());
        }
    }

    pub fn driver(&self) -> &GlDriver {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use lucent_scene::{Color, NodeRef, RenderNode};

    use super::*;
    use crate::gl::recording::{GlCall, RecordingContext};

    fn red_rect() -> NodeRef {
        RenderNode::color(Rect::new(10.0, 10.0, 50.0, 50.0), Color::new(1.0, 0.0, 0.0, 1.0))
    }

    #[test]
    fn test_render_issues_one_draw() {
        let gl = Rc::new(RecordingContext::new());
        let mut renderer = GlRenderer::new(gl.clone(), RendererConfig::default()).unwrap();

        renderer.render(&red_rect(), Rect::from_size(100.0, 100.0), 1.0, None, 0, true);
        renderer.after_frame();

        assert_eq!(gl.count_calls(|c| matches!(c, GlCall::DrawArrays { .. })), 1);
        assert_eq!(gl.count_calls(|c| matches!(c, GlCall::Clear(_))), 1);
    }

    #[test]
    fn test_render_two_frames_without_explicit_after_frame() {
        let gl = Rc::new(RecordingContext::new());
        let mut renderer = GlRenderer::new(gl.clone(), RendererConfig::default()).unwrap();

        let node = red_rect();
        renderer.render(&node, Rect::from_size(100.0, 100.0), 1.0, None, 0, false);
        // No after_frame: the next render catches up on pooled deletions.
        renderer.render(&node, Rect::from_size(100.0, 100.0), 1.0, None, 0, false);
        renderer.after_frame();

        assert_eq!(gl.count_calls(|c| matches!(c, GlCall::DrawArrays { .. })), 2);
    }

    #[test]
    fn test_render_flipped_adds_blit() {
        let gl = Rc::new(RecordingContext::new());
        let mut renderer = GlRenderer::new(gl.clone(), RendererConfig::default()).unwrap();

        renderer.render_flipped(&red_rect(), Rect::from_size(100.0, 100.0), 1.0, 0);
        renderer.after_frame();

        // The scene draw plus the final flip blit.
        assert_eq!(gl.count_calls(|c| matches!(c, GlCall::DrawArrays { .. })), 2);
    }

    #[test]
    fn test_scissor_applied_for_damage_region() {
        let gl = Rc::new(RecordingContext::new());
        let mut renderer = GlRenderer::new(gl.clone(), RendererConfig::default()).unwrap();

        renderer.render(
            &red_rect(),
            Rect::from_size(100.0, 100.0),
            1.0,
            Some(Rect::new(0.0, 0.0, 60.0, 60.0)),
            0,
            true,
        );
        renderer.after_frame();

        assert!(gl.count_calls(|c| matches!(c, GlCall::Scissor(..))) >= 1);
    }

    #[test]
    fn test_unused_offscreen_texture_deleted_later() {
        let gl = Rc::new(RecordingContext::new());
        let mut renderer = GlRenderer::new(gl.clone(), RendererConfig::default()).unwrap();

        // Frame 1 renders an offscreen-needing node; frames 2 and 3 render
        // without it, so the cached offscreen texture ages out.
        let group = RenderNode::opacity(
            0.5,
            RenderNode::container(vec![
                RenderNode::color(Rect::new(0.0, 0.0, 30.0, 30.0), Color::WHITE),
                RenderNode::color(Rect::new(10.0, 10.0, 30.0, 30.0), Color::BLACK),
            ]),
        );
        let viewport = Rect::from_size(100.0, 100.0);
        renderer.render(&group, viewport, 1.0, None, 0, false);
        renderer.after_frame();
        assert_eq!(renderer.driver().n_textures(), 1);

        let plain = red_rect();
        renderer.render(&plain, viewport, 1.0, None, 0, false);
        renderer.after_frame();
        // Still cached: the watermark trails one frame behind.
        assert_eq!(renderer.driver().n_textures(), 1);

        renderer.render(&plain, viewport, 1.0, None, 0, false);
        renderer.after_frame();
        assert_eq!(renderer.driver().n_textures(), 0);
    }
}
