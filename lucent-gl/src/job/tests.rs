use std::rc::Rc;
use std::sync::Arc;

use glam::Vec2;
use lucent_scene::{
    Color, Font, GlyphBitmap, GlyphRasterizer, IntRect, NodeRef, PositionedGlyph, Rect,
    RenderNode, RoundedRect,
};

use super::*;
use crate::command::CommandQueue;
use crate::driver::GlDriver;
use crate::gl::recording::RecordingContext;
use crate::library::{GlyphLibrary, IconLibrary, PathCache, ShadowLibrary};
use crate::shader::{ClipVariant, ProgramKind};

struct Fixture {
    gl: Rc<RecordingContext>,
    driver: GlDriver,
    glyphs: GlyphLibrary,
    icons: IconLibrary,
    shadows: ShadowLibrary,
    paths: PathCache,
}

impl Fixture {
    fn new() -> Self {
        Self::with_gl(Rc::new(RecordingContext::new()))
    }

    fn with_gl(gl: Rc<RecordingContext>) -> Self {
        let mut driver = GlDriver::new(gl.clone(), false).unwrap();
        let queue = CommandQueue::new(gl.clone(), Some(driver.uniforms()));
        driver.begin_frame(queue);
        Self {
            gl,
            driver,
            glyphs: GlyphLibrary::new(),
            icons: IconLibrary::new(),
            shadows: ShadowLibrary::new(),
            paths: PathCache::new(),
        }
    }

    fn job(&mut self) -> RenderJob<'_> {
        RenderJob::new(
            RenderJobResources {
                driver: &mut self.driver,
                glyphs: &mut self.glyphs,
                icons: &mut self.icons,
                shadows: &mut self.shadows,
                paths: &mut self.paths,
                fallback: None,
            },
            Rect::from_size(200.0, 200.0),
            1.0,
            None,
            0,
            false,
        )
    }

    fn visit(&mut self, node: &NodeRef) {
        let mut job = self.job();
        job.visit_node(node);
    }

    /// Finish the frame and start the next one on the same queue.
    fn next_frame(&mut self) {
        self.driver.end_frame();
        let queue = self.driver.after_frame();
        self.driver.begin_frame(queue);
    }

    fn n_batches(&mut self) -> usize {
        self.driver.queue_mut().n_batches()
    }

    fn n_draws(&mut self) -> usize {
        let queue = self.driver.queue_mut();
        (0..queue.n_batches()).filter(|&i| queue.batch(i).is_draw()).count()
    }

    fn n_clears(&mut self) -> usize {
        let queue = self.driver.queue_mut();
        (0..queue.n_batches()).filter(|&i| !queue.batch(i).is_draw()).count()
    }
}

fn red_rect() -> NodeRef {
    RenderNode::color(Rect::new(10.0, 20.0, 30.0, 40.0), Color::new(1.0, 0.0, 0.0, 1.0))
}

// Scenario A: a single solid rect records one draw of one quad with the
// color packed as half floats into the vertices.
#[test]
fn test_single_color_rect() {
    let mut f = Fixture::new();
    f.visit(&red_rect());

    assert_eq!(f.n_batches(), 1);
    let queue = f.driver.queue_mut();
    let batch = queue.batch(0);
    assert!(batch.is_draw());
    assert_eq!(batch.draw().vbo_count, 6);
    assert_eq!(batch.draw().bind_count, 0);

    let vertex = queue.vertex(0);
    assert_eq!(vertex.color[0].to_f32(), 1.0);
    assert_eq!(vertex.color[1].to_f32(), 0.0);
    assert_eq!(vertex.color[2].to_f32(), 0.0);
    assert_eq!(vertex.color[3].to_f32(), 1.0);
    assert_eq!(vertex.position, [10.0, 20.0]);
}

#[test]
fn test_fully_contained_draw_uses_no_clip_program() {
    let mut f = Fixture::new();
    f.visit(&red_rect());
    let expected = f.driver.programs.get(ProgramKind::Color, ClipVariant::None).id;
    assert_eq!(f.driver.queue_mut().batch(0).program, expected);
}

// Scenario B: adjacent identical rects merge into one 12-vertex batch.
#[test]
fn test_adjacent_color_rects_merge() {
    let mut f = Fixture::new();
    let color = Color::new(0.2, 0.4, 0.6, 1.0);
    let node = RenderNode::container(vec![
        RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), color),
        RenderNode::color(Rect::new(10.0, 0.0, 10.0, 10.0), color),
    ]);
    f.visit(&node);

    assert_eq!(f.n_batches(), 1);
    assert_eq!(f.driver.queue_mut().batch(0).draw().vbo_count, 12);
}

// Scenario C: opacity folds into the draw for foldable children.
#[test]
fn test_opacity_over_color_draws_directly() {
    let mut f = Fixture::new();
    f.visit(&RenderNode::opacity(0.5, red_rect()));

    assert_eq!(f.n_batches(), 1);
    assert_eq!(f.n_clears(), 0);

    // The recorded alpha uniform is 0.5.
    let queue = f.driver.queue_mut();
    let batch = *queue.batch(0);
    let mut saw_alpha = false;
    for i in 0..batch.draw().uniform_count {
        let uniform = queue.uniform_ref((batch.draw().uniform_offset + i) as usize);
        let bytes = queue.uniforms.borrow().value_bytes(uniform.info.offset(), 4).to_vec();
        if bytes == 0.5f32.to_ne_bytes() {
            saw_alpha = true;
        }
    }
    assert!(saw_alpha);
}

#[test]
fn test_zero_opacity_records_nothing() {
    let mut f = Fixture::new();
    f.visit(&RenderNode::opacity(0.0, red_rect()));
    assert_eq!(f.n_batches(), 0);
}

// Invariant 8: opacity == 1 is the identity on the batch stream.
#[test]
fn test_full_opacity_is_identity() {
    let mut direct = Fixture::new();
    direct.visit(&red_rect());
    let direct_batches = direct.n_batches();
    let direct_count = direct.driver.queue_mut().batch(0).draw().vbo_count;
    let direct_program = direct.driver.queue_mut().batch(0).program;

    let mut wrapped = Fixture::new();
    wrapped.visit(&RenderNode::opacity(1.0, red_rect()));
    assert_eq!(wrapped.n_batches(), direct_batches);
    assert_eq!(wrapped.driver.queue_mut().batch(0).draw().vbo_count, direct_count);
    assert_eq!(wrapped.driver.queue_mut().batch(0).program, direct_program);
}

// Invariant 5: a node disjoint from the clip leaves no trace.
#[test]
fn test_clipped_away_subtree_records_nothing() {
    let mut f = Fixture::new();
    // The fixture viewport is 200x200.
    f.visit(&RenderNode::color(Rect::new(500.0, 500.0, 10.0, 10.0), Color::WHITE));
    assert_eq!(f.n_batches(), 0);
}

// Invariant 9: a top-only rect border draws exactly one rect.
#[test]
fn test_top_only_rect_border() {
    let mut f = Fixture::new();
    let outline = RoundedRect::from_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
    let node = RenderNode::border(outline, [3.0, 0.0, 0.0, 0.0], [Color::BLACK; 4]);
    f.visit(&node);

    assert_eq!(f.n_batches(), 1);
    let queue = f.driver.queue_mut();
    assert_eq!(queue.batch(0).draw().vbo_count, 6);
    // Top strip: full width at the top edge, 3px tall.
    assert_eq!(queue.vertex(0).position, [0.0, 0.0]);
    assert_eq!(queue.vertex(3).position, [50.0, 3.0]);
}

// Scenario F: a rounded clip whose child sits in the inner rect pushes
// "fully contained" and the child selects the NO_CLIP program without a
// clip-rect uniform.
#[test]
fn test_rounded_clip_fully_contains_child() {
    let gl = Rc::new(RecordingContext::new());
    // Pretend the linker dropped u_clip_rect, as the real NO_CLIP variant
    // does.
    gl.drop_uniform("u_clip_rect");
    let mut f = Fixture::with_gl(gl);

    let clip = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 100.0, 100.0), 10.0);
    let child = RenderNode::color(Rect::new(30.0, 30.0, 10.0, 10.0), Color::WHITE);
    f.visit(&RenderNode::rounded_clip(clip, child));

    assert_eq!(f.n_batches(), 1);
    let queue = f.driver.queue_mut();
    let batch = *queue.batch(0);
    let expected = f.driver.programs.get(ProgramKind::Color, ClipVariant::None).id;
    assert_eq!(batch.program, expected);

    // Shared uniforms minus the dropped clip rect.
    assert_eq!(batch.draw().uniform_count, 4);
}

#[test]
fn test_rounded_clip_offscreen_when_corners_collide() {
    let mut f = Fixture::new();

    // Two rounded clips whose corners genuinely intersect force the inner
    // child through an offscreen pass.
    let outer = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 100.0, 100.0), 40.0);
    let inner = RoundedRect::with_uniform_radius(Rect::new(5.0, 5.0, 95.0, 95.0), 40.0);
    let child = RenderNode::color(Rect::new(0.0, 0.0, 100.0, 100.0), Color::WHITE);
    let tree = RenderNode::rounded_clip(outer, RenderNode::rounded_clip(inner, child));
    f.visit(&tree);

    // The offscreen pass shows up as a clear on a fresh render target.
    assert!(f.n_clears() >= 1);
    assert!(f.n_draws() >= 2);
}

// Scenario D: the blurred outset shadow renders its template once and
// reuses it on the next frame.
#[test]
fn test_blurred_outset_shadow_caches_template() {
    let mut f = Fixture::new();
    let outline = RoundedRect::with_uniform_radius(Rect::new(20.0, 20.0, 100.0, 100.0), 8.0);
    let node = RenderNode::outset_shadow(outline, Color::BLACK, 2.0, 2.0, 0.0, 4.0);

    f.visit(&node);
    let first_frame_batches = f.n_batches();
    assert_eq!(f.shadows.len(), 1);
    // Template render + two blur passes each clear their target.
    assert!(f.n_clears() >= 3);

    f.next_frame();
    let frame_id = f.driver.frame_id();
    f.shadows.begin_frame(&mut f.driver, frame_id);

    f.visit(&node);
    assert_eq!(f.shadows.len(), 1);
    assert_eq!(f.n_clears(), 0);
    assert!(f.n_batches() < first_frame_batches);
}

#[test]
fn test_unblurred_outset_shadow_emits_patches() {
    let mut f = Fixture::new();
    let outline = RoundedRect::with_uniform_radius(Rect::new(20.0, 20.0, 100.0, 100.0), 8.0);
    let node = RenderNode::outset_shadow(outline, Color::BLACK, 2.0, 3.0, 4.0, 0.0);
    f.visit(&node);

    // Four corners and four edges in one draw, no offscreen work.
    assert_eq!(f.n_batches(), 1);
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.driver.queue_mut().batch(0).draw().vbo_count, 8 * 6);
}

struct WideRasterizer;

impl GlyphRasterizer for WideRasterizer {
    fn ink_rect(&self, _glyph: u32) -> IntRect {
        // Too wide for the glyph atlas entry limit, forcing a dedicated
        // texture per glyph.
        IntRect { x: 0, y: -20, width: 200, height: 20 }
    }

    fn rasterize(
        &self,
        _glyph: u32,
        _scale_1024: u32,
        _xshift: u8,
        _yshift: u8,
        width: u32,
        height: u32,
    ) -> Option<GlyphBitmap> {
        Some(GlyphBitmap {
            width,
            height,
            stride: width as usize * 4,
            pixels: vec![255; (width * height * 4) as usize],
        })
    }
}

// Scenario E: a glyph run crossing atlas textures splits the draw exactly
// at the texture switch while both batches share one contiguous vertex
// range.
#[test]
fn test_text_split_draw_shares_vertex_range() {
    let mut f = Fixture::new();
    let font = Arc::new(Font::new(Arc::new(WideRasterizer)));
    let glyphs = vec![
        PositionedGlyph::new(1, 210 * 1024),
        PositionedGlyph::new(2, 210 * 1024),
    ];
    let node = RenderNode::text(font, glyphs, Color::BLACK, Vec2::new(0.0, 30.0));

    // Keep the run inside the viewport-sized clip.
    let mut job = f.job();
    job.visit_node(&node);
    drop(job);

    assert_eq!(f.n_batches(), 2);
    let queue = f.driver.queue_mut();
    let first = queue.batch(0).draw();
    let second = queue.batch(1).draw();
    assert_eq!(first.vbo_count, 6);
    assert_eq!(second.vbo_count, 6);
    assert_eq!(first.vbo_offset + first.vbo_count, second.vbo_offset);
    // Different atlas textures were bound for the two halves.
    assert_eq!(first.bind_count, 1);
    assert_eq!(second.bind_count, 1);
    assert_ne!(
        queue.bind(first.bind_offset as usize).id,
        queue.bind(second.bind_offset as usize).id
    );
}

// Invariant 6: the offscreen cache returns the same texture across frames
// for an unchanged node.
#[test]
fn test_offscreen_cache_across_frames() {
    let mut f = Fixture::new();
    // A two-child container under opacity forces the offscreen path.
    let child = RenderNode::container(vec![
        RenderNode::color(Rect::new(0.0, 0.0, 30.0, 30.0), Color::WHITE),
        RenderNode::color(Rect::new(10.0, 10.0, 30.0, 30.0), Color::BLACK),
    ]);
    let node = RenderNode::opacity(0.5, child);

    f.visit(&node);
    assert!(f.n_clears() >= 1);

    f.next_frame();
    f.visit(&node);
    // Cached: no render-target clear this frame.
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.n_draws(), 1);
}

#[test]
fn test_translate_transform_folds_into_offsets() {
    let mut f = Fixture::new();
    let node = RenderNode::transform(
        lucent_scene::Transform::translate(15.0, 5.0),
        RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE),
    );
    f.visit(&node);

    assert_eq!(f.n_batches(), 1);
    let queue = f.driver.queue_mut();
    assert_eq!(queue.vertex(0).position, [15.0, 5.0]);
}

#[test]
fn test_cross_fade_extremes_bypass_offscreens() {
    let mut f = Fixture::new();
    let start = red_rect();
    let end = RenderNode::color(Rect::new(10.0, 20.0, 30.0, 40.0), Color::BLACK);

    f.visit(&RenderNode::cross_fade(start.clone(), end.clone(), 0.0));
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.n_draws(), 1);

    let mut f = Fixture::new();
    f.visit(&RenderNode::cross_fade(start, end, 1.0));
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.n_draws(), 1);
}

#[test]
fn test_cross_fade_renders_both_children_offscreen() {
    let mut f = Fixture::new();
    let start = red_rect();
    let end = RenderNode::color(Rect::new(10.0, 20.0, 30.0, 40.0), Color::BLACK);
    f.visit(&RenderNode::cross_fade(start, end, 0.5));

    // Two offscreen clears plus the final composite draw sampling both.
    assert_eq!(f.n_clears(), 2);
    let queue = f.driver.queue_mut();
    let last = queue.batch(queue.n_batches() - 1);
    assert_eq!(last.draw().bind_count, 2);
}

#[test]
fn test_css_background_peephole_fuses_draws() {
    let mut f = Fixture::new();
    let outline = RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 80.0, 40.0), 6.0);
    let fill = RenderNode::color(outline.bounds, Color::new(0.9, 0.9, 0.9, 1.0));
    let container = RenderNode::container(vec![
        RenderNode::rounded_clip(outline, fill),
        RenderNode::border(outline, [1.0; 4], [Color::BLACK; 4]),
    ]);
    f.visit(&container);

    assert_eq!(f.n_batches(), 1);
    let expected = f.driver.programs.get(ProgramKind::FilledBorder, ClipVariant::None).id;
    assert_eq!(f.driver.queue_mut().batch(0).program, expected);
}

#[test]
fn test_shadow_node_draws_shadow_then_child() {
    let mut f = Fixture::new();
    let child = red_rect();
    let node = RenderNode::shadow(
        child,
        vec![lucent_scene::Shadow { color: Color::BLACK, dx: 3.0, dy: 3.0, radius: 0.0 }],
    );
    f.visit(&node);

    // One offscreen pass for the silhouette, then shadow draw + child draw.
    assert_eq!(f.n_clears(), 1);
    assert!(f.n_draws() >= 3);
}

#[test]
fn test_blur_node_caches_result() {
    let mut f = Fixture::new();
    let node = RenderNode::blur(4.0, red_rect());

    f.visit(&node);
    // Offscreen + two blur passes.
    assert_eq!(f.n_clears(), 3);

    f.next_frame();
    f.visit(&node);
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.n_draws(), 1);
}

#[test]
fn test_texture_node_small_goes_through_icon_atlas() {
    use lucent_scene::{ColorState, ImageTexture, MemoryFormat};

    let mut f = Fixture::new();
    let texture = Arc::new(ImageTexture::from_memory(
        16,
        16,
        MemoryFormat::Rgba8Premultiplied,
        ColorState::SrgbLinear,
        64,
        vec![255u8; 64 * 16],
    ));
    f.visit(&RenderNode::texture(Rect::new(0.0, 0.0, 16.0, 16.0), texture));

    assert_eq!(f.n_batches(), 1);
    assert_eq!(f.icons.n_cached(), 1);
    let queue = f.driver.queue_mut();
    assert_eq!(queue.batch(0).draw().bind_count, 1);
}

#[test]
fn test_oversized_texture_is_sliced_into_one_conceptual_draw() {
    use lucent_scene::{ColorState, ImageTexture, MemoryFormat};

    let gl = Rc::new(RecordingContext::with_max_texture_size(256));
    let mut f = Fixture::with_gl(gl);

    // 300x70 with 64px tiles: 5x2 slices.
    let texture = Arc::new(ImageTexture::from_memory(
        300,
        70,
        MemoryFormat::Rgba8Premultiplied,
        ColorState::SrgbLinear,
        1200,
        vec![255u8; 1200 * 70],
    ));
    f.visit(&RenderNode::texture(Rect::new(0.0, 0.0, 150.0, 35.0), texture));

    // Each tile is its own batch (different texture bind) but the vertex
    // ranges chain contiguously.
    let queue = f.driver.queue_mut();
    assert_eq!(queue.n_batches(), 10);
    for i in 1..queue.n_batches() {
        let prev = queue.batch(i - 1).draw();
        let cur = queue.batch(i).draw();
        assert_eq!(prev.vbo_offset + prev.vbo_count, cur.vbo_offset);
    }
}

#[test]
fn test_custom_shader_without_program_draws_pink() {
    // A failing shader cannot be provoked through the recording fake (it
    // compiles everything), so drive the fallback directly.
    let mut f = Fixture::new();
    let node = RenderNode::custom_shader(
        Rect::new(0.0, 0.0, 40.0, 40.0),
        Arc::new(lucent_scene::ShaderSource::new(String::new(), vec![])),
        vec![],
        vec![],
    );
    let mut job = f.job();
    job.visit_custom_shader_fallback(&node);
    drop(job);
    assert_eq!(f.n_batches(), 1);
}

#[test]
fn test_fill_node_with_rect_path_clips_inline() {
    let mut f = Fixture::new();
    let path = Arc::new(lucent_scene::Path::rect(Rect::new(0.0, 0.0, 20.0, 20.0)));
    let child = RenderNode::color(Rect::new(0.0, 0.0, 40.0, 40.0), Color::WHITE);
    let node = RenderNode::fill(path, lucent_scene::FillRule::Winding, child);
    f.visit(&node);

    // Inline clip: a single direct draw, no mask texture, no offscreen.
    assert_eq!(f.n_clears(), 0);
    assert_eq!(f.n_draws(), 1);
    assert!(f.paths.is_empty());
}

#[test]
fn test_region_limits_initial_clip() {
    let mut f = Fixture::new();
    let mut job = RenderJob::new(
        RenderJobResources {
            driver: &mut f.driver,
            glyphs: &mut f.glyphs,
            icons: &mut f.icons,
            shadows: &mut f.shadows,
            paths: &mut f.paths,
            fallback: None,
        },
        Rect::from_size(200.0, 200.0),
        1.0,
        Some(Rect::new(0.0, 0.0, 50.0, 50.0)),
        0,
        false,
    );
    // Outside the damage region: skipped entirely.
    job.visit_node(&RenderNode::color(Rect::new(100.0, 100.0, 20.0, 20.0), Color::WHITE));
    drop(job);
    assert_eq!(f.n_batches(), 0);
}

#[test]
fn test_batches_reorder_by_framebuffer_on_execute() {
    use crate::gl::recording::GlCall;

    let mut f = Fixture::new();
    // Color, then an offscreen-needing opacity group, then color again:
    // recording order interleaves framebuffers; execution groups them.
    let group = RenderNode::opacity(
        0.5,
        RenderNode::container(vec![
            RenderNode::color(Rect::new(0.0, 0.0, 20.0, 20.0), Color::WHITE),
            RenderNode::color(Rect::new(5.0, 5.0, 20.0, 20.0), Color::BLACK),
        ]),
    );
    let tree = RenderNode::container(vec![
        RenderNode::color(Rect::new(50.0, 0.0, 20.0, 20.0), Color::WHITE),
        group,
        RenderNode::color(Rect::new(100.0, 0.0, 20.0, 20.0), Color::BLACK),
    ]);

    let mut job = f.job();
    job.render(&tree);
    drop(job);

    let binds: Vec<u32> = f
        .gl
        .calls()
        .into_iter()
        .filter_map(|c| if let GlCall::BindFramebuffer(id) = c { Some(id) } else { None })
        .collect();
    // The offscreen framebuffer binds once, before the surface batch run;
    // the surface framebuffer binds exactly once after it.
    assert_eq!(binds.iter().filter(|&&id| id == 0).count(), 1);
    assert_eq!(binds.last(), Some(&0));
}
