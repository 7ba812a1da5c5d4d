use std::rc::Rc;

use lucent_scene::Rect;

use super::*;
use crate::gl::recording::{GlCall, RecordingContext};
use crate::uniform::UniformProgramId;

struct Fixture {
    queue: CommandQueue,
    gl: Rc<RecordingContext>,
    program: UniformProgramId,
    program2: UniformProgramId,
}

fn fixture() -> Fixture {
    let gl = Rc::new(RecordingContext::new());
    let mut queue = CommandQueue::new(gl.clone(), None);
    // Two programs with two uniform keys each; both sample textures.
    let program = queue.uniforms.borrow_mut().register_program(42, &[0, 1], true);
    let program2 = queue.uniforms.borrow_mut().register_program(43, &[0, 1], true);
    queue.begin_frame();
    Fixture { queue, gl, program, program2 }
}

fn draw_quad(queue: &mut CommandQueue, program: UniformProgramId, w: u16, h: u16) {
    queue.begin_draw(program, w, h);
    queue.add_vertices();
    queue.end_draw();
}

#[test]
fn test_empty_draw_is_discarded() {
    let mut f = fixture();
    f.queue.begin_draw(f.program, 100, 100);
    f.queue.end_draw();
    assert_eq!(f.queue.n_batches(), 0);
}

#[test]
fn test_adjacent_identical_draws_merge() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    draw_quad(&mut f.queue, f.program, 100, 100);
    assert_eq!(f.queue.n_batches(), 1);
    assert_eq!(f.queue.batch(0).draw().vbo_count, 12);
    assert_eq!(f.queue.batch(0).draw().vbo_offset, 0);
}

#[test]
fn test_different_program_prevents_merge() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    draw_quad(&mut f.queue, f.program2, 100, 100);
    assert_eq!(f.queue.n_batches(), 2);
}

#[test]
fn test_different_viewport_prevents_merge() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    draw_quad(&mut f.queue, f.program, 200, 100);
    assert_eq!(f.queue.n_batches(), 2);
}

#[test]
fn test_changed_uniform_prevents_merge() {
    let mut f = fixture();
    f.queue.begin_draw(f.program, 100, 100);
    f.queue.uniforms.borrow_mut().set_1f(f.program, 0, 0, 0.5);
    f.queue.add_vertices();
    f.queue.end_draw();

    f.queue.begin_draw(f.program, 100, 100);
    f.queue.uniforms.borrow_mut().set_1f(f.program, 0, 0, 0.75);
    f.queue.add_vertices();
    f.queue.end_draw();

    assert_eq!(f.queue.n_batches(), 2);
}

#[test]
fn test_equal_uniform_value_still_merges() {
    let mut f = fixture();
    f.queue.begin_draw(f.program, 100, 100);
    f.queue.uniforms.borrow_mut().set_1f(f.program, 0, 0, 0.5);
    f.queue.add_vertices();
    f.queue.end_draw();

    // The second write with the same value is ignored, so both snapshots
    // reference the same arena offset.
    f.queue.begin_draw(f.program, 100, 100);
    f.queue.uniforms.borrow_mut().set_1f(f.program, 0, 0, 0.5);
    f.queue.add_vertices();
    f.queue.end_draw();

    assert_eq!(f.queue.n_batches(), 1);
    assert_eq!(f.queue.batch(0).draw().vbo_count, 12);
}

#[test]
fn test_changed_bind_prevents_merge() {
    let mut f = fixture();
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 6, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);
    assert_eq!(f.queue.n_batches(), 2);
}

#[test]
fn test_clear_never_merges() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    f.queue.clear(ClearMask::empty(), &Rect::from_size(100.0, 100.0));
    draw_quad(&mut f.queue, f.program, 100, 100);
    assert_eq!(f.queue.n_batches(), 3);
    assert!(!f.queue.batch(1).is_draw());
}

#[test]
fn test_vertex_range_gap_prevents_merge() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    // A quad reserved outside any draw leaves a hole in the vertex buffer,
    // so the next draw's range no longer chains onto the previous one.
    f.queue.reserve_quads(1);
    draw_quad(&mut f.queue, f.program, 100, 100);
    assert_eq!(f.queue.n_batches(), 2);
}

#[test]
fn test_split_draw_offset_fixup() {
    let mut f = fixture();
    f.queue.begin_draw(f.program, 100, 100);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);

    // Reserve both quads up front, as the glyph path does.
    let base = f.queue.reserve_quads(2);
    assert_eq!(base, 0);
    f.queue.add_tail_vertex_count(6);

    // Split because the second quad samples another texture. The fresh
    // batch's vbo_offset points at the buffer end and must be pulled back.
    let tail = f.queue.tail_draw();
    let continue_at = tail.vbo_offset + tail.vbo_count;
    f.queue.split_draw();
    f.queue.set_tail_vbo_offset(continue_at);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 6, glow::LINEAR, glow::LINEAR);
    f.queue.add_tail_vertex_count(6);
    f.queue.end_draw();

    assert_eq!(f.queue.n_batches(), 2);
    let first = f.queue.batch(0).draw();
    let second = f.queue.batch(1).draw();
    assert_eq!(first.vbo_offset, 0);
    assert_eq!(first.vbo_count, 6);
    assert_eq!(second.vbo_offset, 6);
    assert_eq!(second.vbo_count, 6);
}

#[test]
fn test_batch_limit_truncates_with_single_warning() {
    let mut f = fixture();
    // Alternate viewports so nothing merges.
    for i in 0..MAX_BATCHES + 10 {
        let w = 100 + (i % 2) as u16;
        draw_quad(&mut f.queue, f.program, w, 100);
    }
    assert_eq!(f.queue.n_batches(), MAX_BATCHES);
}

fn linked_is_consistent(queue: &CommandQueue) {
    let order = queue.linked_order();
    assert_eq!(order.len(), queue.n_batches());
    let mut seen = vec![false; queue.n_batches()];
    for &i in &order {
        assert!(!seen[i], "batch {i} appears twice");
        seen[i] = true;
    }
    let head = queue.head_batch_index() as usize;
    assert_eq!(queue.batch(head).prev_batch_index, -1);
    assert_eq!(queue.batch(*order.last().unwrap()).next_batch_index, -1);
}

#[test]
fn test_reorder_groups_framebuffers() {
    let mut f = fixture();

    // fbo 0, then an offscreen-style fbo 3, then fbo 0 again.
    draw_quad(&mut f.queue, f.program, 100, 100);
    f.queue.bind_framebuffer(3);
    draw_quad(&mut f.queue, f.program2, 50, 50);
    f.queue.bind_framebuffer(0);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 9, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);

    f.queue.execute(100, 1.0, None, 0);

    // The fbo-3 batch was hoisted ahead of both fbo-0 batches, which stay
    // in relative order, so only two framebuffer binds happen.
    assert_eq!(f.gl.count_calls(|c| matches!(c, GlCall::BindFramebuffer(_))), 2);
    let binds: Vec<_> = f
        .gl
        .calls()
        .into_iter()
        .filter_map(|c| if let GlCall::BindFramebuffer(id) = c { Some(id) } else { None })
        .collect();
    assert_eq!(binds, vec![3, 0]);
    linked_is_consistent(&f.queue);
}

#[test]
fn test_reorder_keeps_writer_before_sampler() {
    let mut f = fixture();

    // Writer: draw into fbo 5. Sampler: draw to the surface reading the
    // texture fbo 5 rendered. Recording order already honors this; the
    // reorder must not break it.
    f.queue.bind_framebuffer(5);
    draw_quad(&mut f.queue, f.program, 64, 64);
    f.queue.bind_framebuffer(0);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 77, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);

    let order = {
        f.queue.execute(100, 1.0, None, 0);
        f.queue.linked_order()
    };
    let writer = order.iter().position(|&i| f.queue.batch(i).framebuffer() == 5).unwrap();
    let sampler = order.iter().position(|&i| f.queue.batch(i).framebuffer() == 0).unwrap();
    assert!(writer < sampler);
    linked_is_consistent(&f.queue);
}

#[test]
fn test_same_framebuffer_draws_keep_relative_order() {
    let mut f = fixture();
    for i in 0..4u16 {
        draw_quad(&mut f.queue, f.program, 100 + i, 100);
        f.queue.bind_framebuffer(2);
        draw_quad(&mut f.queue, f.program2, 50, 50 + i);
        f.queue.bind_framebuffer(0);
    }
    f.queue.execute(100, 1.0, None, 0);
    linked_is_consistent(&f.queue);

    let order = f.queue.linked_order();
    let fbo0: Vec<_> =
        order.iter().copied().filter(|&i| f.queue.batch(i).framebuffer() == 0).collect();
    let fbo2: Vec<_> =
        order.iter().copied().filter(|&i| f.queue.batch(i).framebuffer() == 2).collect();
    assert!(fbo0.windows(2).all(|w| w[0] < w[1]));
    assert!(fbo2.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_execute_diffs_program_and_viewport() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    // Force a second batch with a gap in uniforms but same program.
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);
    f.queue.execute(100, 1.0, None, 0);

    assert_eq!(f.gl.count_calls(|c| matches!(c, GlCall::UseProgram(_))), 1);
    assert_eq!(f.gl.count_calls(|c| matches!(c, GlCall::Viewport(..))), 1);
    assert_eq!(f.gl.count_calls(|c| matches!(c, GlCall::DrawArrays { .. })), 2);
    assert_eq!(f.gl.count_calls(|c| matches!(c, GlCall::BufferData { .. })), 1);
}

#[test]
fn test_execute_scissor_only_on_default_framebuffer() {
    let mut f = fixture();
    f.queue.bind_framebuffer(4);
    draw_quad(&mut f.queue, f.program, 64, 64);
    f.queue.bind_framebuffer(0);
    f.queue.attachments.bind_texture(0, glow::TEXTURE_2D, 8, glow::LINEAR, glow::LINEAR);
    draw_quad(&mut f.queue, f.program, 100, 100);

    f.queue.execute(100, 1.0, Some(Rect::new(10.0, 10.0, 20.0, 20.0)), 0);

    let calls = f.gl.calls();
    // Scissor turns on exactly when the surface framebuffer binds.
    let on = calls.iter().position(|c| *c == GlCall::Scissored(true)).unwrap();
    let surface_bind = calls.iter().position(|c| *c == GlCall::BindFramebuffer(0)).unwrap();
    assert!(on > surface_bind);
    assert!(f.gl.count_calls(|c| matches!(c, GlCall::Scissor(..))) >= 1);
}

#[test]
fn test_clear_uses_current_framebuffer() {
    let mut f = fixture();
    f.queue.bind_framebuffer(6);
    f.queue.clear(ClearMask::COLOR, &Rect::from_size(32.0, 32.0));
    assert_eq!(f.queue.batch(0).framebuffer(), 6);
}

#[test]
fn test_end_frame_resets_queue() {
    let mut f = fixture();
    draw_quad(&mut f.queue, f.program, 100, 100);
    f.queue.execute(100, 1.0, None, 0);
    f.queue.end_frame();
    assert_eq!(f.queue.n_batches(), 0);
    f.queue.begin_frame();
    draw_quad(&mut f.queue, f.program, 100, 100);
    assert_eq!(f.queue.n_batches(), 1);
    assert_eq!(f.queue.batch(0).draw().vbo_offset, 0);
}
