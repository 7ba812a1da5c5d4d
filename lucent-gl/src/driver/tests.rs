use std::rc::Rc;
use std::sync::Arc;

use lucent_scene::{ColorState, ImageTexture, MemoryFormat};

use super::*;
use crate::command::CommandQueue;
use crate::gl::recording::RecordingContext;

struct Fixture {
    driver: GlDriver,
    gl: Rc<RecordingContext>,
}

fn fixture() -> Fixture {
    let gl = Rc::new(RecordingContext::new());
    let driver = GlDriver::new(gl.clone(), false).unwrap();
    Fixture { driver, gl }
}

fn frame_queue(driver: &GlDriver) -> CommandQueue {
    CommandQueue::new(driver.gl().clone(), Some(driver.uniforms()))
}

fn memory_texture(width: u32, height: u32) -> Arc<ImageTexture> {
    Arc::new(ImageTexture::from_memory(
        width,
        height,
        MemoryFormat::Rgba8Premultiplied,
        ColorState::SrgbLinear,
        width as usize * 4,
        vec![255u8; width as usize * 4 * height as usize],
    ))
}

#[test]
fn test_frame_lifecycle_swaps_queues() {
    let mut f = fixture();
    let queue = frame_queue(&f.driver);
    assert!(!f.driver.in_frame());
    f.driver.begin_frame(queue);
    assert!(f.driver.in_frame());
    assert_eq!(f.driver.frame_id(), 1);
    f.driver.end_frame();
    let _queue = f.driver.after_frame();
    assert!(!f.driver.in_frame());
}

#[test]
fn test_cache_and_lookup_texture() {
    let mut f = fixture();
    let id = f.driver.create_texture(16, 16, glow::RGBA8, glow::NEAREST, glow::NEAREST);
    assert_ne!(id, 0);

    let key = TextureKey::new(0xabc, 1.0, 1.0, glow::NEAREST);
    f.driver.cache_texture(key, id);
    assert_eq!(f.driver.lookup_texture(&key), id);
    assert_eq!(f.driver.lookup_texture(&TextureKey::new(0xdef, 1.0, 1.0, glow::NEAREST)), 0);
}

#[test]
fn test_collect_evicts_by_watermark() {
    let mut f = fixture();
    let id = f.driver.create_texture(16, 16, glow::RGBA8, glow::NEAREST, glow::NEAREST);
    let key = TextureKey::new(0xabc, 1.0, 1.0, glow::NEAREST);
    f.driver.cache_texture(key, id);

    // Texture was created in frame 0; a watermark at frame 0 evicts it.
    let evicted = f.driver.collect_unused_textures(0);
    assert_eq!(evicted, 1);
    assert_eq!(f.driver.lookup_texture(&key), 0);
    assert!(!f.driver.contains_texture(id));
}

#[test]
fn test_permanent_texture_survives_collection() {
    let mut f = fixture();
    let id = f.driver.create_texture(16, 16, glow::RGBA8, glow::NEAREST, glow::NEAREST);
    f.driver.mark_texture_permanent(id);
    assert_eq!(f.driver.collect_unused_textures(i64::MAX), 0);
    assert!(f.driver.contains_texture(id));
}

#[test]
fn test_lookup_refreshes_last_used() {
    let mut f = fixture();
    let id = f.driver.create_texture(16, 16, glow::RGBA8, glow::NEAREST, glow::NEAREST);
    let key = TextureKey::new(0xabc, 1.0, 1.0, glow::NEAREST);
    f.driver.cache_texture(key, id);

    // Advance two frames, touching the texture each frame via lookup.
    for _ in 0..2 {
        let queue = frame_queue(&f.driver);
        f.driver.begin_frame(queue);
        assert_eq!(f.driver.lookup_texture(&key), id);
        f.driver.end_frame();
        f.driver.after_frame();
    }
    assert!(f.driver.contains_texture(id));
}

#[test]
fn test_release_render_target_keeps_texture() {
    let mut f = fixture();
    let target = f.driver.create_render_target(32, 32, glow::RGBA8, glow::NEAREST, glow::NEAREST)
        .unwrap();
    let texture_id = target.texture_id;
    let returned = f.driver.release_render_target(target, false);
    assert_eq!(returned, texture_id);
    assert!(f.driver.contains_texture(texture_id));
}

#[test]
fn test_release_render_target_pooled() {
    let mut f = fixture();
    let queue = frame_queue(&f.driver);
    f.driver.begin_frame(queue);
    let target = f.driver.create_render_target(32, 32, glow::RGBA8, glow::NEAREST, glow::NEAREST)
        .unwrap();
    let texture_id = target.texture_id;
    assert_eq!(f.driver.release_render_target(target, true), 0);
    f.driver.end_frame();
    f.driver.after_frame();
    assert!(!f.driver.contains_texture(texture_id));
}

#[test]
fn test_load_texture_caches_by_source_identity() {
    let mut f = fixture();
    let source = memory_texture(8, 8);
    let first = f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR);
    assert_ne!(first, 0);
    let second = f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR);
    assert_eq!(first, second);
    // A premultiplied linear source uploads without a conversion pass.
    assert_eq!(f.driver.queue_mut().n_batches(), 0);
    let _ = &f.gl;
}

#[test]
fn test_load_texture_straight_alpha_converts() {
    let mut f = fixture();
    let source = Arc::new(ImageTexture::from_memory(
        8,
        8,
        MemoryFormat::Rgba8,
        ColorState::SrgbLinear,
        32,
        vec![128u8; 32 * 8],
    ));
    let id = f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR);
    assert_ne!(id, 0);
    // The conversion pass records into the shared queue; executing it
    // produces the premultiply draw.
    f.driver.queue_mut().execute(8, 1.0, None, 0);
    assert_eq!(
        f.gl.count_calls(|c| matches!(c, crate::gl::recording::GlCall::DrawArrays { .. })),
        1
    );
}

#[test]
fn test_load_texture_dropped_source_ages_out() {
    let mut f = fixture();
    let source = memory_texture(8, 8);
    let id = f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR);
    assert_ne!(id, 0);

    // While the source is alive the upload is pinned.
    assert_eq!(f.driver.collect_unused_textures(i64::MAX), 0);
    drop(source);
    assert_eq!(f.driver.collect_unused_textures(i64::MAX), 1);
}

#[test]
fn test_adopted_gl_texture_used_directly() {
    let mut f = fixture();
    let source = Arc::new(ImageTexture::from_gl(8, 8, 99, 1, ColorState::SrgbLinear, true, false));
    assert_eq!(f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR), 99);
}

#[test]
fn test_foreign_context_gl_texture_rejected() {
    let mut f = fixture();
    let source = Arc::new(ImageTexture::from_gl(8, 8, 99, 2, ColorState::SrgbLinear, true, false));
    assert_eq!(f.driver.load_texture(&source, glow::LINEAR, glow::LINEAR), 0);
}

#[test]
fn test_slice_texture_tiles_oversized_source() {
    let gl = Rc::new(RecordingContext::with_max_texture_size(256));
    let mut driver = GlDriver::new(gl, false).unwrap();

    // 256/4 = 64 per tile; a 130x70 source needs 3x2 tiles.
    let source = memory_texture(130, 70);
    let slices = driver.slice_texture(&source);
    assert_eq!(slices.len(), 6);
    assert_eq!(slices[0].rect, (0, 0, 64, 64));
    assert_eq!(slices[2].rect, (128, 0, 2, 64));
    assert_eq!(slices[5].rect, (128, 64, 2, 6));

    // Cached on second call.
    let again = driver.slice_texture(&source);
    assert_eq!(again.len(), 6);
    assert_eq!(again[0].texture_id, slices[0].texture_id);
}

#[test]
fn test_custom_shader_failure_is_cached() {
    let mut f = fixture();
    let shader = Arc::new(lucent_scene::ShaderSource::new("void mainImage() {}".into(), vec![]));
    let program = f.driver.lookup_custom_shader(&shader);
    // The recording context always compiles, so this succeeds; the cache
    // must return the identical program on the second lookup.
    let again = f.driver.lookup_custom_shader(&shader);
    assert_eq!(program.map(|p| p.id), again.map(|p| p.id));
}
