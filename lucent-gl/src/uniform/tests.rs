use glam::Mat4;
use lucent_scene::Color;

use super::*;
use crate::gl::recording::{GlCall, RecordingContext};

fn new_program(state: &mut UniformState) -> UniformProgramId {
    // Keys 0..4 present, key 4 optimized out.
    state.register_program(7, &[0, 1, 2, 3, -1], true)
}

#[test]
fn test_initial_mapping_reads_as_unset() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    let mapping = state.program(prog).mappings[0];
    assert!(mapping.info.initial());
    assert_eq!(mapping.info.offset(), 0);
}

#[test]
fn test_first_write_clears_initial_and_allocates() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 0, 0.5);
    let info = state.program(prog).mappings[0].info;
    assert!(!info.initial());
    assert_ne!(info.offset(), 0);
    assert_eq!(state.value_bytes(info.offset(), 4), 0.5f32.to_ne_bytes());
}

#[test]
fn test_equal_write_is_ignored() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 0, 0.5);
    let before = state.program(prog).mappings[0].info;
    state.set_1f(prog, 0, 0, 0.5);
    assert_eq!(state.program(prog).mappings[0].info, before);
}

#[test]
fn test_changed_write_appends_new_slot() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 0, 0.5);
    let first = state.program(prog).mappings[0].info;
    state.set_1f(prog, 0, 0, 0.75);
    let second = state.program(prog).mappings[0].info;
    assert_ne!(first.offset(), second.offset());
    // The old bytes survive for snapshot comparison.
    assert_eq!(state.value_bytes(first.offset(), 4), 0.5f32.to_ne_bytes());
    assert_eq!(state.value_bytes(second.offset(), 4), 0.75f32.to_ne_bytes());
}

#[test]
fn test_optimized_out_location_drops_writes() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 4, 0, 1.0);
    let mapping = state.program(prog).mappings[4];
    assert!(mapping.info.initial());
}

#[test]
fn test_stamp_short_circuits() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 10, 1.0);
    // Same stamp: the write is skipped entirely, even with a new value.
    state.set_1f(prog, 0, 10, 2.0);
    let info = state.program(prog).mappings[0].info;
    assert_eq!(state.value_bytes(info.offset(), 4), 1.0f32.to_ne_bytes());
    // New stamp: the value lands.
    state.set_1f(prog, 0, 11, 2.0);
    let info = state.program(prog).mappings[0].info;
    assert_eq!(state.value_bytes(info.offset(), 4), 2.0f32.to_ne_bytes());
}

#[test]
fn test_matrix_alignment() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 0, 1.0);
    state.set_matrix(prog, 1, 0, &Mat4::IDENTITY);
    let info = state.program(prog).mappings[1].info;
    // 16-byte alignment means a slot offset divisible by 4.
    assert_eq!(info.offset() % 4, 0);
    assert_eq!(info.byte_size(), 64);
}

#[test]
fn test_array_growth_reallocates() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1fv(prog, 0, 0, &[1.0, 2.0]);
    let first = state.program(prog).mappings[0].info;
    assert_eq!(first.array_count(), 2);
    state.set_1fv(prog, 0, 0, &[1.0, 2.0, 3.0]);
    let second = state.program(prog).mappings[0].info;
    assert_eq!(second.array_count(), 3);
    assert_ne!(first.offset(), second.offset());
}

#[test]
fn test_apply_dedups_identical_info() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_color(prog, 2, 0, &Color::new(1.0, 0.0, 0.0, 1.0));
    let info = state.program(prog).mappings[2].info;

    let gl = RecordingContext::new();
    state.apply(&gl, 7, 2, info);
    state.apply(&gl, 7, 2, info);
    assert_eq!(gl.count_calls(|c| matches!(c, GlCall::Uniform(_))), 1);
}

#[test]
fn test_end_frame_resets_arena_and_mappings() {
    let mut state = UniformState::new();
    let prog = new_program(&mut state);
    state.set_1f(prog, 0, 0, 0.5);
    state.end_frame();
    let mapping = state.program(prog).mappings[0];
    assert!(mapping.info.initial());
    assert_eq!(mapping.stamp, 0);
    // Locations survive across frames.
    assert_eq!(mapping.location, 0);
    // The next write allocates fresh from the reserved region.
    state.set_1f(prog, 0, 0, 0.5);
    let info = state.program(prog).mappings[0].info;
    assert!(!info.initial());
    assert_ne!(info.offset(), 0);
}

#[test]
fn test_info_packing_roundtrip() {
    let info = UniformInfo::new(false, UniformFormat::RoundedRect as u32, 3, 12345);
    assert!(!info.initial());
    assert_eq!(info.format(), Some(UniformFormat::RoundedRect));
    assert_eq!(info.array_count(), 3);
    assert_eq!(info.offset(), 12345);
}
