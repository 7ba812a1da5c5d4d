//! Desired framebuffer and texture bindings for the next draw.
//!
//! Every call is idempotent: binding a value that is already current leaves
//! the `changed` bit alone, so end-of-draw snapshots only pick up real
//! transitions. Resetting a slot to id 0 marks it `initial`, forcing the
//! next bind through.

/// Texture units the shaders may sample; must match the widest program.
pub const MAX_TEXTURES_PER_PROGRAM: usize = 4;

/// Filters a sampler index can encode.
const N_FILTERS: u32 = 3;

fn filter_index(filter: u32) -> u32 {
    match filter {
        glow::LINEAR => 0,
        glow::NEAREST => 1,
        glow::LINEAR_MIPMAP_LINEAR => 2,
        _ => unreachable!("unsupported filter"),
    }
}

/// Index into the precomputed sampler table for a (min, mag) filter pair.
pub fn sampler_index(min_filter: u32, mag_filter: u32) -> u32 {
    filter_index(min_filter) * N_FILTERS + filter_index(mag_filter)
}

/// One texture unit's desired binding.
#[derive(Debug, Clone, Copy)]
pub struct BindTexture {
    pub target: u32,
    pub sampler: u32,
    pub id: u32,
    pub changed: bool,
    pub initial: bool,
}

impl Default for BindTexture {
    fn default() -> Self {
        Self { target: glow::TEXTURE_2D, sampler: 0, id: 0, changed: false, initial: true }
    }
}

/// The desired framebuffer binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindFramebuffer {
    pub id: u32,
    pub changed: bool,
}

/// Tracks the framebuffer and [`MAX_TEXTURES_PER_PROGRAM`] texture units.
#[derive(Debug, Default)]
pub struct AttachmentState {
    pub fbo: BindFramebuffer,
    pub textures: [BindTexture; MAX_TEXTURES_PER_PROGRAM],
    pub n_changed: u32,
}

impl AttachmentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `id` bound on texture `unit` with the given filters.
    pub fn bind_texture(&mut self, unit: usize, target: u32, id: u32, min_filter: u32, mag_filter: u32) {
        debug_assert!(unit < MAX_TEXTURES_PER_PROGRAM);
        let slot = &mut self.textures[unit];
        let sampler = sampler_index(min_filter, mag_filter);
        if slot.id != id || slot.target != target || slot.sampler != sampler {
            if !slot.changed {
                slot.changed = true;
                self.n_changed += 1;
            }
            slot.target = target;
            slot.sampler = sampler;
            slot.id = id;
            slot.initial = false;
        }
    }

    /// Requests `id` as the draw framebuffer. Returns the previously
    /// requested id.
    pub fn bind_framebuffer(&mut self, id: u32) -> u32 {
        let prev = self.fbo.id;
        if self.fbo.id != id {
            self.fbo.id = id;
            self.fbo.changed = true;
        }
        prev
    }

    /// Drops a texture binding; the next bind of that unit always records a
    /// transition.
    pub fn reset_texture(&mut self, unit: usize) {
        let slot = &mut self.textures[unit];
        if slot.changed {
            self.n_changed -= 1;
        }
        *slot = BindTexture::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_index() {
        assert_eq!(sampler_index(glow::LINEAR, glow::LINEAR), 0);
        assert_eq!(sampler_index(glow::NEAREST, glow::NEAREST), 4);
        assert_eq!(sampler_index(glow::LINEAR_MIPMAP_LINEAR, glow::NEAREST), 7);
    }

    #[test]
    fn test_bind_texture_idempotent() {
        let mut state = AttachmentState::new();
        state.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);
        assert!(state.textures[0].changed);
        assert_eq!(state.n_changed, 1);

        state.textures[0].changed = false;
        state.n_changed = 0;
        state.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);
        assert!(!state.textures[0].changed);
        assert_eq!(state.n_changed, 0);
    }

    #[test]
    fn test_filter_change_is_a_transition() {
        let mut state = AttachmentState::new();
        state.bind_texture(0, glow::TEXTURE_2D, 5, glow::LINEAR, glow::LINEAR);
        state.textures[0].changed = false;
        state.n_changed = 0;
        state.bind_texture(0, glow::TEXTURE_2D, 5, glow::NEAREST, glow::NEAREST);
        assert!(state.textures[0].changed);
    }

    #[test]
    fn test_bind_framebuffer_returns_previous() {
        let mut state = AttachmentState::new();
        assert_eq!(state.bind_framebuffer(3), 0);
        assert_eq!(state.bind_framebuffer(3), 3);
        assert!(state.fbo.changed);
    }

    #[test]
    fn test_reset_texture_marks_initial() {
        let mut state = AttachmentState::new();
        state.bind_texture(1, glow::TEXTURE_2D, 9, glow::LINEAR, glow::LINEAR);
        state.reset_texture(1);
        assert!(state.textures[1].initial);
        assert_eq!(state.textures[1].id, 0);
        assert_eq!(state.n_changed, 0);
    }
}
