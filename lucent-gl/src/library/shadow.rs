//! Cache of blurred outset-shadow template textures.
//!
//! Keyed by the outline in normalized, blurred-extent space plus the blur
//! radius. The entry list is small, so lookups are a linear scan.

use lucent_scene::RoundedRect;

use crate::driver::GlDriver;

/// Frames an entry may go unused before it is released.
const MAX_UNUSED_FRAMES: i64 = 4;

struct ShadowEntry {
    outline: RoundedRect,
    blur_radius: f32,
    texture_id: u32,
    last_used_in_frame: i64,
}

/// See module docs.
#[derive(Default)]
pub struct ShadowLibrary {
    entries: Vec<ShadowEntry>,
}

impl ShadowLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached template for (outline, radius), or 0.
    pub fn lookup(&mut self, outline: &RoundedRect, blur_radius: f32, frame_id: i64) -> u32 {
        for entry in &mut self.entries {
            if entry.blur_radius == blur_radius && entry.outline == *outline {
                entry.last_used_in_frame = frame_id;
                return entry.texture_id;
            }
        }
        0
    }

    pub fn insert(
        &mut self,
        outline: RoundedRect,
        blur_radius: f32,
        texture_id: u32,
        frame_id: i64,
    ) {
        self.entries.push(ShadowEntry {
            outline,
            blur_radius,
            texture_id,
            last_used_in_frame: frame_id,
        });
    }

    /// Releases templates that have not been drawn for a few frames.
    pub fn begin_frame(&mut self, driver: &mut GlDriver, frame_id: i64) {
        self.entries.retain(|entry| {
            if entry.last_used_in_frame + MAX_UNUSED_FRAMES < frame_id {
                driver.release_texture(entry.texture_id);
                false
            } else {
                // Keep the backing texture out of the driver's eviction.
                if let Some(texture) = driver.texture_mut(entry.texture_id) {
                    texture.last_used_in_frame = frame_id;
                }
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use lucent_scene::Rect;

    use super::*;
    use crate::gl::recording::RecordingContext;

    fn driver() -> GlDriver {
        GlDriver::new(Rc::new(RecordingContext::new()), false).unwrap()
    }

    fn outline() -> RoundedRect {
        RoundedRect::with_uniform_radius(Rect::new(0.0, 0.0, 64.0, 64.0), 8.0)
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let mut driver = driver();
        let mut shadows = ShadowLibrary::new();
        assert_eq!(shadows.lookup(&outline(), 4.0, 1), 0);

        let id = driver.create_texture(64, 64, glow::RGBA8, glow::NEAREST, glow::NEAREST);
        shadows.insert(outline(), 4.0, id, 1);
        assert_eq!(shadows.lookup(&outline(), 4.0, 2), id);
        // A different radius is a different template.
        assert_eq!(shadows.lookup(&outline(), 8.0, 2), 0);
    }

    #[test]
    fn test_unused_entries_are_released() {
        let mut driver = driver();
        let mut shadows = ShadowLibrary::new();
        let id = driver.create_texture(64, 64, glow::RGBA8, glow::NEAREST, glow::NEAREST);
        shadows.insert(outline(), 4.0, id, 1);

        shadows.begin_frame(&mut driver, 3);
        assert_eq!(shadows.len(), 1);

        shadows.begin_frame(&mut driver, 10);
        assert!(shadows.is_empty());
        assert!(!driver.contains_texture(id));
    }
}
