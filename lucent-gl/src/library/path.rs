//! Cache of rasterized path masks.
//!
//! Fill and stroke draws that cannot be expressed as inline clips render
//! their coverage into a mask texture once and reuse it while the path, the
//! operation and the scale stay the same.

use std::sync::Arc;

use hashbrown::HashMap;
use lucent_scene::{FillRule, Path, Rect};

use crate::driver::GlDriver;

const MAX_FRAME_AGE: i64 = 60;

/// Which rasterization produced the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskOp {
    Fill(FillRule),
    /// Stroke width as bits, so the key hashes.
    Stroke(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskKey {
    path: usize,
    op: MaskOp,
    scale_x: u32,
    scale_y: u32,
}

impl MaskKey {
    pub fn new(path: &Arc<Path>, op: MaskOp, scale_x: f32, scale_y: f32) -> Self {
        Self {
            path: Arc::as_ptr(path) as usize,
            op,
            scale_x: scale_x.to_bits(),
            scale_y: scale_y.to_bits(),
        }
    }
}

struct MaskEntry {
    /// Pins the pointer key.
    _path: Arc<Path>,
    texture_id: u32,
    /// Mask extent in scene coordinates.
    bounds: Rect,
    last_used_in_frame: i64,
}

/// See module docs.
#[derive(Default)]
pub struct PathCache {
    entries: HashMap<MaskKey, MaskEntry>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&mut self, key: &MaskKey, frame_id: i64) -> Option<(u32, Rect)> {
        let entry = self.entries.get_mut(key)?;
        entry.last_used_in_frame = frame_id;
        Some((entry.texture_id, entry.bounds))
    }

    pub fn insert(
        &mut self,
        key: MaskKey,
        path: &Arc<Path>,
        texture_id: u32,
        bounds: Rect,
        frame_id: i64,
    ) {
        self.entries.insert(
            key,
            MaskEntry { _path: path.clone(), texture_id, bounds, last_used_in_frame: frame_id },
        );
    }

    /// Releases masks unused for [`MAX_FRAME_AGE`] frames.
    pub fn begin_frame(&mut self, driver: &mut GlDriver, frame_id: i64) {
        self.entries.retain(|_, entry| {
            if entry.last_used_in_frame + MAX_FRAME_AGE < frame_id {
                driver.release_texture(entry.texture_id);
                false
            } else {
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

    use super::*;
    use crate::gl::recording::RecordingContext;

    #[test]
    fn test_mask_key_distinguishes_op_and_scale() {
        let path = Arc::new(Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let fill = MaskKey::new(&path, MaskOp::Fill(FillRule::Winding), 1.0, 1.0);
        let even_odd = MaskKey::new(&path, MaskOp::Fill(FillRule::EvenOdd), 1.0, 1.0);
        let scaled = MaskKey::new(&path, MaskOp::Fill(FillRule::Winding), 2.0, 1.0);
        assert_ne!(fill, even_odd);
        assert_ne!(fill, scaled);
    }

    #[test]
    fn test_unused_masks_expire() {
        let mut driver = GlDriver::new(Rc::new(RecordingContext::new()), false).unwrap();
        let mut cache = PathCache::new();
        let path = Arc::new(Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let key = MaskKey::new(&path, MaskOp::Fill(FillRule::Winding), 1.0, 1.0);

        let id = driver.create_texture(16, 16, glow::RGBA8, glow::NEAREST, glow::NEAREST);
        cache.insert(key, &path, id, Rect::new(0.0, 0.0, 10.0, 10.0), 1);

        cache.begin_frame(&mut driver, 30);
        assert_eq!(cache.len(), 1);
        cache.begin_frame(&mut driver, 100);
        assert!(cache.is_empty());
        assert!(!driver.contains_texture(id));
    }
}
