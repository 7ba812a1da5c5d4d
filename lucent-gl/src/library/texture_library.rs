//! Shared superstructure of the glyph/icon texture caches.
//!
//! Entries smaller than `max_entry_size` pack into shared atlases; larger
//! ones get a dedicated permanent texture. Per-frame compaction drops whole
//! atlases once more than half their pixels belong to unused entries, and a
//! periodic scan every `max_frame_age` frames expires entries that were not
//! accessed since the last scan.

use std::hash::Hash;

use hashbrown::HashMap;

use crate::driver::{GlDriver, TextureArea};
use crate::library::atlas::Atlas;

pub const DEFAULT_ATLAS_WIDTH: i32 = 512;
pub const DEFAULT_ATLAS_HEIGHT: i32 = 512;
pub const DEFAULT_MAX_FRAME_AGE: i64 = 60;

/// Ratio of stale pixels beyond which an atlas is dropped whole.
const MAX_OLD_RATIO: f64 = 0.5;

/// A cached image: where it lives plus the caller's payload.
pub struct AtlasEntry<V> {
    /// Index into the library's atlas list, or `None` for a standalone
    /// texture.
    pub atlas_index: Option<usize>,
    /// Standalone texture id; 0 for atlased or empty entries.
    pub texture_id: u32,
    pub area: TextureArea,
    pub n_pixels: i64,
    /// Entry pixels currently count as live in their atlas.
    pub used: bool,
    /// Entry was looked up since the last periodic scan.
    pub accessed: bool,
    pub value: V,
}

/// Result of packing a new entry, with the upload destination.
#[derive(Debug, Clone, Copy)]
pub struct Packed {
    pub texture_id: u32,
    pub packed_x: i32,
    pub packed_y: i32,
    pub area: TextureArea,
}

/// See module docs.
pub struct TextureLibrary<K, V> {
    entries: HashMap<K, AtlasEntry<V>>,
    atlases: Vec<Atlas>,
    /// Entries with either side above this go to a dedicated texture;
    /// 0 disables the limit.
    pub max_entry_size: i32,
    pub max_frame_age: i64,
    atlas_width: i32,
    atlas_height: i32,
}

impl<K: Hash + Eq + Clone, V> TextureLibrary<K, V> {
    pub fn new(max_entry_size: i32) -> Self {
        Self {
            entries: HashMap::new(),
            atlases: Vec::new(),
            max_entry_size,
            max_frame_age: DEFAULT_MAX_FRAME_AGE,
            atlas_width: DEFAULT_ATLAS_WIDTH,
            atlas_height: DEFAULT_ATLAS_HEIGHT,
        }
    }

    pub fn can_cache(&self, width: i32, height: i32) -> bool {
        self.max_entry_size == 0 || (width <= self.max_entry_size && height <= self.max_entry_size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn n_atlases(&self) -> usize {
        self.atlases.len()
    }

    pub fn atlas_texture(&self, index: usize) -> u32 {
        self.atlases[index].texture_id
    }

    /// The GL texture backing an entry.
    pub fn entry_texture(&self, entry: &AtlasEntry<V>) -> u32 {
        match entry.atlas_index {
            Some(index) => self.atlases[index].texture_id,
            None => entry.texture_id,
        }
    }

    /// Looks up an entry, marking it used and accessed. Returns the backing
    /// texture, the uv area and the payload.
    pub fn lookup(&mut self, key: &K) -> Option<(u32, TextureArea, &V)> {
        let entry = self.entries.get_mut(key)?;
        if !entry.used {
            if let Some(index) = entry.atlas_index {
                self.atlases[index].unused_pixels -= entry.n_pixels;
            }
            entry.used = true;
        }
        entry.accessed = true;
        let texture_id = match entry.atlas_index {
            Some(index) => self.atlases[index].texture_id,
            None => entry.texture_id,
        };
        Some((texture_id, entry.area, &entry.value))
    }

    /// Allocates a new atlas, painting the 3×3 opaque white block at (0,0)
    /// so color-only draws can sample a guaranteed-opaque texel.
    fn acquire_atlas(&mut self, driver: &mut GlDriver) -> usize {
        let (width, height) = (self.atlas_width, self.atlas_height);
        let texture_id = driver
            .queue_mut()
            .create_texture(width, height, glow::RGBA8, glow::LINEAR, glow::LINEAR);
        let mut atlas = Atlas::new(texture_id, width, height);

        let (x, y) = atlas.allocate(3, 3).expect("fresh atlas rejected 3x3 block");
        debug_assert!(x == 0 && y == 0);
        let white = [255u8; 4 * 3 * 3];
        driver.queue_mut().with_bound_texture(texture_id, |gl| {
            gl.tex_sub_image_2d(glow::TEXTURE_2D, 0, 0, 0, 3, 3, glow::RGBA, glow::UNSIGNED_BYTE, &white);
        });

        self.atlases.push(atlas);
        self.atlases.len() - 1
    }

    fn pack_any_atlas(&mut self, driver: &mut GlDriver, width: i32, height: i32) -> (usize, i32, i32) {
        for (index, atlas) in self.atlases.iter_mut().enumerate() {
            if let Some((x, y)) = atlas.allocate(width, height) {
                return (index, x, y);
            }
        }
        let index = self.acquire_atlas(driver);
        let (x, y) = self.atlases[index]
            .allocate(width, height)
            .expect("entry cannot fit an empty atlas");
        (index, x, y)
    }

    /// Inserts a new entry of `width`×`height` content pixels surrounded by
    /// `padding`, returning where to upload.
    pub fn pack(
        &mut self,
        driver: &mut GlDriver,
        key: K,
        width: i32,
        height: i32,
        padding: i32,
        value: V,
    ) -> Packed {
        let padded_w = width + 2 * padding;
        let padded_h = height + 2 * padding;

        let (entry, packed) = if width <= 0 || height <= 0 {
            // Cache invisible entries for fast lookups without spending any
            // texture space on them.
            let entry = AtlasEntry {
                atlas_index: None,
                texture_id: 0,
                area: TextureArea::default(),
                n_pixels: 0,
                used: true,
                accessed: true,
                value,
            };
            let packed = Packed { texture_id: 0, packed_x: 0, packed_y: 0, area: entry.area };
            (entry, packed)
        } else if self.can_cache(width, height)
            && padded_w <= self.atlas_width
            && padded_h <= self.atlas_height
        {
            let (atlas_index, x, y) = self.pack_any_atlas(driver, padded_w, padded_h);
            let atlas = &self.atlases[atlas_index];
            let area = atlas.area(x, y, width, height, padding);
            let entry = AtlasEntry {
                atlas_index: Some(atlas_index),
                texture_id: 0,
                area,
                n_pixels: (padded_w * padded_h) as i64,
                used: true,
                accessed: true,
                value,
            };
            let packed =
                Packed { texture_id: atlas.texture_id, packed_x: x, packed_y: y, area };
            (entry, packed)
        } else {
            let max_texture_size = driver.queue_mut().max_texture_size();
            let (mut texture_w, mut texture_h) = (padded_w, padded_h);
            if texture_w > max_texture_size || texture_h > max_texture_size {
                log::warn!(
                    "clipping requested texture of size {texture_w}x{texture_h} to maximum \
                     allowable size {max_texture_size}"
                );
                texture_w = texture_w.min(max_texture_size);
                texture_h = texture_h.min(max_texture_size);
            }
            let texture_id =
                driver.create_texture(texture_w, texture_h, glow::RGBA8, glow::LINEAR, glow::LINEAR);
            driver.mark_texture_permanent(texture_id);
            let area = TextureArea {
                x: padding as f32 / padded_w as f32,
                y: padding as f32 / padded_h as f32,
                x2: (padding + width) as f32 / padded_w as f32,
                y2: (padding + height) as f32 / padded_h as f32,
            };
            let entry = AtlasEntry {
                atlas_index: None,
                texture_id,
                area,
                n_pixels: (padded_w * padded_h) as i64,
                used: true,
                accessed: true,
                value,
            };
            let packed = Packed { texture_id, packed_x: 0, packed_y: 0, area };
            (entry, packed)
        };

        self.entries.insert(key, entry);
        packed
    }

    /// Per-frame maintenance; returns true when anything was dropped (front
    /// caches must then be cleared).
    pub fn begin_frame(&mut self, driver: &mut GlDriver, frame_id: i64) -> bool {
        let periodic_scan = self.max_frame_age > 0 && frame_id % self.max_frame_age == 0;

        // Drop atlases that are mostly stale.
        let mut removed: Vec<usize> = Vec::new();
        for (index, atlas) in self.atlases.iter().enumerate() {
            if atlas.unused_ratio() > MAX_OLD_RATIO {
                removed.push(index);
            }
        }

        if !periodic_scan && removed.is_empty() {
            return false;
        }

        // Remap indices for the retained atlases.
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.atlases.len());
        let mut next = 0;
        for index in 0..self.atlases.len() {
            if removed.contains(&index) {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }
        for index in removed.iter().rev() {
            let atlas = self.atlases.remove(*index);
            driver.autorelease_texture(atlas.texture_id);
        }

        let mut dropped = false;
        let atlases = &mut self.atlases;
        self.entries.retain(|_, entry| {
            match entry.atlas_index {
                Some(old_index) => {
                    match remap[old_index] {
                        Some(new_index) => {
                            entry.atlas_index = Some(new_index);
                            if periodic_scan {
                                // Expire pixels of entries nobody touched;
                                // they count against the next compaction.
                                if entry.used && !entry.accessed {
                                    atlases[new_index].unused_pixels += entry.n_pixels;
                                    entry.used = false;
                                }
                                entry.accessed = false;
                            }
                            true
                        }
                        None => {
                            dropped = true;
                            false
                        }
                    }
                }
                None => {
                    if periodic_scan && !entry.accessed {
                        if entry.texture_id != 0 {
                            driver.release_texture(entry.texture_id);
                        }
                        dropped = true;
                        false
                    } else {
                        if periodic_scan {
                            entry.accessed = false;
                        }
                        true
                    }
                }
            }
        });

        dropped || !remap.iter().all(|r| r.is_some())
    }
}
