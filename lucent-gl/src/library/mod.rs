//! Texture caches built on shared atlases.
//!
//! [`TextureLibrary`] is the common superstructure (packing, per-frame
//! compaction, aging); the glyph and icon libraries specialize it, while the
//! shadow template cache and path mask cache are flat keyed stores with the
//! same aging discipline.

pub mod atlas;
mod glyph;
mod icon;
mod path;
mod shadow;
mod texture_library;

pub use glyph::{compute_phase_and_pos, GlyphHit, GlyphKey, GlyphLibrary};
pub use icon::{IconLibrary, MAX_ICON_SIZE};
pub use path::{MaskKey, MaskOp, PathCache};
pub use shadow::ShadowLibrary;
pub use texture_library::{
    AtlasEntry, Packed, TextureLibrary, DEFAULT_ATLAS_HEIGHT, DEFAULT_ATLAS_WIDTH,
    DEFAULT_MAX_FRAME_AGE,
};
