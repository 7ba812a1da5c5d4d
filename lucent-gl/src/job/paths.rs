//! Fill and stroke visitors.
//!
//! Contours that classify as rects, rounded rects or circles become inline
//! clips; everything else renders the child offscreen and masks it with a
//! cached coverage texture produced by the fallback rasterizer.

use std::sync::Arc;

use glam::Vec2;
use lucent_scene::{Contour, NodeKind, NodeRef, Path, Rect, RoundedRect};

use super::{Offscreen, RenderJob};
use crate::library::{MaskKey, MaskOp};
use crate::shader::{keys, ProgramKind};

impl RenderJob<'_> {
    pub(super) fn visit_path_node(&mut self, node: &NodeRef) {
        match node.kind() {
            NodeKind::Fill { path, fill_rule, child } => {
                let (path, op, child) = (path.clone(), MaskOp::Fill(*fill_rule), child.clone());

                // Rect-ish single contours become plain clips.
                if let Some(contour) = path.single_contour() {
                    match contour {
                        Contour::Rect(rect) => {
                            let rect = *rect;
                            self.visit_clipped_child(&child, &rect);
                            return;
                        }
                        Contour::RoundedRect(rounded) => {
                            let clipped = lucent_scene::RenderNode::rounded_clip(*rounded, child);
                            self.visit_rounded_clip_node(&clipped);
                            return;
                        }
                        Contour::Circle { center, radius } => {
                            let rounded = circle_outline(*center, *radius);
                            let clipped = lucent_scene::RenderNode::rounded_clip(rounded, child);
                            self.visit_rounded_clip_node(&clipped);
                            return;
                        }
                        Contour::Standard(_) => {}
                    }
                }

                self.visit_masked_child(node, &path, op, &child);
            }
            NodeKind::Stroke { path, style, child } => {
                let (path, op, child) =
                    (path.clone(), MaskOp::Stroke(style.width.to_bits()), child.clone());
                self.visit_masked_child(node, &path, op, &child);
            }
            _ => unreachable!(),
        }
    }

    /// Renders the child offscreen and multiplies it with the path's
    /// coverage mask.
    fn visit_masked_child(
        &mut self,
        node: &NodeRef,
        path: &Arc<Path>,
        op: MaskOp,
        child: &NodeRef,
    ) {
        let bounds = node.bounds();
        let frame_id = self.driver.frame_id();
        let key = MaskKey::new(path, op, self.scale_x, self.scale_y);

        let mask = match self.paths.lookup(&key, frame_id) {
            Some((texture_id, _)) => texture_id,
            None => {
                let Some(texture_id) = self.rasterize_mask(node, &bounds) else {
                    return;
                };
                self.paths.insert(key, path, texture_id, bounds, frame_id);
                texture_id
            }
        };

        let mut offscreen = Offscreen::new(bounds);
        offscreen.force_offscreen = true;
        offscreen.reset_clip = true;
        if !self.visit_node_with_offscreen(child, &mut offscreen) {
            return;
        }

        self.begin_draw(self.choose_program(ProgramKind::Mask));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
        self.set_uniform_texture(keys::MASK_SOURCE, 1, mask);
        self.draw_offscreen(&bounds, &offscreen);
        self.end_draw();
    }

    /// Coverage of the path over `bounds` through the fallback rasterizer,
    /// uploaded as a texture. White pixels where the path covers.
    fn rasterize_mask(&mut self, node: &NodeRef, bounds: &Rect) -> Option<u32> {
        let scale_x = self.scale_x.abs();
        let scale_y = self.scale_y.abs();
        let width = (bounds.width * scale_x).ceil() as i32;
        let height = (bounds.height * scale_y).ceil() as i32;
        if width <= 0 || height <= 0 {
            return None;
        }

        let fallback = self.fallback?;
        let buffer = fallback.paint_node(node, width as u32, height as u32, scale_x, scale_y)?;

        let texture_id = self.driver.queue_mut().upload_memory_texture(
            width,
            height,
            false,
            buffer.stride,
            &buffer.pixels,
            glow::NEAREST,
            glow::NEAREST,
        );
        if texture_id == 0 {
            return None;
        }
        self.driver.register_texture(texture_id, width, height, glow::RGBA8);
        Some(texture_id)
    }
}

/// A circle expressed as a uniform-radius rounded rect.
fn circle_outline(center: Vec2, radius: f32) -> RoundedRect {
    RoundedRect::with_uniform_radius(
        Rect::new(center.x - radius, center.y - radius, 2.0 * radius, 2.0 * radius),
        radius,
    )
}
