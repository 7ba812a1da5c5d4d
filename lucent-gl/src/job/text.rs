//! The text visitor: one quad per glyph, all vertices reserved in one
//! allocation, the draw split whenever the next glyph lives in a different
//! atlas.

use half::f16;
use lucent_scene::{Color, NodeKind, NodeRef, GLYPH_UNITS};

use super::{color_to_half, RenderJob};
use crate::command::{DrawVertex, VERTICES_PER_QUAD};
use crate::library::{compute_phase_and_pos, GlyphKey};
use crate::shader::{keys, ProgramKind};

impl RenderJob<'_> {
    /// Draws a text run. `force_color` recolors color glyphs too (used for
    /// text shadows); otherwise color glyphs carry the `vec4(-1)` sentinel
    /// so the shader leaves their pixels alone.
    pub(super) fn visit_text_node(&mut self, node: &NodeRef, color: &Color, force_color: bool) {
        let NodeKind::Text { font, glyphs, offset, has_color_glyphs, .. } = node.kind() else {
            unreachable!()
        };
        let (font, glyphs, offset) = (font.clone(), glyphs.clone(), *offset);

        if glyphs.is_empty() {
            return;
        }
        if (force_color || !has_color_glyphs) && color.is_clear() {
            return;
        }

        // TODO: handle uneven axis scales with per-axis glyph keys.
        let text_scale = self.scale_x.abs().max(self.scale_y.abs());
        let x = offset.x + self.offset_x;
        let y = offset.y + self.offset_y;

        let no_color: [f16; 4] = [f16::from_f32(-1.0); 4];
        let text_color = color_to_half(color);

        let mut lookup = GlyphKey {
            font_id: font.id(),
            glyph: 0,
            xshift: 0,
            yshift: 0,
            scale: (text_scale * 1024.0) as u32,
        };

        let (yshift, ypos) = compute_phase_and_pos(y);

        self.begin_draw(self.choose_program(ProgramKind::Coloring));

        let num_glyphs = glyphs.len();
        let base = self.driver.queue_mut().reserve_quads(num_glyphs);

        let mut last_texture = 0u32;
        let mut used = 0usize;
        let mut x_position = 0i32;

        for glyph_info in &glyphs {
            lookup.glyph = glyph_info.glyph;

            let glyph_color =
                if !force_color && glyph_info.is_color { no_color } else { text_color };

            let mut cx = (x_position + glyph_info.x_offset) as f32 / GLYPH_UNITS as f32;
            let (xshift, aligned_cx) = compute_phase_and_pos(x + cx);
            lookup.xshift = xshift;
            cx = aligned_cx;

            let cy;
            if glyph_info.y_offset != 0 {
                let raw_cy = glyph_info.y_offset as f32 / GLYPH_UNITS as f32;
                let (shift, aligned_cy) = compute_phase_and_pos(y + raw_cy);
                lookup.yshift = shift;
                cy = aligned_cy;
            } else {
                lookup.yshift = yshift;
                cy = ypos;
            }

            x_position += glyph_info.width;

            let Some(hit) = self.glyphs.lookup_or_add(self.driver, &font, lookup) else {
                continue;
            };

            let vbo_full = {
                let tail = self.driver.queue_mut().tail_draw();
                tail.vbo_count + VERTICES_PER_QUAD as u32 > u16::MAX as u32
            };
            if last_texture != hit.texture_id || vbo_full {
                if last_texture != 0 {
                    // The reserved vertices sit past the buffer cursor the
                    // fresh batch would record; continue from the previous
                    // batch's end instead.
                    let tail = self.driver.queue_mut().tail_draw();
                    let continue_at = tail.vbo_offset + tail.vbo_count;
                    self.split_draw();
                    self.driver.queue_mut().set_tail_vbo_offset(continue_at);
                }
                self.set_uniform_texture(keys::SOURCE, 0, hit.texture_id);
                last_texture = hit.texture_id;
            }

            let tx = hit.area.x;
            let ty = hit.area.y;
            let tx2 = hit.area.x2;
            let ty2 = hit.area.y2;

            let glyph_x = cx + hit.ink_rect.x as f32;
            let glyph_y = cy + hit.ink_rect.y as f32;
            let glyph_x2 = glyph_x + hit.ink_rect.width as f32;
            let glyph_y2 = glyph_y + hit.ink_rect.height as f32;

            let quad = [
                DrawVertex::new([glyph_x, glyph_y], [tx, ty], glyph_color),
                DrawVertex::new([glyph_x, glyph_y2], [tx, ty2], glyph_color),
                DrawVertex::new([glyph_x2, glyph_y], [tx2, ty], glyph_color),
                DrawVertex::new([glyph_x2, glyph_y2], [tx2, ty2], glyph_color),
                DrawVertex::new([glyph_x, glyph_y2], [tx, ty2], glyph_color),
                DrawVertex::new([glyph_x2, glyph_y], [tx2, ty], glyph_color),
            ];
            let queue = self.driver.queue_mut();
            queue.write_vertices(base + used * VERTICES_PER_QUAD, &quad);
            queue.add_tail_vertex_count(VERTICES_PER_QUAD as u32);
            used += 1;
        }

        if used != num_glyphs {
            let queue = self.driver.queue_mut();
            queue.retract_vertices((num_glyphs - used) * VERTICES_PER_QUAD);
        }

        self.end_draw();
    }
}
