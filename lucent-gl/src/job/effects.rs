//! Opacity, cross-fade, blend, color-matrix, blur and shadow visitors.

use glam::Mat4;
use lucent_scene::{NodeKind, NodeRef, Rect, RoundedRect};

use super::visitors::use_offscreen_for_opacity;
use super::{color_to_half, Offscreen, RenderJob, SHADOW_EXTRA_SIZE};
use crate::command::ClearMask;
use crate::driver::{TextureArea, TextureKey, NINE_SLICE_BOTTOM_CENTER, NINE_SLICE_BOTTOM_LEFT,
    NINE_SLICE_BOTTOM_RIGHT, NINE_SLICE_CENTER, NINE_SLICE_LEFT_CENTER, NINE_SLICE_RIGHT_CENTER,
    NINE_SLICE_TOP_CENTER, NINE_SLICE_TOP_LEFT, NINE_SLICE_TOP_RIGHT};
use crate::shader::{keys, ProgramKind};
use half::f16;

const ALPHA_CLEAR: f32 = 0x00ff as f32 / 0xffff as f32;

/// A color-matrix that leaves alpha alone can be peeled off under a shadow.
fn color_matrix_modifies_alpha(matrix: &Mat4, offset: &glam::Vec4) -> bool {
    if offset.w != 0.0 {
        return true;
    }
    let row3 = glam::Vec4::new(matrix.x_axis.w, matrix.y_axis.w, matrix.z_axis.w, matrix.w_axis.w);
    row3 != glam::Vec4::new(0.0, 0.0, 0.0, 1.0)
}

impl RenderJob<'_> {
    pub(super) fn visit_opacity_node(&mut self, node: &NodeRef) {
        let NodeKind::Opacity { opacity, child } = node.kind() else { unreachable!() };
        let (opacity, child) = (*opacity, child.clone());
        let new_alpha = self.alpha * opacity;

        if new_alpha < ALPHA_CLEAR {
            return;
        }

        let prev_alpha = self.set_alpha(new_alpha);

        if !use_offscreen_for_opacity(&child) {
            self.visit_node(&child);
        } else {
            let mut offscreen = Offscreen::new(child.bounds());
            offscreen.force_offscreen = true;
            offscreen.reset_clip = true;

            // Offscreen rendering resets alpha to 1; the blit applies it.
            if !self.visit_node_with_offscreen(&child, &mut offscreen) {
                self.set_alpha(prev_alpha);
                return;
            }

            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            let bounds = node.bounds();
            self.draw_offscreen(&bounds, &offscreen);
            self.end_draw();
        }

        self.set_alpha(prev_alpha);
    }

    pub(super) fn visit_cross_fade_node(&mut self, node: &NodeRef) {
        let NodeKind::CrossFade { start, end, progress } = node.kind() else { unreachable!() };
        let (start, end, progress) = (start.clone(), end.clone(), *progress);
        let bounds = node.bounds();

        let mut offscreen_start = Offscreen::new(bounds);
        offscreen_start.force_offscreen = true;
        offscreen_start.reset_clip = true;

        let mut offscreen_end = Offscreen::new(bounds);
        offscreen_end.force_offscreen = true;
        offscreen_end.reset_clip = true;

        if !self.visit_node_with_offscreen(&start, &mut offscreen_start) {
            self.visit_node(&end);
            return;
        }

        if !self.visit_node_with_offscreen(&end, &mut offscreen_end) {
            let prev_alpha = self.set_alpha(self.alpha * progress);
            self.visit_node(&start);
            self.set_alpha(prev_alpha);
            return;
        }

        self.begin_draw(self.choose_program(ProgramKind::CrossFade));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen_start.texture_id);
        self.set_uniform_texture(keys::CROSS_FADE_SOURCE2, 1, offscreen_end.texture_id);
        self.set_uniform_1f(keys::CROSS_FADE_PROGRESS, progress);
        self.draw_offscreen(&bounds, &offscreen_end);
        self.end_draw();
    }

    pub(super) fn visit_blend_node(&mut self, node: &NodeRef) {
        let NodeKind::Blend { bottom, top, mode } = node.kind() else { unreachable!() };
        let (bottom, top, mode) = (bottom.clone(), top.clone(), *mode);
        let bounds = node.bounds();

        let mut bottom_offscreen = Offscreen::new(bounds);
        bottom_offscreen.force_offscreen = true;
        bottom_offscreen.reset_clip = true;

        let mut top_offscreen = Offscreen::new(bounds);
        top_offscreen.force_offscreen = true;
        top_offscreen.reset_clip = true;

        if !self.visit_node_with_offscreen(&bottom, &mut bottom_offscreen) {
            self.visit_node(&top);
            return;
        }

        if !self.visit_node_with_offscreen(&top, &mut top_offscreen) {
            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, bottom_offscreen.texture_id);
            self.draw_offscreen(&bounds, &bottom_offscreen);
            self.end_draw();
            return;
        }

        self.begin_draw(self.choose_program(ProgramKind::Blend));
        self.set_uniform_texture(keys::SOURCE, 0, bottom_offscreen.texture_id);
        self.set_uniform_texture(keys::BLEND_SOURCE2, 1, top_offscreen.texture_id);
        self.set_uniform_1i(keys::BLEND_MODE, mode as i32);
        self.draw_offscreen_rect(&bounds);
        self.end_draw();
    }

    pub(super) fn visit_color_matrix_node(&mut self, node: &NodeRef) {
        let NodeKind::ColorMatrix { matrix, offset, child } = node.kind() else { unreachable!() };
        let (matrix, offset, child) = (*matrix, *offset, child.clone());
        if child.is_invisible() {
            return;
        }
        let bounds = node.bounds();

        let mut offscreen = Offscreen::new(bounds);
        offscreen.reset_clip = true;
        if !self.visit_node_with_offscreen(&child, &mut offscreen) {
            return;
        }

        self.begin_draw(self.choose_program(ProgramKind::ColorMatrix));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
        self.set_uniform_matrix(keys::COLOR_MATRIX_MATRIX, &matrix);
        self.set_uniform_4f(keys::COLOR_MATRIX_OFFSET, offset.to_array());
        self.draw_offscreen(&bounds, &offscreen);
        self.end_draw();
    }

    pub(super) fn visit_blur_node(&mut self, node: &NodeRef) {
        let NodeKind::Blur { radius, child } = node.kind() else { unreachable!() };
        let (radius, child) = (*radius, child.clone());
        if child.is_invisible() {
            return;
        }

        let key = TextureKey::new(node.id(), self.scale_x, self.scale_y, glow::NEAREST);
        let mut offscreen = Offscreen::new(child.bounds());
        offscreen.texture_id = self.driver.lookup_texture(&key);
        let cache_texture = offscreen.texture_id == 0;

        let (min_x, max_x, min_y, max_y) = self.blur_node(&mut offscreen, &child, radius);
        if offscreen.texture_id == 0 {
            return;
        }

        if cache_texture {
            self.driver.cache_texture(key, offscreen.texture_id);
        }

        self.begin_draw(self.choose_program(ProgramKind::Blit));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
        self.draw_coords(min_x, min_y, max_x, max_y, 0.0, 1.0, 1.0, 0.0, super::FP16_ZERO);
        self.end_draw();
    }

    pub(super) fn visit_unblurred_inset_shadow_node(&mut self, node: &NodeRef) {
        let NodeKind::InsetShadow { outline, color, dx, dy, spread, .. } = node.kind() else {
            unreachable!()
        };
        let (outline, color, dx, dy, spread) = (*outline, *color, *dx, *dy, *spread);
        let transformed_outline = self.transform_rounded_rect(&outline);
        let bounds = node.bounds();

        self.begin_draw(self.choose_program(ProgramKind::InsetShadow));
        self.set_uniform_rounded_rect(keys::SHADOW_OUTLINE_RECT, &transformed_outline);
        self.set_uniform_1f(keys::SHADOW_SPREAD, spread);
        self.set_uniform_2f(keys::SHADOW_OFFSET, dx, dy);
        self.draw_rect_with_color(&bounds, color_to_half(&color));
        self.end_draw();
    }

    pub(super) fn visit_blurred_inset_shadow_node(&mut self, node: &NodeRef) {
        let NodeKind::InsetShadow { outline, color, dx, dy, spread, blur_radius } = node.kind()
        else {
            unreachable!()
        };
        let (outline, color) = (*outline, *color);
        let (dx, dy, spread, blur_radius) = (*dx, *dy, *spread, *blur_radius);

        let scale_x = self.scale_x;
        let scale_y = self.scale_y;
        let blur_extra = blur_radius * 2.0;
        let half_blur_extra = blur_extra / 2.0;

        let texture_width = ((outline.bounds.width + blur_extra) * scale_x).ceil();
        let texture_height = ((outline.bounds.height + blur_extra) * scale_y).ceil();

        let key = TextureKey::new(node.id(), scale_x, scale_y, glow::NEAREST);
        let mut blurred_texture_id = self.driver.lookup_texture(&key);

        if blurred_texture_id == 0 {
            // Render the unblurred inset shadow into a scaled template. The
            // blur reads outside the outline, so the outline grows by the
            // blur extent first and the whole geometry is pre-scaled.
            let grown_spread = spread + half_blur_extra;
            let mut outline_to_blur =
                outline.shrink(-half_blur_extra, -half_blur_extra, -half_blur_extra, -half_blur_extra);
            outline_to_blur.bounds.x = 0.0;
            outline_to_blur.bounds.y = 0.0;
            outline_to_blur.bounds.width *= scale_x;
            outline_to_blur.bounds.height *= scale_y;
            for corner in &mut outline_to_blur.corners {
                corner.width *= scale_x;
                corner.height *= scale_y;
            }

            let Some(render_target) = self.driver.create_render_target(
                texture_width as i32,
                texture_height as i32,
                self.target_format,
                glow::NEAREST,
                glow::NEAREST,
            ) else {
                return;
            };

            let prev_viewport = self.set_viewport_for_size(texture_width, texture_height);
            let prev_projection = self.set_projection_for_size(texture_width, texture_height);
            self.set_modelview(lucent_scene::Transform::identity());
            self.push_clip(RoundedRect::from_rect(Rect::from_size(texture_width, texture_height)));

            let prev_fbo = self.driver.queue_mut().bind_framebuffer(render_target.framebuffer_id);
            let clear_rect = self.viewport;
            self.driver.queue_mut().clear(ClearMask::empty(), &clear_rect);

            let transformed_outline = self.transform_rounded_rect(&outline_to_blur);

            self.begin_draw(self.choose_program(ProgramKind::InsetShadow));
            self.set_uniform_rounded_rect(keys::SHADOW_OUTLINE_RECT, &transformed_outline);
            self.set_uniform_1f(keys::SHADOW_SPREAD, grown_spread * scale_x.max(scale_y));
            self.set_uniform_2f(keys::SHADOW_OFFSET, dx * scale_x, dy * scale_y);
            self.draw_with_color(0.0, 0.0, texture_width, texture_height, color_to_half(&color));
            self.end_draw();

            self.pop_modelview();
            self.pop_clip();
            self.set_projection(prev_projection);
            self.set_viewport(prev_viewport);
            self.driver.queue_mut().bind_framebuffer(prev_fbo);

            let mut offscreen = Offscreen::new(outline.bounds);
            offscreen.texture_id = render_target.texture_id;
            offscreen.area = TextureArea::FULL;

            blurred_texture_id = self.blur_offscreen(
                &offscreen,
                texture_width as i32,
                texture_height as i32,
                blur_radius * scale_x,
                blur_radius * scale_y,
            );

            self.driver.release_render_target(render_target, true);
            if blurred_texture_id == 0 {
                return;
            }
            self.driver.cache_texture(key, blurred_texture_id);
        }

        // Blit the center of the blurred template into the node, clipped to
        // the outline when it is rounded.
        let needs_clip = !outline.is_rectilinear();
        let tx1 = half_blur_extra * scale_x / texture_width;
        let ty1 = half_blur_extra * scale_y / texture_height;

        if needs_clip {
            let mut node_clip = RoundedRect {
                bounds: self.transform_bounds(&outline.bounds),
                corners: outline.corners,
            };
            for corner in &mut node_clip.corners {
                corner.width *= scale_x;
                corner.height *= scale_y;
            }
            self.push_clip(node_clip);
        }

        let offscreen = Offscreen {
            texture_id: blurred_texture_id,
            area: TextureArea { x: tx1, y: ty1, x2: 1.0 - tx1, y2: 1.0 - ty1 },
            was_offscreen: true,
            ..Offscreen::new(node.bounds())
        };

        self.begin_draw(self.choose_program(ProgramKind::Blit));
        self.set_uniform_texture(keys::SOURCE, 0, blurred_texture_id);
        let bounds = node.bounds();
        self.draw_offscreen(&bounds, &offscreen);
        self.end_draw();

        if needs_clip {
            self.pop_clip();
        }
    }

    pub(super) fn visit_unblurred_outset_shadow_node(&mut self, node: &NodeRef) {
        let NodeKind::OutsetShadow { outline, color, dx, dy, spread, .. } = node.kind() else {
            unreachable!()
        };
        let (outline, color, dx, dy, spread) = (*outline, *color, *dx, *dy, *spread);
        let color = color_to_half(&color);
        let bounds = node.bounds();
        let (x, y, w, h) = (bounds.x, bounds.y, bounds.width, bounds.height);

        let transformed_outline = self.transform_rounded_rect(&outline);

        // Top, right, bottom, left.
        let edge_sizes = [spread - dy, spread + dx, spread + dy, spread - dx];
        // Top-left, top-right, bottom-right, bottom-left.
        let corner_sizes = [
            (outline.corners[0].width + spread - dx, outline.corners[0].height + spread - dy),
            (outline.corners[1].width + spread + dx, outline.corners[1].height + spread - dy),
            (outline.corners[2].width + spread + dx, outline.corners[2].height + spread + dy),
            (outline.corners[3].width + spread - dx, outline.corners[3].height + spread + dy),
        ];

        self.begin_draw(self.choose_program(ProgramKind::UnblurredOutsetShadow));
        self.set_uniform_rounded_rect(keys::SHADOW_OUTLINE_RECT, &transformed_outline);
        self.set_uniform_1f(keys::SHADOW_SPREAD, spread);
        self.set_uniform_2f(keys::SHADOW_OFFSET, dx, dy);

        if corner_sizes[0].0 > 0.0 && corner_sizes[0].1 > 0.0 {
            self.draw_with_color(x, y, corner_sizes[0].0, corner_sizes[0].1, color);
        }
        if corner_sizes[1].0 > 0.0 && corner_sizes[1].1 > 0.0 {
            self.draw_with_color(
                x + w - corner_sizes[1].0,
                y,
                corner_sizes[1].0,
                corner_sizes[1].1,
                color,
            );
        }
        if corner_sizes[2].0 > 0.0 && corner_sizes[2].1 > 0.0 {
            self.draw_with_color(
                x + w - corner_sizes[2].0,
                y + h - corner_sizes[2].1,
                corner_sizes[2].0,
                corner_sizes[2].1,
                color,
            );
        }
        if corner_sizes[3].0 > 0.0 && corner_sizes[3].1 > 0.0 {
            self.draw_with_color(
                x,
                y + h - corner_sizes[3].1,
                corner_sizes[3].0,
                corner_sizes[3].1,
                color,
            );
        }
        if edge_sizes[0] > 0.0 {
            self.draw_with_color(
                x + corner_sizes[0].0,
                y,
                w - corner_sizes[0].0 - corner_sizes[1].0,
                edge_sizes[0],
                color,
            );
        }
        if edge_sizes[1] > 0.0 {
            self.draw_with_color(
                x + w - edge_sizes[1],
                y + corner_sizes[1].1,
                edge_sizes[1],
                h - corner_sizes[1].1 - corner_sizes[2].1,
                color,
            );
        }
        if edge_sizes[2] > 0.0 {
            self.draw_with_color(
                x + corner_sizes[3].0,
                y + h - edge_sizes[2],
                w - corner_sizes[3].0 - corner_sizes[2].0,
                edge_sizes[2],
                color,
            );
        }
        if edge_sizes[3] > 0.0 {
            self.draw_with_color(
                x,
                y + corner_sizes[0].1,
                edge_sizes[3],
                h - corner_sizes[0].1 - corner_sizes[3].1,
                color,
            );
        }

        self.end_draw();
    }

    pub(super) fn visit_blurred_outset_shadow_node(&mut self, node: &NodeRef) {
        let NodeKind::OutsetShadow { outline, color, dx, dy, spread, blur_radius } = node.kind()
        else {
            unreachable!()
        };
        let (outline, color) = (*outline, *color);
        let (dx, dy, spread, blur_radius) = (*dx, *dy, *spread, *blur_radius);
        let color = color_to_half(&color);

        let scale_x = self.scale_x;
        let scale_y = self.scale_y;
        let blur_extra = blur_radius * 2.0;
        let half_blur_extra = blur_extra / 2.0;
        let extra_blur_pixels_x = (half_blur_extra * scale_x).ceil() as i32;
        let extra_blur_pixels_y = (half_blur_extra * scale_y).ceil() as i32;

        let half_width = outline.bounds.width / 2.0;
        let half_height = outline.bounds.height / 2.0;

        // The template is the minimal outline that still holds the corner
        // radii. Outlines small relative to their corners cannot be sliced.
        let mut scaled_outline = outline;
        let do_slicing = !(outline.bounds.width < blur_extra
            || outline.bounds.height < blur_extra
            || outline.corners.iter().any(|c| c.width >= half_width || c.height >= half_height));

        if do_slicing {
            scaled_outline.shrink_to_minimum();
            scaled_outline = scaled_outline.shrink(-spread, -spread, -spread, -spread);
            scaled_outline.bounds = scaled_outline.bounds.inset(-half_blur_extra, -half_blur_extra);
            scaled_outline.bounds.width += SHADOW_EXTRA_SIZE;
            scaled_outline.bounds.height += SHADOW_EXTRA_SIZE;
        } else {
            scaled_outline = scaled_outline.shrink(-spread, -spread, -spread, -spread);
        }

        let texture_width = ((scaled_outline.bounds.width + blur_extra) * scale_x).ceil() as i32;
        let texture_height = ((scaled_outline.bounds.height + blur_extra) * scale_y).ceil() as i32;

        scaled_outline.bounds.x = extra_blur_pixels_x as f32;
        scaled_outline.bounds.y = extra_blur_pixels_y as f32;
        scaled_outline.bounds.width = (texture_width - 2 * extra_blur_pixels_x) as f32;
        scaled_outline.bounds.height = (texture_height - 2 * extra_blur_pixels_y) as f32;
        for corner in &mut scaled_outline.corners {
            corner.width *= scale_x;
            corner.height *= scale_y;
        }

        let frame_id = self.driver.frame_id();
        let mut blurred_texture_id = self.shadows.lookup(&scaled_outline, blur_radius, frame_id);

        if blurred_texture_id == 0 {
            let Some(render_target) = self.driver.create_render_target(
                texture_width,
                texture_height,
                self.target_format,
                glow::NEAREST,
                glow::NEAREST,
            ) else {
                return;
            };

            let prev_projection =
                self.set_projection_for_size(texture_width as f32, texture_height as f32);
            let prev_viewport =
                self.set_viewport_for_size(texture_width as f32, texture_height as f32);
            self.set_modelview(lucent_scene::Transform::identity());
            self.push_clip(scaled_outline);

            let prev_fbo = self.driver.queue_mut().bind_framebuffer(render_target.framebuffer_id);
            let clear_rect = self.viewport;
            self.driver.queue_mut().clear(ClearMask::empty(), &clear_rect);

            // The white template; the draw shader recolors it.
            let white = [f16::ONE; 4];
            self.begin_draw(self.choose_program(ProgramKind::Color));
            self.draw_with_color(0.0, 0.0, texture_width as f32, texture_height as f32, white);
            self.end_draw();

            self.pop_clip();
            self.pop_modelview();
            self.set_viewport(prev_viewport);
            self.set_projection(prev_projection);

            let mut offscreen = Offscreen::new(outline.bounds);
            offscreen.area = TextureArea::FULL;
            offscreen.texture_id = self.driver.release_render_target(render_target, false);

            blurred_texture_id = self.blur_offscreen(
                &offscreen,
                texture_width,
                texture_height,
                blur_radius * scale_x,
                blur_radius * scale_y,
            );
            if blurred_texture_id == 0 {
                return;
            }

            self.shadows.insert(scaled_outline, blur_radius, blurred_texture_id, frame_id);
            self.driver.queue_mut().bind_framebuffer(prev_fbo);
        }

        let transformed_outline = self.transform_rounded_rect(&outline);

        if !do_slicing {
            let min_x = (outline.bounds.x - spread - half_blur_extra + dx).floor();
            let min_y = (outline.bounds.y - spread - half_blur_extra + dy).floor();

            let offscreen = Offscreen {
                texture_id: blurred_texture_id,
                area: TextureArea::FULL,
                was_offscreen: true,
                ..Offscreen::new(outline.bounds)
            };

            self.begin_draw(self.choose_program(ProgramKind::OutsetShadow));
            self.set_uniform_texture(keys::SOURCE, 0, blurred_texture_id);
            self.set_uniform_rounded_rect(keys::OUTSET_SHADOW_OUTLINE_RECT, &transformed_outline);
            self.draw_offscreen_with_color(
                &Rect::new(
                    min_x,
                    min_y,
                    texture_width as f32 / scale_x,
                    texture_height as f32 / scale_y,
                ),
                &offscreen,
                color,
            );
            self.end_draw();
            return;
        }

        // Nine-slice the template so only the corners pay for the blur.
        let min_x = (outline.bounds.x - spread - half_blur_extra + dx).floor();
        let min_y = (outline.bounds.y - spread - half_blur_extra + dy).floor();
        let max_x = (outline.bounds.max_x() + half_blur_extra + dx + spread).ceil();
        let max_y = (outline.bounds.max_y() + half_blur_extra + dy + spread).ceil();

        let slices = self.driver.texture_nine_slice(
            blurred_texture_id,
            &scaled_outline,
            extra_blur_pixels_x,
            extra_blur_pixels_y,
        );

        let left_width = slices[NINE_SLICE_TOP_LEFT].rect.width / scale_x;
        let right_width = slices[NINE_SLICE_TOP_RIGHT].rect.width / scale_x;
        let center_width = (max_x - min_x) - (left_width + right_width);

        let top_height = slices[NINE_SLICE_TOP_LEFT].rect.height / scale_y;
        let bottom_height = slices[NINE_SLICE_BOTTOM_LEFT].rect.height / scale_y;
        let center_height = (max_y - min_y) - (top_height + bottom_height);

        self.begin_draw(self.choose_program(ProgramKind::OutsetShadow));
        self.set_uniform_texture(keys::SOURCE, 0, blurred_texture_id);
        self.set_uniform_rounded_rect(keys::OUTSET_SHADOW_OUTLINE_RECT, &transformed_outline);

        let mut offscreen = Offscreen::new(outline.bounds);
        offscreen.texture_id = blurred_texture_id;
        offscreen.was_offscreen = true;

        let mut draw_slice = |job: &mut Self, slice: usize, rect: Rect| {
            if !slices[slice].is_visible() || rect.width <= 0.0 || rect.height <= 0.0 {
                return;
            }
            offscreen.area = slices[slice].area;
            job.draw_offscreen_with_color(&rect, &offscreen, color);
        };

        draw_slice(self, NINE_SLICE_TOP_LEFT, Rect::new(min_x, min_y, left_width, top_height));
        draw_slice(
            self,
            NINE_SLICE_TOP_CENTER,
            Rect::new(min_x + left_width, min_y, center_width, top_height),
        );
        draw_slice(
            self,
            NINE_SLICE_TOP_RIGHT,
            Rect::new(max_x - right_width, min_y, right_width, top_height),
        );
        draw_slice(
            self,
            NINE_SLICE_BOTTOM_RIGHT,
            Rect::new(max_x - right_width, max_y - bottom_height, right_width, bottom_height),
        );
        draw_slice(
            self,
            NINE_SLICE_BOTTOM_LEFT,
            Rect::new(min_x, max_y - bottom_height, left_width, bottom_height),
        );
        draw_slice(
            self,
            NINE_SLICE_LEFT_CENTER,
            Rect::new(min_x, min_y + top_height, left_width, center_height),
        );
        draw_slice(
            self,
            NINE_SLICE_RIGHT_CENTER,
            Rect::new(max_x - right_width, min_y + top_height, right_width, center_height),
        );
        draw_slice(
            self,
            NINE_SLICE_BOTTOM_CENTER,
            Rect::new(min_x + left_width, max_y - bottom_height, center_width, bottom_height),
        );

        // The center is only needed when the outline does not cover it.
        let center =
            Rect::new(min_x + left_width, min_y + top_height, center_width, center_height);
        if !outline.contains_rect(&center) {
            draw_slice(self, NINE_SLICE_CENTER, center);
        }

        self.end_draw();
    }

    pub(super) fn visit_shadow_node(&mut self, node: &NodeRef) {
        let NodeKind::Shadow { shadows, child } = node.kind() else { unreachable!() };
        let (shadows, original_child) = (shadows.clone(), child.clone());

        // Shadows recolor every pixel but keep alpha; an alpha-preserving
        // color matrix below can be peeled off.
        let shadow_child = match original_child.kind() {
            NodeKind::ColorMatrix { matrix, offset, child }
                if !color_matrix_modifies_alpha(matrix, offset) =>
            {
                child.clone()
            }
            _ => original_child.clone(),
        };

        for shadow in &shadows {
            if shadow.color.is_clear() || shadow_child.is_invisible() {
                continue;
            }

            if shadow.radius == 0.0 && matches!(shadow_child.kind(), NodeKind::Text { .. }) {
                if shadow.dx != 0.0 || shadow.dy != 0.0 {
                    self.offset(shadow.dx, shadow.dy);
                    self.visit_text_node(&shadow_child, &shadow.color, true);
                    self.offset(-shadow.dx, -shadow.dy);
                }
                continue;
            }

            let mut offscreen = Offscreen::new(shadow_child.bounds());
            let bounds;

            if shadow.radius > 0.0 {
                offscreen.do_not_cache = true;
                let (min_x, max_x, min_y, max_y) =
                    self.blur_node(&mut offscreen, &shadow_child, shadow.radius);
                if offscreen.texture_id == 0 {
                    continue;
                }
                bounds = Rect::new(
                    min_x - self.offset_x,
                    min_y - self.offset_y,
                    max_x - min_x,
                    max_y - min_y,
                );
                offscreen.was_offscreen = true;
            } else if shadow.dx == 0.0 && shadow.dy == 0.0 {
                // Hidden exactly behind the child.
                continue;
            } else {
                offscreen.reset_clip = true;
                offscreen.do_not_cache = true;
                if !self.visit_node_with_offscreen(&shadow_child, &mut offscreen) {
                    continue;
                }
                bounds = shadow_child.bounds();
            }

            self.offset(shadow.dx, shadow.dy);
            self.begin_draw(self.choose_program(ProgramKind::Coloring));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            self.draw_offscreen_with_color(&bounds, &offscreen, color_to_half(&shadow.color));
            self.end_draw();
            self.offset(-shadow.dx, -shadow.dy);
        }

        self.visit_node(&original_child);
    }
}
