//! Offscreen orchestration: rendering a subtree into a render target and
//! the two-pass blur built on top of it.

use lucent_scene::{NodeKind, Rect, RenderNode, RoundedRect, Transform};

use super::{Offscreen, RenderJob, FP16_ZERO};
use crate::command::ClearMask;
use crate::driver::{TextureArea, TextureKey};
use crate::shader::{keys, ProgramKind};

impl RenderJob<'_> {
    /// Renders `node` into a texture sized to `offscreen.bounds` under the
    /// current transform, reusing a cached texture when the memo key hits.
    /// Returns false when the node is invisible or the render target could
    /// not be created; parent draws continue in that case.
    pub(super) fn visit_node_with_offscreen(
        &mut self,
        node: &std::sync::Arc<RenderNode>,
        offscreen: &mut Offscreen,
    ) -> bool {
        debug_assert_eq!(offscreen.texture_id, 0);

        if node.is_invisible() {
            offscreen.area = TextureArea::FULL;
            offscreen.was_offscreen = false;
            return false;
        }

        // A texture node needs no indirection unless explicitly forced.
        if let NodeKind::Texture { texture } = node.kind() {
            if !offscreen.force_offscreen {
                self.upload_texture(texture, offscreen);
                return offscreen.texture_id != 0;
            }
        }

        let filter = if offscreen.linear_filter { glow::LINEAR } else { glow::NEAREST };
        let saved_offset = (self.offset_x, self.offset_y);

        let flipped_x = self.scale_x < 0.0;
        let flipped_y = self.scale_y < 0.0;
        if flipped_x || flipped_y {
            self.push_modelview(Transform::scale(
                if flipped_x { -1.0 } else { 1.0 },
                if flipped_y { -1.0 } else { 1.0 },
            ));
        }

        let key = TextureKey::for_child(
            node.id(),
            self.scale_x,
            self.scale_y,
            filter,
            &offscreen.bounds,
        );

        let mut viewport = self.transform_bounds(&offscreen.bounds);

        // Align to the pixel grid; the padding returns as uv insets.
        let aligned_x = viewport.x.floor();
        let padding_left = viewport.x - aligned_x;
        let aligned_width = (viewport.width + padding_left).ceil();
        let padding_right = aligned_width - viewport.width - padding_left;

        let aligned_y = viewport.y.floor();
        let padding_top = viewport.y - aligned_y;
        let aligned_height = (viewport.height + padding_top).ceil();
        let padding_bottom = aligned_height - viewport.height - padding_top;

        // Downscale rather than clip when the texture would exceed the
        // hardware limit.
        let max_texture_size = self.driver.queue_mut().max_texture_size() as f32;
        let mut downscale_x = 1.0f32;
        let mut downscale_y = 1.0f32;
        if aligned_width > max_texture_size {
            downscale_x = max_texture_size / viewport.width;
        }
        if aligned_height > max_texture_size {
            downscale_y = max_texture_size / viewport.height;
        }
        let downscaled = downscale_x != 1.0 || downscale_y != 1.0;
        if downscaled {
            self.push_modelview(Transform::scale(downscale_x, downscale_y));
            viewport = self.transform_bounds(&offscreen.bounds);
        }

        let texture_width;
        let texture_height;
        if downscale_x == 1.0 {
            viewport.x = aligned_x;
            viewport.width = aligned_width;
            offscreen.area.x = padding_left / aligned_width;
            offscreen.area.x2 = 1.0 - padding_right / aligned_width;
            texture_width = aligned_width as i32;
        } else {
            offscreen.area.x = 0.0;
            offscreen.area.x2 = 1.0;
            texture_width = max_texture_size as i32;
        }
        if downscale_y == 1.0 {
            viewport.y = aligned_y;
            viewport.height = aligned_height;
            offscreen.area.y = padding_bottom / aligned_height;
            offscreen.area.y2 = 1.0 - padding_top / aligned_height;
            texture_height = aligned_height as i32;
        } else {
            offscreen.area.y = 0.0;
            offscreen.area.y2 = 1.0;
            texture_height = max_texture_size as i32;
        }

        let cached_id = self.driver.lookup_texture(&key);
        if cached_id != 0 {
            if downscaled {
                self.pop_modelview();
            }
            if flipped_x || flipped_y {
                self.pop_modelview();
            }
            offscreen.texture_id = cached_id;
            // Not re-rendered, but the id still points at offscreen content.
            offscreen.was_offscreen = true;
            return true;
        }

        let Some(render_target) = self.driver.create_render_target(
            texture_width.max(1),
            texture_height.max(1),
            self.target_format,
            filter,
            filter,
        ) else {
            if downscaled {
                self.pop_modelview();
            }
            if flipped_x || flipped_y {
                self.pop_modelview();
            }
            log::warn!("offscreen render target {texture_width}x{texture_height} failed");
            return false;
        };

        let prev_viewport = self.set_viewport(viewport);
        let prev_projection = self.set_projection_from_rect(&viewport);
        let prev_alpha = self.set_alpha(1.0);

        let prev_fbo = self.driver.queue_mut().bind_framebuffer(render_target.framebuffer_id);
        let clear_viewport = self.viewport;
        self.driver.queue_mut().clear(ClearMask::empty(), &clear_viewport);

        if offscreen.reset_clip {
            self.push_clip(RoundedRect::from_rect(self.viewport));
        }

        self.visit_node(node);

        if offscreen.reset_clip {
            self.pop_clip();
        }
        if downscaled {
            self.pop_modelview();
        }
        if flipped_x || flipped_y {
            self.pop_modelview();
        }

        self.set_viewport(prev_viewport);
        self.set_projection(prev_projection);
        self.set_alpha(prev_alpha);
        self.driver.queue_mut().bind_framebuffer(prev_fbo);

        self.offset_x = saved_offset.0;
        self.offset_y = saved_offset.1;

        offscreen.was_offscreen = true;
        offscreen.texture_id = self.driver.release_render_target(render_target, false);

        if !offscreen.do_not_cache {
            self.driver.cache_texture(key, offscreen.texture_id);
        }

        true
    }

    /// Two-pass separable blur of `offscreen` into a fresh texture of
    /// `width`×`height` device pixels. Returns the blurred texture id or 0.
    pub(super) fn blur_offscreen(
        &mut self,
        offscreen: &Offscreen,
        width: i32,
        height: i32,
        blur_radius_x: f32,
        blur_radius_y: f32,
    ) -> u32 {
        debug_assert!(offscreen.texture_id != 0);

        let Some(pass1) = self.driver.create_render_target(
            width.max(1),
            height.max(1),
            self.target_format,
            glow::NEAREST,
            glow::NEAREST,
        ) else {
            return 0;
        };
        if width <= 0 || height <= 0 {
            return self.driver.release_render_target(pass1, false);
        }
        let Some(pass2) = self.driver.create_render_target(
            width,
            height,
            self.target_format,
            glow::NEAREST,
            glow::NEAREST,
        ) else {
            return self.driver.release_render_target(pass1, false);
        };

        let pass_rect = Rect::from_size(width as f32, height as f32);
        let prev_viewport = self.set_viewport(pass_rect);
        let prev_projection = self.set_projection_from_rect(&pass_rect);
        self.set_modelview(Transform::identity());
        self.push_clip(RoundedRect::from_rect(pass_rect));

        // Horizontal pass into pass1.
        let prev_fbo = self.driver.queue_mut().bind_framebuffer(pass1.framebuffer_id);
        self.driver.queue_mut().clear(ClearMask::empty(), &pass_rect);

        self.begin_draw(self.choose_program(ProgramKind::Blur));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
        self.set_uniform_1f(keys::BLUR_RADIUS, blur_radius_x);
        self.set_uniform_2f(keys::BLUR_SIZE, width as f32, height as f32);
        self.set_uniform_2f(keys::BLUR_DIR, 1.0, 0.0);
        self.draw_coords(0.0, 0.0, width as f32, height as f32, 0.0, 1.0, 1.0, 0.0, FP16_ZERO);
        self.end_draw();

        // Vertical pass into pass2, sampling pass1.
        self.driver.queue_mut().bind_framebuffer(pass2.framebuffer_id);
        self.driver.queue_mut().clear(ClearMask::empty(), &pass_rect);

        self.begin_draw(self.choose_program(ProgramKind::Blur));
        self.set_uniform_texture(keys::SOURCE, 0, pass1.texture_id);
        self.set_uniform_1f(keys::BLUR_RADIUS, blur_radius_y);
        self.set_uniform_2f(keys::BLUR_SIZE, width as f32, height as f32);
        self.set_uniform_2f(keys::BLUR_DIR, 0.0, 1.0);
        self.draw_coords(0.0, 0.0, width as f32, height as f32, 0.0, 1.0, 1.0, 0.0, FP16_ZERO);
        self.end_draw();

        self.pop_modelview();
        self.pop_clip();
        self.set_viewport(prev_viewport);
        self.set_projection(prev_projection);
        self.driver.queue_mut().bind_framebuffer(prev_fbo);

        self.driver.release_render_target(pass1, true);
        self.driver.release_render_target(pass2, false)
    }

    /// Blurs `node` with `blur_radius`, reusing `offscreen.texture_id` when
    /// the caller already found a cached blur. Returns the draw extents of
    /// the enlarged (blurred) rect in framebuffer-offset coordinates.
    pub(super) fn blur_node(
        &mut self,
        offscreen: &mut Offscreen,
        node: &std::sync::Arc<RenderNode>,
        blur_radius: f32,
    ) -> (f32, f32, f32, f32) {
        // 2.0 matches the blur shader's radius multiplier.
        let blur_extra = blur_radius * 2.0;
        let half_blur_extra = blur_extra / 2.0;
        let scale_x = self.scale_x;
        let scale_y = self.scale_y;
        let bounds = node.bounds();

        let texture_width = (bounds.width + blur_extra).ceil();
        let texture_height = (bounds.height + blur_extra).ceil();

        if offscreen.texture_id == 0 {
            offscreen.bounds = Rect::new(
                bounds.x - half_blur_extra,
                bounds.y - half_blur_extra,
                texture_width,
                texture_height,
            );
            offscreen.reset_clip = true;
            offscreen.force_offscreen = true;

            if self.visit_node_with_offscreen(node, offscreen) {
                offscreen.texture_id = self.blur_offscreen(
                    offscreen,
                    (texture_width * scale_x.abs()) as i32,
                    (texture_height * scale_y.abs()) as i32,
                    blur_radius * scale_x.abs(),
                    blur_radius * scale_y.abs(),
                );
                offscreen.area = TextureArea::FULL;
            }
        }

        (
            self.offset_x + bounds.x - half_blur_extra,
            self.offset_x + bounds.max_x() + half_blur_extra,
            self.offset_y + bounds.y - half_blur_extra,
            self.offset_y + bounds.max_y() + half_blur_extra,
        )
    }
}
