//! Node dispatch, clip/transform visitors and the texture-ish visitors.

use std::sync::Arc;

use lucent_scene::{
    ImageTexture, NodeKind, NodeRef, Rect, RenderNode, RoundedRect, Transform, TransformCategory,
};

use super::{color_to_half, Offscreen, RenderJob, FP16_ZERO, MAX_GRADIENT_STOPS};
use crate::driver::{TextureArea, TextureKey};
use crate::shader::{keys, ProgramKind};

/// Whether a node can be drawn directly under any transform; nodes that
/// already render through a texture tolerate every matrix.
fn node_supports_transform(node: &RenderNode) -> bool {
    match node.kind() {
        NodeKind::Color { .. }
        | NodeKind::Opacity { .. }
        | NodeKind::ColorMatrix { .. }
        | NodeKind::Texture { .. }
        | NodeKind::CrossFade { .. }
        | NodeKind::Debug { .. }
        | NodeKind::Text { .. }
        | NodeKind::Canvas { .. }
        | NodeKind::Blend { .. }
        | NodeKind::Blur { .. } => true,
        NodeKind::Shadow { child, .. } => node_supports_transform(child),
        NodeKind::Transform { child, .. } => node_supports_transform(child),
        _ => false,
    }
}

/// Like [`node_supports_transform`] but for plain (non-perspective) 2D
/// matrices, where a few more kinds work directly.
fn node_supports_2d_transform(node: &RenderNode) -> bool {
    match node.kind() {
        NodeKind::Color { .. }
        | NodeKind::Opacity { .. }
        | NodeKind::ColorMatrix { .. }
        | NodeKind::Texture { .. }
        | NodeKind::CrossFade { .. }
        | NodeKind::LinearGradient { .. }
        | NodeKind::RadialGradient { .. }
        | NodeKind::ConicGradient { .. }
        | NodeKind::Debug { .. }
        | NodeKind::Text { .. }
        | NodeKind::Canvas { .. }
        | NodeKind::Blend { .. }
        | NodeKind::Blur { .. } => true,
        NodeKind::Shadow { child, .. } => node_supports_2d_transform(child),
        NodeKind::Transform { child, .. } => node_supports_2d_transform(child),
        NodeKind::Container { children } => children.iter().all(|c| node_supports_2d_transform(c)),
        _ => false,
    }
}

/// Opacity can be folded into the draws of a leaf or single-child subtree;
/// overlapping siblings need the offscreen path to avoid double blending.
pub(super) fn use_offscreen_for_opacity(node: &RenderNode) -> bool {
    match node.kind() {
        NodeKind::Container { children } => {
            children.len() > 1 || children.iter().any(|c| use_offscreen_for_opacity(c))
        }
        NodeKind::Color { .. }
        | NodeKind::LinearGradient { .. }
        | NodeKind::RadialGradient { .. }
        | NodeKind::ConicGradient { .. }
        | NodeKind::Texture { .. }
        | NodeKind::Text { .. }
        | NodeKind::Canvas { .. } => false,
        NodeKind::Transform { child, .. }
        | NodeKind::Clip { child, .. }
        | NodeKind::RoundedClip { child, .. }
        | NodeKind::Debug { child, .. } => use_offscreen_for_opacity(child),
        _ => true,
    }
}

/// True when transforming `bounds` still yields an axis-aligned rect.
pub(super) fn result_is_axis_aligned(transform: &Transform, bounds: &Rect) -> bool {
    let points = [
        transform.transform_point(glam::Vec2::new(bounds.x, bounds.y)),
        transform.transform_point(glam::Vec2::new(bounds.max_x(), bounds.y)),
        transform.transform_point(glam::Vec2::new(bounds.x, bounds.max_y())),
        transform.transform_point(glam::Vec2::new(bounds.max_x(), bounds.max_y())),
    ];
    let min = points.iter().fold(points[0], |m, p| m.min(*p));
    let max = points.iter().fold(points[0], |m, p| m.max(*p));
    points.iter().all(|p| {
        ((p.x - min.x).abs() < f32::EPSILON || (p.x - max.x).abs() < f32::EPSILON)
            && ((p.y - min.y).abs() < f32::EPSILON || (p.y - max.y).abs() < f32::EPSILON)
    })
}

/// Intersects a plain rect with a rounded rect when the result is still a
/// single rounded rect (each touched corner wholly inside the rect).
pub(super) fn intersect_rounded_rectilinear(
    non_rounded: &Rect,
    rounded: &RoundedRect,
) -> Option<RoundedRect> {
    let mut corners = [false; 4];
    for i in 0..4 {
        if !rounded.has_corner(i) {
            continue;
        }
        let corner = rounded.corner_rect(i);
        if !non_rounded.intersects(&corner) {
            continue;
        }
        if !non_rounded.contains_rect(&corner) {
            return None;
        }
        corners[i] = true;
    }

    let mut result = RoundedRect::from_rect(non_rounded.intersection(&rounded.bounds));
    for i in 0..4 {
        if corners[i] {
            result.corners[i] = rounded.corners[i];
        }
    }
    Some(result)
}

fn equal_texture_nodes(a: &RenderNode, b: &RenderNode) -> bool {
    match (a.kind(), b.kind()) {
        (NodeKind::Texture { texture: ta }, NodeKind::Texture { texture: tb }) => {
            Arc::ptr_eq(ta, tb) && a.bounds() == b.bounds()
        }
        _ => false,
    }
}

impl RenderJob<'_> {
    /// Visits one node: clip admission, kind dispatch, clip restore.
    pub(crate) fn visit_node(&mut self, node: &NodeRef) {
        if node.is_invisible() {
            return;
        }

        let (visible, pushed_clip) = self.update_clip(&node.bounds());
        if !visible {
            return;
        }

        match node.kind() {
            NodeKind::Blend { .. } => self.visit_blend_node(node),
            NodeKind::Blur { radius, child } => {
                if *radius > 0.0 {
                    self.visit_blur_node(node);
                } else {
                    self.visit_node(child);
                }
            }
            NodeKind::Border { outline, uniform_color, .. } => {
                if *uniform_color && outline.is_rectilinear() {
                    self.visit_rect_border_node(node);
                } else {
                    self.visit_border_node(node);
                }
            }
            NodeKind::Clip { clip, child } => {
                let (clip, child) = (*clip, child.clone());
                self.visit_clipped_child(&child, &clip);
            }
            NodeKind::Color { .. } => self.visit_color_node(node),
            NodeKind::ColorMatrix { .. } => self.visit_color_matrix_node(node),
            NodeKind::ConicGradient { stops, .. } => {
                if stops.len() <= MAX_GRADIENT_STOPS {
                    self.visit_conic_gradient_node(node);
                } else {
                    self.visit_as_fallback(node);
                }
            }
            NodeKind::Container { children } => self.visit_container_node(children),
            NodeKind::CrossFade { start, end, progress } => {
                if *progress <= 0.0 {
                    self.visit_node(&start.clone());
                } else if *progress >= 1.0 || equal_texture_nodes(start, end) {
                    self.visit_node(&end.clone());
                } else {
                    self.visit_cross_fade_node(node);
                }
            }
            NodeKind::Debug { child, .. } => {
                // Draws get reordered anyway; the message is for tooling.
                self.visit_node(&child.clone());
            }
            NodeKind::CustomShader { .. } => self.visit_custom_shader_node(node),
            NodeKind::Fill { .. } | NodeKind::Stroke { .. } => self.visit_path_node(node),
            NodeKind::InsetShadow { blur_radius, .. } => {
                if *blur_radius > 0.0 {
                    self.visit_blurred_inset_shadow_node(node);
                } else {
                    self.visit_unblurred_inset_shadow_node(node);
                }
            }
            NodeKind::LinearGradient { stops, .. } => {
                if stops.len() <= MAX_GRADIENT_STOPS {
                    self.visit_linear_gradient_node(node);
                } else {
                    self.visit_as_fallback(node);
                }
            }
            NodeKind::Opacity { .. } => self.visit_opacity_node(node),
            NodeKind::OutsetShadow { blur_radius, .. } => {
                if *blur_radius > 0.0 {
                    self.visit_blurred_outset_shadow_node(node);
                } else {
                    self.visit_unblurred_outset_shadow_node(node);
                }
            }
            NodeKind::RadialGradient { stops, .. } => {
                if stops.len() <= MAX_GRADIENT_STOPS {
                    self.visit_radial_gradient_node(node);
                } else {
                    self.visit_as_fallback(node);
                }
            }
            NodeKind::Repeat { .. } => self.visit_repeat_node(node),
            NodeKind::RoundedClip { .. } => self.visit_rounded_clip_node(node),
            NodeKind::Shadow { .. } => self.visit_shadow_node(node),
            NodeKind::Text { color, .. } => {
                let color = *color;
                self.visit_text_node(node, &color, false);
            }
            NodeKind::Texture { .. } => self.visit_texture_node(node),
            NodeKind::Transform { .. } => self.visit_transform_node(node),
            NodeKind::Canvas { .. } => self.visit_as_fallback(node),
        }

        if pushed_clip {
            self.pop_clip();
        }
    }

    /// Container walk with the CSS-background peephole: a rounded color
    /// clip followed by a same-outline uniform border becomes one
    /// `filled_border` draw.
    fn visit_container_node(&mut self, children: &[NodeRef]) {
        let children: Vec<NodeRef> = children.to_vec();
        let mut i = 0;
        while i < children.len() {
            let child = &children[i];

            if i + 1 < children.len() && self.current_clip().is_fully_contained {
                if let NodeKind::RoundedClip { clip, child: grandchild } = child.kind() {
                    let sibling = &children[i + 1];
                    if let (NodeKind::Color { .. }, NodeKind::Border { outline, uniform_color, .. }) =
                        (grandchild.kind(), sibling.kind())
                    {
                        if *uniform_color && clip == outline {
                            self.visit_css_background(child, sibling);
                            i += 2;
                            continue;
                        }
                    }
                }
            }

            self.visit_node(child);
            i += 1;
        }
    }

    pub(super) fn visit_clipped_child(&mut self, child: &NodeRef, clip: &Rect) {
        let transformed_clip = self.transform_bounds(clip);
        let current = self.current_clip().clone();

        if current.is_rectilinear {
            let intersection =
                RoundedRect::from_rect(transformed_clip.intersection(&current.rect.bounds));
            self.push_clip(intersection);
            self.visit_node(child);
            self.pop_clip();
        } else if let Some(intersection) =
            intersect_rounded_rectilinear(&transformed_clip, &current.rect)
        {
            self.push_clip(intersection);
            self.visit_node(child);
            self.pop_clip();
        } else {
            // The clip cannot be expressed inline; render the child clipped
            // offscreen and blit.
            let mut offscreen = Offscreen::new(*clip);
            offscreen.force_offscreen = true;
            offscreen.reset_clip = true;
            offscreen.do_not_cache = true;

            if !self.visit_node_with_offscreen(child, &mut offscreen) {
                return;
            }

            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            let bounds = *clip;
            self.draw_offscreen_rect(&bounds);
            self.end_draw();
        }
    }

    pub(super) fn visit_rounded_clip_node(&mut self, node: &NodeRef) {
        let NodeKind::RoundedClip { clip, child } = node.kind() else { unreachable!() };
        let child = child.clone();
        if child.is_invisible() {
            return;
        }

        let mut transformed_clip = RoundedRect {
            bounds: self.transform_bounds(&clip.bounds),
            corners: clip.corners,
        };
        for corner in &mut transformed_clip.corners {
            corner.width *= self.scale_x.abs();
            corner.height *= self.scale_y.abs();
        }

        let current = self.current_clip().clone();

        if current.is_rectilinear {
            if let Some(intersection) =
                intersect_rounded_rectilinear(&current.rect.bounds, &transformed_clip)
            {
                self.push_clip(intersection);
                self.visit_node(&child);
                self.pop_clip();
                return;
            }
        }

        // Both clips are rounded from here on.
        let need_offscreen = if self.clip.len() <= 1 {
            false
        } else {
            !rounded_inner_contains_rect(&current.rect, &transformed_clip.bounds)
        };

        if !need_offscreen {
            // When the new clip swallows the current one entirely, the
            // intersection is just the current clip.
            if rounded_inner_contains_rect(&transformed_clip, &current.rect.bounds) {
                self.visit_node(&child);
                return;
            }

            self.push_clip(transformed_clip);
            self.visit_node(&child);
            self.pop_clip();
        } else {
            let mut offscreen = Offscreen::new(node.bounds());
            offscreen.force_offscreen = true;
            offscreen.reset_clip = false;

            self.push_clip(transformed_clip);
            let ok = self.visit_node_with_offscreen(&child, &mut offscreen);
            self.pop_clip();
            if !ok {
                return;
            }

            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            let bounds = node.bounds();
            self.draw_offscreen(&bounds, &offscreen);
            self.end_draw();
        }
    }

    pub(super) fn visit_transform_node(&mut self, node: &NodeRef) {
        let NodeKind::Transform { transform, child } = node.kind() else { unreachable!() };
        let (transform, child) = (*transform, child.clone());

        match transform.category() {
            TransformCategory::Identity => self.visit_node(&child),
            TransformCategory::Translate2d => {
                let (dx, dy) = transform.to_translate();
                self.offset(dx, dy);
                self.visit_node(&child);
                self.offset(-dx, -dy);
            }
            TransformCategory::Affine2d => {
                self.push_modelview(transform);
                self.visit_node(&child);
                self.pop_modelview();
            }
            category => {
                if category == TransformCategory::Dim2 && node_supports_2d_transform(&child) {
                    self.push_modelview(transform);
                    self.visit_node(&child);
                    self.pop_modelview();
                } else if node_supports_transform(&child) {
                    self.push_modelview(transform);
                    self.visit_node(&child);
                    self.pop_modelview();
                } else {
                    self.visit_transformed_offscreen(&child, transform, category);
                }
            }
        }
    }

    /// General transforms over incompatible children: rasterize the child
    /// and draw the texture under the transform.
    fn visit_transformed_offscreen(
        &mut self,
        child: &NodeRef,
        transform: Transform,
        category: TransformCategory,
    ) {
        let mut offscreen = Offscreen::new(child.bounds());
        offscreen.reset_clip = true;
        if !result_is_axis_aligned(&transform, &child.bounds()) {
            offscreen.linear_filter = true;
        }

        // For 2D transforms, peel the scale off so the offscreen rasterizes
        // at the effective resolution and only the rest transforms the quad.
        let mut applied = transform;
        let mut pushed_scale = false;
        if category == TransformCategory::Dim2 {
            let (xx, yx, xy, yy, dx, dy) = transform.to_2d();
            let sx = (xx * xx + yx * yx).sqrt();
            let sy = (xy * xy + yy * yy).sqrt();
            if sx != 1.0 || sy != 1.0 {
                let scale = Transform::scale(sx, sy).pre_translate(dx / sx, dy / sy);
                if let Some(inverse) = scale.invert() {
                    self.push_modelview(scale);
                    pushed_scale = true;
                    applied = inverse.then(&transform);
                }
            }
        }

        if self.visit_node_with_offscreen(child, &mut offscreen) {
            self.push_modelview(applied);
            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            let bounds = child.bounds();
            self.draw_offscreen(&bounds, &offscreen);
            self.end_draw();
            self.pop_modelview();
        }

        if pushed_scale {
            self.pop_modelview();
        }
    }

    pub(super) fn upload_texture(&mut self, texture: &Arc<ImageTexture>, offscreen: &mut Offscreen) {
        if self.icons.can_cache(texture) {
            let (texture_id, area) = self.icons.lookup_or_add(self.driver, texture);
            offscreen.texture_id = texture_id;
            offscreen.area = area;
        } else {
            offscreen.texture_id = self.driver.load_texture(texture, glow::LINEAR, glow::LINEAR);
            offscreen.area = TextureArea::FULL;
        }
    }

    pub(super) fn visit_texture_node(&mut self, node: &NodeRef) {
        let NodeKind::Texture { texture } = node.kind() else { unreachable!() };
        let texture = texture.clone();
        let bounds = node.bounds();
        let max_texture_size = self.driver.queue_mut().max_texture_size();

        if (texture.width as i32) <= max_texture_size && (texture.height as i32) <= max_texture_size
        {
            let mut offscreen = Offscreen::new(bounds);
            self.upload_texture(&texture, &mut offscreen);
            if offscreen.texture_id == 0 {
                return;
            }

            self.begin_draw(self.choose_program(ProgramKind::Blit));
            self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
            self.draw_offscreen(&bounds, &offscreen);
            self.end_draw();
        } else {
            // One conceptual draw split per tile.
            let slices = self.driver.slice_texture(&texture);
            if slices.is_empty() {
                return;
            }

            let min_x = self.offset_x + bounds.x;
            let min_y = self.offset_y + bounds.y;
            let scale_x = bounds.width / texture.width as f32;
            let scale_y = bounds.height / texture.height as f32;

            self.begin_draw(self.choose_program(ProgramKind::Blit));
            for (i, slice) in slices.iter().enumerate() {
                let (sx, sy, sw, sh) = slice.rect;
                let x1 = min_x + sx as f32 * scale_x;
                let y1 = min_y + sy as f32 * scale_y;
                let x2 = x1 + sw as f32 * scale_x;
                let y2 = y1 + sh as f32 * scale_y;

                if i > 0 {
                    self.split_draw();
                }
                self.set_uniform_texture(keys::SOURCE, 0, slice.texture_id);
                self.draw_coords(x1, y1, x2, y2, 0.0, 0.0, 1.0, 1.0, FP16_ZERO);
            }
            self.end_draw();
        }
    }

    pub(super) fn visit_repeat_node(&mut self, node: &NodeRef) {
        let NodeKind::Repeat { child, child_bounds } = node.kind() else { unreachable!() };
        let (child, child_bounds) = (child.clone(), *child_bounds);
        let bounds = node.bounds();

        if child.is_invisible() {
            return;
        }

        if child_bounds != child.bounds() {
            // Repeating a sub-rect of the child is not wired up natively.
            self.visit_as_fallback(node);
            return;
        }

        // Smaller than one tile: draw the visible part of the child.
        if child_bounds.contains_rect(&bounds) {
            self.visit_clipped_child(&child, &bounds);
            return;
        }

        let mut offscreen = Offscreen::new(child.bounds());
        offscreen.reset_clip = true;
        if !self.visit_node_with_offscreen(&child, &mut offscreen) {
            return;
        }

        self.begin_draw(self.choose_program(ProgramKind::Repeat));
        self.set_uniform_texture(keys::SOURCE, 0, offscreen.texture_id);
        self.set_uniform_4f(
            keys::REPEAT_CHILD_BOUNDS,
            [
                (bounds.x - child_bounds.x) / child_bounds.width,
                (bounds.y - child_bounds.y) / child_bounds.height,
                bounds.width / child_bounds.width,
                bounds.height / child_bounds.height,
            ],
        );
        self.set_uniform_4f(
            keys::REPEAT_TEXTURE_RECT,
            [
                offscreen.area.x,
                if offscreen.was_offscreen { offscreen.area.y2 } else { offscreen.area.y },
                offscreen.area.x2,
                if offscreen.was_offscreen { offscreen.area.y } else { offscreen.area.y2 },
            ],
        );
        self.draw_offscreen(&bounds, &offscreen);
        self.end_draw();
    }

    pub(super) fn visit_custom_shader_node(&mut self, node: &NodeRef) {
        let NodeKind::CustomShader { shader, args, children } = node.kind() else { unreachable!() };
        let (shader, args, children) = (shader.clone(), args.clone(), children.to_vec());
        let bounds = node.bounds();

        let Some(program) = self.driver.lookup_custom_shader(&shader) else {
            // Diagnosed once at compile time; draw the well-known pink.
            self.visit_custom_shader_fallback(node);
            return;
        };

        let mut offscreens = Vec::with_capacity(children.len());
        for child in &children {
            let mut offscreen = Offscreen::new(bounds);
            offscreen.force_offscreen = true;
            offscreen.reset_clip = true;
            if !self.visit_node_with_offscreen(child, &mut offscreen) {
                return;
            }
            offscreens.push(offscreen);
        }

        self.begin_draw(program);
        for (i, offscreen) in offscreens.iter().enumerate() {
            self.set_uniform_texture(
                keys::CUSTOM_TEXTURE1 + i,
                i as u32,
                offscreen.texture_id,
            );
        }
        self.set_uniform_2f(keys::CUSTOM_SIZE, bounds.width, bounds.height);

        for (i, def) in shader.uniforms.iter().enumerate() {
            use lucent_scene::ShaderArgKind;
            let key = keys::CUSTOM_ARG0 + i;
            let data = &args[def.offset..];
            match def.kind {
                ShaderArgKind::Float => {
                    self.set_uniform_1f(key, f32::from_ne_bytes(data[..4].try_into().unwrap()))
                }
                ShaderArgKind::Int => {
                    self.set_uniform_1i(key, i32::from_ne_bytes(data[..4].try_into().unwrap()))
                }
                ShaderArgKind::UInt | ShaderArgKind::Bool => {
                    let value = u32::from_ne_bytes(data[..4].try_into().unwrap());
                    let program = self.program_uniforms();
                    self.driver.queue_mut().uniforms.borrow_mut().set_1ui(program, key, 0, value);
                }
                ShaderArgKind::Vec2 => {
                    let v: &[f32] = bytemuck::cast_slice(&data[..8]);
                    self.set_uniform_2f(key, v[0], v[1]);
                }
                ShaderArgKind::Vec3 => {
                    let v: &[f32] = bytemuck::cast_slice(&data[..12]);
                    let program = self.program_uniforms();
                    self.driver
                        .queue_mut()
                        .uniforms
                        .borrow_mut()
                        .set_3f(program, key, 0, v[0], v[1], v[2]);
                }
                ShaderArgKind::Vec4 => {
                    let v: &[f32] = bytemuck::cast_slice(&data[..16]);
                    self.set_uniform_4f(key, [v[0], v[1], v[2], v[3]]);
                }
            }
        }

        self.draw_offscreen_rect(&bounds);
        self.end_draw();
    }

    pub(super) fn visit_custom_shader_fallback(&mut self, node: &NodeRef) {
        // 255 105 180: the canonical "this shader failed" pink.
        let pink = color_to_half(&lucent_scene::Color::new(1.0, 0.41, 0.71, 1.0));
        self.begin_draw(self.choose_program(ProgramKind::Color));
        let bounds = node.bounds();
        self.draw_rect_with_color(&bounds, pink);
        self.end_draw();
    }

    /// Renders a node in software through the fallback hook (or the canvas
    /// node's own painter), uploads the result and blits it. Cached by node
    /// identity and scale.
    pub(super) fn visit_as_fallback(&mut self, node: &NodeRef) {
        let scale_x = self.scale_x.abs();
        let scale_y = self.scale_y.abs();
        let bounds = node.bounds();
        let surface_width = (bounds.width * scale_x).ceil() as i32;
        let surface_height = (bounds.height * scale_y).ceil() as i32;

        if surface_width <= 0 || surface_height <= 0 {
            return;
        }

        let key = TextureKey::new(node.id(), scale_x, scale_y, glow::NEAREST);
        let mut texture_id = self.driver.lookup_texture(&key);

        if texture_id == 0 {
            let buffer = match node.kind() {
                NodeKind::Canvas { painter } => {
                    painter.paint(surface_width as u32, surface_height as u32, scale_x, scale_y)
                }
                _ => match self.fallback {
                    Some(fallback) => fallback.paint_node(
                        node,
                        surface_width as u32,
                        surface_height as u32,
                        scale_x,
                        scale_y,
                    ),
                    None => {
                        if !self.warned_no_fallback {
                            self.warned_no_fallback = true;
                            log::warn!("no fallback painter; node skipped");
                        }
                        None
                    }
                },
            };
            let Some(buffer) = buffer else { return };

            texture_id = self.driver.queue_mut().upload_memory_texture(
                surface_width,
                surface_height,
                false,
                buffer.stride,
                &buffer.pixels,
                glow::NEAREST,
                glow::NEAREST,
            );
            if texture_id == 0 {
                return;
            }
            self.driver.register_texture(texture_id, surface_width, surface_height, glow::RGBA8);
            self.driver.cache_texture(key, texture_id);
        }

        self.begin_draw(self.choose_program(ProgramKind::Blit));
        self.set_uniform_texture_with_filter(
            keys::SOURCE,
            0,
            texture_id,
            glow::NEAREST,
            glow::NEAREST,
        );
        self.draw_offscreen_rect(&bounds);
        self.end_draw();

        if self.debug_fallback {
            let red = color_to_half(&lucent_scene::Color::new(1.0, 0.0, 0.0, 0.25));
            self.begin_draw(self.choose_program(ProgramKind::Color));
            self.draw_rect_with_color(&bounds, red);
            self.end_draw();
        }
    }
}

/// Whether `rect` sits entirely inside the straight-edged inner region of
/// `rounded` (conservative: outside every corner's span).
pub(super) fn rounded_inner_contains_rect(rounded: &RoundedRect, rect: &Rect) -> bool {
    rounded.inner_rect().contains_rect(rect)
}
