//! Color, gradient and border visitors.

use lucent_scene::{ColorStop, NodeKind, NodeRef, Rect};

use super::{color_to_half, Offscreen, RenderJob};
use crate::command::{BatchPayload, DrawVertex};
use crate::driver::TextureArea;
use crate::library::DEFAULT_ATLAS_WIDTH;
use crate::shader::{keys, ProgramKind};

/// Gradient stops are uploaded as packed floats, offset first.
fn stops_as_floats(stops: &[ColorStop]) -> Vec<f32> {
    let mut out = Vec::with_capacity(stops.len() * 5);
    for stop in stops {
        out.extend_from_slice(&[
            stop.offset,
            stop.color.r,
            stop.color.g,
            stop.color.b,
            stop.color.a,
        ]);
    }
    out
}

impl RenderJob<'_> {
    pub(super) fn visit_color_node(&mut self, node: &NodeRef) {
        let NodeKind::Color { color } = node.kind() else { unreachable!() };
        if color.is_clear() {
            return;
        }
        let color = color_to_half(color);
        let bounds = node.bounds();

        // Small rects ride the coloring program against the guaranteed
        // white texel of the atlases, so they merge with surrounding glyph
        // and icon draws. Past ~300px coordinate precision suffers.
        let coloring = self.choose_program(ProgramKind::Coloring);
        let continues_coloring = {
            let queue = self.driver.queue_mut();
            queue.n_batches() > 0 && {
                let batch = queue.batch(queue.n_batches() - 1);
                matches!(batch.payload, BatchPayload::Draw(_)) && batch.program == coloring.id
            }
        };

        if bounds.width < 300.0 && bounds.height < 300.0 && continues_coloring {
            let offscreen = Offscreen {
                area: TextureArea {
                    x: 1.0 / DEFAULT_ATLAS_WIDTH as f32,
                    y: 1.0 / DEFAULT_ATLAS_WIDTH as f32,
                    x2: 2.0 / DEFAULT_ATLAS_WIDTH as f32,
                    y2: 2.0 / DEFAULT_ATLAS_WIDTH as f32,
                },
                ..Offscreen::new(bounds)
            };
            self.begin_draw(coloring);
            self.draw_offscreen_with_color(&bounds, &offscreen, color);
            self.end_draw();
        } else {
            self.begin_draw(self.choose_program(ProgramKind::Color));
            self.draw_rect_with_color(&bounds, color);
            self.end_draw();
        }
    }

    pub(super) fn visit_linear_gradient_node(&mut self, node: &NodeRef) {
        let NodeKind::LinearGradient { start, end, stops, repeating } = node.kind() else {
            unreachable!()
        };
        let (start, end, repeating) = (*start, *end, *repeating);
        let stops_data: Vec<f32> = stops_as_floats(stops);
        let n_stops = stops.len() as i32;
        let bounds = node.bounds();

        let x1 = self.offset_x + start.x;
        let y1 = self.offset_y + start.y;
        let x2 = self.offset_x + end.x;
        let y2 = self.offset_y + end.y;

        self.begin_draw(self.choose_program(ProgramKind::LinearGradient));
        self.set_uniform_1i(keys::GRADIENT_NUM_COLOR_STOPS, n_stops);
        self.set_uniform_1fv(keys::GRADIENT_COLOR_STOPS, &stops_data);
        self.set_uniform_4f(keys::LINEAR_GRADIENT_POINTS, [x1, y1, x2 - x1, y2 - y1]);
        self.set_uniform_1i(keys::LINEAR_GRADIENT_REPEAT, repeating as i32);
        self.draw_rect(&bounds);
        self.end_draw();
    }

    pub(super) fn visit_radial_gradient_node(&mut self, node: &NodeRef) {
        let NodeKind::RadialGradient { center, hradius, vradius, start, end, stops, repeating } =
            node.kind()
        else {
            unreachable!()
        };
        let (center, hradius, vradius) = (*center, *hradius, *vradius);
        let (start, end, repeating) = (*start, *end, *repeating);
        let stops_data: Vec<f32> = stops_as_floats(stops);
        let n_stops = stops.len() as i32;
        let bounds = node.bounds();

        let scale = 1.0 / (end - start);
        let bias = -start * scale;

        self.begin_draw(self.choose_program(ProgramKind::RadialGradient));
        self.set_uniform_1i(keys::GRADIENT_NUM_COLOR_STOPS, n_stops);
        self.set_uniform_1fv(keys::GRADIENT_COLOR_STOPS, &stops_data);
        self.set_uniform_1i(keys::RADIAL_GRADIENT_REPEAT, repeating as i32);
        self.set_uniform_2f(keys::RADIAL_GRADIENT_RANGE, scale, bias);
        self.set_uniform_4f(
            keys::RADIAL_GRADIENT_GEOMETRY,
            [
                self.offset_x + center.x,
                self.offset_y + center.y,
                1.0 / (hradius * self.scale_x),
                1.0 / (vradius * self.scale_y),
            ],
        );
        self.draw_rect(&bounds);
        self.end_draw();
    }

    pub(super) fn visit_conic_gradient_node(&mut self, node: &NodeRef) {
        let NodeKind::ConicGradient { center, angle, stops } = node.kind() else { unreachable!() };
        let (center, angle) = (*center, *angle);
        let stops_data: Vec<f32> = stops_as_floats(stops);
        let n_stops = stops.len() as i32;
        let bounds = node.bounds();

        let scale = 0.5 * std::f32::consts::FRAC_1_PI;
        let bias = angle * scale + 2.0;

        self.begin_draw(self.choose_program(ProgramKind::ConicGradient));
        self.set_uniform_1i(keys::GRADIENT_NUM_COLOR_STOPS, n_stops);
        self.set_uniform_1fv(keys::GRADIENT_COLOR_STOPS, &stops_data);
        self.set_uniform_4f(
            keys::CONIC_GRADIENT_GEOMETRY,
            [self.offset_x + center.x, self.offset_y + center.y, scale, bias],
        );
        self.draw_rect(&bounds);
        self.end_draw();
    }

    /// Rectilinear border with one color: four plain rects.
    pub(super) fn visit_rect_border_node(&mut self, node: &NodeRef) {
        let NodeKind::Border { widths, colors, .. } = node.kind() else { unreachable!() };
        let (widths, colors) = (*widths, *colors);
        let bounds = node.bounds();
        let (x, y) = (bounds.x, bounds.y);
        let (w, h) = (bounds.width, bounds.height);

        self.begin_draw(self.choose_program(ProgramKind::Color));

        if widths[0] > 0.0 {
            let color = color_to_half(&colors[0]);
            self.draw_rect_with_color(&Rect::new(x, y, w - widths[1], widths[0]), color);
        }
        if widths[1] > 0.0 {
            let color = color_to_half(&colors[1]);
            self.draw_rect_with_color(
                &Rect::new(x + w - widths[1], y, widths[1], h - widths[2]),
                color,
            );
        }
        if widths[2] > 0.0 {
            let color = color_to_half(&colors[2]);
            self.draw_rect_with_color(
                &Rect::new(x + widths[3], y + h - widths[2], w - widths[3], widths[2]),
                color,
            );
        }
        if widths[3] > 0.0 {
            let color = color_to_half(&colors[3]);
            self.draw_rect_with_color(&Rect::new(x, y + widths[0], widths[3], h - widths[0]), color);
        }

        self.end_draw();
    }

    /// General border: one trapezoid per side under the border shader.
    pub(super) fn visit_border_node(&mut self, node: &NodeRef) {
        let NodeKind::Border { outline, widths, colors, .. } = node.kind() else { unreachable!() };
        let (outline, widths, colors) = (*outline, *widths, *colors);
        let bounds = node.bounds();

        // Per-corner extents each side's trapezoid must cover.
        let mut sizes = [(0.0f32, 0.0f32); 4];
        if widths[0] > 0.0 {
            sizes[0].1 = widths[0].max(outline.corners[0].height);
            sizes[1].1 = widths[0].max(outline.corners[1].height);
        }
        if widths[1] > 0.0 {
            sizes[1].0 = widths[1].max(outline.corners[1].width);
            sizes[2].0 = widths[1].max(outline.corners[2].width);
        }
        if widths[2] > 0.0 {
            sizes[2].1 = widths[2].max(outline.corners[2].height);
            sizes[3].1 = widths[2].max(outline.corners[3].height);
        }
        if widths[3] > 0.0 {
            sizes[0].0 = widths[3].max(outline.corners[0].width);
            sizes[3].0 = widths[3].max(outline.corners[3].width);
        }

        let min_x = self.offset_x + bounds.x;
        let min_y = self.offset_y + bounds.y;
        let max_x = min_x + bounds.width;
        let max_y = min_y + bounds.height;

        let transformed_outline = self.transform_rounded_rect(&outline);

        self.begin_draw(self.choose_program(ProgramKind::Border));
        self.set_uniform_4fv(keys::BORDER_WIDTHS, &widths);
        self.set_uniform_rounded_rect(keys::BORDER_OUTLINE_RECT, &transformed_outline);

        let mut emit = |job: &mut Self, positions: [[f32; 2]; 6], uvs: [[f32; 2]; 6], color| {
            let vertices = job.driver.queue_mut().add_vertices();
            for i in 0..6 {
                vertices[i] = DrawVertex::new(positions[i], uvs[i], color);
            }
        };

        if widths[0] > 0.0 {
            let color = color_to_half(&colors[0]);
            emit(
                self,
                [
                    [min_x, min_y],
                    [min_x + sizes[0].0, min_y + sizes[0].1],
                    [max_x, min_y],
                    [max_x - sizes[1].0, min_y + sizes[1].1],
                    [min_x + sizes[0].0, min_y + sizes[0].1],
                    [max_x, min_y],
                ],
                [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]],
                color,
            );
        }
        if widths[1] > 0.0 {
            let color = color_to_half(&colors[1]);
            emit(
                self,
                [
                    [max_x - sizes[1].0, min_y + sizes[1].1],
                    [max_x - sizes[2].0, max_y - sizes[2].1],
                    [max_x, min_y],
                    [max_x, max_y],
                    [max_x - sizes[2].0, max_y - sizes[2].1],
                    [max_x, min_y],
                ],
                [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]],
                color,
            );
        }
        if widths[2] > 0.0 {
            let color = color_to_half(&colors[2]);
            emit(
                self,
                [
                    [min_x + sizes[3].0, max_y - sizes[3].1],
                    [min_x, max_y],
                    [max_x - sizes[2].0, max_y - sizes[2].1],
                    [max_x, max_y],
                    [min_x, max_y],
                    [max_x - sizes[2].0, max_y - sizes[2].1],
                ],
                [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]],
                color,
            );
        }
        if widths[3] > 0.0 {
            let color = color_to_half(&colors[3]);
            emit(
                self,
                [
                    [min_x, min_y],
                    [min_x, max_y],
                    [min_x + sizes[0].0, min_y + sizes[0].1],
                    [min_x + sizes[3].0, max_y - sizes[3].1],
                    [min_x, max_y],
                    [min_x + sizes[0].0, min_y + sizes[0].1],
                ],
                [[0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]],
                color,
            );
        }

        self.end_draw();
    }

    /// The CSS background pattern: a rounded color clip plus a same-outline
    /// uniform border collapse into one filled_border draw.
    pub(super) fn visit_css_background(&mut self, clip_node: &NodeRef, border_node: &NodeRef) {
        let NodeKind::RoundedClip { child, .. } = clip_node.kind() else { unreachable!() };
        let NodeKind::Border { outline, widths, colors, .. } = border_node.kind() else {
            unreachable!()
        };
        let NodeKind::Color { color: fill_color } = child.kind() else { unreachable!() };

        if border_node.is_invisible() {
            return;
        }

        let ring = color_to_half(&colors[0]);
        let fill = color_to_half(fill_color);
        let widths = *widths;
        let bounds = border_node.bounds();
        let transformed_outline = self.transform_rounded_rect(outline);

        let min_x = self.offset_x + bounds.x;
        let min_y = self.offset_y + bounds.y;
        let max_x = min_x + bounds.width;
        let max_y = min_y + bounds.height;

        self.begin_draw(self.choose_program(ProgramKind::FilledBorder));
        self.set_uniform_4fv(keys::BORDER_WIDTHS, &widths);
        self.set_uniform_rounded_rect(keys::BORDER_OUTLINE_RECT, &transformed_outline);

        let vertices = self.driver.queue_mut().add_vertices();
        let positions = [
            [min_x, min_y],
            [min_x, max_y],
            [max_x, min_y],
            [max_x, max_y],
            [min_x, max_y],
            [max_x, min_y],
        ];
        for i in 0..6 {
            vertices[i] =
                DrawVertex { position: positions[i], uv: [0.0, 0.0], color: ring, color2: fill };
        }

        self.end_draw();
    }
}
