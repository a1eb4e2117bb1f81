// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Screen projection, drawing and picking for the globe view.
//!
//! World geometry is projected through the camera onto an egui painter.
//! Anything on the far hemisphere is culled, and pointer hits resolve to the
//! nearest visible aircraft within a pixel radius.

use eframe::egui;
use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};
use opensky_client::EventBus;

use super::camera::GlobeCamera;
use super::globe::{GlobeMaterial, GlobeMesh};
use super::layer::{AircraftLayer, DrawStrategy, PLACEHOLDER_CAUSES, PLACEHOLDER_HINT, PLACEHOLDER_TITLE};

/// Minimum pick radius around an aircraft, in points.
const PICK_RADIUS: f32 = 8.0;
/// Pixels of scroll per zoom step.
const SCROLL_PER_STEP: f32 = 50.0;

const LIGHT_DIRECTION: Vec3 = Vec3::new(10.0, 10.0, 5.0);
const AMBIENT: f32 = 0.4;
const DIFFUSE: f32 = 1.2;

const BACKGROUND: egui::Color32 = egui::Color32::from_rgb(5, 8, 18);
const AIRCRAFT_COLOR: egui::Color32 = egui::Color32::from_rgb(0x10, 0xb9, 0x81);
const SELECTED_COLOR: egui::Color32 = egui::Color32::from_rgb(0xff, 0x6b, 0x6b);
const TRAIL_COLOR: egui::Color32 = egui::Color32::from_rgba_premultiplied(80, 200, 160, 140);

/// Pointer outcome of one scene frame.
#[derive(Debug)]
pub struct SceneResponse {
    pub response: egui::Response,
    /// Index into the layer's ordered entity array under the pointer.
    pub hit: Option<usize>,
    pub clicked: bool,
}

/// Project a world point to screen space. `None` when behind the camera.
#[must_use]
pub fn project_point(view_projection: &Mat4, rect: egui::Rect, point: Vec3) -> Option<egui::Pos2> {
    let clip = *view_projection * point.extend(1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.xyz() / clip.w;
    Some(egui::pos2(
        rect.left() + (ndc.x + 1.0) * 0.5 * rect.width(),
        rect.top() + (1.0 - ndc.y) * 0.5 * rect.height(),
    ))
}

/// Whether a point on (or just above) the sphere faces the eye.
#[must_use]
pub fn faces_eye(eye: Vec3, point: Vec3) -> bool {
    point.dot(eye - point) > 0.0
}

/// Nearest projected point within `radius` of `pointer`.
#[must_use]
pub fn pick(screen: &[Option<egui::Pos2>], pointer: egui::Pos2, radius: f32) -> Option<usize> {
    screen
        .iter()
        .enumerate()
        .filter_map(|(i, pos)| pos.map(|p| (i, p.distance_sq(pointer))))
        .filter(|(_, d)| *d <= radius * radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn shade(color: egui::Color32, normal: Vec3) -> egui::Color32 {
    let intensity = (AMBIENT + DIFFUSE * normal.dot(LIGHT_DIRECTION.normalize()).max(0.0)).min(1.0);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "channel values stay within 0..=255"
    )]
    let scale = |c: u8| (f32::from(c) * intensity) as u8;
    egui::Color32::from_rgb(scale(color.r()), scale(color.g()), scale(color.b()))
}

#[derive(Debug)]
pub struct GlobeScene {
    mesh: GlobeMesh,
    material: GlobeMaterial,
    /// Per-entity screen positions of the last frame, `None` when culled.
    screen: Vec<Option<egui::Pos2>>,
    radii: Vec<f32>,
}

impl GlobeScene {
    #[must_use]
    pub fn new(material: GlobeMaterial) -> Self {
        Self {
            mesh: GlobeMesh::new(),
            material,
            screen: Vec::new(),
            radii: Vec::new(),
        }
    }

    /// Draw the globe and aircraft, feed pointer input to the camera, and
    /// report which aircraft is under the pointer.
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        camera: &mut GlobeCamera,
        layer: &AircraftLayer,
        bus: &EventBus,
    ) -> SceneResponse {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        handle_camera_input(ui, &response, rect, camera, bus);

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, BACKGROUND);

        let view_projection = camera.view_projection(rect.aspect_ratio());
        let eye = camera.eye();
        self.draw_globe(&painter, rect, &view_projection, eye);

        if layer.strategy() == DrawStrategy::Placeholder {
            self.screen.clear();
            self.radii.clear();
            draw_placeholder(&painter, rect, &view_projection);
        } else {
            painter.extend(self.aircraft_shapes(rect, &view_projection, eye, layer));
        }

        let hit = response
            .hover_pos()
            .and_then(|pointer| self.pick_with_radii(pointer));
        let clicked = response.clicked();

        SceneResponse {
            response,
            hit,
            clicked,
        }
    }

    fn draw_globe(&self, painter: &egui::Painter, rect: egui::Rect, view_projection: &Mat4, eye: Vec3) {
        let base = match &self.material {
            GlobeMaterial::Textured(_) => egui::Color32::WHITE,
            GlobeMaterial::Flat(color) => *color,
        };
        let textured = self.material.is_textured();

        let mut mesh = egui::Mesh::with_texture(self.material.texture_id());
        let mut remap = vec![None::<u32>; self.mesh.vertices.len()];

        for triangle in self.mesh.indices.chunks_exact(3) {
            let corners = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            let centroid = corners.iter().map(|&i| self.mesh.vertices[i]).sum::<Vec3>() / 3.0;
            if !faces_eye(eye, centroid) {
                continue;
            }

            let mut out = [0_u32; 3];
            let mut visible = true;
            for (slot, &i) in out.iter_mut().zip(&corners) {
                if let Some(index) = remap[i] {
                    *slot = index;
                    continue;
                }
                let vertex = self.mesh.vertices[i];
                let Some(pos) = project_point(view_projection, rect, vertex) else {
                    visible = false;
                    break;
                };
                let index = u32::try_from(mesh.vertices.len()).unwrap_or(u32::MAX);
                mesh.vertices.push(egui::epaint::Vertex {
                    pos,
                    uv: if textured { self.mesh.uvs[i] } else { egui::epaint::WHITE_UV },
                    color: shade(base, vertex.normalize_or_zero()),
                });
                remap[i] = Some(index);
                *slot = index;
            }
            if visible {
                mesh.indices.extend_from_slice(&out);
            }
        }

        painter.add(egui::Shape::mesh(mesh));
    }

    /// Project every instance and build this frame's aircraft shapes.
    ///
    /// `Individual` emits per-aircraft shapes with trails and a selection glow.
    /// `Batched` emits a single mesh holding one marker quad per visible
    /// instance; picking still resolves through the per-index screen cache.
    fn aircraft_shapes(
        &mut self,
        rect: egui::Rect,
        view_projection: &Mat4,
        eye: Vec3,
        layer: &AircraftLayer,
    ) -> Vec<egui::Shape> {
        let individual = layer.strategy() == DrawStrategy::Individual;
        let focal = rect.height() * 0.5 / 30_f32.to_radians().tan();

        self.screen.clear();
        self.radii.clear();

        let mut shapes = Vec::new();
        let mut batch = egui::Mesh::default();
        if !individual {
            batch.reserve_vertices(layer.len() * 4);
            batch.reserve_triangles(layer.len() * 2);
        }

        for (i, instance) in layer.instances().iter().enumerate() {
            let position = instance.w_axis.xyz();
            let projected = if faces_eye(eye, position) {
                project_point(view_projection, rect, position)
            } else {
                None
            };
            let scale = instance.x_axis.xyz().length();
            let radius = (scale * focal / eye.distance(position).max(0.01)).max(1.5);
            self.screen.push(projected);
            self.radii.push(radius);

            let Some(pos) = projected else { continue };
            let selected = layer.selected_index() == Some(i);
            let color = if selected { SELECTED_COLOR } else { AIRCRAFT_COLOR };

            if individual {
                if let Some(tail) = layer.trail(i).and_then(|(_, end)| project_point(view_projection, rect, end)) {
                    shapes.push(egui::Shape::line_segment([pos, tail], egui::Stroke::new(1.5, TRAIL_COLOR)));
                }
                if selected {
                    shapes.push(egui::Shape::circle_filled(pos, radius * 2.2, color.gamma_multiply(0.25)));
                }
                shapes.push(egui::Shape::Circle(egui::epaint::CircleShape {
                    center: pos,
                    radius,
                    fill: color,
                    stroke: egui::Stroke::new(1.0, egui::Color32::WHITE),
                }));
            } else {
                push_marker(&mut batch, pos, radius, color.gamma_multiply(0.9));
            }
        }

        if !batch.is_empty() {
            shapes.push(egui::Shape::mesh(batch));
        }
        shapes
    }

    fn pick_with_radii(&self, pointer: egui::Pos2) -> Option<usize> {
        let max_radius = self.radii.iter().copied().fold(PICK_RADIUS, f32::max);
        pick(&self.screen, pointer, max_radius).filter(|&i| {
            let radius = self.radii.get(i).copied().unwrap_or(0.0).max(PICK_RADIUS);
            self.screen[i].is_some_and(|p| p.distance(pointer) <= radius)
        })
    }
}

/// Append a diamond marker of `radius` around `center` to a batch mesh.
fn push_marker(mesh: &mut egui::Mesh, center: egui::Pos2, radius: f32, color: egui::Color32) {
    let base = u32::try_from(mesh.vertices.len()).unwrap_or(u32::MAX);
    for offset in [
        egui::vec2(0.0, -radius),
        egui::vec2(radius, 0.0),
        egui::vec2(0.0, radius),
        egui::vec2(-radius, 0.0),
    ] {
        mesh.colored_vertex(center + offset, color);
    }
    mesh.add_triangle(base, base + 1, base + 2);
    mesh.add_triangle(base, base + 2, base + 3);
}

fn handle_camera_input(
    ui: &egui::Ui,
    response: &egui::Response,
    rect: egui::Rect,
    camera: &mut GlobeCamera,
    bus: &EventBus,
) {
    if response.drag_started() {
        camera.begin_interaction(bus);
    }
    if response.dragged() {
        let delta = response.drag_delta();
        camera.drag(Vec2::new(delta.x, delta.y), rect.height(), bus);
    }
    if response.drag_stopped() {
        camera.end_interaction(bus);
    }

    if response.hovered() {
        let (scroll, pinch) = ui.input(|i| (i.smooth_scroll_delta.y, i.zoom_delta()));
        camera.zoom(scroll / SCROLL_PER_STEP, bus);
        camera.pinch(pinch, bus);
    }
}

fn draw_placeholder(painter: &egui::Painter, rect: egui::Rect, view_projection: &Mat4) {
    let anchor = project_point(view_projection, rect, Vec3::new(0.0, 1.5, 0.0))
        .filter(|p| rect.contains(*p))
        .unwrap_or_else(|| rect.center());

    let mut text = format!("{PLACEHOLDER_TITLE}\n\nThis could be due to:\n");
    for cause in PLACEHOLDER_CAUSES {
        text.push_str("• ");
        text.push_str(cause);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(PLACEHOLDER_HINT);

    let galley = painter.layout(
        text,
        egui::FontId::proportional(13.0),
        egui::Color32::WHITE,
        280.0,
    );
    let padding = egui::vec2(14.0, 10.0);
    let bubble = egui::Rect::from_center_size(anchor, galley.size() + padding * 2.0);
    painter.rect_filled(bubble, 8.0, egui::Color32::from_black_alpha(200));
    painter.galley(bubble.min + padding, galley, egui::Color32::WHITE);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::super::globe::FLAT_COLOR;
    use super::super::layer::tests::aircraft;
    use super::super::LayerConfig;
    use super::*;

    /// `n` aircraft in a north-south line facing the default camera.
    #[allow(clippy::cast_precision_loss, reason = "test counts are small")]
    fn visible_layer(n: usize) -> AircraftLayer {
        let map: HashMap<_, _> = (0..n)
            .map(|i| {
                let a = aircraft(&format!("id{i:03}"), -30.0 + i as f64 * 3.0, -90.0, Some(250.0));
                (a.id.clone(), a)
            })
            .collect();
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&Arc::new(map));
        layer.update_frame(0.0, None);
        layer
    }

    fn shapes_for(scene: &mut GlobeScene, layer: &AircraftLayer) -> Vec<egui::Shape> {
        let camera = GlobeCamera::new(false);
        let rect = viewport();
        let vp = camera.view_projection(rect.aspect_ratio());
        scene.aircraft_shapes(rect, &vp, camera.eye(), layer)
    }

    fn viewport() -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    #[test]
    fn test_origin_projects_to_center() {
        let camera = GlobeCamera::new(false);
        let rect = viewport();
        let vp = camera.view_projection(rect.aspect_ratio());

        let center = project_point(&vp, rect, Vec3::ZERO).unwrap();
        assert!((center.x - 400.0).abs() < 1e-3);
        assert!((center.y - 300.0).abs() < 1e-3);

        // Above the origin is up on screen
        let north = project_point(&vp, rect, Vec3::Y).unwrap();
        assert!(north.y < center.y);
    }

    #[test]
    fn test_point_behind_camera_is_rejected() {
        let camera = GlobeCamera::new(false);
        let rect = viewport();
        let vp = camera.view_projection(rect.aspect_ratio());
        assert!(project_point(&vp, rect, Vec3::new(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn test_far_hemisphere_is_culled() {
        let eye = Vec3::new(0.0, 0.0, 3.0);
        assert!(faces_eye(eye, Vec3::new(0.0, 0.0, 1.02)));
        assert!(!faces_eye(eye, Vec3::new(0.0, 0.0, -1.02)));
        assert!(faces_eye(eye, Vec3::new(0.9, 0.0, 0.45)));
        assert!(!faces_eye(eye, Vec3::new(1.02, 0.0, 0.0)));
    }

    #[test]
    fn test_pick_nearest_within_radius() {
        let screen = vec![
            Some(egui::pos2(100.0, 100.0)),
            None,
            Some(egui::pos2(104.0, 100.0)),
            Some(egui::pos2(300.0, 300.0)),
        ];
        assert_eq!(pick(&screen, egui::pos2(103.0, 100.0), 8.0), Some(2));
        assert_eq!(pick(&screen, egui::pos2(99.0, 101.0), 8.0), Some(0));
        assert_eq!(pick(&screen, egui::pos2(200.0, 200.0), 8.0), None);
        assert_eq!(pick(&[], egui::pos2(0.0, 0.0), 8.0), None);
    }

    #[test]
    fn test_batched_strategy_submits_one_mesh() {
        let layer = visible_layer(21);
        assert_eq!(layer.strategy(), DrawStrategy::Batched);

        let mut scene = GlobeScene::new(GlobeMaterial::Flat(FLAT_COLOR));
        let shapes = shapes_for(&mut scene, &layer);
        assert_eq!(shapes.len(), 1);
        let egui::Shape::Mesh(mesh) = &shapes[0] else {
            panic!("expected a mesh, got {:?}", shapes[0]);
        };
        assert_eq!(mesh.vertices.len(), 21 * 4);
        assert_eq!(mesh.indices.len(), 21 * 6);

        for i in 0..21 {
            let pos = scene.screen[i].unwrap_or_else(|| panic!("aircraft {i} culled"));
            assert_eq!(scene.pick_with_radii(pos), Some(i));
        }
    }

    #[test]
    fn test_individual_strategy_draws_each_aircraft() {
        let layer = visible_layer(5);
        assert_eq!(layer.strategy(), DrawStrategy::Individual);

        let mut scene = GlobeScene::new(GlobeMaterial::Flat(FLAT_COLOR));
        let shapes = shapes_for(&mut scene, &layer);
        let markers = shapes
            .iter()
            .filter(|s| matches!(s, egui::Shape::Circle(c) if c.fill == AIRCRAFT_COLOR))
            .count();
        assert_eq!(markers, 5);
        assert!(shapes.iter().all(|s| !matches!(s, egui::Shape::Mesh(_))));
        assert_eq!(scene.pick_with_radii(scene.screen[3].unwrap()), Some(3));
    }

    #[test]
    fn test_shade_respects_light() {
        let lit = shade(egui::Color32::from_rgb(100, 100, 100), LIGHT_DIRECTION.normalize());
        let dark = shade(egui::Color32::from_rgb(100, 100, 100), -LIGHT_DIRECTION.normalize());
        assert_eq!(lit.r(), 100);
        assert_eq!(dark.r(), 40);
    }
}
