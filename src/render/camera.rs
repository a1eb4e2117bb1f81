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

//! Orbit camera around the globe.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Mat4, Vec2, Vec3};
use opensky_client::{EventBus, UiEvent};

pub const MIN_DISTANCE: f32 = 1.2;
pub const MAX_DISTANCE: f32 = 8.0;
const DEFAULT_DISTANCE: f32 = 3.0;
const FOV_Y_DEGREES: f32 = 60.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;

const DAMPING: f32 = 0.12;
const ROTATE_SPEED: f32 = 0.4;
const ZOOM_SPEED: f32 = 0.6;
/// Full turns per minute while idle.
const AUTO_ROTATE_SPEED: f32 = 0.12;
/// Seconds without interaction before auto-rotation resumes.
const IDLE_RESUME_SECS: f32 = 5.0;
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

#[derive(Debug, Clone)]
pub struct GlobeCamera {
    yaw: f32,
    pitch: f32,
    distance: f32,
    target_distance: f32,
    /// Rotation still to be applied by damping.
    pending: Vec2,
    auto_rotate_enabled: bool,
    auto_rotating: bool,
    interacting: bool,
    idle_secs: f32,
}

impl GlobeCamera {
    #[must_use]
    pub fn new(auto_rotate: bool) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: DEFAULT_DISTANCE,
            target_distance: DEFAULT_DISTANCE,
            pending: Vec2::ZERO,
            auto_rotate_enabled: auto_rotate,
            auto_rotating: auto_rotate,
            interacting: false,
            idle_secs: 0.0,
        }
    }

    pub fn begin_interaction(&mut self, bus: &EventBus) {
        if self.interacting {
            return;
        }
        self.interacting = true;
        self.idle_secs = 0.0;
        bus.publish(UiEvent::InteractionStart);
        if self.auto_rotating {
            self.auto_rotating = false;
            bus.publish(UiEvent::AutoRotate(false));
        }
    }

    /// Orbit by a pointer drag of `delta` pixels in a viewport `height` pixels tall.
    pub fn drag(&mut self, delta: Vec2, height: f32, bus: &EventBus) {
        if height <= 0.0 {
            return;
        }
        self.pending += Vec2::new(-delta.x, delta.y) * (TAU / height) * ROTATE_SPEED;
        bus.publish(UiEvent::InteractionChange);
    }

    /// Zoom by scroll steps; positive steps move closer.
    pub fn zoom(&mut self, steps: f32, bus: &EventBus) {
        if steps != 0.0 {
            self.scale_distance(0.95_f32.powf(ZOOM_SPEED * steps), bus);
        }
    }

    /// Zoom by a pinch factor; factors above 1 move closer.
    pub fn pinch(&mut self, factor: f32, bus: &EventBus) {
        if factor > 0.0 && (factor - 1.0).abs() > f32::EPSILON {
            self.scale_distance(factor.recip(), bus);
        }
    }

    fn scale_distance(&mut self, scale: f32, bus: &EventBus) {
        let was_interacting = self.interacting;
        self.begin_interaction(bus);
        self.target_distance = (self.target_distance * scale).clamp(MIN_DISTANCE, MAX_DISTANCE);
        bus.publish(UiEvent::InteractionChange);
        if !was_interacting {
            self.end_interaction(bus);
        }
    }

    pub fn end_interaction(&mut self, bus: &EventBus) {
        if !self.interacting {
            return;
        }
        self.interacting = false;
        self.idle_secs = 0.0;
        bus.publish(UiEvent::InteractionEnd);
    }

    /// Advance damping, zoom easing and auto-rotation by `dt` seconds.
    pub fn update(&mut self, dt: f32, bus: &EventBus) {
        let step = self.pending * DAMPING;
        self.yaw = (self.yaw + step.x).rem_euclid(TAU);
        self.pitch = (self.pitch + step.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.pending -= step;
        if self.pending.length_squared() < 1e-10 {
            self.pending = Vec2::ZERO;
        }

        self.distance += (self.target_distance - self.distance) * DAMPING;

        if !self.auto_rotate_enabled || self.interacting {
            return;
        }
        if self.auto_rotating {
            self.yaw = (self.yaw + TAU / 60.0 * AUTO_ROTATE_SPEED * dt).rem_euclid(TAU);
        } else {
            self.idle_secs += dt;
            if self.idle_secs >= IDLE_RESUME_SECS {
                self.auto_rotating = true;
                bus.publish(UiEvent::AutoRotate(true));
            }
        }
    }

    /// React to bus events addressed to the camera.
    pub fn handle_event(&mut self, event: &UiEvent) {
        if matches!(event, UiEvent::ResetView) {
            self.reset();
        }
    }

    /// Return to the initial view.
    pub fn reset(&mut self) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.distance = DEFAULT_DISTANCE;
        self.target_distance = DEFAULT_DISTANCE;
        self.pending = Vec2::ZERO;
    }

    #[must_use]
    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw) * self.distance
    }

    #[must_use]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    #[must_use]
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let projection = Mat4::perspective_rh_gl(FOV_Y_DEGREES.to_radians(), aspect.max(0.01), NEAR, FAR);
        projection * self.view()
    }

    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    #[cfg(test)]
    pub fn target_distance(&self) -> f32 {
        self.target_distance
    }

    #[must_use]
    pub fn is_auto_rotating(&self) -> bool {
        self.auto_rotating
    }

    /// Whether the camera is still moving and needs repaints.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.auto_rotating
            || self.pending != Vec2::ZERO
            || (self.target_distance - self.distance).abs() > 1e-4
    }
}
