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

//! Globe and aircraft rendering.
//!
//! The layer owns per-snapshot geometry and per-frame instance transforms,
//! the camera turns pointer input into an orbit view, and the scene projects
//! both onto an egui painter and resolves pointer hits back to aircraft.

pub mod camera;
pub mod globe;
pub mod layer;
pub mod scene;

use std::path::PathBuf;

use thiserror::Error;

pub use camera::GlobeCamera;
pub use globe::GlobeMaterial;
pub use layer::{AircraftLayer, DrawStrategy, LayerConfig};
pub use scene::GlobeScene;

/// Radius of the unit globe surface.
pub const GLOBE_RADIUS: f32 = 1.0;

/// Radius at which aircraft float above the surface.
pub const AIRCRAFT_RADIUS: f64 = 1.02;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Neither a wgpu nor a glow render state is available.
    #[error("no supported rendering backend (wgpu or glow) is available")]
    UnsupportedBackend,

    #[error("failed to load globe texture {}: {source}", path.display())]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Confirm a 3D-capable render state exists, reporting the failure otherwise.
pub fn check_backend(cc: &eframe::CreationContext<'_>, on_error: impl FnOnce(RenderError)) -> bool {
    require_backend(cc.wgpu_render_state.is_some(), cc.gl.is_some(), on_error)
}

fn require_backend(has_wgpu: bool, has_gl: bool, on_error: impl FnOnce(RenderError)) -> bool {
    if has_wgpu || has_gl {
        true
    } else {
        on_error(RenderError::UnsupportedBackend);
        false
    }
}
