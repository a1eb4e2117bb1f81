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

//! Globe surface mesh and material.

use std::path::Path;

use eframe::egui;
use glam::Vec3;
use image::imageops::FilterType;
use log::{info, warn};
use opensky_client::geo;

use super::{RenderError, GLOBE_RADIUS};

/// Longitude segments of the surface grid.
const LON_SEGMENTS: u32 = 64;
/// Latitude segments of the surface grid.
const LAT_SEGMENTS: u32 = 32;
/// Largest texture side uploaded to the GPU.
const MAX_TEXTURE_WIDTH: u32 = 4096;

pub const FLAT_COLOR: egui::Color32 = egui::Color32::from_rgb(0x2a, 0x2a, 0x2a);

/// How the globe surface is filled.
#[derive(Clone)]
pub enum GlobeMaterial {
    Textured(egui::TextureHandle),
    Flat(egui::Color32),
}

impl std::fmt::Debug for GlobeMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Textured(handle) => f.debug_tuple("Textured").field(&handle.id()).finish(),
            Self::Flat(color) => f.debug_tuple("Flat").field(color).finish(),
        }
    }
}

impl GlobeMaterial {
    /// Load the Earth texture, falling back to a flat material on any failure.
    pub fn load(ctx: &egui::Context, path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No globe texture configured, using flat material");
            return Self::Flat(FLAT_COLOR);
        };

        match load_texture_image(path) {
            Ok(image) => {
                info!("Loaded globe texture {} ({}x{})", path.display(), image.size[0], image.size[1]);
                Self::Textured(ctx.load_texture("globe-earth", image, egui::TextureOptions::LINEAR))
            }
            Err(e) => {
                warn!("{e}; using flat material");
                Self::Flat(FLAT_COLOR)
            }
        }
    }

    #[must_use]
    pub fn texture_id(&self) -> egui::TextureId {
        match self {
            Self::Textured(handle) => handle.id(),
            Self::Flat(_) => egui::TextureId::default(),
        }
    }

    #[must_use]
    pub fn is_textured(&self) -> bool {
        matches!(self, Self::Textured(_))
    }
}

/// Decode an equirectangular image into an egui texture, downscaled if needed.
pub fn load_texture_image(path: &Path) -> Result<egui::ColorImage, RenderError> {
    let to_error = |source| RenderError::Texture {
        path: path.to_path_buf(),
        source,
    };

    let mut image = image::open(path).map_err(to_error)?;
    if image.width() > MAX_TEXTURE_WIDTH {
        image = image.resize(MAX_TEXTURE_WIDTH, MAX_TEXTURE_WIDTH / 2, FilterType::Triangle);
    }

    let rgba = image.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

/// Latitude/longitude grid on the unit sphere.
#[derive(Debug, Clone)]
pub struct GlobeMesh {
    pub vertices: Vec<Vec3>,
    /// Equirectangular texture coordinates, `v = 0` at the north pole.
    pub uvs: Vec<egui::Pos2>,
    pub indices: Vec<u32>,
}

impl GlobeMesh {
    #[must_use]
    pub fn new() -> Self {
        Self::with_segments(LON_SEGMENTS, LAT_SEGMENTS)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "texture coordinates are f32")]
    pub fn with_segments(lon_segments: u32, lat_segments: u32) -> Self {
        let columns = lon_segments + 1;
        let rows = lat_segments + 1;
        let mut vertices = Vec::with_capacity((columns * rows) as usize);
        let mut uvs = Vec::with_capacity(vertices.capacity());

        for row in 0..rows {
            let v = f64::from(row) / f64::from(lat_segments);
            let lat = 90.0 - v * 180.0;
            for column in 0..columns {
                let u = f64::from(column) / f64::from(lon_segments);
                let lon = u * 360.0 - 180.0;
                vertices.push(geo::project(lat, lon, f64::from(GLOBE_RADIUS)).as_vec3());
                uvs.push(egui::pos2(u as f32, v as f32));
            }
        }

        let mut indices = Vec::with_capacity((lon_segments * lat_segments * 6) as usize);
        for row in 0..lat_segments {
            for column in 0..lon_segments {
                let a = row * columns + column;
                let b = a + columns;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self { vertices, uvs, indices }
    }
}

impl Default for GlobeMesh {
    fn default() -> Self {
        Self::new()
    }
}
