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

//! Geospatial helpers.
//!
//! Maps geographic coordinates onto a sphere for the globe renderer and
//! provides great-circle distance and bearing between two points.

use glam::DVec3;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Project a latitude/longitude pair onto a sphere of the given radius.
///
/// Latitude is measured from the north pole and longitude is offset by 180°,
/// so `(90, _)` lands on `+Y` and `(0, 0)` lands on `+X`.
/// Inputs outside `[-90, 90]` / `[-180, 180]` are not meaningful.
#[must_use]
pub fn project(lat: f64, lon: f64, radius: f64) -> DVec3 {
    let phi = (90.0 - lat).to_radians();
    let theta = (lon + 180.0).to_radians();

    DVec3::new(
        -radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// Great-circle distance between two points in kilometers (haversine).
#[must_use]
pub fn great_circle_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing from point 1 to point 2 in degrees, normalized to `[0, 360)`.
#[must_use]
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lon = (lon2 - lon1).to_radians();
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Europe, the coverage region of the default live query.
    #[must_use]
    pub const fn europe() -> Self {
        Self::new(35.0, 70.0, -15.0, 45.0)
    }

    /// Western Europe around the UK, where synthetic aircraft are placed.
    #[must_use]
    pub const fn fallback_region() -> Self {
        Self::new(45.0, 55.0, -15.0, 5.0)
    }

    /// The same box with each pair of bounds in ascending order.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self::new(
            self.min_lat.min(self.max_lat),
            self.min_lat.max(self.max_lat),
            self.min_lon.min(self.max_lon),
            self.min_lon.max(self.max_lon),
        )
    }

    /// Every bound is finite and each minimum is at most its maximum.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }

    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Query parameters understood by the OpenSky states endpoint.
    #[must_use]
    pub fn query_params(&self) -> [(&'static str, String); 4] {
        [
            ("lamin", self.min_lat.to_string()),
            ("lamax", self.max_lat.to_string()),
            ("lomin", self.min_lon.to_string()),
            ("lomax", self.max_lon.to_string()),
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::europe()
    }
}
