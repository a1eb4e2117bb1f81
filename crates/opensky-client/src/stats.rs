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

//! Aggregate statistics over the current aircraft collection.

use std::collections::HashSet;

use crate::protocol::AircraftRecord;

/// Summary numbers shown in the statistics panel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlightStats {
    pub total: usize,
    pub in_flight: usize,
    pub on_ground: usize,
    /// Mean of positive barometric altitudes, 0 when none.
    pub avg_altitude: f64,
    /// Mean of positive velocities, 0 when none.
    pub avg_speed: f64,
    /// Distinct origin countries.
    pub countries: usize,
}

impl FlightStats {
    #[must_use]
    pub fn from_aircraft<'a>(aircraft: impl IntoIterator<Item = &'a AircraftRecord>) -> Self {
        let mut stats = Self::default();
        let mut countries = HashSet::new();
        let (mut alt_sum, mut alt_n) = (0.0, 0_u32);
        let (mut spd_sum, mut spd_n) = (0.0, 0_u32);

        for a in aircraft {
            stats.total += 1;
            if a.on_ground {
                stats.on_ground += 1;
            } else {
                stats.in_flight += 1;
            }
            if let Some(alt) = a.barometric_altitude.filter(|alt| *alt > 0.0) {
                alt_sum += alt;
                alt_n += 1;
            }
            if let Some(v) = a.velocity.filter(|v| *v > 0.0) {
                spd_sum += v;
                spd_n += 1;
            }
            countries.insert(a.origin_country.as_str());
        }

        if alt_n > 0 {
            stats.avg_altitude = alt_sum / f64::from(alt_n);
        }
        if spd_n > 0 {
            stats.avg_speed = spd_sum / f64::from(spd_n);
        }
        stats.countries = countries.len();
        stats
    }

    /// Share of aircraft in flight, 0–100.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "aircraft counts are small")]
    pub fn in_flight_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.in_flight as f64 * 100.0 / self.total as f64
        }
    }

    /// Share of aircraft on the ground, 0–100.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "aircraft counts are small")]
    pub fn on_ground_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.on_ground as f64 * 100.0 / self.total as f64
        }
    }
}
