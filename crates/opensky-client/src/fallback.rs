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

//! Synthetic aircraft used when the live feed is unavailable.

use chrono::Utc;
use rand::Rng;

use crate::geo::BoundingBox;
use crate::protocol::{AircraftRecord, PositionSource};

/// Number of synthetic aircraft produced per substitution.
pub const FALLBACK_AIRCRAFT_COUNT: usize = 8;

const CALLSIGNS: [&str; FALLBACK_AIRCRAFT_COUNT] =
    ["BA123", "LH456", "AF789", "KL012", "IB345", "AZ678", "TP901", "SN234"];

const COUNTRIES: [&str; FALLBACK_AIRCRAFT_COUNT] = [
    "United Kingdom",
    "Germany",
    "France",
    "Netherlands",
    "Spain",
    "Italy",
    "Portugal",
    "Belgium",
];

/// Generate a fixed-size set of airborne aircraft inside `region`.
///
/// Ids, callsigns, countries and field presence are the same on every call;
/// positions and telemetry are randomized within realistic bounds. Inverted
/// bounds are swapped; a box with non-finite bounds falls back to
/// [`BoundingBox::fallback_region`].
#[must_use]
pub fn generate(region: &BoundingBox) -> Vec<AircraftRecord> {
    let region = match region.normalized() {
        r if r.is_valid() => r,
        _ => BoundingBox::fallback_region(),
    };
    let mut rng = rand::thread_rng();
    let now = Utc::now().timestamp();

    (0..FALLBACK_AIRCRAFT_COUNT)
        .map(|i| {
            let altitude = rng.gen_range(30_000.0..50_000.0);
            AircraftRecord {
                id: format!("a1b2c{i:02}"),
                callsign: Some(CALLSIGNS[i % CALLSIGNS.len()].to_string()),
                origin_country: COUNTRIES[i % COUNTRIES.len()].to_string(),
                position_timestamp: Some(now),
                last_contact_timestamp: now,
                longitude: rng.gen_range(region.min_lon..=region.max_lon),
                latitude: rng.gen_range(region.min_lat..=region.max_lat),
                barometric_altitude: Some(altitude),
                on_ground: false,
                velocity: Some(rng.gen_range(400.0..600.0)),
                heading: Some(rng.gen_range(0.0..360.0)),
                vertical_rate: Some(rng.gen_range(-1000.0..1000.0)),
                sensors: None,
                geo_altitude: Some(altitude + rng.gen_range(-500.0..500.0)),
                squawk: Some(format!("{:04}", rng.gen_range(0..7777))),
                special_position_indicator: false,
                position_source: PositionSource::AdsB,
            }
        })
        .collect()
}
