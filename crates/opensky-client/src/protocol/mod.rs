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

//! Protocol layer for aircraft state feeds.
//!
//! Defines the aircraft record shared by every layer above it and a
//! trait-based parser abstraction. The OpenSky Network state-vector format is
//! the only implementation today.

mod opensky;

pub use opensky::{StateVectorParser, STATE_VECTOR_COLUMNS};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing a feed payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid row format: {0}")]
    InvalidFormat(String),

    #[error("invalid value for field '{field}' in row {row}: {value}")]
    InvalidValue {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// Source of an aircraft's position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionSource {
    #[default]
    AdsB,
    Asterix,
    Mlat,
    Flarm,
    Other(u8),
}

impl PositionSource {
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::AdsB,
            1 => Self::Asterix,
            2 => Self::Mlat,
            3 => Self::Flarm,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AdsB => "ADS-B",
            Self::Asterix => "ASTERIX",
            Self::Mlat => "MLAT",
            Self::Flarm => "FLARM",
            Self::Other(_) => "Other",
        }
    }
}

/// Latest known state of one tracked aircraft.
///
/// Records without a position are never constructed by the parser, so
/// `latitude` and `longitude` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftRecord {
    /// ICAO 24-bit transponder address (hex string), unique per collection.
    pub id: String,
    /// Callsign with padding removed.
    pub callsign: Option<String>,
    pub origin_country: String,
    /// Epoch seconds of the last position report.
    pub position_timestamp: Option<i64>,
    /// Epoch seconds of the last message of any kind.
    pub last_contact_timestamp: i64,
    pub longitude: f64,
    pub latitude: f64,
    /// Barometric altitude.
    pub barometric_altitude: Option<f64>,
    pub on_ground: bool,
    /// Ground speed.
    pub velocity: Option<f64>,
    /// True track in degrees clockwise from north.
    pub heading: Option<f64>,
    pub vertical_rate: Option<f64>,
    /// Receiver ids that contributed to this state.
    pub sensors: Option<Vec<i64>>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub special_position_indicator: bool,
    pub position_source: PositionSource,
}

impl AircraftRecord {
    /// Callsign if known, otherwise the transponder id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.id)
    }

    /// Case-insensitive match against callsign, id, and origin country.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.callsign
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(&query))
            || self.id.to_lowercase().contains(&query)
            || self.origin_country.to_lowercase().contains(&query)
    }
}

/// One accepted feed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Server time of the snapshot in epoch seconds.
    pub time: i64,
    /// Rows that carried a position.
    pub aircraft: Vec<AircraftRecord>,
    /// Rows dropped for lacking a position or an id.
    pub dropped: usize,
}

/// Trait for feed parsers.
///
/// Implement this trait to add support for other aircraft state formats.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse a complete response body.
    ///
    /// Returns `Ok(Some(message))` if the payload carried data,
    /// `Ok(None)` if it was well formed but empty,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, callsign: Option<&str>, country: &str) -> AircraftRecord {
        AircraftRecord {
            id: id.to_string(),
            callsign: callsign.map(str::to_string),
            origin_country: country.to_string(),
            position_timestamp: None,
            last_contact_timestamp: 0,
            longitude: 0.0,
            latitude: 0.0,
            barometric_altitude: None,
            on_ground: false,
            velocity: None,
            heading: None,
            vertical_rate: None,
            sensors: None,
            geo_altitude: None,
            squawk: None,
            special_position_indicator: false,
            position_source: PositionSource::AdsB,
        }
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let r = record("4ca7b5", Some("RYR12AB"), "Ireland");
        assert!(r.matches("ryr"));
        assert!(r.matches("4CA7"));
        assert!(r.matches("irel"));
        assert!(r.matches("   "));
        assert!(!r.matches("lufthansa"));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(record("abc123", None, "X").display_name(), "abc123");
        assert_eq!(record("abc123", Some("BAW1"), "X").display_name(), "BAW1");
    }

    #[test]
    fn test_position_source_codes() {
        assert_eq!(PositionSource::from_code(0), PositionSource::AdsB);
        assert_eq!(PositionSource::from_code(2), PositionSource::Mlat);
        assert_eq!(PositionSource::from_code(9), PositionSource::Other(9));
    }
}
