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

//! OpenSky Network state-vector parser.
//!
//! The `/states/all` endpoint answers with `{"time": .., "states": [[..], ..]}`
//! where each state is a positional array:
//!
//! ```text
//! 0 icao24  1 callsign  2 origin_country  3 time_position  4 last_contact
//! 5 longitude  6 latitude  7 baro_altitude  8 on_ground  9 velocity
//! 10 true_track  11 vertical_rate  12 sensors  13 geo_altitude  14 squawk
//! 15 spi  16 position_source  [17 category]
//! ```

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use super::{AircraftRecord, ParseError, PositionSource, Protocol, StateSnapshot};

/// Minimum number of columns in a state vector row.
pub const STATE_VECTOR_COLUMNS: usize = 17;

// Column positions
const ICAO24: usize = 0;
const CALLSIGN: usize = 1;
const ORIGIN_COUNTRY: usize = 2;
const TIME_POSITION: usize = 3;
const LAST_CONTACT: usize = 4;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;
const SENSORS: usize = 12;
const GEO_ALTITUDE: usize = 13;
const SQUAWK: usize = 14;
const SPI: usize = 15;
const POSITION_SOURCE: usize = 16;

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    time: i64,
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

/// Parser for OpenSky `/states/all` response bodies.
///
/// A row without longitude or latitude is dropped. A row of the wrong shape
/// fails the whole payload.
#[derive(Debug, Default)]
pub struct StateVectorParser;

impl StateVectorParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parse_row(row_idx: usize, row: &[Value]) -> Result<Option<AircraftRecord>, ParseError> {
        if row.len() < STATE_VECTOR_COLUMNS {
            return Err(ParseError::InvalidFormat(format!(
                "row {row_idx} has {} columns, expected at least {STATE_VECTOR_COLUMNS}",
                row.len()
            )));
        }

        let field = Field { row: row_idx, values: row };

        // Shape checks run before the position filter so a bad row is never silently dropped
        let id = field.string(ICAO24, "icao24")?;
        let callsign = field.opt_string(CALLSIGN, "callsign")?;
        let origin_country = field.opt_string(ORIGIN_COUNTRY, "origin_country")?.unwrap_or_default();
        let position_timestamp = field.opt_i64(TIME_POSITION, "time_position")?;
        let last_contact_timestamp = field.opt_i64(LAST_CONTACT, "last_contact")?.unwrap_or_default();
        let longitude = field.opt_f64(LONGITUDE, "longitude")?;
        let latitude = field.opt_f64(LATITUDE, "latitude")?;
        let barometric_altitude = field.opt_f64(BARO_ALTITUDE, "baro_altitude")?;
        let on_ground = field.flag(ON_GROUND, "on_ground")?;
        let velocity = field.opt_f64(VELOCITY, "velocity")?;
        let heading = field.opt_f64(TRUE_TRACK, "true_track")?;
        let vertical_rate = field.opt_f64(VERTICAL_RATE, "vertical_rate")?;
        let sensors = field.sensors(SENSORS)?;
        let geo_altitude = field.opt_f64(GEO_ALTITUDE, "geo_altitude")?;
        let squawk = field.opt_string(SQUAWK, "squawk")?;
        let special_position_indicator = field.flag(SPI, "spi")?;
        let position_source = field.position_source(POSITION_SOURCE)?;

        let (Some(longitude), Some(latitude)) = (longitude, latitude) else {
            return Ok(None);
        };
        if id.is_empty() {
            return Ok(None);
        }

        Ok(Some(AircraftRecord {
            id,
            callsign,
            origin_country,
            position_timestamp,
            last_contact_timestamp,
            longitude,
            latitude,
            barometric_altitude,
            on_ground,
            velocity,
            heading,
            vertical_rate,
            sensors,
            geo_altitude,
            squawk,
            special_position_indicator,
            position_source,
        }))
    }

    /// Parse already-decoded rows.
    pub fn parse_rows(&self, rows: &[Vec<Value>]) -> Result<(Vec<AircraftRecord>, usize), ParseError> {
        let mut aircraft = Vec::with_capacity(rows.len());
        let mut dropped = 0;

        for (idx, row) in rows.iter().enumerate() {
            match Self::parse_row(idx, row)? {
                Some(record) => aircraft.push(record),
                None => dropped += 1,
            }
        }

        debug!("Parsed {} aircraft, dropped {} rows without position", aircraft.len(), dropped);
        Ok((aircraft, dropped))
    }
}

impl Protocol for StateVectorParser {
    type Message = StateSnapshot;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<StateSnapshot>, ParseError> {
        let response: StatesResponse = serde_json::from_slice(input)?;

        let rows = match response.states {
            Some(rows) if !rows.is_empty() => rows,
            _ => return Ok(None),
        };

        let (aircraft, dropped) = self.parse_rows(&rows)?;
        Ok(Some(StateSnapshot {
            time: response.time,
            aircraft,
            dropped,
        }))
    }
}

/// Typed accessors over one row.
struct Field<'a> {
    row: usize,
    values: &'a [Value],
}

impl Field<'_> {
    fn invalid(&self, field: &'static str, value: &Value) -> ParseError {
        ParseError::InvalidValue {
            row: self.row,
            field,
            value: value.to_string(),
        }
    }

    fn string(&self, idx: usize, name: &'static str) -> Result<String, ParseError> {
        match &self.values[idx] {
            Value::String(s) => Ok(s.trim().to_string()),
            other => Err(self.invalid(name, other)),
        }
    }

    fn opt_string(&self, idx: usize, name: &'static str) -> Result<Option<String>, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(None),
            Value::String(s) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            other => Err(self.invalid(name, other)),
        }
    }

    fn opt_f64(&self, idx: usize, name: &'static str) -> Result<Option<f64>, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(None),
            Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| self.invalid(name, &self.values[idx])),
            other => Err(self.invalid(name, other)),
        }
    }

    #[allow(clippy::cast_possible_truncation, reason = "timestamps are whole seconds")]
    fn opt_i64(&self, idx: usize, name: &'static str) -> Result<Option<i64>, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Some)
                .ok_or_else(|| self.invalid(name, &self.values[idx])),
            other => Err(self.invalid(name, other)),
        }
    }

    fn flag(&self, idx: usize, name: &'static str) -> Result<bool, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            other => Err(self.invalid(name, other)),
        }
    }

    fn sensors(&self, idx: usize) -> Result<Option<Vec<i64>>, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| self.invalid("sensors", v)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(self.invalid("sensors", other)),
        }
    }

    fn position_source(&self, idx: usize) -> Result<PositionSource, ParseError> {
        match &self.values[idx] {
            Value::Null => Ok(PositionSource::default()),
            Value::Number(n) => n
                .as_u64()
                .and_then(|code| u8::try_from(code).ok())
                .map(PositionSource::from_code)
                .ok_or_else(|| self.invalid("position_source", &self.values[idx])),
            other => Err(self.invalid("position_source", other)),
        }
    }
}
