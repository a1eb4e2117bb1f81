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

//! Published store state and its configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::geo::BoundingBox;
use crate::protocol::AircraftRecord;

/// HTTP status the upstream uses for rate limiting.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Aircraft collection keyed by transponder id.
pub type AircraftMap = HashMap<String, AircraftRecord>;

/// Configuration for the fetch/sync engine.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Delay between scheduled fetch cycles.
    pub fetch_interval: Duration,
    /// Minimum spacing between visible connected/timestamp updates.
    pub update_throttle: Duration,
    /// Pause after an HTTP 429 before polling resumes.
    pub rate_limit_backoff: Duration,
    /// Region requested from the live feed.
    pub query_region: BoundingBox,
    /// Region where synthetic aircraft are placed.
    pub fallback_region: BoundingBox,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_millis(15_000),
            update_throttle: Duration::from_millis(1_000),
            rate_limit_backoff: Duration::from_millis(30_000),
            query_region: BoundingBox::europe(),
            fallback_region: BoundingBox::fallback_region(),
        }
    }
}

/// Classification of a failed fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request could not reach the server.
    Network,
    /// The server answered with an error status.
    Api,
    /// The server answered but the payload was empty or malformed.
    Data,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Api => "api",
            Self::Data => "data",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status for `Api` errors.
    pub status: Option<u16>,
}

impl SyncError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Api,
            message: message.into(),
            status: Some(status),
        }
    }

    /// Rate-limit errors resolve on their own after the back-off window.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(STATUS_TOO_MANY_REQUESTS)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// Polling lifecycle as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingState {
    #[default]
    Idle,
    Polling,
    /// Waiting out the back-off window after a 429.
    RateLimited,
    Paused,
}

/// Snapshot of everything the store publishes.
///
/// `aircraft_by_id` is swapped as a whole on every accepted cycle, so two
/// snapshots share a collection exactly when `Arc::ptr_eq` holds.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub aircraft_by_id: Arc<AircraftMap>,
    pub selected_aircraft_id: Option<String>,
    pub connected: bool,
    pub loading: bool,
    pub paused: bool,
    pub last_error: Option<SyncError>,
    /// Epoch milliseconds of the last visible update.
    pub last_update_timestamp: Option<i64>,
    pub polling: PollingState,
    /// Incremented on every published transition.
    pub revision: u64,
}

impl SyncState {
    #[must_use]
    pub fn aircraft_count(&self) -> usize {
        self.aircraft_by_id.len()
    }

    #[must_use]
    pub fn selected_aircraft(&self) -> Option<&AircraftRecord> {
        self.selected_aircraft_id
            .as_deref()
            .and_then(|id| self.aircraft_by_id.get(id))
    }

    /// Aircraft matching `query`, ordered by id.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&AircraftRecord> {
        let mut hits: Vec<_> = self
            .aircraft_by_id
            .values()
            .filter(|a| a.matches(query))
            .collect();
        hits.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        hits
    }

    /// Short status line for the UI.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        if self.loading {
            "Loading..."
        } else if self.paused {
            "Paused"
        } else if self.connected {
            "Connected"
        } else {
            "Disconnected"
        }
    }
}
