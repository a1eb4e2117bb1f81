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

//! Client library for live aircraft state vectors from the OpenSky Network.
//!
//! The crate is split into layers that can be used on their own or composed
//! through [`FlightStore`]:
//!
//! - **Geo layer**: lat/lon to sphere projection, distances, bounding boxes
//! - **Protocol layer**: parsing of the `/states/all` positional row format
//! - **Source layer**: one HTTP request per fetch cycle behind [`FeedSource`]
//! - **Store layer**: polling, rate-limit back-off, pause/resume, and the
//!   published [`SyncState`]
//!
//! # Quick Start
//!
//! ```no_run
//! use opensky_client::{FlightStore, HttpFeedSource, HttpSourceConfig, StoreConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = HttpFeedSource::new(&HttpSourceConfig::default()).unwrap();
//!     let store = FlightStore::new(StoreConfig::default(), source);
//!     store.start();
//!
//!     let mut updates = store.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow_and_update().clone();
//!         println!("{} aircraft ({})", state.aircraft_count(), state.status_label());
//!     }
//! }
//! ```
//!
//! ## Protocol Layer Only
//!
//! ```
//! use opensky_client::protocol::{Protocol, StateVectorParser};
//!
//! let body = br#"{"time":1,"states":[["abc123","BAW1 ","United Kingdom",1,1,-0.1,51.5,
//!     10000.0,false,230.0,90.0,0.0,null,10100.0,"1000",false,0]]}"#;
//! let snapshot = StateVectorParser::new().parse(body).unwrap().unwrap();
//! assert_eq!(snapshot.aircraft[0].callsign.as_deref(), Some("BAW1"));
//! ```

pub mod events;
pub mod fallback;
pub mod geo;
pub mod protocol;
pub mod source;
pub mod stats;
pub mod store;

pub use events::{EventBus, UiEvent};
pub use geo::BoundingBox;
pub use protocol::{AircraftRecord, ParseError, PositionSource, StateSnapshot};
pub use source::{FeedResponse, FeedSource, HttpFeedSource, HttpSourceConfig, TransportError};
pub use stats::FlightStats;
pub use store::{ErrorKind, FlightStore, PollingState, StoreConfig, SyncError, SyncState};
