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

//! Application configuration management.
//!
//! Settings live in a TOML file managed by `confy`. The file is read once at
//! startup; command-line flags override individual fields afterwards and
//! nothing is written back during a session.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use opensky_client::source::DEFAULT_API_BASE_URL;
use opensky_client::{BoundingBox, HttpSourceConfig, StoreConfig};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "globe-radar";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// OpenSky REST API root
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Optional HTTP request timeout in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Delay between fetch cycles
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    /// Minimum spacing of visible "last update" changes
    #[serde(default = "default_update_throttle_ms")]
    pub update_throttle_ms: u64,

    /// Pause after the server answers 429
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Entity count at which the layer switches to batched drawing
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Velocity above which individual aircraft get a heading trail
    #[serde(default = "default_trail_velocity_threshold")]
    pub trail_velocity_threshold: f64,

    /// Region requested from the feed
    #[serde(default = "BoundingBox::europe")]
    pub query_region: BoundingBox,

    /// Region for synthetic aircraft when the feed fails
    #[serde(default = "BoundingBox::fallback_region")]
    pub fallback_region: BoundingBox,

    /// Equirectangular Earth texture; flat material when unset or unreadable
    #[serde(default)]
    pub texture_path: Option<PathBuf>,

    /// Slowly spin the globe while idle
    #[serde(default = "default_true")]
    pub auto_rotate: bool,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_fetch_interval_ms() -> u64 {
    15_000
}

fn default_update_throttle_ms() -> u64 {
    1_000
}

fn default_rate_limit_backoff_ms() -> u64 {
    30_000
}

fn default_batch_threshold() -> usize {
    20
}

fn default_trail_velocity_threshold() -> f64 {
    200.0
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: None,
            fetch_interval_ms: default_fetch_interval_ms(),
            update_throttle_ms: default_update_throttle_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            batch_threshold: default_batch_threshold(),
            trail_velocity_threshold: default_trail_velocity_threshold(),
            query_region: BoundingBox::europe(),
            fallback_region: BoundingBox::fallback_region(),
            texture_path: None,
            auto_rotate: true,
        }
    }
}

/// Repair a region from the config file: inverted bounds are swapped and
/// non-finite bounds replace the whole box with `default`.
fn checked_region(name: &str, region: BoundingBox, default: BoundingBox) -> BoundingBox {
    if region.is_valid() {
        return region;
    }
    let normalized = region.normalized();
    if normalized.is_valid() {
        warn!("{name} has inverted bounds, swapping them: {region:?}");
        normalized
    } else {
        warn!("{name} has non-finite bounds, using the default region: {region:?}");
        default
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Engine timing and regions
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            fetch_interval: Duration::from_millis(self.fetch_interval_ms.max(1)),
            update_throttle: Duration::from_millis(self.update_throttle_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
            query_region: checked_region("query_region", self.query_region, BoundingBox::europe()),
            fallback_region: checked_region(
                "fallback_region",
                self.fallback_region,
                BoundingBox::fallback_region(),
            ),
        }
    }

    #[must_use]
    pub fn source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            base_url: self.api_base_url.clone(),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let config = AppConfig::default();
        let store = config.store_config();
        let engine = StoreConfig::default();
        assert_eq!(store.fetch_interval, engine.fetch_interval);
        assert_eq!(store.update_throttle, engine.update_throttle);
        assert_eq!(store.rate_limit_backoff, engine.rate_limit_backoff);
        assert_eq!(store.query_region, engine.query_region);
        assert_eq!(config.batch_threshold, 20);
        assert!(config.source_config().request_timeout.is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"fetch_interval_ms": 5000, "auto_rotate": false}"#).unwrap();
        assert_eq!(config.fetch_interval_ms, 5000);
        assert!(!config.auto_rotate);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.rate_limit_backoff_ms, 30_000);
        assert_eq!(config.fallback_region, BoundingBox::fallback_region());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = AppConfig {
            fetch_interval_ms: 0,
            request_timeout_ms: Some(2_500),
            ..AppConfig::default()
        };
        assert_eq!(config.store_config().fetch_interval, Duration::from_millis(1));
        assert_eq!(config.source_config().request_timeout, Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn test_bad_regions_are_repaired() {
        let config = AppConfig {
            query_region: BoundingBox::new(70.0, 35.0, 45.0, -15.0),
            fallback_region: BoundingBox::new(45.0, 55.0, f64::NAN, 5.0),
            ..AppConfig::default()
        };
        let store = config.store_config();
        assert_eq!(store.query_region, BoundingBox::europe());
        assert_eq!(store.fallback_region, BoundingBox::fallback_region());
    }
}
