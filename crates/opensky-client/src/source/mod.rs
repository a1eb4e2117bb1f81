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

//! Feed source layer.
//!
//! A [`FeedSource`] performs one bounded request against the upstream
//! aircraft-state endpoint and hands back the raw status and body. Status
//! classification and parsing belong to the store, so sources stay dumb and
//! easy to replace in tests.

use std::future::Future;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::geo::BoundingBox;

/// Default OpenSky REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://opensky-network.org/api";

/// Raw upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FeedResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that never produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server (DNS, refused connection, timeout).
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Something that can fetch the current aircraft states for a region.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(
        &self,
        bbox: BoundingBox,
    ) -> impl Future<Output = Result<FeedResponse, TransportError>> + Send;
}

/// Configuration for the HTTP source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Optional request timeout; `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: None,
        }
    }
}

/// OpenSky `/states/all` over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    states_url: String,
}

impl HttpFeedSource {
    pub fn new(config: &HttpSourceConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            states_url: format!("{}/states/all", config.base_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn states_url(&self) -> &str {
        &self.states_url
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, bbox: BoundingBox) -> Result<FeedResponse, TransportError> {
        debug!("GET {} {:?}", self.states_url, bbox);

        let response = self
            .client
            .get(&self.states_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&bbox.query_params())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(FeedResponse::new(status, body.to_vec()))
    }
}
