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

//! Fetch/sync engine.
//!
//! [`FlightStore`] owns the authoritative aircraft collection together with
//! connection, error and pause state, and drives the polling lifecycle:
//!
//! ```text
//! Idle -> Polling -> { Polling, RateLimited -> Polling, Paused -> Polling }
//! ```
//!
//! Every transition is published atomically through a `watch` channel, so
//! observers always see a fully formed [`SyncState`]. Failures never escape
//! the engine: they are classified, recorded in `last_error`, and (except for
//! rate limiting) replaced by synthetic aircraft so the globe stays populated.

mod state;

pub use state::{
    AircraftMap, ErrorKind, PollingState, StoreConfig, SyncError, SyncState,
    STATUS_TOO_MANY_REQUESTS,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::fallback;
use crate::protocol::{AircraftRecord, Protocol, StateSnapshot, StateVectorParser};
use crate::source::{FeedResponse, FeedSource, TransportError};

/// Handle to the scheduled polling task. At most one exists at a time.
#[derive(Debug)]
struct PollingHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Who asked for a cycle. A request issued before `stop()`, or by a loop
/// that has since been cancelled, is dropped once it gets the cycle gate.
#[derive(Debug, Clone)]
struct CycleTicket {
    epoch: u64,
    cancel: CancellationToken,
}

impl CycleTicket {
    fn is_stale(&self, current_epoch: u64) -> bool {
        self.cancel.is_cancelled() || self.epoch != current_epoch
    }
}

/// Why a cycle is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Regular interval tick; skipped when another cycle is in flight.
    Scheduled,
    /// Start, resume, retry, or back-off resumption; waits for any in-flight cycle.
    Immediate,
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Applied,
    Fallback,
    RateLimited,
    Skipped,
    Discarded,
}

/// Classified upstream result, before it is applied to state.
#[derive(Debug)]
enum Classified {
    Fresh(StateSnapshot),
    RateLimited(SyncError),
    Failed(SyncError),
}

fn classify(result: Result<FeedResponse, TransportError>) -> Classified {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let kind = if err.is_connectivity() {
                ErrorKind::Network
            } else {
                ErrorKind::Unknown
            };
            return Classified::Failed(SyncError::new(kind, err.to_string()));
        }
    };

    if response.status == STATUS_TOO_MANY_REQUESTS {
        return Classified::RateLimited(SyncError::api(
            response.status,
            "rate limit reached, pausing updates",
        ));
    }

    if !response.is_success() {
        return Classified::Failed(SyncError::api(
            response.status,
            format!("HTTP error status {}", response.status),
        ));
    }

    match StateVectorParser::new().parse(&response.body) {
        Ok(Some(snapshot)) => Classified::Fresh(snapshot),
        Ok(None) => Classified::Failed(SyncError::new(ErrorKind::Data, "no aircraft in this region")),
        Err(err) => Classified::Failed(SyncError::new(ErrorKind::Data, err.to_string())),
    }
}

fn into_map(aircraft: Vec<AircraftRecord>) -> AircraftMap {
    aircraft.into_iter().map(|a| (a.id.clone(), a)).collect()
}

struct Inner<S> {
    config: StoreConfig,
    source: S,
    state: watch::Sender<SyncState>,
    polling: Mutex<Option<PollingHandle>>,
    /// Serializes fetch cycles.
    cycle_gate: tokio::sync::Mutex<()>,
    /// Bumped by `stop()`. A cycle requested under an older epoch is dropped
    /// before fetching, or discards its response if the bump lands mid-request.
    epoch: AtomicU64,
    next_handle_id: AtomicU64,
    last_visible_update: Mutex<Option<Instant>>,
}

/// The aircraft store and its polling engine.
///
/// Cloning is cheap; all clones share the same state. Must be used from
/// within a tokio runtime.
pub struct FlightStore<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for FlightStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for FlightStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("FlightStore")
            .field("aircraft_count", &state.aircraft_by_id.len())
            .field("polling", &state.polling)
            .field("connected", &state.connected)
            .finish_non_exhaustive()
    }
}

impl<S: FeedSource> FlightStore<S> {
    #[must_use]
    pub fn new(config: StoreConfig, source: S) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                state,
                polling: Mutex::new(None),
                cycle_gate: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
                next_handle_id: AtomicU64::new(1),
                last_visible_update: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Current state. The aircraft collection is shared, not copied.
    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn polling_state(&self) -> PollingState {
        self.inner.state.borrow().polling
    }

    #[must_use]
    pub fn selected_aircraft(&self) -> Option<AircraftRecord> {
        self.inner.state.borrow().selected_aircraft().cloned()
    }

    /// Aircraft matching `query` by callsign, id, or origin country.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<AircraftRecord> {
        self.inner
            .state
            .borrow()
            .search(query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Start polling. No-op if polling is already active or the store is paused.
    pub fn start(&self) {
        let mut polling = self.lock_polling();
        if polling.is_some() {
            debug!("Polling already active");
            return;
        }

        let paused = self.update(|s| {
            s.last_error = None;
            s.paused
        });
        if paused {
            info!("Store is paused; polling starts on resume");
            return;
        }

        let handle = self.spawn_polling(None);
        info!(
            "Starting aircraft polling every {}s (handle {})",
            self.inner.config.fetch_interval.as_secs(),
            handle.id
        );
        *polling = Some(handle);
        self.update(|s| s.polling = PollingState::Polling);
    }

    /// Stop polling. The last snapshot stays visible; a response still in
    /// flight is discarded when it arrives.
    pub fn stop(&self) {
        let mut polling = self.lock_polling();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = polling.take() {
            info!("Stopping aircraft polling (handle {})", handle.id);
            handle.cancel.cancel();
        }
        self.update(|s| {
            if !s.paused {
                s.polling = PollingState::Idle;
            }
        });
    }

    /// Flip the paused flag.
    ///
    /// Pausing cancels the timer and lets an in-flight cycle finish. Resuming
    /// triggers one cycle right away and reschedules the timer.
    pub fn toggle_pause(&self) {
        let mut polling = self.lock_polling();
        let paused = self.update(|s| {
            s.paused = !s.paused;
            s.polling = if s.paused {
                PollingState::Paused
            } else {
                PollingState::Polling
            };
            s.paused
        });

        if paused {
            if let Some(handle) = polling.take() {
                handle.cancel.cancel();
            }
            info!("Paused aircraft updates");
        } else {
            if let Some(stale) = polling.take() {
                stale.cancel.cancel();
            }
            let handle = self.spawn_polling(None);
            info!("Resumed aircraft updates (handle {})", handle.id);
            *polling = Some(handle);
        }
    }

    /// Select an aircraft by id, or clear the selection.
    pub fn set_selected(&self, id: Option<&str>) {
        self.update(|s| s.selected_aircraft_id = id.map(str::to_string));
    }

    pub fn clear_error(&self) {
        self.update(|s| s.last_error = None);
    }

    /// Clear the error and fetch now, starting polling if it is stopped.
    pub fn retry(&self) {
        self.clear_error();

        let ticket = self.lock_polling().as_ref().map(|h| self.ticket(h.cancel.clone()));
        let paused = self.inner.state.borrow().paused;
        if paused {
            info!("Retry ignored while paused");
        } else if let Some(ticket) = ticket {
            info!("Retrying aircraft fetch");
            let store = self.clone();
            tokio::spawn(async move {
                store.run_cycle(Trigger::Immediate, &ticket).await;
            });
        } else {
            self.start();
        }
    }

    fn lock_polling(&self) -> MutexGuard<'_, Option<PollingHandle>> {
        self.inner
            .polling
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply a mutation and publish it as one transition.
    fn update<R: Default>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut result = R::default();
        self.inner.state.send_modify(|s| {
            result = f(s);
            s.revision += 1;
        });
        result
    }

    fn ticket(&self, cancel: CancellationToken) -> CycleTicket {
        CycleTicket {
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            cancel,
        }
    }

    fn spawn_polling(&self, initial_delay: Option<Duration>) -> PollingHandle {
        let id = self.inner.next_handle_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let ticket = self.ticket(cancel.clone());
        let store = self.clone();

        tokio::spawn(async move {
            store.poll_loop(ticket, initial_delay).await;
            debug!("Polling task {id} finished");
        });

        PollingHandle { id, cancel }
    }

    async fn poll_loop(&self, ticket: CycleTicket, initial_delay: Option<Duration>) {
        let cancel = ticket.cancel.clone();
        if let Some(delay) = initial_delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return,
            }
            info!("Rate-limit back-off elapsed, resuming polling");
            self.update(|s| {
                if s.polling == PollingState::RateLimited {
                    s.polling = PollingState::Polling;
                }
            });
        }

        if self.run_cycle(Trigger::Immediate, &ticket).await == CycleOutcome::RateLimited {
            return;
        }

        let period = self.inner.config.fetch_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            if self.run_cycle(Trigger::Scheduled, &ticket).await == CycleOutcome::RateLimited {
                return;
            }
        }
    }

    async fn run_cycle(&self, trigger: Trigger, ticket: &CycleTicket) -> CycleOutcome {
        let _gate = match trigger {
            Trigger::Scheduled => {
                if let Ok(guard) = self.inner.cycle_gate.try_lock() {
                    guard
                } else {
                    debug!("Previous fetch still in flight, skipping tick");
                    return CycleOutcome::Skipped;
                }
            }
            Trigger::Immediate => self.inner.cycle_gate.lock().await,
        };

        let epoch = ticket.epoch;
        if ticket.is_stale(self.inner.epoch.load(Ordering::SeqCst)) {
            debug!("Polling stopped while waiting for the previous fetch, dropping cycle");
            return CycleOutcome::Skipped;
        }

        let started = self.update(|s| {
            if s.paused {
                return false;
            }
            s.loading = true;
            s.last_error = None;
            true
        });
        if !started {
            debug!("Paused, skipping fetch cycle");
            return CycleOutcome::Skipped;
        }

        let result = self.inner.source.fetch(self.inner.config.query_region).await;

        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            info!("Discarding response that arrived after polling stopped");
            self.update(|s| s.loading = false);
            return CycleOutcome::Discarded;
        }

        match classify(result) {
            Classified::Fresh(snapshot) => {
                self.apply_snapshot(snapshot);
                CycleOutcome::Applied
            }
            Classified::Failed(error) => {
                self.apply_fallback(error);
                CycleOutcome::Fallback
            }
            Classified::RateLimited(error) => {
                self.enter_backoff(error);
                CycleOutcome::RateLimited
            }
        }
    }

    fn apply_snapshot(&self, snapshot: StateSnapshot) {
        let count = snapshot.aircraft.len();
        let aircraft = Arc::new(into_map(snapshot.aircraft));

        let visible = {
            let mut last = self
                .inner
                .last_visible_update
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let due = last.map_or(true, |t| now.duration_since(t) >= self.inner.config.update_throttle);
            if due {
                *last = Some(now);
            }
            due
        };

        self.update(|s| {
            if s
                .selected_aircraft_id
                .as_ref()
                .is_some_and(|id| !aircraft.contains_key(id))
            {
                s.selected_aircraft_id = None;
            }
            s.aircraft_by_id = aircraft;
            s.last_error = None;
            s.loading = false;
            if visible {
                s.connected = true;
                s.last_update_timestamp = Some(Utc::now().timestamp_millis());
            }
        });

        debug!("Applied snapshot with {count} aircraft ({} rows dropped)", snapshot.dropped);
    }

    fn apply_fallback(&self, error: SyncError) {
        warn!("Aircraft fetch failed ({error}); showing synthetic aircraft");
        let aircraft = Arc::new(into_map(fallback::generate(&self.inner.config.fallback_region)));

        self.update(|s| {
            if s
                .selected_aircraft_id
                .as_ref()
                .is_some_and(|id| !aircraft.contains_key(id))
            {
                s.selected_aircraft_id = None;
            }
            s.aircraft_by_id = aircraft;
            s.connected = true;
            s.loading = false;
            s.last_error = Some(error);
            s.last_update_timestamp = Some(Utc::now().timestamp_millis());
        });
    }

    fn enter_backoff(&self, error: SyncError) {
        let backoff = self.inner.config.rate_limit_backoff;
        warn!("Rate limited by upstream; pausing polling for {}s", backoff.as_secs());

        let mut polling = self.lock_polling();
        let paused = self.update(|s| {
            s.loading = false;
            s.last_error = Some(error);
            if !s.paused {
                s.polling = PollingState::RateLimited;
            }
            s.paused
        });

        // Paused or stopped stores keep no timer
        if paused {
            return;
        }
        if let Some(current) = polling.take() {
            current.cancel.cancel();
            *polling = Some(self.spawn_polling(Some(backoff)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::fallback::FALLBACK_AIRCRAFT_COUNT;
    use crate::geo::BoundingBox;

    /// One scripted upstream reply.
    struct Reply {
        delay: Duration,
        result: Result<FeedResponse, TransportError>,
    }

    fn ok(body: &str) -> Reply {
        Reply {
            delay: Duration::ZERO,
            result: Ok(FeedResponse::new(200, body)),
        }
    }

    fn status(code: u16) -> Reply {
        Reply {
            delay: Duration::ZERO,
            result: Ok(FeedResponse::new(code, "")),
        }
    }

    fn delayed(delay: Duration, body: &str) -> Reply {
        Reply {
            delay,
            result: Ok(FeedResponse::new(200, body)),
        }
    }

    /// Replays queued replies, then repeats `ok(default_body)` forever.
    struct ScriptedSource {
        replies: Mutex<VecDeque<Reply>>,
        default_body: String,
        calls: Arc<AtomicUsize>,
    }

    impl FeedSource for ScriptedSource {
        async fn fetch(&self, _bbox: BoundingBox) -> Result<FeedResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front();
            let reply = reply.unwrap_or_else(|| ok(&self.default_body));
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            reply.result
        }
    }

    fn row(id: &str, lat: Option<f64>, lon: Option<f64>) -> String {
        let fmt = |v: Option<f64>| v.map_or_else(|| "null".to_string(), |v| v.to_string());
        format!(
            r#"["{id}","TST1","Testland",1700000000,1700000000,{},{},10000.0,false,220.0,90.0,0.0,null,10100.0,"1000",false,0]"#,
            fmt(lon),
            fmt(lat)
        )
    }

    fn body(rows: &[String]) -> String {
        format!(r#"{{"time":1700000000,"states":[{}]}}"#, rows.join(","))
    }

    fn five_aircraft() -> String {
        let rows: Vec<_> = (0..5)
            .map(|i| row(&format!("aa000{i}"), Some(50.0 + f64::from(i)), Some(1.0)))
            .collect();
        body(&rows)
    }

    fn store_with(replies: Vec<Reply>) -> (FlightStore<ScriptedSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            replies: Mutex::new(replies.into()),
            default_body: five_aircraft(),
            calls: Arc::clone(&calls),
        };
        (FlightStore::new(StoreConfig::default(), source), calls)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_success() {
        let (store, calls) = store_with(vec![ok(&five_aircraft())]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.aircraft_count(), 5);
        assert!(state.connected);
        assert!(!state.loading);
        assert!(state.last_error.is_none());
        assert!(state.last_update_timestamp.is_some());
        assert_eq!(state.polling, PollingState::Polling);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (store, calls) = store_with(vec![]);
        store.start();
        store.start();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        advance(15_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        advance(15_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_without_position_are_excluded() {
        let payload = body(&[row("abc123", Some(51.5), Some(-0.1)), row("def456", None, Some(2.0))]);
        let (store, _) = store_with(vec![ok(&payload)]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        assert_eq!(state.aircraft_count(), 1);
        let a = &state.aircraft_by_id["abc123"];
        assert!((a.latitude - 51.5).abs() < 1e-9);
        assert!((a.longitude - (-0.1)).abs() < 1e-9);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off() {
        let (store, calls) = store_with(vec![status(429)]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        let error = state.last_error.clone().unwrap();
        assert_eq!(error.kind, ErrorKind::Api);
        assert!(error.is_rate_limited());
        assert_eq!(state.polling, PollingState::RateLimited);
        assert_eq!(state.aircraft_count(), 0, "no fallback on rate limit");
        assert!(!state.loading);

        // The regular 15s tick must not fire inside the back-off window
        advance(29_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        advance(1_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let state = store.snapshot();
        assert_eq!(state.polling, PollingState::Polling);
        assert!(state.last_error.is_none());
        assert_eq!(state.aircraft_count(), 5);

        advance(15_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_states_uses_fallback() {
        let (store, _) = store_with(vec![ok(r#"{"time":1,"states":[]}"#)]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        assert_eq!(state.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Data));
        assert_eq!(state.aircraft_count(), FALLBACK_AIRCRAFT_COUNT);
        assert!(state.connected);
        assert!(!state.loading);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_uses_fallback() {
        let (store, _) = store_with(vec![status(503)]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        let error = state.last_error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Api);
        assert_eq!(error.status, Some(503));
        assert!(!error.is_rate_limited());
        assert_eq!(state.aircraft_count(), FALLBACK_AIRCRAFT_COUNT);
        assert_eq!(state.polling, PollingState::Polling);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_classified() {
        let (store, _) = store_with(vec![
            Reply {
                delay: Duration::ZERO,
                result: Err(TransportError::Connect("connection refused".into())),
            },
            Reply {
                delay: Duration::ZERO,
                result: Err(TransportError::Other("body decode".into())),
            },
        ]);
        store.start();
        advance(1).await;
        let state = store.snapshot();
        assert_eq!(state.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
        assert_eq!(state.aircraft_count(), FALLBACK_AIRCRAFT_COUNT);
        assert!(state.connected);

        advance(15_000).await;
        let state = store.snapshot();
        assert_eq!(state.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Unknown));
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_row_fails_whole_cycle() {
        let payload = body(&[row("abc123", Some(51.5), Some(-0.1)), r#"["short",null]"#.to_string()]);
        let (store, _) = store_with(vec![ok(&payload)]);
        store.start();
        advance(1).await;

        let state = store.snapshot();
        assert_eq!(state.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Data));
        assert!(!state.aircraft_by_id.contains_key("abc123"));
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_pause_stops_and_resumes() {
        let (store, calls) = store_with(vec![]);
        store.start();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.toggle_pause();
        let state = store.snapshot();
        assert!(state.paused);
        assert_eq!(store.polling_state(), PollingState::Paused);

        advance(60_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.toggle_pause();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "resume fetches immediately");
        assert!(!store.snapshot().paused);
        assert_eq!(store.polling_state(), PollingState::Polling);

        advance(15_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        store.stop();
        assert_eq!(store.polling_state(), PollingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_paused_schedules_nothing() {
        let (store, calls) = store_with(vec![]);
        store.toggle_pause();
        store.stop();
        store.start();
        advance(30_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.snapshot().paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_waits_for_in_flight_cycle() {
        let (store, calls) = store_with(vec![delayed(Duration::from_secs(20), &five_aircraft())]);
        store.start();
        advance(1).await;
        assert!(store.snapshot().loading);

        store.toggle_pause();
        store.toggle_pause();
        advance(10_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "cycles never overlap");

        advance(10_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!store.snapshot().loading);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_resume_cycle_waiting_on_gate() {
        let (store, calls) = store_with(vec![delayed(Duration::from_secs(20), &five_aircraft())]);
        store.start();
        advance(1).await;

        store.toggle_pause();
        store.toggle_pause();
        advance(1).await;
        store.stop();
        advance(60_000).await;

        let state = store.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.aircraft_count(), 0);
        assert!(!state.loading);
        assert_eq!(state.polling, PollingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_retry_cycle_waiting_on_gate() {
        let (store, calls) = store_with(vec![delayed(Duration::from_secs(20), &five_aircraft())]);
        store.start();
        advance(1).await;

        store.retry();
        advance(1).await;
        store.stop();
        advance(60_000).await;

        let state = store.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.aircraft_count(), 0);
        assert!(!state.loading);
        assert_eq!(state.polling, PollingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_while_paused_schedules_nothing() {
        let rate_limited = Reply {
            delay: Duration::from_secs(5),
            result: Ok(FeedResponse::new(429, "")),
        };
        let (store, calls) = store_with(vec![rate_limited]);
        store.start();
        advance(1).await;

        store.toggle_pause();
        advance(10_000).await;
        let state = store.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.last_error.as_ref().is_some_and(SyncError::is_rate_limited));
        assert_eq!(state.polling, PollingState::Paused);
        assert!(!state.loading);

        advance(60_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no back-off timer while paused");

        store.toggle_pause();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.polling_state(), PollingState::Polling);
        assert_eq!(store.snapshot().aircraft_count(), 5);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_on_retry_replaces_polling_loop() {
        let (store, calls) = store_with(vec![ok(&five_aircraft()), status(429)]);
        store.start();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.retry();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.polling_state(), PollingState::RateLimited);
        assert_eq!(store.snapshot().aircraft_count(), 5, "last snapshot kept");

        // The original 15s tick belongs to the cancelled loop
        advance(20_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        advance(10_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.polling_state(), PollingState::Polling);

        advance(15_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_late_response() {
        let (store, calls) = store_with(vec![delayed(Duration::from_secs(5), &five_aircraft())]);
        store.start();
        advance(1).await;
        assert!(store.snapshot().loading);

        store.stop();
        advance(10_000).await;

        let state = store.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.aircraft_count(), 0);
        assert!(!state.loading);
        assert!(!state.connected);
        assert_eq!(state.polling, PollingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_last_snapshot() {
        let (store, calls) = store_with(vec![]);
        store.start();
        advance(1).await;
        store.stop();
        store.stop();
        advance(60_000).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().aircraft_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamp_update_is_throttled() {
        let second = body(&[row("bb0001", Some(48.0), Some(2.0))]);
        let (store, calls) = store_with(vec![ok(&five_aircraft()), ok(&second)]);
        store.start();
        advance(1).await;
        let first = store.snapshot();
        let stamp = first.last_update_timestamp;
        assert!(stamp.is_some());

        advance(400).await;
        store.retry();
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let state = store.snapshot();
        assert_eq!(state.aircraft_count(), 1, "data is never throttled");
        assert!(!Arc::ptr_eq(&first.aircraft_by_id, &state.aircraft_by_id));
        assert_eq!(state.last_update_timestamp, stamp);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_clears_error_and_fetches() {
        let (store, calls) = store_with(vec![status(500)]);
        store.start();
        advance(1).await;
        assert!(store.snapshot().last_error.is_some());

        store.retry();
        assert!(store.snapshot().last_error.is_none());
        advance(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.snapshot().aircraft_count(), 5);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_is_cleared_when_aircraft_disappears() {
        let second = body(&[row("bb0001", Some(48.0), Some(2.0))]);
        let (store, _) = store_with(vec![ok(&five_aircraft()), ok(&second)]);
        store.start();
        advance(1).await;

        store.set_selected(Some("aa0002"));
        assert_eq!(store.selected_aircraft().map(|a| a.id), Some("aa0002".to_string()));

        advance(15_000).await;
        assert!(store.snapshot().selected_aircraft_id.is_none());
        assert!(store.selected_aircraft().is_none());
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_see_transitions() {
        let (store, _) = store_with(vec![]);
        let mut rx = store.subscribe();
        store.start();
        advance(1).await;

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.aircraft_count(), 5);
        assert!(state.revision >= 3);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_and_select() {
        let (store, _) = store_with(vec![]);
        store.start();
        advance(1).await;

        assert_eq!(store.search("aa0003").len(), 1);
        assert_eq!(store.search("testland").len(), 5);
        assert!(store.search("nowhere").is_empty());

        store.set_selected(Some("aa0003"));
        store.clear_error();
        assert_eq!(store.snapshot().selected_aircraft_id.as_deref(), Some("aa0003"));
        store.set_selected(None);
        assert!(store.snapshot().selected_aircraft_id.is_none());
        store.stop();
    }

    #[test]
    fn test_classify_statuses() {
        assert!(matches!(classify(Ok(FeedResponse::new(429, ""))), Classified::RateLimited(_)));
        assert!(matches!(
            classify(Ok(FeedResponse::new(404, ""))),
            Classified::Failed(SyncError { kind: ErrorKind::Api, status: Some(404), .. })
        ));
        assert!(matches!(
            classify(Ok(FeedResponse::new(200, r#"{"time":1}"#))),
            Classified::Failed(SyncError { kind: ErrorKind::Data, .. })
        ));
        assert!(matches!(classify(Ok(FeedResponse::new(200, five_aircraft()))), Classified::Fresh(_)));
    }
}
