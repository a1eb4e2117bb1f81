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

//! Aircraft entities on the globe.
//!
//! [`AircraftLayer`] turns the store's aircraft collection into an ordered
//! entity array with cached surface positions, and writes one transform per
//! entity each frame. Geometry is rebuilt only when the store publishes a new
//! collection (`Arc` identity), never per frame.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use opensky_client::geo;
use opensky_client::store::AircraftMap;
use opensky_client::{AircraftRecord, EventBus, FeedSource, FlightStore, UiEvent};

use super::AIRCRAFT_RADIUS;

pub const PLACEHOLDER_TITLE: &str = "No Aircraft Found";
pub const PLACEHOLDER_CAUSES: [&str; 3] = [
    "No flights in this area",
    "Data service temporarily unavailable",
    "Network connection issues",
];
pub const PLACEHOLDER_HINT: &str = "Try refreshing or check back later";

const SELECTED_SCALE: f32 = 0.015;
const DEFAULT_SCALE: f32 = 0.012;
const FLOAT_AMPLITUDE: f32 = 0.0005;
const PULSE_AMPLITUDE: f32 = 0.05;
const TRAIL_LENGTH: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerConfig {
    /// Entity count at which drawing switches to a single batch.
    pub batch_threshold: usize,
    /// Velocity above which an individually drawn aircraft shows a heading trail.
    pub trail_velocity_threshold: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 20,
            trail_velocity_threshold: 200.0,
        }
    }
}

/// How the current entity set is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStrategy {
    /// Nothing to draw; show the "no aircraft" explanation instead.
    Placeholder,
    /// One proxy per aircraft with selection glow and heading trail.
    Individual,
    /// One instanced primitive set; hits resolve by instance index.
    Batched,
}

/// Receives selection changes from pointer clicks.
pub trait SelectionSink {
    fn select(&self, id: Option<&str>);
}

impl<S: FeedSource> SelectionSink for FlightStore<S> {
    fn select(&self, id: Option<&str>) {
        self.set_selected(id);
    }
}

#[derive(Debug)]
pub struct AircraftLayer {
    config: LayerConfig,
    snapshot: Option<Arc<AircraftMap>>,
    /// Ordered by id; instance `i` always describes `entities[i]`.
    entities: Vec<AircraftRecord>,
    positions: Vec<Vec3>,
    instances: Vec<Mat4>,
    selected_index: Option<usize>,
    hovered_id: Option<String>,
}

impl AircraftLayer {
    #[must_use]
    pub fn new(config: LayerConfig) -> Self {
        Self {
            config,
            snapshot: None,
            entities: Vec::new(),
            positions: Vec::new(),
            instances: Vec::new(),
            selected_index: None,
            hovered_id: None,
        }
    }

    /// Adopt a published collection. Returns `true` when geometry was rebuilt.
    pub fn sync(&mut self, aircraft: &Arc<AircraftMap>) -> bool {
        if self
            .snapshot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, aircraft))
        {
            return false;
        }

        self.entities.clear();
        self.entities.extend(aircraft.values().cloned());
        self.entities.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        self.positions.clear();
        self.positions.extend(
            self.entities
                .iter()
                .map(|a| geo::project(a.latitude, a.longitude, AIRCRAFT_RADIUS).as_vec3()),
        );

        self.instances.clear();
        self.instances.resize(self.entities.len(), Mat4::IDENTITY);
        self.selected_index = None;
        self.snapshot = Some(Arc::clone(aircraft));
        log::debug!("Rebuilt aircraft layer with {} entities", self.entities.len());
        true
    }

    /// Write this frame's transforms into the instance buffer.
    ///
    /// Each entity floats slightly and pulses in scale with a per-index phase;
    /// the selected entity is drawn larger and spins about Y.
    #[allow(clippy::cast_precision_loss, reason = "entity indices are small")]
    pub fn update_frame(&mut self, elapsed: f32, selected: Option<&str>) {
        self.selected_index = selected.and_then(|id| self.index_of(id));

        for (i, (instance, position)) in self.instances.iter_mut().zip(&self.positions).enumerate() {
            let phase = i as f32;
            let float = (elapsed * 1.5 + phase * 0.05).sin() * FLOAT_AMPLITUDE;
            let pulse = 1.0 + (elapsed * 2.0 + phase * 0.1).sin() * PULSE_AMPLITUDE;

            let is_selected = self.selected_index == Some(i);
            let (base, rotation) = if is_selected {
                (SELECTED_SCALE, Quat::from_rotation_y(elapsed * 1.5))
            } else {
                (DEFAULT_SCALE, Quat::IDENTITY)
            };

            *instance = Mat4::from_scale_rotation_translation(
                Vec3::splat(base * pulse),
                rotation,
                *position + Vec3::new(0.0, float, 0.0),
            );
        }
    }

    #[must_use]
    pub fn strategy(&self) -> DrawStrategy {
        match self.entities.len() {
            0 => DrawStrategy::Placeholder,
            n if n < self.config.batch_threshold => DrawStrategy::Individual,
            _ => DrawStrategy::Batched,
        }
    }

    /// Apply pointer input for this frame.
    ///
    /// `hit` is an index into the ordered entity array, as produced by the
    /// scene picker for either strategy. Entering an aircraft publishes a
    /// hover with its record, leaving publishes an empty hover, and a click
    /// selects it.
    pub fn handle_pointer(
        &mut self,
        hit: Option<usize>,
        clicked: bool,
        sink: &impl SelectionSink,
        bus: &EventBus,
    ) {
        let target = hit.and_then(|i| self.entities.get(i));

        if target.map(|a| a.id.as_str()) != self.hovered_id.as_deref() {
            if self.hovered_id.take().is_some() {
                bus.publish(UiEvent::AircraftHover(None));
            }
            if let Some(aircraft) = target {
                self.hovered_id = Some(aircraft.id.clone());
                bus.publish(UiEvent::AircraftHover(Some(aircraft.clone())));
            }
        }

        if clicked {
            if let Some(aircraft) = target {
                sink.select(Some(&aircraft.id));
                bus.publish(UiEvent::SelectionChanged(Some(aircraft.id.clone())));
            }
        }
    }

    /// Heading marker for a fast aircraft, as a surface segment.
    #[allow(clippy::cast_possible_truncation, reason = "render precision is f32")]
    #[must_use]
    pub fn trail(&self, index: usize) -> Option<(Vec3, Vec3)> {
        let aircraft = self.entities.get(index)?;
        let position = *self.positions.get(index)?;
        let heading = aircraft.heading?;
        if aircraft.velocity? <= self.config.trail_velocity_threshold {
            return None;
        }

        let h = heading.to_radians();
        let lat_scale = aircraft.latitude.to_radians().cos().max(0.01);
        let ahead = geo::project(
            aircraft.latitude + h.cos() * 0.5,
            aircraft.longitude + h.sin() * 0.5 / lat_scale,
            AIRCRAFT_RADIUS,
        )
        .as_vec3();

        let direction = (ahead - position).try_normalize()?;
        Some((position, position - direction * TRAIL_LENGTH))
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.entities.binary_search_by(|a| a.id.as_str().cmp(id)).ok()
    }

    #[cfg(test)]
    pub fn entities(&self) -> &[AircraftRecord] {
        &self.entities
    }

    #[cfg(test)]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[must_use]
    pub fn instances(&self) -> &[Mat4] {
        &self.instances
    }

    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use opensky_client::PositionSource;

    use super::*;

    pub(crate) fn aircraft(id: &str, lat: f64, lon: f64, velocity: Option<f64>) -> AircraftRecord {
        AircraftRecord {
            id: id.to_string(),
            callsign: Some(format!("CS{id}")),
            origin_country: "Testland".to_string(),
            position_timestamp: Some(0),
            last_contact_timestamp: 0,
            longitude: lon,
            latitude: lat,
            barometric_altitude: Some(10_000.0),
            on_ground: false,
            velocity,
            heading: Some(90.0),
            vertical_rate: None,
            sensors: None,
            geo_altitude: None,
            squawk: None,
            special_position_indicator: false,
            position_source: PositionSource::AdsB,
        }
    }

    #[allow(clippy::cast_precision_loss, reason = "test counts are small")]
    pub(crate) fn collection(n: usize) -> Arc<AircraftMap> {
        let map: HashMap<_, _> = (0..n)
            .map(|i| {
                let a = aircraft(&format!("id{i:03}"), 40.0 + i as f64 * 0.5, i as f64, Some(150.0));
                (a.id.clone(), a)
            })
            .collect();
        Arc::new(map)
    }

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<Option<String>>>);

    impl SelectionSink for RecordingSink {
        fn select(&self, id: Option<&str>) {
            self.0.borrow_mut().push(id.map(str::to_string));
        }
    }

    #[test]
    fn test_rebuild_only_on_new_collection() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        let first = collection(5);

        assert!(layer.sync(&first));
        assert!(!layer.sync(&first));
        assert!(!layer.sync(&Arc::clone(&first)));

        let same_content = Arc::new((*first).clone());
        assert!(layer.sync(&same_content));
        assert!(!layer.sync(&same_content));
    }

    #[test]
    fn test_entities_ordered_and_projected() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&collection(12));

        let ids: Vec<_> = layer.entities().iter().map(|a| a.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        for position in layer.positions() {
            assert!((position.length() - 1.02).abs() < 1e-4);
        }
    }

    #[test]
    fn test_update_frame_reuses_buffer() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&collection(30));
        let ptr = layer.instances().as_ptr();

        for frame in 0..100 {
            #[allow(clippy::cast_precision_loss, reason = "test frame counter")]
            let t = frame as f32 / 60.0;
            layer.update_frame(t, Some("id007"));
        }

        assert_eq!(layer.instances().as_ptr(), ptr);
        assert_eq!(layer.instances().len(), 30);
    }

    #[test]
    fn test_frame_transforms() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&collection(3));
        layer.update_frame(0.0, Some("id001"));
        assert_eq!(layer.selected_index(), Some(1));

        let (scale, rotation, translation) = layer.instances()[0].to_scale_rotation_translation();
        assert!((scale.x - DEFAULT_SCALE).abs() < 1e-6);
        assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
        assert!(translation.abs_diff_eq(layer.positions()[0], 1e-6));

        let (scale, _, _) = layer.instances()[1].to_scale_rotation_translation();
        let expected = SELECTED_SCALE * (1.0 + 0.1_f32.sin() * PULSE_AMPLITUDE);
        assert!((scale.x - expected).abs() < 1e-6);

        let (_, _, translation) = layer.instances()[2].to_scale_rotation_translation();
        let float = 0.1_f32.sin() * FLOAT_AMPLITUDE;
        assert!((translation.y - (layer.positions()[2].y + float)).abs() < 1e-6);

        // Selected entity spins about Y, others do not
        layer.update_frame(1.0, Some("id001"));
        let (_, spin, _) = layer.instances()[1].to_scale_rotation_translation();
        assert!(spin.abs_diff_eq(Quat::from_rotation_y(1.5), 1e-4));
        let (_, still, _) = layer.instances()[0].to_scale_rotation_translation();
        assert!(still.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_unknown_selection_is_ignored() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&collection(3));
        layer.update_frame(0.5, Some("missing"));
        assert_eq!(layer.selected_index(), None);
    }

    #[test]
    fn test_strategy_threshold_and_click_mapping() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        assert_eq!(layer.strategy(), DrawStrategy::Placeholder);

        layer.sync(&collection(19));
        assert_eq!(layer.strategy(), DrawStrategy::Individual);

        layer.sync(&collection(20));
        assert_eq!(layer.strategy(), DrawStrategy::Batched);

        let batch = collection(21);
        layer.sync(&batch);
        assert_eq!(layer.strategy(), DrawStrategy::Batched);

        let bus = EventBus::new();
        let sink = RecordingSink::default();
        let mut expected: Vec<_> = batch.keys().cloned().collect();
        expected.sort();

        for i in 0..21 {
            layer.handle_pointer(Some(i), true, &sink, &bus);
        }
        let selected: Vec<_> = sink.0.borrow().iter().flatten().cloned().collect();
        assert_eq!(selected, expected);

        layer.sync(&Arc::new(HashMap::new()));
        assert_eq!(layer.strategy(), DrawStrategy::Placeholder);
    }

    #[test]
    fn test_hover_enter_and_leave() {
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&collection(4));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let sink = RecordingSink::default();

        layer.handle_pointer(Some(2), false, &sink, &bus);
        layer.handle_pointer(Some(2), false, &sink, &bus);
        layer.handle_pointer(None, false, &sink, &bus);
        layer.handle_pointer(Some(99), true, &sink, &bus);

        match rx.try_recv().unwrap() {
            UiEvent::AircraftHover(Some(a)) => assert_eq!(a.id, "id002"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), UiEvent::AircraftHover(None));
        assert!(rx.try_recv().is_err());
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn test_trail_only_for_fast_aircraft() {
        let mut map = HashMap::new();
        for a in [
            aircraft("fast", 50.0, 0.0, Some(250.0)),
            aircraft("slow", 50.0, 1.0, Some(150.0)),
            aircraft("none", 50.0, 2.0, None),
        ] {
            map.insert(a.id.clone(), a);
        }
        let mut layer = AircraftLayer::new(LayerConfig::default());
        layer.sync(&Arc::new(map));

        let fast = layer.entities().iter().position(|a| a.id == "fast").unwrap();
        let (start, end) = layer.trail(fast).unwrap();
        assert!((start.distance(end) - TRAIL_LENGTH).abs() < 1e-4);

        for id in ["slow", "none"] {
            let i = layer.entities().iter().position(|a| a.id == id).unwrap();
            assert!(layer.trail(i).is_none());
        }
    }

    #[test]
    fn test_placeholder_copy() {
        assert_eq!(PLACEHOLDER_CAUSES.len(), 3);
        assert!(PLACEHOLDER_CAUSES.iter().any(|c| c.contains("Network")));
        assert!(!PLACEHOLDER_HINT.is_empty());
    }
}
