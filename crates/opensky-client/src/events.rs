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

//! Typed notifications between the scene and the UI shell.

use tokio::sync::broadcast;

use crate::protocol::AircraftRecord;

const DEFAULT_CAPACITY: usize = 64;

/// Signals exchanged between the renderer and UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Pointer entered an aircraft (`Some`) or left it (`None`).
    AircraftHover(Option<AircraftRecord>),
    /// Selected aircraft id changed.
    SelectionChanged(Option<String>),
    /// Camera manipulation began.
    InteractionStart,
    /// Camera moved during a manipulation.
    InteractionChange,
    /// Camera manipulation ended.
    InteractionEnd,
    /// Request to return the camera to its initial view.
    ResetView,
    /// Auto-rotation started (`true`) or stopped (`false`).
    AutoRotate(bool),
}

/// Fire-and-forget publish/subscribe bus scoped to one application instance.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
