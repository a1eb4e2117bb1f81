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

mod config;
mod render;
mod status_pane;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use config::AppConfig;
use eframe::egui;
use log::{error, info, warn};
use opensky_client::{
    geo, AircraftRecord, EventBus, FlightStats, FlightStore, HttpFeedSource, SyncState, UiEvent,
};
use render::{AircraftLayer, GlobeCamera, GlobeMaterial, GlobeScene, LayerConfig};
use status_pane::{StatusAction, StatusPane};
use tokio::sync::{broadcast, watch};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How long shortcut feedback stays on screen.
const FEEDBACK_DURATION: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about = "Live aircraft positions on a 3D globe")]
struct Args {
    /// Fetch interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Aircraft count at which rendering switches to a single batch
    #[arg(long)]
    batch_threshold: Option<usize>,

    /// Equirectangular Earth texture (JPEG or PNG)
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Keep the globe still while idle
    #[arg(long)]
    no_auto_rotate: bool,

    /// Log filter, e.g. "debug" or "opensky_client=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(ms) = self.interval_ms {
            config.fetch_interval_ms = ms;
        }
        if let Some(threshold) = self.batch_threshold {
            config.batch_threshold = threshold;
        }
        if let Some(path) = &self.texture {
            config.texture_path = Some(path.clone());
        }
        if self.no_auto_rotate {
            config.auto_rotate = false;
        }
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn main() -> Result<(), eframe::Error> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    info!("Starting Globe Radar...");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {e}");
        AppConfig::default()
    });
    if let Ok(path) = AppConfig::get_config_path() {
        info!("Configuration file: {}", path.display());
    }
    args.apply(&mut config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("globe-radar-io")
        .build()
        .map_err(|e| eframe::Error::AppCreation(Box::new(e)))?;
    let _runtime_guard = runtime.enter();

    let source = HttpFeedSource::new(&config.source_config())
        .map_err(|e| eframe::Error::AppCreation(Box::new(e)))?;
    let store = FlightStore::new(config.store_config(), source);
    store.start();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("Globe Radar"),
        ..Default::default()
    };

    let app_store = store.clone();
    let result = eframe::run_native(
        "Globe Radar",
        options,
        Box::new(move |cc| {
            info!("Creating application...");
            Ok(Box::new(GlobeRadarApp::new(cc, app_store, &config)))
        }),
    );

    store.stop();
    if let Err(e) = &result {
        error!("Application error: {e}");
    }
    result
}

/// Id to select automatically for a search: the only match, if exactly one.
fn auto_select_target(query: &str, results: &[&AircraftRecord]) -> Option<String> {
    match results {
        [only] if !query.trim().is_empty() => Some(only.id.clone()),
        _ => None,
    }
}

fn format_optional(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.0} {unit}"))
}

/// Label/value rows for the selected-aircraft panel.
fn detail_rows(aircraft: &AircraftRecord, reference: (f64, f64)) -> Vec<(&'static str, String)> {
    let (ref_lat, ref_lon) = reference;
    let distance = geo::great_circle_distance_km(ref_lat, ref_lon, aircraft.latitude, aircraft.longitude);
    let bearing = geo::bearing_deg(ref_lat, ref_lon, aircraft.latitude, aircraft.longitude);

    vec![
        ("ICAO24", aircraft.id.clone()),
        ("Country", aircraft.origin_country.clone()),
        ("Position", format!("{:.4}, {:.4}", aircraft.latitude, aircraft.longitude)),
        ("Altitude", format_optional(aircraft.barometric_altitude, "m")),
        ("Geo altitude", format_optional(aircraft.geo_altitude, "m")),
        ("Speed", format_optional(aircraft.velocity, "m/s")),
        ("Heading", format_optional(aircraft.heading, "°")),
        ("Vertical rate", aircraft.vertical_rate.map_or_else(|| "N/A".to_string(), |v| format!("{v:+.1} m/s"))),
        ("Squawk", aircraft.squawk.clone().unwrap_or_else(|| "N/A".to_string())),
        ("On ground", if aircraft.on_ground { "Yes" } else { "No" }.to_string()),
        ("Source", aircraft.position_source.label().to_string()),
        ("Distance", format!("{distance:.0} km from region center")),
        ("Bearing", format!("{bearing:.0}°")),
    ]
}

struct GlobeRadarApp {
    store: FlightStore<HttpFeedSource>,
    state_rx: watch::Receiver<SyncState>,
    state: SyncState,
    stats: FlightStats,
    bus: EventBus,
    bus_rx: broadcast::Receiver<UiEvent>,
    layer: AircraftLayer,
    camera: GlobeCamera,
    /// `None` when no 3D backend is available; the shell shows a list instead.
    scene: Option<GlobeScene>,
    degraded_reason: Option<String>,
    status_pane: StatusPane,
    search_query: String,
    hovered: Option<AircraftRecord>,
    show_shortcuts: bool,
    feedback: Option<(String, Instant)>,
    region_center: (f64, f64),
    started: Instant,
    last_frame: Instant,
}

impl GlobeRadarApp {
    fn new(cc: &eframe::CreationContext<'_>, store: FlightStore<HttpFeedSource>, config: &AppConfig) -> Self {
        let mut degraded_reason = None;
        let has_backend = render::check_backend(cc, |e| {
            error!("{e}; falling back to list view");
            degraded_reason = Some(e.to_string());
        });
        let scene = has_backend.then(|| {
            GlobeScene::new(GlobeMaterial::load(&cc.egui_ctx, config.texture_path.as_deref()))
        });

        let bus = EventBus::new();
        let bus_rx = bus.subscribe();
        let state_rx = store.subscribe();
        let now = Instant::now();

        Self {
            state: store.snapshot(),
            store,
            state_rx,
            stats: FlightStats::default(),
            bus,
            bus_rx,
            layer: AircraftLayer::new(LayerConfig {
                batch_threshold: config.batch_threshold,
                trail_velocity_threshold: config.trail_velocity_threshold,
            }),
            camera: GlobeCamera::new(config.auto_rotate),
            scene,
            degraded_reason,
            status_pane: StatusPane::new(),
            search_query: String::new(),
            hovered: None,
            show_shortcuts: false,
            feedback: None,
            region_center: config.query_region.center(),
            started: now,
            last_frame: now,
        }
    }

    fn refresh_state(&mut self) {
        if !self.state_rx.has_changed().unwrap_or(false) {
            return;
        }
        let previous = Arc::clone(&self.state.aircraft_by_id);
        self.state = self.state_rx.borrow_and_update().clone();
        if !Arc::ptr_eq(&previous, &self.state.aircraft_by_id) {
            self.stats = FlightStats::from_aircraft(self.state.aircraft_by_id.values());
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.bus_rx.try_recv() {
                Ok(event) => {
                    self.camera.handle_event(&event);
                    if let UiEvent::AircraftHover(hovered) = event {
                        self.hovered = hovered;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("UI event bus lagged, skipped {skipped} events");
                }
                Err(_) => break,
            }
        }
    }

    fn show_feedback(&mut self, message: impl Into<String>) {
        self.feedback = Some((message.into(), Instant::now()));
    }

    fn clear_selection(&mut self) {
        self.store.set_selected(None);
        self.bus.publish(UiEvent::SelectionChanged(None));
    }

    fn select(&mut self, id: &str) {
        self.store.set_selected(Some(id));
        self.bus.publish(UiEvent::SelectionChanged(Some(id.to_string())));
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (space, reset, escape, help) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Space),
                i.key_pressed(egui::Key::R),
                i.key_pressed(egui::Key::Escape),
                i.key_pressed(egui::Key::H) || i.key_pressed(egui::Key::Questionmark),
            )
        });

        if space {
            let was_paused = self.store.snapshot().paused;
            self.store.toggle_pause();
            self.show_feedback(if was_paused { "Resumed data fetching" } else { "Paused data fetching" });
        }
        if reset {
            self.bus.publish(UiEvent::ResetView);
            self.show_feedback("Reset camera view");
        }
        if escape {
            self.show_shortcuts = false;
            self.search_query.clear();
            self.clear_selection();
        }
        if help {
            self.show_shortcuts = !self.show_shortcuts;
        }
    }

    fn draw_search_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("search_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("✈ Globe Radar").strong());
                ui.separator();
                let edit = ui.add(
                    egui::TextEdit::singleline(&mut self.search_query)
                        .hint_text("Search callsign, ICAO24 or country")
                        .desired_width(280.0),
                );
                if edit.changed() {
                    let target = {
                        let results = self.state.search(&self.search_query);
                        auto_select_target(&self.search_query, &results)
                    };
                    if let Some(id) = target {
                        self.select(&id);
                    }
                }
                if !self.search_query.is_empty() && ui.button("✕").clicked() {
                    self.search_query.clear();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(self.state.status_label());
                    ui.label(format!("{} aircraft", self.state.aircraft_count()));
                });
            });
        });
    }

    fn draw_side_panel(&mut self, ctx: &egui::Context) {
        let selected = self.state.selected_aircraft().cloned();
        let mut pick = None;
        let mut deselect = false;

        egui::SidePanel::right("aircraft_panel")
            .default_width(320.0)
            .show(ctx, |ui| {
                if let Some(aircraft) = &selected {
                    ui.horizontal(|ui| {
                        ui.heading(aircraft.display_name());
                        if ui.small_button("✕").on_hover_text("Clear selection (Esc)").clicked() {
                            deselect = true;
                        }
                    });
                    egui::Grid::new("aircraft_details").num_columns(2).striped(true).show(ui, |ui| {
                        for (label, value) in detail_rows(aircraft, self.region_center) {
                            ui.label(egui::RichText::new(label).weak());
                            ui.label(egui::RichText::new(value).monospace());
                            ui.end_row();
                        }
                    });
                    ui.separator();
                }

                let results = self.state.search(&self.search_query);
                ui.label(egui::RichText::new(format!("{} matching aircraft", results.len())).weak());
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for aircraft in results {
                        let is_selected = selected.as_ref().is_some_and(|s| s.id == aircraft.id);
                        let text = format!("{:<8} {:<6} {}", aircraft.display_name(), aircraft.id, aircraft.origin_country);
                        if ui
                            .selectable_label(is_selected, egui::RichText::new(text).monospace())
                            .clicked()
                        {
                            pick = Some(aircraft.id.clone());
                        }
                    }
                });
            });

        if deselect {
            self.clear_selection();
        }
        if let Some(id) = pick {
            self.select(&id);
        }
    }

    fn draw_overlays(&mut self, ctx: &egui::Context) {
        if self
            .feedback
            .as_ref()
            .is_some_and(|(_, since)| since.elapsed() >= FEEDBACK_DURATION)
        {
            self.feedback = None;
        }
        if let Some((message, _)) = &self.feedback {
            egui::Area::new(egui::Id::new("shortcut_feedback"))
                .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 60.0))
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.label(message.as_str());
                    });
                });
        }

        if self.show_shortcuts {
            egui::Window::new("Keyboard Shortcuts")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    egui::Grid::new("shortcuts").num_columns(2).show(ui, |ui| {
                        for (key, action) in [
                            ("Space", "Pause / resume updates"),
                            ("R", "Reset camera view"),
                            ("Esc", "Clear selection and search"),
                            ("H / ?", "Toggle this help"),
                        ] {
                            ui.label(egui::RichText::new(key).monospace().strong());
                            ui.label(action);
                            ui.end_row();
                        }
                    });
                });
        }
    }

    fn draw_degraded_view(&mut self, ui: &mut egui::Ui) {
        ui.heading("3D view unavailable");
        if let Some(reason) = &self.degraded_reason {
            ui.label(egui::RichText::new(reason).weak());
        }
        ui.separator();

        let mut pick = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for aircraft in self.state.search(&self.search_query) {
                let text = format!(
                    "{:<8} {:>8.3} {:>9.3}  {}",
                    aircraft.display_name(),
                    aircraft.latitude,
                    aircraft.longitude,
                    format_optional(aircraft.barometric_altitude, "m"),
                );
                let is_selected = self.state.selected_aircraft_id.as_deref() == Some(aircraft.id.as_str());
                if ui
                    .selectable_label(is_selected, egui::RichText::new(text).monospace())
                    .clicked()
                {
                    pick = Some(aircraft.id.clone());
                }
            }
        });
        if let Some(id) = pick {
            self.select(&id);
        }
    }
}

impl eframe::App for GlobeRadarApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.refresh_state();
        self.handle_shortcuts(ctx);
        self.drain_events();
        self.camera.update(dt, &self.bus);

        self.layer.sync(&self.state.aircraft_by_id);
        self.layer.update_frame(
            now.duration_since(self.started).as_secs_f32(),
            self.state.selected_aircraft_id.as_deref(),
        );

        self.draw_search_bar(ctx);
        self.draw_side_panel(ctx);

        match self.status_pane.render(ctx, &self.state, &self.stats) {
            Some(StatusAction::Retry) => self.store.retry(),
            Some(StatusAction::TogglePause) => self.store.toggle_pause(),
            None => {}
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let Some(scene) = self.scene.as_mut() else {
                    self.draw_degraded_view(ui);
                    return;
                };

                let output = scene.show(ui, &mut self.camera, &self.layer, &self.bus);
                self.layer.handle_pointer(output.hit, output.clicked, &self.store, &self.bus);

                if output.hit.is_some() {
                    if let Some(aircraft) = &self.hovered {
                        output.response.on_hover_ui_at_pointer(|ui| {
                            ui.label(egui::RichText::new(aircraft.display_name()).strong());
                            ui.label(format!("{} · {}", aircraft.id, aircraft.origin_country));
                            ui.label(format!(
                                "Alt {} · Speed {}",
                                format_optional(aircraft.barometric_altitude, "m"),
                                format_optional(aircraft.velocity, "m/s"),
                            ));
                        });
                    }
                }
            });

        self.draw_overlays(ctx);

        // Aircraft float and pulse continuously
        if self.camera.is_animating() || !self.layer.is_empty() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(Duration::from_secs(1));
        }
    }
}
