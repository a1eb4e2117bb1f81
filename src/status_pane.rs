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

use eframe::egui;
use opensky_client::{ErrorKind, FlightStats, PollingState, SyncError, SyncState};

const LABEL_COLOR: egui::Color32 = egui::Color32::from_rgb(130, 130, 130);
const VALUE_COLOR: egui::Color32 = egui::Color32::from_rgb(200, 200, 200);
const HEADER_COLOR: egui::Color32 = egui::Color32::from_rgb(150, 150, 150);

/// Buttons pressed in the status pane this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Retry,
    TogglePause,
}

/// Colored indicator for the connection line: color, text, icon.
fn status_indicator(state: &SyncState) -> (egui::Color32, &'static str, &'static str) {
    if state.loading {
        (egui::Color32::from_rgb(255, 200, 100), "LOADING", "◐")
    } else if state.paused {
        (egui::Color32::from_rgb(150, 180, 255), "PAUSED", "‖")
    } else if state.polling == PollingState::RateLimited {
        (egui::Color32::from_rgb(255, 170, 60), "RATE LIMITED", "◔")
    } else if state.connected {
        (egui::Color32::from_rgb(100, 255, 100), "CONNECTED", "●")
    } else {
        (egui::Color32::from_rgb(150, 150, 150), "DISCONNECTED", "○")
    }
}

/// One-line description of the last error for the pane.
fn error_summary(error: &SyncError) -> String {
    if error.is_rate_limited() {
        return "Rate limited by server, updates resume shortly".to_string();
    }
    match error.kind {
        ErrorKind::Network => format!("Network error: {}", error.message),
        ErrorKind::Api => match error.status {
            Some(status) => format!("API error ({status}): {}", error.message),
            None => format!("API error: {}", error.message),
        },
        ErrorKind::Data => format!("Data error: {}", error.message),
        ErrorKind::Unknown => format!("Error: {}", error.message),
    }
}

/// Human-readable age of the last visible update.
fn format_age(last_update_ms: Option<i64>, now_ms: i64) -> String {
    let Some(last) = last_update_ms else {
        return "never".to_string();
    };
    let secs = (now_ms - last).max(0) / 1000;
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m {}s ago", secs / 60, secs % 60)
    } else {
        format!("{}h {}m ago", secs / 3600, (secs % 3600) / 60)
    }
}

fn row(ui: &mut egui::Ui, label: &str, value: impl Into<String>) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).color(LABEL_COLOR).size(9.0));
        ui.label(egui::RichText::new(value.into()).color(VALUE_COLOR).size(9.0).monospace());
    });
}

#[derive(Debug)]
pub struct StatusPane {
    pub visible: bool,
    pub collapsed: bool,
}

impl StatusPane {
    pub fn new() -> Self {
        Self {
            visible: true,
            collapsed: false,
        }
    }

    /// Render the status pane as a floating window
    pub fn render(&mut self, ctx: &egui::Context, state: &SyncState, stats: &FlightStats) -> Option<StatusAction> {
        let mut action = None;

        if !self.visible {
            egui::Window::new("show_status")
                .title_bar(false)
                .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
                .fixed_size(egui::vec2(140.0, 35.0))
                .resizable(false)
                .frame(egui::Frame::window(&ctx.style())
                    .fill(egui::Color32::from_rgba_unmultiplied(25, 30, 35, 200))
                    .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(60, 80, 100)))
                    .corner_radius(6.0))
                .show(ctx, |ui| {
                    if ui.button(egui::RichText::new("📊 Show Status")
                        .color(egui::Color32::from_rgb(150, 200, 220))
                        .size(11.0))
                        .clicked() {
                        self.visible = true;
                    }
                });
            return None;
        }

        egui::Window::new("Flight Status")
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
            .fixed_size(egui::vec2(260.0, if self.collapsed { 40.0 } else { 300.0 }))
            .resizable(false)
            .collapsible(false)
            .frame(egui::Frame::window(&ctx.style())
                .fill(egui::Color32::from_rgba_unmultiplied(25, 30, 35, 230))
                .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(60, 80, 100)))
                .corner_radius(6.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("◈ STATUS")
                        .color(egui::Color32::from_rgb(100, 180, 220))
                        .size(12.0)
                        .strong());

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button(egui::RichText::new("✕")
                            .size(12.0)
                            .color(egui::Color32::from_rgb(200, 100, 100)))
                            .on_hover_text("Hide status pane")
                            .clicked() {
                            self.visible = false;
                        }

                        ui.add_space(4.0);

                        let collapse_icon = if self.collapsed { "▼" } else { "▲" };
                        if ui.button(egui::RichText::new(collapse_icon).size(10.0))
                            .on_hover_text(if self.collapsed { "Expand" } else { "Collapse" })
                            .clicked() {
                            self.collapsed = !self.collapsed;
                        }
                    });
                });

                if self.collapsed {
                    return;
                }

                ui.separator();
                action = Self::render_connection_section(ui, state);
                ui.add_space(6.0);
                Self::render_stats_section(ui, stats);
            });

        action
    }

    fn render_connection_section(ui: &mut egui::Ui, state: &SyncState) -> Option<StatusAction> {
        let mut action = None;

        ui.label(egui::RichText::new("FEED").color(HEADER_COLOR).size(9.0).strong());
        ui.add_space(2.0);

        ui.horizontal(|ui| {
            let (color, text, icon) = status_indicator(state);
            ui.label(egui::RichText::new(icon).color(color).size(10.0));
            ui.label(egui::RichText::new(text).color(color).size(10.0).monospace().strong());
        });

        row(ui, "Aircraft:", state.aircraft_count().to_string());
        row(
            ui,
            "Updated:",
            format_age(state.last_update_timestamp, chrono::Utc::now().timestamp_millis()),
        );

        if let Some(error) = &state.last_error {
            let color = if error.is_rate_limited() {
                egui::Color32::from_rgb(255, 200, 100)
            } else {
                egui::Color32::from_rgb(255, 100, 100)
            };
            ui.label(egui::RichText::new(error_summary(error)).color(color).size(9.0));
        }

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui.add_enabled(!state.loading, egui::Button::new("⟳ Retry")).clicked() {
                action = Some(StatusAction::Retry);
            }
            let pause_label = if state.paused { "▶ Resume" } else { "⏸ Pause" };
            if ui.button(pause_label).on_hover_text("Space").clicked() {
                action = Some(StatusAction::TogglePause);
            }
        });

        action
    }

    fn render_stats_section(ui: &mut egui::Ui, stats: &FlightStats) {
        ui.label(egui::RichText::new("STATISTICS").color(HEADER_COLOR).size(10.0).strong());
        ui.add_space(3.0);

        row(ui, "Total:", stats.total.to_string());
        row(
            ui,
            "In flight:",
            format!("{} ({:.0}%)", stats.in_flight, stats.in_flight_percent()),
        );
        row(
            ui,
            "On ground:",
            format!("{} ({:.0}%)", stats.on_ground, stats.on_ground_percent()),
        );
        row(ui, "Avg altitude:", format!("{:.0} m", stats.avg_altitude));
        row(ui, "Avg speed:", format!("{:.0} m/s", stats.avg_speed));
        row(ui, "Countries:", stats.countries.to_string());
    }
}
