use chrono::{NaiveDate, NaiveDateTime};
use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;

use crate::app::InsightApp;
use crate::chart::config::{Aggregation, ChartConfigPatch, ChartType, HEIGHT_STEP, MAX_HEIGHT, MIN_HEIGHT};
use crate::data::filter::{self, FilterSpec};
use crate::data::model::Table;
use crate::state::{ChartInstance, Workspace, WorkspaceEvent};
use crate::ui::Action;

const NONE_LABEL: &str = "None";

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, app: &InsightApp, actions: &mut Vec<Action>) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                actions.push(Action::OpenFile);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(orchestrator) = &app.orchestrator {
            let preview = orchestrator.preview();
            ui.label(format!(
                "{} rows loaded, {} after global filter, {} chart(s)",
                orchestrator.workspace().table().num_rows(),
                preview.total_rows,
                orchestrator.workspace().len()
            ));
            let skipped = orchestrator.base_report().unparsed_timestamps;
            if skipped > 0 {
                ui.label(
                    RichText::new(format!("{skipped} row(s) with unreadable time values excluded"))
                        .color(Color32::YELLOW),
                );
            }
        }

        ui.separator();

        if let Some(msg) = &app.status_message {
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                Color32::GRAY
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// Left side panel – datasets and global filter
// ---------------------------------------------------------------------------

/// Render the left panel.
pub fn side_panel(ui: &mut Ui, app: &InsightApp, actions: &mut Vec<Action>) {
    ui.heading("Datasets");
    ui.separator();

    if app.catalog.is_empty() {
        ui.label("No dataset loaded.");
        if ui.button("Open…").clicked() {
            actions.push(Action::OpenFile);
        }
        return;
    }

    let active = app.catalog.active_name().unwrap_or_default().to_string();
    egui::ComboBox::from_id_salt("dataset_picker")
        .selected_text(&active)
        .show_ui(ui, |ui: &mut Ui| {
            for name in app.catalog.names() {
                if ui.selectable_label(name == active, name).clicked() && name != active {
                    actions.push(Action::SelectDataset(name.to_string()));
                }
            }
        });
    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Open…").clicked() {
            actions.push(Action::OpenFile);
        }
        if ui.button("Delete").clicked() {
            actions.push(Action::DeleteDataset(active.clone()));
        }
    });

    let Some(orchestrator) = &app.orchestrator else {
        return;
    };
    let workspace = orchestrator.workspace();

    ui.add_space(8.0);
    ui.heading("Filters");
    ui.separator();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            if let Some(spec) = filter_editor(ui, "global", workspace.table(), workspace.global_filter()) {
                actions.push(WorkspaceEvent::UpdateGlobalFilter(spec).into());
            }
        });
}

// ---------------------------------------------------------------------------
// Filter editor (shared by the global and per-chart filters)
// ---------------------------------------------------------------------------

/// Widgets for one [`FilterSpec`]. Returns the edited spec when anything changed.
pub fn filter_editor(ui: &mut Ui, id: &str, table: &Table, spec: &FilterSpec) -> Option<FilterSpec> {
    let mut updated = None;
    let columns = table.column_names();

    // ---- Categorical rule ----
    ui.strong("Filter by values of");
    if let Some(column) = optional_column_combo(ui, &format!("{id}_title_col"), &columns, spec.title_column()) {
        // A newly picked column starts with its first few values selected.
        let values = column
            .as_deref()
            .and_then(|c| filter::unique_values(table, c).ok())
            .unwrap_or_default();
        updated = Some(
            spec.clone()
                .with_title_column(column)
                .with_title_values(filter::default_selection(&values)),
        );
    }

    if let Some(column) = spec.title_column() {
        let values = filter::unique_values(table, column).unwrap_or_default();
        let selected = spec.title_values();
        let header = format!("{column}  ({}/{})", selected.len(), values.len());
        egui::CollapsingHeader::new(RichText::new(header).strong())
            .id_salt(format!("{id}_values"))
            .default_open(false)
            .show(ui, |ui: &mut Ui| {
                ui.horizontal(|ui: &mut Ui| {
                    if ui.small_button("All").clicked() {
                        updated = Some(spec.clone().with_title_values(values.iter().cloned()));
                    }
                    if ui.small_button("None").clicked() {
                        updated = Some(spec.clone().with_title_values(Vec::<String>::new()));
                    }
                });
                for value in &values {
                    let mut checked = selected.contains(value);
                    if ui.checkbox(&mut checked, value.as_str()).changed() {
                        let mut next = selected.clone();
                        if checked {
                            next.insert(value.clone());
                        } else {
                            next.remove(value);
                        }
                        updated = Some(spec.clone().with_title_values(next));
                    }
                }
            });
    }

    ui.add_space(6.0);

    // ---- Temporal rule ----
    ui.strong("Time column");
    if let Some(column) = optional_column_combo(ui, &format!("{id}_time_col"), &columns, spec.time_column()) {
        let range = column
            .as_deref()
            .and_then(|c| filter::default_range(table, c).ok().flatten());
        updated = Some(
            spec.clone()
                .with_time_column(column)
                .with_range(range.map(|r| r.0), range.map(|r| r.1)),
        );
    }

    if let Some(column) = spec.time_column() {
        match (spec.start(), spec.end()) {
            (Some(start), Some(end)) => {
                let mut start_date = start.date();
                let mut end_date = end.date();
                let mut changed = false;
                ui.horizontal(|ui: &mut Ui| {
                    ui.label("From");
                    changed |= ui
                        .add(DatePickerButton::new(&mut start_date).id_salt(&format!("{id}_start")))
                        .changed();
                    ui.label("to");
                    changed |= ui
                        .add(DatePickerButton::new(&mut end_date).id_salt(&format!("{id}_end")))
                        .changed();
                });
                if changed {
                    updated = Some(
                        spec.clone()
                            .with_range(Some(midnight(start_date)), Some(midnight(end_date))),
                    );
                }
            }
            _ => {
                ui.label(
                    RichText::new(format!("'{column}' has no readable dates"))
                        .color(Color32::YELLOW),
                );
            }
        }
    }

    updated
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Column picker with a leading "None" entry. Returns the new choice if changed.
fn optional_column_combo(
    ui: &mut Ui,
    id: &str,
    columns: &[String],
    current: Option<&str>,
) -> Option<Option<String>> {
    let mut choice = None;
    egui::ComboBox::from_id_salt(id)
        .selected_text(current.unwrap_or(NONE_LABEL))
        .show_ui(ui, |ui: &mut Ui| {
            if ui.selectable_label(current.is_none(), NONE_LABEL).clicked() && current.is_some() {
                choice = Some(None);
            }
            for col in columns {
                let is_current = current == Some(col.as_str());
                if ui.selectable_label(is_current, col).clicked() && !is_current {
                    choice = Some(Some(col.clone()));
                }
            }
        });
    choice
}

fn column_combo(ui: &mut Ui, id: &str, columns: &[String], current: &str) -> Option<String> {
    let mut choice = None;
    egui::ComboBox::from_id_salt(id)
        .selected_text(current)
        .show_ui(ui, |ui: &mut Ui| {
            for col in columns {
                if ui.selectable_label(col == current, col).clicked() && col != current {
                    choice = Some(col.clone());
                }
            }
        });
    choice
}

// ---------------------------------------------------------------------------
// Chart card – per-chart configuration
// ---------------------------------------------------------------------------

/// Controls for one chart: type, axes, aggregation, encodings, height, local filter.
pub fn chart_card(ui: &mut Ui, workspace: &Workspace, instance: &ChartInstance, actions: &mut Vec<Action>) {
    let id = instance.id();
    let config = instance.config();
    let options = workspace.column_options();
    let mut patch = ChartConfigPatch::default();

    ui.horizontal(|ui: &mut Ui| {
        ui.heading(id.to_string());
        if ui.button("🗑 Remove").clicked() {
            actions.push(WorkspaceEvent::RemoveChart(id).into());
        }
    });

    egui::Grid::new(format!("{id}_config"))
        .num_columns(2)
        .spacing([12.0, 4.0])
        .show(ui, |ui: &mut Ui| {
            ui.label("Chart type");
            egui::ComboBox::from_id_salt(format!("{id}_type"))
                .selected_text(config.chart_type.to_string())
                .show_ui(ui, |ui: &mut Ui| {
                    for chart_type in ChartType::ALL {
                        let is_current = chart_type == config.chart_type;
                        if ui.selectable_label(is_current, chart_type.to_string()).clicked() && !is_current {
                            patch.chart_type = Some(chart_type.to_string());
                        }
                    }
                });
            ui.end_row();

            ui.label("X axis");
            patch.x_axis = column_combo(ui, &format!("{id}_x"), &options.all, &config.x_axis);
            ui.end_row();

            ui.label("Y axis");
            patch.y_axis = column_combo(ui, &format!("{id}_y"), &options.numeric, &config.y_axis);
            ui.end_row();

            ui.label("Aggregation");
            egui::ComboBox::from_id_salt(format!("{id}_agg"))
                .selected_text(config.aggregation.label())
                .show_ui(ui, |ui: &mut Ui| {
                    for aggregation in Aggregation::ALL {
                        let is_current = aggregation == config.aggregation;
                        if ui.selectable_label(is_current, aggregation.label()).clicked() && !is_current {
                            patch.aggregation = Some(aggregation.label().to_string());
                        }
                    }
                });
            ui.end_row();

            ui.label("Color");
            patch.color_dimension = optional_column_combo(
                ui,
                &format!("{id}_color"),
                &options.all,
                config.color_dimension.as_deref(),
            );
            ui.end_row();

            if let Some(label) = config.chart_type.secondary_a_label() {
                ui.label(label);
                patch.secondary_dimension_a = optional_column_combo(
                    ui,
                    &format!("{id}_dim_a"),
                    &options.all,
                    config.secondary_dimension_a.as_deref(),
                );
                ui.end_row();
            }

            if let Some(label) = config.chart_type.secondary_b_label() {
                ui.label(label);
                patch.secondary_dimension_b = optional_column_combo(
                    ui,
                    &format!("{id}_dim_b"),
                    &options.all,
                    config.secondary_dimension_b.as_deref(),
                );
                ui.end_row();
            }

            ui.label("Height");
            let mut height = config.height;
            let slider = egui::Slider::new(&mut height, MIN_HEIGHT..=MAX_HEIGHT)
                .step_by(f64::from(HEIGHT_STEP))
                .suffix(" px");
            if ui.add(slider).changed() {
                patch.height = Some(i64::from(height));
            }
            ui.end_row();
        });

    if patch != ChartConfigPatch::default() {
        actions.push(WorkspaceEvent::UpdateChartConfig(id, patch).into());
    }

    // ---- Local filter ----
    egui::CollapsingHeader::new("Chart filter")
        .id_salt(format!("{id}_filter"))
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            let mut enabled = instance.local_filter().is_some();
            if ui.checkbox(&mut enabled, "Apply a filter to this chart only").changed() {
                let spec = enabled.then(FilterSpec::new);
                actions.push(WorkspaceEvent::UpdateLocalFilter(id, spec).into());
            }
            if let Some(local) = instance.local_filter() {
                if let Some(spec) = filter_editor(ui, &id.to_string(), workspace.table(), local) {
                    actions.push(WorkspaceEvent::UpdateLocalFilter(id, Some(spec)).into());
                }
            }
        });
}
