use std::path::Path;

use eframe::egui;

use crate::data::catalog::DatasetCatalog;
use crate::data::loader;
use crate::state::{ChartOrchestrator, EventOutcome, WorkspaceEvent};
use crate::ui::{panels, plot, preview, Action};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InsightApp {
    pub catalog: DatasetCatalog,
    /// Present while at least one dataset is loaded.
    pub orchestrator: Option<ChartOrchestrator>,
    pub status_message: Option<String>,
}

impl InsightApp {
    pub fn open_path(&mut self, path: &Path) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match loader::load_file(path) {
            Ok(table) => match self.catalog.insert(&file_name, table) {
                Ok(name) => {
                    self.status_message = Some(format!("Loaded {name}"));
                    self.activate_selected();
                }
                Err(e) => {
                    log::error!("{e}");
                    self.status_message = Some(format!("Error: {e}"));
                }
            },
            Err(e) => {
                log::error!("Failed to load file: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::OpenFile => {
                if let Some(path) = pick_file() {
                    self.open_path(&path);
                }
            }
            Action::SelectDataset(name) => match self.catalog.select(&name) {
                Ok(_) => self.activate_selected(),
                Err(e) => self.status_message = Some(format!("Error: {e}")),
            },
            Action::DeleteDataset(name) => match self.catalog.remove(&name) {
                Ok(_) => {
                    self.status_message = Some(format!("Deleted {name}"));
                    self.activate_selected();
                }
                Err(e) => self.status_message = Some(format!("Error: {e}")),
            },
            Action::Workspace(event) => self.dispatch(event),
        }
    }

    /// Point the orchestrator at the catalog's active dataset.
    ///
    /// A fresh workspace opens with one default chart.
    fn activate_selected(&mut self) {
        let Some(table) = self.catalog.active().cloned() else {
            self.orchestrator = None;
            return;
        };
        if self.orchestrator.is_some() {
            self.dispatch(WorkspaceEvent::ReplaceDataset(table));
        } else {
            self.orchestrator = Some(ChartOrchestrator::new(table));
            self.dispatch(WorkspaceEvent::AddChart);
        }
    }

    fn dispatch(&mut self, event: WorkspaceEvent) {
        let Some(orchestrator) = &mut self.orchestrator else {
            return;
        };
        match orchestrator.dispatch(event) {
            Ok(EventOutcome::DatasetReplaced(report)) => {
                let mut notes = Vec::new();
                if report.global_filter_reset {
                    notes.push("global filter reset".to_string());
                }
                if !report.cleared_local_filters.is_empty() {
                    notes.push(format!(
                        "{} chart filter(s) cleared",
                        report.cleared_local_filters.len()
                    ));
                }
                if !report.refitted_configs.is_empty() {
                    notes.push(format!(
                        "{} chart(s) refitted to the new columns",
                        report.refitted_configs.len()
                    ));
                }
                if !notes.is_empty() {
                    self.status_message = Some(format!("Dataset switched: {}", notes.join(", ")));
                }
            }
            Ok(_) => {}
            Err(e) => self.status_message = Some(format!("Error: {e}")),
        }
    }
}

fn pick_file() -> Option<std::path::PathBuf> {
    rfd::FileDialog::new()
        .set_title("Open dataset")
        .add_filter("Supported files", &["csv", "json", "parquet", "pq"])
        .add_filter("CSV", &["csv"])
        .add_filter("JSON", &["json"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_file()
}

impl eframe::App for InsightApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut actions: Vec<Action> = Vec::new();

        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, self, &mut actions);
        });

        // ---- Left side panel: datasets and global filter ----
        egui::SidePanel::left("filter_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, self, &mut actions);
            });

        // ---- Central panel: preview and charts ----
        egui::CentralPanel::default().show(ctx, |ui| match &self.orchestrator {
            Some(orchestrator) => {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    preview::preview_table(ui, orchestrator.preview());
                    ui.separator();
                    for instance in orchestrator.workspace().charts() {
                        let outcome = orchestrator.output(instance.id());
                        ui.push_id(instance.id(), |ui| {
                            panels::chart_card(ui, orchestrator.workspace(), instance, &mut actions);
                            plot::chart_view(ui, instance.id(), outcome);
                        });
                        ui.separator();
                    }
                    if ui.button("➕ Add chart").clicked() {
                        actions.push(WorkspaceEvent::AddChart.into());
                    }
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.heading("Open a dataset to start  (File → Open…)");
                });
            }
        });

        for action in actions {
            self.apply(action);
        }
    }
}
