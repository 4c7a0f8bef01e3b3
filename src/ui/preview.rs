use eframe::egui::{RichText, Ui};
use egui_extras::{Column, TableBuilder};

use crate::state::Preview;

const ROW_HEIGHT: f32 = 18.0;

/// Grid of the first rows of the globally filtered table.
pub fn preview_table(ui: &mut Ui, preview: &Preview) {
    ui.horizontal(|ui: &mut Ui| {
        ui.heading("Preview");
        ui.label(format!(
            "showing {} of {} row(s)",
            preview.rows.num_rows(),
            preview.total_rows
        ));
    });

    if preview.columns.is_empty() {
        ui.label("No columns.");
        return;
    }

    let rows = &preview.rows;
    ui.push_id("preview_grid", |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .max_scroll_height(ROW_HEIGHT * 12.0)
            .columns(Column::auto().at_least(60.0), preview.columns.len())
            .header(ROW_HEIGHT + 2.0, |mut header| {
                for name in &preview.columns {
                    header.col(|ui: &mut Ui| {
                        ui.label(RichText::new(name).strong());
                    });
                }
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, rows.num_rows(), |mut row| {
                    let cells = rows.row(row.index()).unwrap_or_default();
                    for cell in cells {
                        row.col(|ui: &mut Ui| {
                            if cell.is_null() {
                                ui.weak(cell.to_string());
                            } else {
                                ui.label(cell.to_string());
                            }
                        });
                    }
                });
            });
    });
}
