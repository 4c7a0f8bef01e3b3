use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Shape, Stroke, Ui};
use egui_plot::{Bar, BarChart, Legend, Line, LineStyle, MarkerShape, Plot, PlotPoints, PlotUi, Points, Polygon};

use crate::chart::config::{ChartType, ConfigError};
use crate::chart::spec::{self, AxisScale, BarMode, ChartSpec, PlotSpec, Series};
use crate::color::{generate_palette, viridis, ColorMap};
use crate::data::model::Table;
use crate::state::{ChartId, ChartOutcome};

const HEATMAP_BINS: usize = 10;

const MARKERS: [MarkerShape; 6] = [
    MarkerShape::Circle,
    MarkerShape::Square,
    MarkerShape::Diamond,
    MarkerShape::Up,
    MarkerShape::Cross,
    MarkerShape::Asterisk,
];

/// Bar fill opacity per pattern value; egui has no hatch fills.
const PATTERN_ALPHA: [f32; 4] = [1.0, 0.55, 0.3, 0.8];

// ---------------------------------------------------------------------------
// Chart view
// ---------------------------------------------------------------------------

/// Draw one chart's output: the plot, its placeholder, or why it failed.
pub fn chart_view(ui: &mut Ui, id: ChartId, outcome: Option<&ChartOutcome>) {
    let output = match outcome {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            ui.colored_label(Color32::RED, format!("Cannot draw chart: {e}"));
            return;
        }
        None => return,
    };
    let skipped = output.filter_report.unparsed_timestamps;
    if skipped > 0 {
        ui.colored_label(
            Color32::YELLOW,
            format!("{skipped} row(s) with unreadable time values excluded"),
        );
    }

    let result = match &output.spec {
        ChartSpec::Placeholder { label, height } => {
            placeholder(ui, label, *height);
            Ok(())
        }
        ChartSpec::Plot(plot) => match plot.chart_type {
            ChartType::Line | ChartType::Bar => series_plot(ui, id, &output.data, plot),
            ChartType::Pie => pie_chart(ui, &output.data, plot),
            ChartType::Heatmap => heatmap(ui, id, &output.data, plot),
        },
    };
    if let Err(e) = result {
        ui.colored_label(Color32::RED, format!("Cannot draw chart: {e}"));
    }
}

fn placeholder(ui: &mut Ui, label: &str, height: u32) {
    let size = egui::vec2(ui.available_width(), height as f32);
    ui.allocate_ui(size, |ui: &mut Ui| {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading(label);
        });
    });
}

fn x_scale(data: &Table, plot: &PlotSpec) -> AxisScale {
    data.column(&plot.x_field)
        .map_or(AxisScale::Numeric, AxisScale::for_column)
}

fn base_plot(id: impl std::hash::Hash, plot: &PlotSpec, scale: &AxisScale, height: f32) -> Plot<'static> {
    let scale = scale.clone();
    Plot::new(id)
        .height(height)
        .legend(Legend::default())
        .x_axis_label(plot.x_field.clone())
        .y_axis_label(plot.y_field.clone())
        .x_axis_formatter(move |mark, _range| scale.label(mark.value))
}

// ---------------------------------------------------------------------------
// Line and bar charts
// ---------------------------------------------------------------------------

/// Position of each distinct value of one encoding, used to pick a style.
struct StyleIndex(Vec<String>);

impl StyleIndex {
    fn new<'a>(values: impl Iterator<Item = Option<&'a String>>) -> Self {
        let distinct: BTreeSet<String> = values.flatten().cloned().collect();
        Self(distinct.into_iter().collect())
    }

    fn of(&self, value: Option<&String>) -> usize {
        value
            .and_then(|v| self.0.binary_search(v).ok())
            .unwrap_or(0)
    }
}

fn legend_name(series: &Series, plot: &PlotSpec) -> String {
    let label = series.key.label();
    if label.is_empty() {
        plot.y_field.clone()
    } else {
        label
    }
}

fn line_style(index: usize) -> LineStyle {
    match index % 4 {
        0 => LineStyle::Solid,
        1 => LineStyle::dashed_loose(),
        2 => LineStyle::dotted_dense(),
        _ => LineStyle::dashed_dense(),
    }
}

fn series_plot(ui: &mut Ui, id: ChartId, data: &Table, plot: &PlotSpec) -> Result<(), ConfigError> {
    let all = spec::series(data, plot)?;
    let scale = x_scale(data, plot);
    let colors = ColorMap::for_series(&all);

    let mut facets: BTreeMap<Option<&String>, Vec<&Series>> = BTreeMap::new();
    for s in &all {
        facets.entry(s.key.facet.as_ref()).or_default().push(s);
    }
    let height = plot.height as f32 / facets.len().max(1) as f32;

    for (facet, members) in facets {
        if let (Some(field), Some(value)) = (&plot.encodings.facet, facet) {
            ui.label(format!("{field} = {value}"));
        }
        let plot_id = format!("{id}_{}", facet.map_or("", String::as_str));
        base_plot(plot_id, plot, &scale, height).show(ui, |plot_ui: &mut PlotUi| {
            match plot.chart_type {
                ChartType::Bar => draw_bars(plot_ui, plot, &scale, &colors, &members),
                _ => draw_lines(plot_ui, plot, &scale, &colors, &members),
            }
        });
    }
    Ok(())
}

fn draw_lines(plot_ui: &mut PlotUi, plot: &PlotSpec, scale: &AxisScale, colors: &ColorMap, members: &[&Series]) {
    let symbols = StyleIndex::new(members.iter().map(|s| s.key.symbol.as_ref()));
    let dashes = StyleIndex::new(members.iter().map(|s| s.key.dash.as_ref()));

    for s in members {
        let color = colors.color_for(s.key.color.as_deref());
        let name = legend_name(s, plot);
        let points: Vec<[f64; 2]> = s
            .points
            .iter()
            .filter_map(|p| Some([scale.position(&p.x)?, p.y?]))
            .collect();

        plot_ui.line(
            Line::new(PlotPoints::from(points.clone()))
                .name(&name)
                .color(color)
                .style(line_style(dashes.of(s.key.dash.as_ref())))
                .width(1.5),
        );
        if plot.markers {
            plot_ui.points(
                Points::new(PlotPoints::from(points))
                    .name(&name)
                    .color(color)
                    .shape(MARKERS[symbols.of(s.key.symbol.as_ref()) % MARKERS.len()])
                    .radius(3.0),
            );
        }
    }
}

/// Smallest gap between distinct positions, or 1 when there is none.
fn slot_width(positions: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = positions.collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    let gap = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min);
    if gap.is_finite() && gap > 0.0 {
        gap
    } else {
        1.0
    }
}

fn draw_bars(plot_ui: &mut PlotUi, plot: &PlotSpec, scale: &AxisScale, colors: &ColorMap, members: &[&Series]) {
    let patterns = StyleIndex::new(members.iter().map(|s| s.key.pattern.as_ref()));
    let slot = 0.8
        * slot_width(
            members
                .iter()
                .flat_map(|s| s.points.iter())
                .filter_map(|p| scale.position(&p.x)),
        );
    let stacked = plot.bar_mode == Some(BarMode::Stack);
    let width = if stacked { slot } else { slot / members.len().max(1) as f64 };

    // Running totals per x position, split by sign so stacks grow outwards.
    let mut positive: BTreeMap<u64, f64> = BTreeMap::new();
    let mut negative: BTreeMap<u64, f64> = BTreeMap::new();

    for (i, s) in members.iter().enumerate() {
        let color = colors.color_for(s.key.color.as_deref());
        let alpha = PATTERN_ALPHA[patterns.of(s.key.pattern.as_ref()) % PATTERN_ALPHA.len()];
        let offset = if stacked {
            0.0
        } else {
            (i as f64 - (members.len() as f64 - 1.0) / 2.0) * width
        };

        let bars: Vec<Bar> = s
            .points
            .iter()
            .filter_map(|p| Some((scale.position(&p.x)?, p.y?)))
            .map(|(x, y)| {
                let mut bar = Bar::new(x + offset, y)
                    .width(width)
                    .fill(color.gamma_multiply(alpha))
                    .stroke(Stroke::new(1.0, color));
                if stacked {
                    let totals = if y >= 0.0 { &mut positive } else { &mut negative };
                    let base = totals.entry(x.to_bits()).or_insert(0.0);
                    bar = bar.base_offset(*base);
                    *base += y;
                }
                bar
            })
            .collect();

        plot_ui.bar_chart(BarChart::new(bars).name(legend_name(s, plot)).color(color));
    }
}

// ---------------------------------------------------------------------------
// Pie chart
// ---------------------------------------------------------------------------

fn pie_chart(ui: &mut Ui, data: &Table, plot: &PlotSpec) -> Result<(), ConfigError> {
    let slices = spec::pie_slices(data, plot)?;
    let total: f64 = slices.iter().map(|s| s.value).sum();
    let palette = generate_palette(slices.len());

    ui.horizontal(|ui: &mut Ui| {
        let side = (plot.height as f32).min(ui.available_width() * 0.6);
        let (response, painter) = ui.allocate_painter(egui::vec2(side, side), Sense::hover());
        let rect: Rect = response.rect;
        let center = rect.center();
        let radius = side * 0.45;

        let mut angle = -std::f32::consts::FRAC_PI_2;
        for (slice, color) in slices.iter().zip(&palette) {
            let sweep = (slice.value / total) as f32 * std::f32::consts::TAU;
            // Convex pieces no wider than ~10 degrees.
            let steps = ((sweep / 0.17).ceil() as usize).max(1);
            for step in 0..steps {
                let a0 = angle + sweep * step as f32 / steps as f32;
                let a1 = angle + sweep * (step + 1) as f32 / steps as f32;
                let arc = |a: f32| Pos2::new(center.x + radius * a.cos(), center.y + radius * a.sin());
                painter.add(Shape::convex_polygon(
                    vec![center, arc(a0), arc(a1)],
                    *color,
                    Stroke::NONE,
                ));
            }
            angle += sweep;
        }

        ui.vertical(|ui: &mut Ui| {
            ui.strong(&plot.x_field);
            for (slice, color) in slices.iter().zip(&palette) {
                let share = 100.0 * slice.value / total;
                ui.colored_label(*color, format!("■ {}  {:.1}%", slice.label, share));
            }
        });
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

fn heatmap(ui: &mut Ui, id: ChartId, data: &Table, plot: &PlotSpec) -> Result<(), ConfigError> {
    let cells = spec::heatmap_cells(data, plot, HEATMAP_BINS)?;
    let scale = x_scale(data, plot);
    let half = 0.5 * slot_width(cells.iter().filter_map(|c| scale.position(&c.x)));
    let (lo, hi) = cells.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.intensity), hi.max(c.intensity))
    });
    let span = if hi > lo { hi - lo } else { 1.0 };

    base_plot(format!("{id}_heatmap"), plot, &scale, plot.height as f32).show(ui, |plot_ui: &mut PlotUi| {
            for cell in &cells {
                let Some(x) = scale.position(&cell.x) else {
                    continue;
                };
                let (y0, y1) = cell.y_range;
                let fill = viridis((cell.intensity - lo) / span);
                let corners = vec![[x - half, y0], [x + half, y0], [x + half, y1], [x - half, y1]];
                plot_ui.polygon(
                    Polygon::new(PlotPoints::from(corners))
                        .fill_color(fill)
                        .stroke(Stroke::new(0.5, fill)),
                );
            }
        });
    Ok(())
}
