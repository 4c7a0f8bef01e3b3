use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Serialize;

use super::config::{Aggregation, ChartConfig, ChartType, ConfigError};
use crate::data::model::{CellValue, Column, ColumnType, Table};

pub const EMPTY_LABEL: &str = "No data after filtering";
pub const HEATMAP_COLOR_SCALE: &str = "Viridis";

// ---------------------------------------------------------------------------
// Declarative chart specification
// ---------------------------------------------------------------------------

/// What a renderer needs to draw one chart, independent of any plotting library.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    /// Shown instead of axes when there is nothing to plot.
    Placeholder { label: String, height: u32 },
    Plot(PlotSpec),
}

impl ChartSpec {
    pub fn height(&self) -> u32 {
        match self {
            ChartSpec::Placeholder { height, .. } => *height,
            ChartSpec::Plot(plot) => plot.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSpec {
    pub chart_type: ChartType,
    /// Category field for pie charts.
    pub x_field: String,
    /// Slice size for pie charts.
    pub y_field: String,
    pub encodings: Encodings,
    /// Whether line charts draw a marker on every point.
    pub markers: bool,
    pub bar_mode: Option<BarMode>,
    pub heatmap: Option<HeatmapIntensity>,
    pub height: u32,
}

/// Columns mapped to visual channels. Unused channels stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Encodings {
    pub color: Option<String>,
    pub symbol: Option<String>,
    pub dash: Option<String>,
    pub pattern: Option<String>,
    pub facet: Option<String>,
}

impl Encodings {
    fn fields(&self) -> [Option<&str>; 5] {
        [
            self.color.as_deref(),
            self.symbol.as_deref(),
            self.dash.as_deref(),
            self.pattern.as_deref(),
            self.facet.as_deref(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarMode {
    Stack,
    Group,
}

/// How heatmap cells are shaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapIntensity {
    /// Reduced field; `None` counts raw rows per cell.
    pub field: Option<String>,
    pub function: Aggregation,
    pub color_scale: &'static str,
}

/// Build the chart specification for already aggregated data.
///
/// Empty data produces a placeholder rather than an error.
pub fn derive(data: &Table, config: &ChartConfig) -> ChartSpec {
    if data.is_empty() {
        return ChartSpec::Placeholder {
            label: EMPTY_LABEL.to_string(),
            height: config.height,
        };
    }

    let mut encodings = Encodings {
        color: config.color_dimension.clone(),
        ..Encodings::default()
    };
    let mut bar_mode = None;
    let mut heatmap = None;
    match config.chart_type {
        ChartType::Line => {
            encodings.symbol = config.secondary_dimension_a.clone();
            encodings.dash = config.secondary_dimension_b.clone();
        }
        ChartType::Bar => {
            encodings.pattern = config.secondary_dimension_a.clone();
            encodings.facet = config.secondary_dimension_b.clone();
            bar_mode = Some(if encodings.color.is_some() {
                BarMode::Stack
            } else {
                BarMode::Group
            });
        }
        ChartType::Pie => {}
        ChartType::Heatmap => {
            // A heatmap has no series; the colour channel shades the cells.
            encodings.color = None;
            heatmap = Some(match config.aggregation {
                Aggregation::None => HeatmapIntensity {
                    field: None,
                    function: Aggregation::Count,
                    color_scale: HEATMAP_COLOR_SCALE,
                },
                function => HeatmapIntensity {
                    field: Some(config.y_axis.clone()),
                    function,
                    color_scale: HEATMAP_COLOR_SCALE,
                },
            });
        }
    }

    ChartSpec::Plot(PlotSpec {
        chart_type: config.chart_type,
        x_field: config.x_axis.clone(),
        y_field: config.y_axis.clone(),
        encodings,
        markers: config.chart_type == ChartType::Line,
        bar_mode,
        heatmap,
        height: config.height,
    })
}

// ---------------------------------------------------------------------------
// Series extraction
// ---------------------------------------------------------------------------

/// Values of the encoding columns shared by every point of a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub color: Option<String>,
    pub symbol: Option<String>,
    pub dash: Option<String>,
    pub pattern: Option<String>,
    pub facet: Option<String>,
}

impl SeriesKey {
    /// Legend text, e.g. `north, circle`.
    pub fn label(&self) -> String {
        [&self.color, &self.symbol, &self.dash, &self.pattern, &self.facet]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: CellValue,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: SeriesKey,
    pub points: Vec<SeriesPoint>,
}

/// Split plotted data into one series per distinct combination of encodings.
/// Series are ordered by key; points keep row order.
pub fn series(data: &Table, plot: &PlotSpec) -> Result<Vec<Series>, ConfigError> {
    let x = field(data, "x_axis", &plot.x_field)?;
    let y = field(data, "y_axis", &plot.y_field)?;
    let channels = plot
        .encodings
        .fields()
        .map(|name| name.map(|n| field(data, "encoding", n)).transpose());
    let [color, symbol, dash, pattern, facet] = channels;
    let (color, symbol, dash, pattern, facet) = (color?, symbol?, dash?, pattern?, facet?);

    let key_at = |column: Option<&Column>, row: usize| column.map(|c| c.values()[row].to_string());

    let mut grouped: BTreeMap<SeriesKey, Vec<SeriesPoint>> = BTreeMap::new();
    for row in 0..data.num_rows() {
        let key = SeriesKey {
            color: key_at(color, row),
            symbol: key_at(symbol, row),
            dash: key_at(dash, row),
            pattern: key_at(pattern, row),
            facet: key_at(facet, row),
        };
        grouped.entry(key).or_default().push(SeriesPoint {
            x: x.values()[row].clone(),
            y: y.values()[row].as_f64(),
        });
    }
    Ok(grouped
        .into_iter()
        .map(|(key, points)| Series { key, points })
        .collect())
}

// ---------------------------------------------------------------------------
// Pie slices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
}

/// Sum the value field per category label, in label order. Missing and
/// non-positive totals get no slice.
pub fn pie_slices(data: &Table, plot: &PlotSpec) -> Result<Vec<PieSlice>, ConfigError> {
    let names = field(data, "x_axis", &plot.x_field)?;
    let values = field(data, "y_axis", &plot.y_field)?;

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for (name, value) in names.values().iter().zip(values.values()) {
        if let Some(v) = value.as_f64() {
            *totals.entry(name.to_string()).or_default() += v;
        }
    }
    Ok(totals
        .into_iter()
        .filter(|(_, value)| *value > 0.0)
        .map(|(label, value)| PieSlice { label, value })
        .collect())
}

// ---------------------------------------------------------------------------
// Heatmap cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub x: CellValue,
    /// Half-open y interval `[lo, hi)`; the top bin is closed.
    pub y_range: (f64, f64),
    pub intensity: f64,
}

/// Bin the y-axis into `bins` equal-width intervals and shade each (x, bin) cell.
pub fn heatmap_cells(data: &Table, plot: &PlotSpec, bins: usize) -> Result<Vec<HeatCell>, ConfigError> {
    let x = field(data, "x_axis", &plot.x_field)?;
    let y = field(data, "y_axis", &plot.y_field)?;
    let function = plot
        .heatmap
        .as_ref()
        .map_or(Aggregation::Count, |h| h.function);

    let ys: Vec<Option<f64>> = y.values().iter().map(CellValue::as_f64).collect();
    let (lo, hi) = ys
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !lo.is_finite() || bins == 0 {
        return Ok(Vec::new());
    }
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut cells: BTreeMap<(CellValue, usize), Vec<f64>> = BTreeMap::new();
    for (row, value) in ys.iter().enumerate() {
        let Some(v) = value else { continue };
        let bin = (((v - lo) / width) as usize).min(bins - 1);
        cells
            .entry((x.values()[row].clone(), bin))
            .or_default()
            .push(*v);
    }

    Ok(cells
        .into_iter()
        .map(|((x, bin), values)| {
            let intensity = match function {
                Aggregation::None | Aggregation::Count => values.len() as f64,
                Aggregation::Sum => values.iter().sum(),
                Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
                Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            let start = lo + bin as f64 * width;
            HeatCell {
                x,
                y_range: (start, start + width),
                intensity,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Axis scales
// ---------------------------------------------------------------------------

/// Maps x values to plot positions and back to tick labels.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisScale {
    Numeric,
    /// Seconds since the Unix epoch.
    Temporal,
    /// Position is the index into the sorted distinct labels.
    Categorical(Vec<String>),
}

impl AxisScale {
    pub fn for_column(column: &Column) -> Self {
        match column.kind() {
            ColumnType::Integer | ColumnType::Float => AxisScale::Numeric,
            ColumnType::Timestamp => AxisScale::Temporal,
            ColumnType::Boolean | ColumnType::String => {
                let mut labels: Vec<String> =
                    column.values().iter().map(|v| v.to_string()).collect();
                labels.sort();
                labels.dedup();
                AxisScale::Categorical(labels)
            }
        }
    }

    pub fn position(&self, value: &CellValue) -> Option<f64> {
        match (self, value) {
            (AxisScale::Numeric, v) => v.as_f64(),
            (AxisScale::Temporal, CellValue::Timestamp(ts)) => {
                Some(ts.and_utc().timestamp() as f64)
            }
            (AxisScale::Temporal, _) => None,
            (AxisScale::Categorical(labels), v) => labels
                .binary_search(&v.to_string())
                .ok()
                .map(|i| i as f64),
        }
    }

    /// Tick label for a plot position; empty between categories.
    pub fn label(&self, position: f64) -> String {
        match self {
            AxisScale::Numeric => format!("{position}"),
            AxisScale::Temporal => DateTime::from_timestamp(position as i64, 0)
                .map(|dt| dt.naive_utc().format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            AxisScale::Categorical(labels) => {
                let index = position.round();
                if (position - index).abs() > 1e-6 || index < 0.0 {
                    return String::new();
                }
                labels.get(index as usize).cloned().unwrap_or_default()
            }
        }
    }
}

fn field<'a>(data: &'a Table, role: &'static str, name: &str) -> Result<&'a Column, ConfigError> {
    data.column(name).ok_or_else(|| ConfigError::UnknownColumn {
        field: role,
        column: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    fn config(chart_type: ChartType, aggregation: Aggregation) -> ChartConfig {
        ChartConfig {
            chart_type,
            x_axis: "cat".into(),
            y_axis: "val".into(),
            aggregation,
            color_dimension: Some("region".into()),
            secondary_dimension_a: Some("shape".into()),
            secondary_dimension_b: None,
            height: 400,
        }
    }

    fn data() -> Table {
        Table::from_rows(
            &[
                ("cat", ColumnType::String),
                ("region", ColumnType::String),
                ("shape", ColumnType::String),
                ("val", ColumnType::Float),
            ],
            vec![
                vec![s("A"), s("north"), s("o"), CellValue::Float(1.0)],
                vec![s("B"), s("south"), s("o"), CellValue::Float(2.0)],
                vec![s("B"), s("north"), s("x"), CellValue::Float(3.0)],
                vec![s("C"), s("north"), s("o"), CellValue::Null],
            ],
        )
        .unwrap()
    }

    fn plot(spec: ChartSpec) -> PlotSpec {
        match spec {
            ChartSpec::Plot(plot) => plot,
            other => panic!("expected a plot, got {other:?}"),
        }
    }

    #[test]
    fn empty_data_gives_placeholder() {
        let empty = data().head(0);
        let spec = derive(&empty, &config(ChartType::Bar, Aggregation::Sum));
        assert_eq!(
            spec,
            ChartSpec::Placeholder {
                label: EMPTY_LABEL.into(),
                height: 400
            }
        );
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "placeholder");
    }

    #[test]
    fn line_uses_symbol_and_dash() {
        let spec = plot(derive(&data(), &config(ChartType::Line, Aggregation::None)));
        assert!(spec.markers);
        assert_eq!(spec.encodings.symbol.as_deref(), Some("shape"));
        assert_eq!(spec.encodings.pattern, None);
        assert_eq!(spec.bar_mode, None);
    }

    #[test]
    fn bar_stacks_only_with_color() {
        let stacked = plot(derive(&data(), &config(ChartType::Bar, Aggregation::Sum)));
        assert_eq!(stacked.bar_mode, Some(BarMode::Stack));
        assert_eq!(stacked.encodings.pattern.as_deref(), Some("shape"));

        let mut cfg = config(ChartType::Bar, Aggregation::Sum);
        cfg.color_dimension = None;
        assert_eq!(plot(derive(&data(), &cfg)).bar_mode, Some(BarMode::Group));
    }

    #[test]
    fn pie_ignores_secondary_dimensions() {
        let spec = plot(derive(&data(), &config(ChartType::Pie, Aggregation::Sum)));
        assert_eq!(spec.encodings.symbol, None);
        assert_eq!(spec.encodings.color.as_deref(), Some("region"));
    }

    #[test]
    fn heatmap_intensity_follows_aggregation() {
        let raw = plot(derive(&data(), &config(ChartType::Heatmap, Aggregation::None)));
        let intensity = raw.heatmap.unwrap();
        assert_eq!(intensity.field, None);
        assert_eq!(intensity.function, Aggregation::Count);

        let reduced = plot(derive(&data(), &config(ChartType::Heatmap, Aggregation::Mean)));
        let intensity = reduced.heatmap.unwrap();
        assert_eq!(intensity.field.as_deref(), Some("val"));
        assert_eq!(intensity.function, Aggregation::Mean);
    }

    #[test]
    fn series_split_by_encodings() {
        let spec = plot(derive(&data(), &config(ChartType::Line, Aggregation::None)));
        let series = series(&data(), &spec).unwrap();
        let labels: Vec<String> = series.iter().map(|s| s.key.label()).collect();
        assert_eq!(labels, vec!["north, o", "north, x", "south, o"]);
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[0].points[1].y, None);
    }

    #[test]
    fn pie_sums_per_label() {
        let spec = plot(derive(&data(), &config(ChartType::Pie, Aggregation::None)));
        let slices = pie_slices(&data(), &spec).unwrap();
        assert_eq!(
            slices,
            vec![
                PieSlice {
                    label: "A".into(),
                    value: 1.0
                },
                PieSlice {
                    label: "B".into(),
                    value: 5.0
                },
            ]
        );
    }

    #[test]
    fn heatmap_counts_rows_per_cell() {
        let spec = plot(derive(&data(), &config(ChartType::Heatmap, Aggregation::None)));
        let cells = heatmap_cells(&data(), &spec, 2).unwrap();
        // y in [1, 3]: bin 0 = [1, 2), bin 1 = [2, 3]. Row C has no y value.
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].x, s("A"));
        assert_eq!(cells[0].y_range, (1.0, 2.0));
        assert_eq!(cells[1].x, s("B"));
        assert_eq!(cells[1].y_range, (2.0, 3.0));
        assert_eq!(cells[1].intensity, 2.0);
    }

    #[test]
    fn categorical_and_temporal_scales() {
        let table = data();
        let scale = AxisScale::for_column(table.column("cat").unwrap());
        assert_eq!(scale.position(&s("B")), Some(1.0));
        assert_eq!(scale.label(2.0), "C");
        assert_eq!(scale.label(1.5), "");

        let ts = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let pos = AxisScale::Temporal.position(&CellValue::Timestamp(ts)).unwrap();
        assert_eq!(AxisScale::Temporal.label(pos), "2021-06-01");
    }
}
