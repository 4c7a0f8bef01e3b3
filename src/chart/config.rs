use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use crate::data::aggregate::Aggregation;
use crate::data::aggregate::grouping_keys;
use crate::data::model::Table;

pub const MIN_HEIGHT: u32 = 320;
pub const MAX_HEIGHT: u32 = 800;
pub const HEIGHT_STEP: u32 = 20;
pub const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown chart type '{0}'")]
    UnknownChartType(String),

    #[error("unknown aggregation '{0}'")]
    UnknownAggregation(String),

    #[error("chart height {0} is outside [320, 800]")]
    HeightOutOfRange(i64),

    #[error("{field} references unknown column '{column}'")]
    UnknownColumn { field: &'static str, column: String },

    #[error("y-axis column '{0}' is not numeric")]
    NonNumericYAxis(String),

    #[error("{field} groups by '{column}', which is also the y-axis")]
    YAxisIsGroupingKey { field: &'static str, column: String },

    #[error("dataset has no numeric columns to chart")]
    NoNumericColumns,
}

// ---------------------------------------------------------------------------
// ChartType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Heatmap,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::Line,
        ChartType::Bar,
        ChartType::Pie,
        ChartType::Heatmap,
    ];

    /// Label for the first secondary dimension, if this chart type uses one.
    pub fn secondary_a_label(self) -> Option<&'static str> {
        match self {
            ChartType::Line => Some("Dot shape"),
            ChartType::Bar => Some("Bar pattern"),
            ChartType::Pie | ChartType::Heatmap => None,
        }
    }

    /// Label for the second secondary dimension, if this chart type uses one.
    pub fn secondary_b_label(self) -> Option<&'static str> {
        match self {
            ChartType::Line => Some("Line type"),
            ChartType::Bar => Some("Facet column"),
            ChartType::Pie | ChartType::Heatmap => None,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl FromStr for ChartType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ChartType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownChartType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ChartConfig – validated
// ---------------------------------------------------------------------------

/// One chart's axes, reduction and optional encoding dimensions.
///
/// `secondary_dimension_a` is the dot shape of a line chart or the pattern of a
/// bar chart; `secondary_dimension_b` is the line dash or the bar facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub aggregation: Aggregation,
    pub color_dimension: Option<String>,
    pub secondary_dimension_a: Option<String>,
    pub secondary_dimension_b: Option<String>,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// RawChartConfig – unvalidated primitives from a picker or JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChartConfig {
    pub chart_type: String,
    pub x_axis: String,
    pub y_axis: String,
    pub aggregation: String,
    #[serde(default)]
    pub color_dimension: Option<String>,
    #[serde(default)]
    pub secondary_dimension_a: Option<String>,
    #[serde(default)]
    pub secondary_dimension_b: Option<String>,
    pub height: i64,
}

impl From<&ChartConfig> for RawChartConfig {
    fn from(config: &ChartConfig) -> Self {
        Self {
            chart_type: config.chart_type.to_string(),
            x_axis: config.x_axis.clone(),
            y_axis: config.y_axis.clone(),
            aggregation: config.aggregation.label().to_string(),
            color_dimension: config.color_dimension.clone(),
            secondary_dimension_a: config.secondary_dimension_a.clone(),
            secondary_dimension_b: config.secondary_dimension_b.clone(),
            height: i64::from(config.height),
        }
    }
}

// ---------------------------------------------------------------------------
// ChartConfigPatch – a partial update
// ---------------------------------------------------------------------------

/// Fields to change on an existing config. Outer `None` leaves a field as is;
/// for the optional dimensions `Some(None)` clears the dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfigPatch {
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub color_dimension: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub secondary_dimension_a: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub secondary_dimension_b: Option<Option<String>>,
    #[serde(default)]
    pub height: Option<i64>,
}

/// A key present in the input, even as `null`, is an explicit change.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ChartConfigPatch {
    /// Overlay this patch on `base`.
    pub fn apply_to(&self, base: &ChartConfig) -> RawChartConfig {
        let mut raw = RawChartConfig::from(base);
        if let Some(v) = &self.chart_type {
            raw.chart_type = v.clone();
        }
        if let Some(v) = &self.x_axis {
            raw.x_axis = v.clone();
        }
        if let Some(v) = &self.y_axis {
            raw.y_axis = v.clone();
        }
        if let Some(v) = &self.aggregation {
            raw.aggregation = v.clone();
        }
        if let Some(v) = &self.color_dimension {
            raw.color_dimension = v.clone();
        }
        if let Some(v) = &self.secondary_dimension_a {
            raw.secondary_dimension_a = v.clone();
        }
        if let Some(v) = &self.secondary_dimension_b {
            raw.secondary_dimension_b = v.clone();
        }
        if let Some(v) = self.height {
            raw.height = v;
        }
        raw
    }
}

// ---------------------------------------------------------------------------
// ChartConfigFactory
// ---------------------------------------------------------------------------

/// Builds and validates chart configs against one dataset's columns.
#[derive(Debug, Clone)]
pub struct ChartConfigFactory {
    columns: Vec<String>,
    /// Numeric columns in the caller's order; the first one is the default y-axis.
    numeric: Vec<String>,
}

impl ChartConfigFactory {
    pub fn new(columns: Vec<String>, numeric_columns: Vec<String>) -> Self {
        Self {
            columns,
            numeric: numeric_columns,
        }
    }

    pub fn for_table(table: &Table) -> Self {
        Self::new(table.column_names(), table.numeric_column_names())
    }

    /// Line chart of the first column against the first numeric column.
    pub fn default_config(&self) -> Result<ChartConfig, ConfigError> {
        let y_axis = self.numeric.first().ok_or(ConfigError::NoNumericColumns)?;
        let x_axis = self.columns.first().ok_or(ConfigError::NoNumericColumns)?;
        Ok(ChartConfig {
            chart_type: ChartType::Line,
            x_axis: x_axis.clone(),
            y_axis: y_axis.clone(),
            aggregation: Aggregation::None,
            color_dimension: None,
            secondary_dimension_a: None,
            secondary_dimension_b: None,
            height: DEFAULT_HEIGHT,
        })
    }

    /// Check every field of `raw`, returning the first violation.
    pub fn validate(&self, raw: &RawChartConfig) -> Result<ChartConfig, ConfigError> {
        let chart_type: ChartType = raw.chart_type.parse()?;
        let aggregation: Aggregation = raw.aggregation.parse()?;
        let height = u32::try_from(raw.height)
            .ok()
            .filter(|h| (MIN_HEIGHT..=MAX_HEIGHT).contains(h))
            .ok_or(ConfigError::HeightOutOfRange(raw.height))?;

        self.require("x_axis", &raw.x_axis)?;
        self.require("y_axis", &raw.y_axis)?;
        if !self.numeric.contains(&raw.y_axis) {
            return Err(ConfigError::NonNumericYAxis(raw.y_axis.clone()));
        }
        for (field, column) in [
            ("color_dimension", &raw.color_dimension),
            ("secondary_dimension_a", &raw.secondary_dimension_a),
            ("secondary_dimension_b", &raw.secondary_dimension_b),
        ] {
            if let Some(column) = column {
                self.require(field, column)?;
            }
        }

        let config = ChartConfig {
            chart_type,
            x_axis: raw.x_axis.clone(),
            y_axis: raw.y_axis.clone(),
            aggregation,
            color_dimension: raw.color_dimension.clone(),
            secondary_dimension_a: raw.secondary_dimension_a.clone(),
            secondary_dimension_b: raw.secondary_dimension_b.clone(),
            height,
        };
        // The reduced column cannot also be a group key.
        if config.aggregation != Aggregation::None {
            if let Some((field, _)) = grouping_keys(&config)
                .into_iter()
                .find(|(_, column)| *column == config.y_axis)
            {
                return Err(ConfigError::YAxisIsGroupingKey {
                    field,
                    column: config.y_axis.clone(),
                });
            }
        }
        Ok(config)
    }

    /// Fit a config built for another dataset onto these columns.
    ///
    /// Dimensions naming a missing column are cleared; a missing x-axis or a
    /// missing or non-numeric y-axis takes the default. Returns `None` when the
    /// config is already valid, or when there is nothing numeric to fall back on.
    pub fn reconcile(&self, config: &ChartConfig) -> Option<ChartConfig> {
        if self.validate(&RawChartConfig::from(config)).is_ok() {
            return None;
        }
        let default = self.default_config().ok()?;
        let has = |column: &String| self.columns.contains(column);

        let mut fitted = config.clone();
        for dimension in [
            &mut fitted.color_dimension,
            &mut fitted.secondary_dimension_a,
            &mut fitted.secondary_dimension_b,
        ] {
            if dimension.as_ref().is_some_and(|c| !has(c)) {
                *dimension = None;
            }
        }
        if !has(&fitted.x_axis) {
            fitted.x_axis = default.x_axis.clone();
        }
        if !self.numeric.contains(&fitted.y_axis) {
            fitted.y_axis = default.y_axis.clone();
        }

        if self.validate(&RawChartConfig::from(&fitted)).is_ok() {
            Some(fitted)
        } else {
            // e.g. the new y-axis is also a group key: start over, keeping type and height.
            Some(ChartConfig {
                chart_type: config.chart_type,
                height: config.height,
                ..default
            })
        }
    }

    fn require(&self, field: &'static str, column: &str) -> Result<(), ConfigError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(ConfigError::UnknownColumn {
                field,
                column: column.to_string(),
            })
        }
    }
}
