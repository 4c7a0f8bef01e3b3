use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::{CellValue, Column, ColumnType, Table};
use crate::chart::config::{ChartConfig, ChartType, ConfigError};

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Reduction applied to the y-axis column. `None` keeps raw rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    None,
    Count,
    Sum,
    Mean,
    Min,
    Max,
}

impl Aggregation {
    pub const ALL: [Aggregation; 6] = [
        Aggregation::None,
        Aggregation::Count,
        Aggregation::Sum,
        Aggregation::Mean,
        Aggregation::Min,
        Aggregation::Max,
    ];

    /// Label shown in pickers.
    pub fn label(self) -> &'static str {
        match self {
            Aggregation::None => "None (raw rows)",
            Aggregation::Count => "Count",
            Aggregation::Sum => "Sum",
            Aggregation::Mean => "Mean",
            Aggregation::Min => "Min",
            Aggregation::Max => "Max",
        }
    }

    /// Type of the reduced column for an input column of type `input`.
    fn output_type(self, input: ColumnType) -> ColumnType {
        match self {
            Aggregation::Count => ColumnType::Integer,
            Aggregation::Mean => ColumnType::Float,
            Aggregation::None | Aggregation::Sum | Aggregation::Min | Aggregation::Max => input,
        }
    }

    /// Reduce one group. Missing values are skipped; `Count` counts present values.
    fn reduce(self, kind: ColumnType, values: &[&CellValue]) -> CellValue {
        let present = values.iter().filter(|v| !v.is_null());
        match self {
            Aggregation::None => CellValue::Null,
            Aggregation::Count => CellValue::Integer(present.count() as i64),
            Aggregation::Sum if kind == ColumnType::Integer => {
                let ints: Vec<i64> = present
                    .filter_map(|v| match v {
                        CellValue::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                match ints.iter().try_fold(0i64, |acc, &i| acc.checked_add(i)) {
                    Some(total) => CellValue::Integer(total),
                    None => {
                        log::warn!("integer sum overflowed; summing as float");
                        CellValue::Float(ints.iter().map(|&i| i as f64).sum())
                    }
                }
            }
            Aggregation::Sum => CellValue::Float(present.filter_map(|v| v.as_f64()).sum()),
            Aggregation::Mean => {
                let (sum, n) = present
                    .filter_map(|v| v.as_f64())
                    .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
                if n == 0 {
                    CellValue::Null
                } else {
                    CellValue::Float(sum / n as f64)
                }
            }
            Aggregation::Min => present
                .min_by(|a, b| cmp_numeric(a, b))
                .map_or(CellValue::Null, |v| (*v).clone()),
            Aggregation::Max => present
                .max_by(|a, b| cmp_numeric(a, b))
                .map_or(CellValue::Null, |v| (*v).clone()),
        }
    }
}

fn cmp_numeric(a: &CellValue, b: &CellValue) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Aggregation {
    type Err = ConfigError;

    /// Accepts the picker label or the bare variant name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Aggregation::ALL
            .into_iter()
            .find(|agg| {
                agg.label().eq_ignore_ascii_case(wanted)
                    || format!("{agg:?}").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ConfigError::UnknownAggregation(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Grouping columns for `config`, paired with the config field that named them.
///
/// Order: x-axis, colour, then the two secondary dimensions for line and bar
/// charts. A column named twice is kept at its first position.
pub fn grouping_keys(config: &ChartConfig) -> Vec<(&'static str, &str)> {
    let mut keys: Vec<(&'static str, &str)> = vec![("x_axis", config.x_axis.as_str())];
    let mut candidates = vec![("color_dimension", config.color_dimension.as_deref())];
    if matches!(config.chart_type, ChartType::Line | ChartType::Bar) {
        candidates.push(("secondary_dimension_a", config.secondary_dimension_a.as_deref()));
        candidates.push(("secondary_dimension_b", config.secondary_dimension_b.as_deref()));
    }
    for (field, column) in candidates {
        if let Some(column) = column {
            if !keys.iter().any(|(_, c)| *c == column) {
                keys.push((field, column));
            }
        }
    }
    keys
}

/// Derive the table a chart plots.
///
/// Without aggregation this is a copy of the input. Otherwise rows are grouped by
/// [`grouping_keys`] (missing values form their own group) and the y-axis column
/// is reduced per group. Output rows are in ascending key order.
pub fn aggregate(table: &Table, config: &ChartConfig) -> Result<Table, ConfigError> {
    if config.aggregation == Aggregation::None {
        return Ok(table.clone());
    }

    let y = table
        .column(&config.y_axis)
        .ok_or_else(|| ConfigError::UnknownColumn {
            field: "y_axis",
            column: config.y_axis.clone(),
        })?;
    if !y.kind().is_numeric() {
        return Err(ConfigError::NonNumericYAxis(config.y_axis.clone()));
    }

    let keys = grouping_keys(config);
    let mut key_columns = Vec::with_capacity(keys.len());
    for &(field, name) in &keys {
        if name == config.y_axis {
            return Err(ConfigError::YAxisIsGroupingKey {
                field,
                column: config.y_axis.clone(),
            });
        }
        let column = table.column(name).ok_or_else(|| ConfigError::UnknownColumn {
            field,
            column: name.to_string(),
        })?;
        key_columns.push(column);
    }

    let mut groups: BTreeMap<Vec<&CellValue>, Vec<&CellValue>> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let key: Vec<&CellValue> = key_columns.iter().map(|c| &c.values()[row]).collect();
        groups.entry(key).or_default().push(&y.values()[row]);
    }

    let n_groups = groups.len();
    let mut key_values: Vec<Vec<CellValue>> = vec![Vec::with_capacity(n_groups); key_columns.len()];
    let mut reduced = Vec::with_capacity(n_groups);
    for (key, members) in groups {
        for (buffer, cell) in key_values.iter_mut().zip(key) {
            buffer.push(cell.clone());
        }
        reduced.push(config.aggregation.reduce(y.kind(), &members));
    }

    let mut columns: Vec<Column> = key_columns
        .iter()
        .zip(key_values)
        .map(|(source, values)| Column::from_parts(source.name().to_string(), source.kind(), values))
        .collect();
    // An overflowed integer sum turns the whole reduced column into floats.
    let mut kind = config.aggregation.output_type(y.kind());
    if kind == ColumnType::Integer && reduced.iter().any(|v| matches!(v, CellValue::Float(_))) {
        kind = ColumnType::Float;
        for value in &mut reduced {
            if let CellValue::Integer(i) = *value {
                *value = CellValue::Float(i as f64);
            }
        }
    }
    columns.push(Column::from_parts(y.name().to_string(), kind, reduced));

    log::debug!(
        "aggregated {} row(s) into {} group(s) by {:?}",
        table.num_rows(),
        n_groups,
        keys.iter().map(|(_, c)| *c).collect::<Vec<_>>()
    );
    Ok(Table::from_parts(columns, n_groups))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;

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
            color_dimension: None,
            secondary_dimension_a: None,
            secondary_dimension_b: None,
            height: 480,
        }
    }

    fn sales() -> Table {
        Table::from_rows(
            &[
                ("cat", ColumnType::String),
                ("region", ColumnType::String),
                ("val", ColumnType::Integer),
            ],
            vec![
                vec![s("A"), s("north"), CellValue::Integer(10)],
                vec![s("A"), s("south"), CellValue::Integer(20)],
                vec![s("B"), s("north"), CellValue::Integer(5)],
                vec![CellValue::Null, s("north"), CellValue::Integer(7)],
                vec![s("B"), CellValue::Null, CellValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn raw_rows_are_copied() {
        let table = sales();
        assert_eq!(aggregate(&table, &config(ChartType::Line, Aggregation::None)).unwrap(), table);
    }

    #[test]
    fn sums_per_group() {
        let table = Table::from_rows(
            &[("cat", ColumnType::String), ("val", ColumnType::Integer)],
            vec![
                vec![s("A"), CellValue::Integer(10)],
                vec![s("A"), CellValue::Integer(20)],
                vec![s("B"), CellValue::Integer(5)],
            ],
        )
        .unwrap();
        let out = aggregate(&table, &config(ChartType::Bar, Aggregation::Sum)).unwrap();
        let expected = Table::from_rows(
            &[("cat", ColumnType::String), ("val", ColumnType::Integer)],
            vec![
                vec![s("A"), CellValue::Integer(30)],
                vec![s("B"), CellValue::Integer(5)],
            ],
        )
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn overflowing_sum_becomes_float() {
        let table = Table::from_rows(
            &[("cat", ColumnType::String), ("val", ColumnType::Integer)],
            vec![
                vec![s("A"), CellValue::Integer(i64::MAX)],
                vec![s("A"), CellValue::Integer(1)],
                vec![s("B"), CellValue::Integer(5)],
            ],
        )
        .unwrap();
        let out = aggregate(&table, &config(ChartType::Bar, Aggregation::Sum)).unwrap();
        let column = out.column("val").unwrap();
        assert_eq!(column.kind(), ColumnType::Float);
        assert_relative_eq!(column.values()[0].as_f64().unwrap(), i64::MAX as f64 + 1.0);
        assert_eq!(column.values()[1], CellValue::Float(5.0));
    }

    #[test]
    fn missing_keys_form_their_own_group_last() {
        let out = aggregate(&sales(), &config(ChartType::Line, Aggregation::Count)).unwrap();
        assert_eq!(out.column("cat").unwrap().values(), &[s("A"), s("B"), CellValue::Null]);
        // The null `val` in group B is not counted.
        assert_eq!(
            out.column("val").unwrap().values(),
            &[CellValue::Integer(2), CellValue::Integer(1), CellValue::Integer(1)]
        );
        assert_eq!(out.column("val").unwrap().kind(), ColumnType::Integer);
    }

    #[test]
    fn mean_min_max() {
        let mean = aggregate(&sales(), &config(ChartType::Bar, Aggregation::Mean)).unwrap();
        let values = mean.column("val").unwrap().values();
        assert_relative_eq!(values[0].as_f64().unwrap(), 15.0);
        assert_relative_eq!(values[1].as_f64().unwrap(), 5.0);
        assert_eq!(mean.column("val").unwrap().kind(), ColumnType::Float);

        let min = aggregate(&sales(), &config(ChartType::Bar, Aggregation::Min)).unwrap();
        assert_eq!(min.column("val").unwrap().values()[0], CellValue::Integer(10));
        let max = aggregate(&sales(), &config(ChartType::Bar, Aggregation::Max)).unwrap();
        assert_eq!(max.column("val").unwrap().values()[0], CellValue::Integer(20));
    }

    #[test]
    fn secondary_dimensions_only_for_line_and_bar() {
        let mut line = config(ChartType::Line, Aggregation::Sum);
        line.color_dimension = Some("region".into());
        line.secondary_dimension_b = Some("region".into());
        line.secondary_dimension_a = Some("cat".into());
        // Duplicates collapse onto their first position.
        assert_eq!(
            grouping_keys(&line),
            vec![("x_axis", "cat"), ("color_dimension", "region")]
        );

        let mut pie = config(ChartType::Pie, Aggregation::Sum);
        pie.secondary_dimension_a = Some("region".into());
        assert_eq!(grouping_keys(&pie), vec![("x_axis", "cat")]);

        let mut bar = config(ChartType::Bar, Aggregation::Sum);
        bar.secondary_dimension_b = Some("region".into());
        let out = aggregate(&sales(), &bar).unwrap();
        assert_eq!(out.column_names(), vec!["cat", "region", "val"]);
        assert_eq!(out.num_rows(), 5);
    }

    #[test]
    fn missing_columns_are_config_errors() {
        let mut cfg = config(ChartType::Line, Aggregation::Sum);
        cfg.color_dimension = Some("nope".into());
        assert_eq!(
            aggregate(&sales(), &cfg).unwrap_err(),
            ConfigError::UnknownColumn {
                field: "color_dimension",
                column: "nope".into()
            }
        );
        let mut cfg = config(ChartType::Line, Aggregation::Sum);
        cfg.y_axis = "gone".into();
        assert!(matches!(
            aggregate(&sales(), &cfg).unwrap_err(),
            ConfigError::UnknownColumn { field: "y_axis", .. }
        ));
    }

    #[test]
    fn y_axis_cannot_be_a_key() {
        let mut cfg = config(ChartType::Line, Aggregation::Sum);
        cfg.x_axis = "val".into();
        assert!(matches!(
            aggregate(&sales(), &cfg).unwrap_err(),
            ConfigError::YAxisIsGroupingKey { .. }
        ));
    }

    #[test]
    fn parses_labels() {
        assert_eq!("None (raw rows)".parse::<Aggregation>().unwrap(), Aggregation::None);
        assert_eq!("mean".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!(
            "median".parse::<Aggregation>().unwrap_err(),
            ConfigError::UnknownAggregation("median".into())
        );
    }

    proptest! {
        #[test]
        fn grouping_is_deterministic(rows in prop::collection::vec(("[a-c]", "[xy]", -100i64..100), 0..30)) {
            let build = || Table::from_rows(
                &[("cat", ColumnType::String), ("region", ColumnType::String), ("val", ColumnType::Integer)],
                rows.iter().map(|(c, r, v)| vec![s(c), s(r), CellValue::Integer(*v)]).collect(),
            ).unwrap();
            let mut cfg = config(ChartType::Bar, Aggregation::Sum);
            cfg.color_dimension = Some("region".into());
            let a = aggregate(&build(), &cfg).unwrap();
            let b = aggregate(&build(), &cfg).unwrap();
            prop_assert_eq!(&a, &b);
            let keys: Vec<_> = (0..a.num_rows()).map(|r| {
                let row = a.row(r).unwrap();
                (row[0].clone(), row[1].clone())
            }).collect();
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
