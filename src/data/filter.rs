use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Column, Table};
use super::timestamp;

/// How many distinct values a freshly picked filter column pre-selects.
pub const DEFAULT_SELECTION_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter references unknown column '{0}'")]
    UnknownColumn(String),
}

// ---------------------------------------------------------------------------
// FilterSpec – categorical membership + temporal range
// ---------------------------------------------------------------------------

/// Declarative row-selection rule.
///
/// The categorical rule is active only when a column and at least one value are
/// set; the temporal rule only when a column, a start and an end are all set.
/// Built once with the `with_*` methods and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    title_column: Option<String>,
    #[serde(default)]
    title_values: BTreeSet<String>,
    time_column: Option<String>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title_column(mut self, column: Option<String>) -> Self {
        self.title_column = column;
        self
    }

    pub fn with_title_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.title_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_column(mut self, column: Option<String>) -> Self {
        self.time_column = column;
        self
    }

    pub fn with_range(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn title_column(&self) -> Option<&str> {
        self.title_column.as_deref()
    }

    pub fn title_values(&self) -> &BTreeSet<String> {
        &self.title_values
    }

    pub fn time_column(&self) -> Option<&str> {
        self.time_column.as_deref()
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    /// The categorical rule, if active.
    pub fn categorical(&self) -> Option<(&str, &BTreeSet<String>)> {
        match &self.title_column {
            Some(column) if !self.title_values.is_empty() => Some((column, &self.title_values)),
            _ => None,
        }
    }

    /// The temporal rule, if active.
    pub fn temporal(&self) -> Option<(&str, NaiveDateTime, NaiveDateTime)> {
        match (&self.time_column, self.start, self.end) {
            (Some(column), Some(start), Some(end)) => Some((column, start, end)),
            _ => None,
        }
    }

    /// Whether neither rule is active.
    pub fn is_inactive(&self) -> bool {
        self.categorical().is_none() && self.temporal().is_none()
    }

    /// Every column this spec names, active or not.
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.title_column
            .as_deref()
            .into_iter()
            .chain(self.time_column.as_deref())
    }
}

/// Diagnostics from one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    /// Rows excluded because their time value was present but did not parse.
    pub unparsed_timestamps: usize,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Return a filtered copy of `table`. The input is never modified.
pub fn apply(table: &Table, spec: &FilterSpec) -> Result<Table, FilterError> {
    apply_with_report(table, spec).map(|(table, _)| table)
}

/// Like [`apply`], also counting rows dropped by timestamp coercion.
///
/// A row passes when:
/// * its value in the title column, as a string, is one of the selected values
///   (missing values never match)
/// * its time value coerces to a timestamp inside `[start, end]`
pub fn apply_with_report(
    table: &Table,
    spec: &FilterSpec,
) -> Result<(Table, FilterReport), FilterError> {
    let mut report = FilterReport::default();
    if spec.is_inactive() {
        return Ok((table.clone(), report));
    }

    let mut keep: Vec<usize> = (0..table.num_rows()).collect();

    if let Some((column, selected)) = spec.categorical() {
        let column = lookup(table, column)?;
        keep.retain(|&row| {
            column.values()[row]
                .filter_key()
                .is_some_and(|key| selected.contains(&key))
        });
    }

    if let Some((column, start, end)) = spec.temporal() {
        let column = lookup(table, column)?;
        keep.retain(|&row| {
            let value = &column.values()[row];
            match timestamp::coerce(value) {
                Some(ts) => start <= ts && ts <= end,
                None => {
                    if !value.is_null() {
                        report.unparsed_timestamps += 1;
                    }
                    false
                }
            }
        });
        if report.unparsed_timestamps > 0 {
            log::debug!(
                "{} value(s) in '{}' did not parse as timestamps and were excluded",
                report.unparsed_timestamps,
                column.name()
            );
        }
    }

    Ok((table.take(&keep), report))
}

// ---------------------------------------------------------------------------
// Picker helpers
// ---------------------------------------------------------------------------

/// Distinct non-missing values of a column as strings, sorted lexicographically.
pub fn unique_values(table: &Table, column: &str) -> Result<Vec<String>, FilterError> {
    let column = lookup(table, column)?;
    let values: BTreeSet<String> = column.values().iter().filter_map(|v| v.filter_key()).collect();
    Ok(values.into_iter().collect())
}

/// Minimum and maximum timestamp in a column, or `None` if nothing parses.
pub fn temporal_bounds(
    table: &Table,
    column: &str,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, FilterError> {
    let column = lookup(table, column)?;
    let mut stamps = column.values().iter().filter_map(timestamp::coerce);
    let Some(first) = stamps.next() else {
        return Ok(None);
    };
    let bounds = stamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
    Ok(Some(bounds))
}

/// The values pre-selected when a filter column is first picked.
pub fn default_selection(values: &[String]) -> BTreeSet<String> {
    values.iter().take(DEFAULT_SELECTION_LEN).cloned().collect()
}

/// The initial range offered for a time column: whole days spanning its bounds.
pub fn default_range(
    table: &Table,
    column: &str,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, FilterError> {
    Ok(temporal_bounds(table, column)?.and_then(|(lo, hi)| {
        let start = lo.date().and_hms_opt(0, 0, 0)?;
        let end = hi.date().and_hms_opt(0, 0, 0)?;
        Some((start, end))
    }))
}

fn lookup<'a>(table: &'a Table, column: &str) -> Result<&'a Column, FilterError> {
    table
        .column(column)
        .ok_or_else(|| FilterError::UnknownColumn(column.to_string()))
}
