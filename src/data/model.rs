use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Display format for timestamps; also the string form used by categorical filters.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("column '{column}' is {kind} but row {row} holds {value:?}")]
    TypeMismatch {
        column: String,
        kind: ColumnType,
        row: usize,
        value: String,
    },
}

// ---------------------------------------------------------------------------
// ColumnType – the closed type tag assigned once at load time
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    String,
}

impl ColumnType {
    /// Integer and float columns can be plotted on a value axis and reduced.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    fn accepts(self, value: &CellValue) -> bool {
        matches!(
            (self, value),
            (_, CellValue::Null)
                | (ColumnType::Integer, CellValue::Integer(_))
                | (ColumnType::Float, CellValue::Float(_))
                | (ColumnType::Boolean, CellValue::Bool(_))
                | (ColumnType::Timestamp, CellValue::Timestamp(_))
                | (ColumnType::String, CellValue::String(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::String => "string",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// CellValue – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell. `Ord` is total so cells can key `BTreeMap`s;
/// missing values sort after every present value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(NaiveDateTime),
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Bool(_) => 0,
                Integer(_) => 1,
                Float(_) => 2,
                String(_) => 3,
                Timestamp(_) => 4,
                Null => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Timestamp(t) => t.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            // Integral floats keep their decimal point so "10.0" never collides with "10".
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
            CellValue::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

/// Cells serialize as their natural JSON values; timestamps as formatted text.
impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Float(v) => serializer.serialize_f64(*v),
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Timestamp(t) => serializer.collect_str(&t.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Interpret the value as an `f64` for reductions and plotting.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String form used for categorical matching; `None` for missing values.
    pub fn filter_key(&self) -> Option<String> {
        (!self.is_null()).then(|| self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnType,
    values: Vec<CellValue>,
}

impl Column {
    /// Build a typed column. Integer cells are widened in float columns; any other
    /// cell that does not match `kind` is rejected.
    pub fn new(
        name: impl Into<String>,
        kind: ColumnType,
        values: Vec<CellValue>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        let mut values = values;
        for (row, value) in values.iter_mut().enumerate() {
            if let (ColumnType::Float, CellValue::Integer(i)) = (kind, &*value) {
                let widened = *i as f64;
                *value = CellValue::Float(widened);
            }
            if !kind.accepts(value) {
                return Err(TableError::TypeMismatch {
                    column: name,
                    kind,
                    row,
                    value: value.to_string(),
                });
            }
        }
        Ok(Self { name, kind, values })
    }

    /// Caller guarantees every value matches `kind`.
    pub(crate) fn from_parts(name: String, kind: ColumnType, values: Vec<CellValue>) -> Self {
        debug_assert!(values.iter().all(|v| kind.accepts(v)));
        Self { name, kind, values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, row: usize) -> Option<&CellValue> {
        self.values.get(row)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn take(&self, rows: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            kind: self.kind,
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Table – ordered, uniquely named, typed columns
// ---------------------------------------------------------------------------

/// An immutable in-memory table. Every pipeline stage produces a new table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Assemble a table, checking unique names and equal column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        let rows = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
            return Err(TableError::LengthMismatch {
                column: bad.name.clone(),
                expected: rows,
                actual: bad.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Build a table from a schema and row-major cells.
    pub fn from_rows(
        schema: &[(&str, ColumnType)],
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self, TableError> {
        let mut buffers: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); schema.len()];
        for row in rows {
            if row.len() != schema.len() {
                return Err(TableError::LengthMismatch {
                    column: "<row>".to_string(),
                    expected: schema.len(),
                    actual: row.len(),
                });
            }
            for (buffer, cell) in buffers.iter_mut().zip(row) {
                buffer.push(cell);
            }
        }
        let columns = schema
            .iter()
            .zip(buffers)
            .map(|((name, kind), values)| Column::new(*name, *kind, values))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    pub(crate) fn from_parts(columns: Vec<Column>, rows: usize) -> Self {
        debug_assert!(columns.iter().all(|c| c.len() == rows));
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has zero rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Copy of the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            rows: rows.len(),
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let rows: Vec<usize> = (0..self.rows.min(n)).collect();
        self.take(&rows)
    }

    /// One row as cells in column order.
    pub fn row(&self, row: usize) -> Option<Vec<&CellValue>> {
        (row < self.rows).then(|| self.columns.iter().map(|c| &c.values[row]).collect())
    }
}
