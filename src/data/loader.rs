use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType};
use arrow::util::display::array_value_to_string;
use indexmap::IndexSet;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Column, ColumnType, Table};
use super::timestamp::parse_timestamp;

/// Text cells read as missing values.
const NULL_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one record per line
/// * `.json`    – `[{ "column": value, ... }, ...]`
/// * `.parquet` – flat columns of primitive, string or temporal type
///
/// Each column gets one [`ColumnType`] here; nothing downstream re-infers types.
pub fn load_file(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => {
            let file = std::fs::File::open(path).context("opening CSV")?;
            load_csv(file)?
        }
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            load_json(&text)?
        }
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    log::info!(
        "loaded {} ({} rows, {} columns)",
        path.display(),
        table.num_rows(),
        table.num_columns()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Read CSV with a header row. Column types are inferred from the text.
pub fn load_csv<R: Read>(input: R) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, buffer) in cells.iter_mut().enumerate() {
            buffer.push(record.get(col_idx).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| infer_text_column(name, &raw))
        .collect();
    Ok(Table::new(columns)?)
}

fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.contains(&s.trim())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Pick the narrowest type every present cell parses as.
fn infer_text_column(name: String, raw: &[String]) -> Column {
    let present: Vec<&str> = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !is_null_token(s))
        .collect();

    let kind = if present.is_empty() {
        ColumnType::String
    } else if present.iter().all(|s| s.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if present.iter().all(|s| s.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if present.iter().all(|s| parse_bool(s).is_some()) {
        ColumnType::Boolean
    } else if present.iter().all(|s| parse_timestamp(s).is_some()) {
        ColumnType::Timestamp
    } else {
        ColumnType::String
    };

    let values = raw
        .iter()
        .map(|s| {
            let s = s.trim();
            if is_null_token(s) {
                return CellValue::Null;
            }
            let parsed = match kind {
                ColumnType::Integer => s.parse().ok().map(CellValue::Integer),
                ColumnType::Float => s.parse().ok().map(CellValue::Float),
                ColumnType::Boolean => parse_bool(s).map(CellValue::Bool),
                ColumnType::Timestamp => parse_timestamp(s).map(CellValue::Timestamp),
                ColumnType::String => Some(CellValue::String(s.to_string())),
            };
            parsed.unwrap_or(CellValue::Null)
        })
        .collect();
    Column::from_parts(name, kind, values)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, as `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "date": "2024-01-01", "region": "north", "units": 12 },
///   ...
/// ]
/// ```
///
/// Columns appear in order of first occurrence; absent keys are missing values.
pub fn load_json(text: &str) -> Result<Table> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut names: IndexSet<String> = IndexSet::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        names.extend(obj.keys().cloned());
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let raw: Vec<&JsonValue> = records
                .iter()
                .map(|rec| rec.get(&name).unwrap_or(&JsonValue::Null))
                .collect();
            infer_json_column(name, &raw)
        })
        .collect();
    Ok(Table::new(columns)?)
}

fn infer_json_column(name: String, raw: &[&JsonValue]) -> Column {
    let present: Vec<&JsonValue> = raw.iter().copied().filter(|v| !v.is_null()).collect();

    let kind = if present.is_empty() {
        ColumnType::String
    } else if present.iter().all(|v| v.is_i64()) {
        ColumnType::Integer
    } else if present.iter().all(|v| v.is_number()) {
        ColumnType::Float
    } else if present.iter().all(|v| v.is_boolean()) {
        ColumnType::Boolean
    } else if present
        .iter()
        .all(|v| v.as_str().and_then(parse_timestamp).is_some())
    {
        ColumnType::Timestamp
    } else {
        ColumnType::String
    };

    let values = raw
        .iter()
        .map(|v| match (kind, v) {
            (_, JsonValue::Null) => CellValue::Null,
            (ColumnType::Integer, v) => v.as_i64().map_or(CellValue::Null, CellValue::Integer),
            (ColumnType::Float, v) => v.as_f64().map_or(CellValue::Null, CellValue::Float),
            (ColumnType::Boolean, v) => v.as_bool().map_or(CellValue::Null, CellValue::Bool),
            (ColumnType::Timestamp, v) => v
                .as_str()
                .and_then(parse_timestamp)
                .map_or(CellValue::Null, CellValue::Timestamp),
            (ColumnType::String, JsonValue::String(s)) => CellValue::String(s.clone()),
            (ColumnType::String, other) => CellValue::String(other.to_string()),
        })
        .collect();
    Column::from_parts(name, kind, values)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with flat columns.
///
/// Integer, float, boolean, string, date and timestamp columns map onto the
/// matching [`ColumnType`]; anything else is read as its display string.
fn load_parquet(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let schema = builder.schema().clone();
    let kinds: Vec<ColumnType> = schema
        .fields()
        .iter()
        .map(|f| arrow_column_type(f.data_type()))
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut buffers: Vec<Vec<CellValue>> = vec![Vec::new(); kinds.len()];
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (idx, (kind, buffer)) in kinds.iter().zip(buffers.iter_mut()).enumerate() {
            extract_cells(batch.column(idx), *kind, buffer)
                .with_context(|| format!("reading column '{}'", schema.field(idx).name()))?;
        }
    }

    let columns = schema
        .fields()
        .iter()
        .zip(kinds)
        .zip(buffers)
        .map(|((field, kind), values)| Column::new(field.name().clone(), kind, values))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table::new(columns)?)
}

fn arrow_column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => ColumnType::Timestamp,
        _ => ColumnType::String,
    }
}

/// Append the cells of one Arrow column, normalised through a cast.
fn extract_cells(col: &ArrayRef, kind: ColumnType, out: &mut Vec<CellValue>) -> Result<()> {
    let rows = 0..col.len();
    match kind {
        ColumnType::Integer => {
            let cast_col = cast(col, &DataType::Int64)?;
            let arr = cast_col.as_primitive::<Int64Type>();
            out.extend(rows.map(|r| {
                if arr.is_null(r) {
                    CellValue::Null
                } else {
                    CellValue::Integer(arr.value(r))
                }
            }));
        }
        ColumnType::Float => {
            let cast_col = cast(col, &DataType::Float64)?;
            let arr = cast_col.as_primitive::<Float64Type>();
            out.extend(rows.map(|r| {
                if arr.is_null(r) || arr.value(r).is_nan() {
                    CellValue::Null
                } else {
                    CellValue::Float(arr.value(r))
                }
            }));
        }
        ColumnType::Boolean => {
            let arr = col.as_boolean();
            out.extend(rows.map(|r| {
                if arr.is_null(r) {
                    CellValue::Null
                } else {
                    CellValue::Bool(arr.value(r))
                }
            }));
        }
        ColumnType::Timestamp => {
            let cast_col = cast(col, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            let arr = cast_col.as_primitive::<TimestampMicrosecondType>();
            out.extend(rows.map(|r| {
                if arr.is_null(r) {
                    CellValue::Null
                } else {
                    arr.value_as_datetime(r)
                        .map_or(CellValue::Null, CellValue::Timestamp)
                }
            }));
        }
        ColumnType::String => {
            for r in rows {
                if col.is_null(r) {
                    out.push(CellValue::Null);
                } else {
                    out.push(CellValue::String(array_value_to_string(col, r)?));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use arrow::array::{Date32Array, Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use chrono::NaiveDate;
    use parquet::arrow::ArrowWriter;

    use super::*;

    #[test]
    fn csv_columns_are_typed_once() {
        let text = "date,region,units,price,flag,note\n\
                    2024-01-01,north,3,1.5,true,x\n\
                    2024-01-02,south,,2,false,\n\
                    2024-01-03,north,7,NaN,True,12\n";
        let table = load_csv(text.as_bytes()).unwrap();
        let kinds: Vec<ColumnType> = table.columns().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnType::Timestamp,
                ColumnType::String,
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::String,
            ]
        );
        assert_eq!(table.column("units").unwrap().values()[1], CellValue::Null);
        assert_eq!(table.column("price").unwrap().values()[1], CellValue::Float(2.0));
        assert_eq!(table.column("price").unwrap().values()[2], CellValue::Null);
        assert_eq!(table.numeric_column_names(), vec!["units", "price"]);
    }

    #[test]
    fn json_records_fill_missing_keys() {
        let text = r#"[
            {"region": "north", "units": 3},
            {"region": "south", "units": 2.5, "extra": true},
            {"units": null}
        ]"#;
        let table = load_json(text).unwrap();
        assert_eq!(table.column_names(), vec!["region", "units", "extra"]);
        assert_eq!(table.column("units").unwrap().kind(), ColumnType::Float);
        assert_eq!(table.column("region").unwrap().values()[2], CellValue::Null);
        assert_eq!(table.column("extra").unwrap().values()[0], CellValue::Null);
        assert_eq!(table.column("extra").unwrap().kind(), ColumnType::Boolean);
    }

    #[test]
    fn json_must_be_array_of_objects() {
        assert!(load_json(r#"{"a": 1}"#).is_err());
        assert!(load_json(r#"[1, 2]"#).is_err());
    }

    #[test]
    fn load_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "region,units\nnorth,4\nsouth,5").unwrap();
        let table = load_file(&path).unwrap();
        assert_eq!(table.num_rows(), 2);

        let unsupported = dir.path().join("sales.xlsx");
        std::fs::write(&unsupported, b"").unwrap();
        assert!(load_file(&unsupported).is_err());
    }

    #[test]
    fn parquet_maps_arrow_types() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("day", DataType::Date32, true),
            Field::new("region", DataType::Utf8, true),
            Field::new("units", DataType::Int32, true),
            Field::new("price", DataType::Float64, true),
        ]));
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let days = (day - epoch).num_days() as i32;
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Date32Array::from(vec![Some(days), None])),
                Arc::new(StringArray::from(vec![Some("north"), None])),
                Arc::new(Int32Array::from(vec![Some(4), Some(5)])),
                Arc::new(Float64Array::from(vec![Some(1.25), None])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(&path).unwrap();
        let kinds: Vec<ColumnType> = table.columns().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnType::Timestamp,
                ColumnType::String,
                ColumnType::Integer,
                ColumnType::Float
            ]
        );
        assert_eq!(
            table.column("day").unwrap().values()[0],
            CellValue::Timestamp(day.and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(table.column("region").unwrap().values()[1], CellValue::Null);
        assert_eq!(table.column("units").unwrap().values()[1], CellValue::Integer(5));
    }
}
