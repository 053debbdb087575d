//! Pipeline artifacts.
//!
//! - Silver: one Parquet file per cleaned entity, column types inferred
//!   from the cleaned cells.
//! - Gold: small CSV tables, one per metric, plus a JSON run manifest.
//!
//! Every writer overwrites its target, so reruns are idempotent.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use crate::error::{ArtifactError, ArtifactResult};
use crate::models::{CleanTable, Scalar};

/// Physical type chosen for a silver column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
}

impl ColumnKind {
    fn of(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Bool(_) => ColumnKind::Bool,
            Scalar::Int(_) => ColumnKind::Int,
            Scalar::Float(_) => ColumnKind::Float,
            Scalar::Text(_) => ColumnKind::Text,
            Scalar::Timestamp(_) => ColumnKind::Timestamp,
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

/// Infer one column's kind: uniform cells keep their type, ints mixed with
/// floats widen to float, anything else falls back to text.
pub fn infer_column_kind<'a>(cells: impl IntoIterator<Item = &'a Scalar>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let next = ColumnKind::of(cell);
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn build_array(kind: ColumnKind, cells: &[&Scalar]) -> ArrayRef {
    match kind {
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            cells
                .iter()
                .map(|c| matches!(c, Scalar::Bool(true)))
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Int => Arc::new(Int64Array::from(
            cells
                .iter()
                .map(|c| match c {
                    Scalar::Int(i) => *i,
                    _ => 0,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            cells
                .iter()
                .map(|c| c.as_f64().unwrap_or(f64::NAN))
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Text => Arc::new(StringArray::from(
            cells.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        )),
        ColumnKind::Timestamp => Arc::new(TimestampMicrosecondArray::from(
            cells
                .iter()
                .map(|c| match c {
                    Scalar::Timestamp(t) => t.and_utc().timestamp_micros(),
                    _ => 0,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn ensure_parent(path: &Path) -> ArtifactResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

// =============================================================================
// Silver (Parquet)
// =============================================================================

/// Write a cleaned table as a single-row-group Parquet file.
pub fn write_silver(path: &Path, table: &CleanTable) -> ArtifactResult<()> {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays = Vec::with_capacity(table.columns.len());

    for (idx, name) in table.columns.iter().enumerate() {
        let cells: Vec<&Scalar> = table.rows.iter().map(|r| &r[idx]).collect();
        let kind = infer_column_kind(cells.iter().copied());
        fields.push(Field::new(name, kind.data_type(), false));
        arrays.push(build_array(kind, &cells));
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(table.len()));
    let batch = RecordBatch::try_new_with_options(schema.clone(), arrays, &options)?;

    ensure_parent(path)?;
    let file = File::create(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Read a silver Parquet file back into a cleaned table.
pub fn read_silver(path: &Path) -> ArtifactResult<CleanTable> {
    let file = File::open(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut table = CleanTable::new(schema.fields().iter().map(|f| f.name().clone()).collect());

    for batch in reader {
        let batch = batch?;
        let columns = batch
            .columns()
            .iter()
            .zip(schema.fields().iter())
            .map(|(array, field)| column_to_scalars(field.name(), array.as_ref()))
            .collect::<ArtifactResult<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            table.rows.push(columns.iter().map(|col| col[row].clone()).collect());
        }
    }

    Ok(table)
}

fn column_to_scalars(name: &str, array: &dyn Array) -> ArtifactResult<Vec<Scalar>> {
    let unsupported = || ArtifactError::UnsupportedColumn {
        column: name.to_string(),
        data_type: array.data_type().to_string(),
    };

    let values = match array.data_type() {
        DataType::Boolean => {
            let a = array.as_any().downcast_ref::<BooleanArray>().ok_or_else(unsupported)?;
            (0..a.len()).map(|i| Scalar::Bool(a.value(i))).collect()
        }
        DataType::Int64 => {
            let a = array.as_any().downcast_ref::<Int64Array>().ok_or_else(unsupported)?;
            a.values().iter().map(|v| Scalar::Int(*v)).collect()
        }
        DataType::Float64 => {
            let a = array.as_any().downcast_ref::<Float64Array>().ok_or_else(unsupported)?;
            a.values().iter().map(|v| Scalar::Float(*v)).collect()
        }
        DataType::Utf8 => {
            let a = array.as_any().downcast_ref::<StringArray>().ok_or_else(unsupported)?;
            (0..a.len()).map(|i| Scalar::Text(a.value(i).to_string())).collect()
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let a = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(unsupported)?;
            a.values()
                .iter()
                .map(|v| {
                    DateTime::from_timestamp_micros(*v)
                        .map(|dt| Scalar::Timestamp(dt.naive_utc()))
                        .ok_or_else(unsupported)
                })
                .collect::<ArtifactResult<Vec<_>>>()?
        }
        _ => return Err(unsupported()),
    };
    Ok(values)
}

/// Delete an artifact left by an earlier run. Returns whether a file was
/// removed.
pub fn remove_artifact(path: &Path) -> ArtifactResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ArtifactError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

// =============================================================================
// Gold (CSV + manifest)
// =============================================================================

/// Write a small CSV table with a header row.
pub fn write_csv_table(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> ArtifactResult<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })
}
