//! Domain models for the restaurant pipeline.
//!
//! - [`RawValue`] - loosely-typed cell as read from a source (bronze)
//! - [`Scalar`] - strictly scalar cell after cleaning (silver)
//! - [`RawTable`] / [`CleanTable`] - column-ordered tables of those cells
//! - [`Order`] / [`SupportTicket`] - typed views used by the aggregator
//! - [`Entity`] - the record families the pipeline knows about

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

// =============================================================================
// Entities
// =============================================================================

/// Record families handled by the cleaning stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Customers,
    Orders,
    Products,
    Items,
    Tickets,
}

impl Entity {
    pub const ALL: [Entity; 5] = [
        Entity::Customers,
        Entity::Orders,
        Entity::Products,
        Entity::Items,
        Entity::Tickets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Entity::Customers => "customers",
            Entity::Orders => "orders",
            Entity::Products => "products",
            Entity::Items => "items",
            Entity::Tickets => "tickets",
        }
    }

    /// File name of the silver artifact for this entity.
    pub fn silver_file(&self) -> String {
        format!("cleaned_{}.parquet", self.name())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Cell values
// =============================================================================

/// A scalar cell. The only cell type left once a table is cleaned.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Scalar {
    /// Type-tagged rendering used as a dedup key: `Int(1)` and `Text("1")`
    /// stay distinct.
    pub fn dedup_key(&self) -> String {
        match self {
            Scalar::Bool(b) => format!("b:{}", b),
            Scalar::Int(i) => format!("i:{}", i),
            Scalar::Float(f) => format!("f:{}", f.to_bits()),
            Scalar::Text(s) => format!("s:{}", s),
            Scalar::Timestamp(t) => format!("t:{}", t.and_utc().timestamp_micros()),
        }
    }

    /// Join-key rendering: identifiers compare as text.
    pub fn as_key(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Bool(b) => json!(b),
            Scalar::Int(i) => json!(i),
            Scalar::Float(f) => json!(f),
            Scalar::Text(s) => json!(s),
            Scalar::Timestamp(t) => json!(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => f.write_str(&format_float(*v)),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Render a float the way the gold CSVs expect: `150.0`, not `150`.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// A cell as read from a raw source: may be null or nested.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Scalar(Scalar),
    Sequence(Vec<RawValue>),
    /// Keys keep their source order; canonicalization sorts them.
    Mapping(Vec<(String, RawValue)>),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Scalar(Scalar::Text(s.into()))
    }

    pub fn int(i: i64) -> Self {
        RawValue::Scalar(Scalar::Int(i))
    }

    pub fn float(f: f64) -> Self {
        RawValue::Scalar(Scalar::Float(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, RawValue::Sequence(_) | RawValue::Mapping(_))
    }

    /// Convert a parsed JSON value. Integers that fit `i64` stay integral.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::int(i),
                None => RawValue::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => RawValue::text(s),
            Value::Array(items) => {
                RawValue::Sequence(items.into_iter().map(RawValue::from_json).collect())
            }
            Value::Object(map) => RawValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, RawValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Scalar> for RawValue {
    fn from(s: Scalar) -> Self {
        RawValue::Scalar(s)
    }
}

// =============================================================================
// Tables
// =============================================================================

/// A raw table: ordered columns, rows may hold nulls and nested values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A cleaned table: every cell is a [`Scalar`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl CleanTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Scalar>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Row as a JSON object, used for schema validation and debug output.
    pub fn row_to_json(&self, row: usize) -> Value {
        let mut obj = Map::new();
        for (col, cell) in self.columns.iter().zip(&self.rows[row]) {
            obj.insert(col.clone(), cell.to_json());
        }
        Value::Object(obj)
    }

    /// Lift back into a raw table (used to re-clean silver data).
    pub fn to_raw(&self) -> RawTable {
        RawTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().cloned().map(RawValue::Scalar).collect())
                .collect(),
        }
    }
}

// =============================================================================
// Typed views
// =============================================================================

/// A cleaned order, as the aggregator sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub subtotal: f64,
    pub ordered_at: Option<NaiveDateTime>,
}

/// A cleaned support ticket, as the aggregator sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportTicket {
    pub ticket_id: Option<String>,
    pub order_id: String,
}
