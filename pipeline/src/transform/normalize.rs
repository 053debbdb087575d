//! Record normalizer: raw (bronze) tables to cleaned (silver) tables.
//!
//! ```text
//! RawTable ─▶ rename id ─▶ canonicalize ─▶ dedup ─▶ drop nulls ─▶ parse ordered_at ─▶ schema ─▶ CleanTable
//!            (orders)      (nested→str)   (first    (any null     (orders)             (orders,
//!                                          wins)     field)                            tickets)
//! ```
//!
//! Nested values are turned into a compact JSON string with mapping keys
//! sorted and sequence elements sorted by their own canonical form, so two
//! values that differ only in ordering compare equal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::{CleaningOptions, MalformedPolicy};
use crate::error::{CleanError, CleanResult};
use crate::logs::{log_info_indent, log_warning};
use crate::models::{CleanTable, Entity, RawTable, RawValue, Scalar};
use crate::validation::SilverValidator;

/// Generic identifier column on the raw orders file
pub const RAW_ORDER_ID: &str = "id";
/// Join-compatible identifier column on cleaned orders and tickets
pub const ORDER_ID: &str = "order_id";
/// Order timestamp column
pub const ORDERED_AT: &str = "ordered_at";

/// Counts describing one entity's cleaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub entity: String,
    pub input_rows: usize,
    pub duplicates_removed: usize,
    pub null_rows_removed: usize,
    pub malformed_dropped: usize,
    pub output_rows: usize,
}

impl CleanReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows in, {} duplicates, {} with nulls, {} malformed, {} out",
            self.entity,
            self.input_rows,
            self.duplicates_removed,
            self.null_rows_removed,
            self.malformed_dropped,
            self.output_rows
        )
    }
}

// =============================================================================
// Canonicalization
// =============================================================================

/// Canonical string form of any value.
///
/// Fails only on non-finite floats, which have no JSON representation.
pub fn canonicalize(value: &RawValue) -> Result<String, String> {
    match value {
        RawValue::Null => Ok("null".to_string()),
        RawValue::Scalar(scalar) => canonical_scalar(scalar),
        RawValue::Sequence(items) => {
            let mut parts = items.iter().map(canonicalize).collect::<Result<Vec<_>, _>>()?;
            parts.sort();
            Ok(format!("[{}]", parts.join(",")))
        }
        RawValue::Mapping(fields) => {
            let mut entries = fields
                .iter()
                .map(|(k, v)| Ok((k.as_str(), canonicalize(v)?)))
                .collect::<Result<Vec<_>, String>>()?;
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", json_string(k), v))
                .collect();
            Ok(format!("{{{}}}", parts.join(",")))
        }
    }
}

fn canonical_scalar(scalar: &Scalar) -> Result<String, String> {
    match scalar {
        Scalar::Float(f) if !f.is_finite() => {
            Err(format!("non-finite number {} has no canonical form", f))
        }
        Scalar::Float(f) => Ok(serde_json::Number::from_f64(*f)
            .map(|n| n.to_string())
            .unwrap_or_else(|| f.to_string())),
        Scalar::Text(s) => Ok(json_string(s)),
        other => Ok(other.to_json().to_string()),
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Canonicalize a single cell: nulls stay null, scalars pass through,
/// nested values become their canonical text.
pub fn canonical_cell(value: RawValue) -> Result<Option<Scalar>, String> {
    match value {
        RawValue::Null => Ok(None),
        RawValue::Scalar(s) => Ok(Some(s)),
        nested => canonicalize(&nested).map(|s| Some(Scalar::Text(s))),
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse an order timestamp. RFC 3339 values are normalized to UTC; a bare
/// date means midnight. Fractions are truncated to microseconds, the
/// precision of the silver artifacts.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    parse_timestamp_exact(value.trim()).map(|ts| ts.trunc_subsecs(6))
}

fn parse_timestamp_exact(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// =============================================================================
// Cleaning
// =============================================================================

/// Clean one entity's raw table.
///
/// Under an `abort` policy the first malformed row fails the whole call;
/// under `drop_row` it is removed and counted.
pub fn clean_table(
    entity: Entity,
    raw: RawTable,
    options: &CleaningOptions,
) -> CleanResult<(CleanTable, CleanReport)> {
    let mut report = CleanReport {
        entity: entity.to_string(),
        input_rows: raw.len(),
        ..Default::default()
    };

    let mut columns = raw.columns;
    if entity == Entity::Orders {
        rename_order_id(&mut columns);
    }

    // Canonicalize every cell, remembering the source row index.
    let mut rows: Vec<(usize, Vec<Option<Scalar>>)> = Vec::with_capacity(raw.rows.len());
    'rows: for (idx, raw_row) in raw.rows.into_iter().enumerate() {
        let mut row = Vec::with_capacity(raw_row.len());
        for (col, cell) in columns.iter().zip(raw_row) {
            match canonical_cell(cell) {
                Ok(cell) => row.push(cell),
                Err(message) => {
                    let err = CleanError::MalformedNested {
                        entity: entity.to_string(),
                        row: idx,
                        column: col.clone(),
                        message,
                    };
                    handle_malformed(options.nested_value_policy, err, &mut report)?;
                    continue 'rows;
                }
            }
        }
        rows.push((idx, row));
    }

    // Exact duplicates: first occurrence wins.
    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(rows.len());
    let before = rows.len();
    rows.retain(|(_, row)| seen.insert(row_key(row)));
    report.duplicates_removed = before - rows.len();

    // Any null field drops the row.
    let before = rows.len();
    let mut scalar_rows: Vec<(usize, Vec<Scalar>)> = rows
        .into_iter()
        .filter_map(|(idx, row)| row.into_iter().collect::<Option<Vec<_>>>().map(|r| (idx, r)))
        .collect();
    report.null_rows_removed = before - scalar_rows.len();

    if entity == Entity::Orders {
        scalar_rows = parse_order_timestamps(&columns, scalar_rows, options, &mut report)?;
    }

    let mut table = CleanTable::new(columns);
    table.rows = scalar_rows.iter().map(|(_, r)| r.clone()).collect();

    if let Some(validator) = SilverValidator::for_entity(entity) {
        table = enforce_schema(entity, table, &scalar_rows, &validator, options, &mut report)?;
    }

    report.output_rows = table.len();
    warn_on_repeated_ids(entity, &table);
    log_info_indent(report.summary(), 1);

    Ok((table, report))
}

/// `id` becomes `order_id`; a table already carrying `order_id` is left alone.
fn rename_order_id(columns: &mut [String]) {
    if columns.iter().any(|c| c == ORDER_ID) {
        return;
    }
    if let Some(col) = columns.iter_mut().find(|c| c.as_str() == RAW_ORDER_ID) {
        *col = ORDER_ID.to_string();
    }
}

fn row_key(row: &[Option<Scalar>]) -> Vec<String> {
    row.iter()
        .map(|cell| match cell {
            Some(s) => s.dedup_key(),
            None => "n:".to_string(),
        })
        .collect()
}

fn handle_malformed(
    policy: MalformedPolicy,
    err: CleanError,
    report: &mut CleanReport,
) -> CleanResult<()> {
    match policy {
        MalformedPolicy::Abort => Err(err),
        MalformedPolicy::DropRow => {
            log_warning(format!("Dropping row: {}", err));
            report.malformed_dropped += 1;
            Ok(())
        }
    }
}

fn parse_order_timestamps(
    columns: &[String],
    rows: Vec<(usize, Vec<Scalar>)>,
    options: &CleaningOptions,
    report: &mut CleanReport,
) -> CleanResult<Vec<(usize, Vec<Scalar>)>> {
    // A missing column is left to the schema check.
    let Some(ts_idx) = columns.iter().position(|c| c == ORDERED_AT) else {
        return Ok(rows);
    };

    let mut parsed = Vec::with_capacity(rows.len());
    for (idx, mut row) in rows {
        let value = match &row[ts_idx] {
            Scalar::Timestamp(t) => Some(*t),
            Scalar::Text(s) => parse_timestamp(s),
            _ => None,
        };
        match value {
            Some(t) => {
                row[ts_idx] = Scalar::Timestamp(t);
                parsed.push((idx, row));
            }
            None => {
                let err = CleanError::MalformedTimestamp {
                    entity: Entity::Orders.to_string(),
                    row: idx,
                    column: ORDERED_AT.to_string(),
                    value: row[ts_idx].to_string(),
                };
                handle_malformed(options.timestamp_policy, err, report)?;
            }
        }
    }
    Ok(parsed)
}

fn enforce_schema(
    entity: Entity,
    table: CleanTable,
    indexed: &[(usize, Vec<Scalar>)],
    validator: &SilverValidator,
    options: &CleaningOptions,
    report: &mut CleanReport,
) -> CleanResult<CleanTable> {
    let mut kept = Vec::with_capacity(table.len());
    for (pos, (idx, _)) in indexed.iter().enumerate() {
        match validator.validate(&table.row_to_json(pos)) {
            Ok(()) => kept.push(table.rows[pos].clone()),
            Err(errors) => {
                let err = CleanError::SchemaViolation {
                    entity: entity.to_string(),
                    row: *idx,
                    errors,
                };
                handle_malformed(options.schema_policy, err, report)?;
            }
        }
    }
    Ok(CleanTable {
        columns: table.columns,
        rows: kept,
    })
}

fn identifier_column(entity: Entity) -> &'static str {
    match entity {
        Entity::Orders => ORDER_ID,
        Entity::Tickets => "ticket_id",
        _ => "id",
    }
}

/// Exact dedup can leave repeated identifiers when other fields differ.
fn warn_on_repeated_ids(entity: Entity, table: &CleanTable) {
    let Some(ids) = table.column(identifier_column(entity)) else {
        return;
    };
    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in ids {
        *counts.entry(id.as_key()).or_default() += 1;
    }
    let repeated = counts.values().filter(|&&n| n > 1).count();
    if repeated > 0 {
        log_warning(format!(
            "{}: {} identifier(s) appear on more than one cleaned row",
            entity, repeated
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use crate::logs::{drain_warnings, LOG_BROADCASTER};

    fn raw(columns: &[&str], rows: Vec<Vec<RawValue>>) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    fn tags(items: &[&str]) -> RawValue {
        RawValue::Sequence(items.iter().map(|s| RawValue::text(*s)).collect())
    }

    fn drop_all() -> CleaningOptions {
        CleaningOptions {
            timestamp_policy: MalformedPolicy::DropRow,
            nested_value_policy: MalformedPolicy::DropRow,
            schema_policy: MalformedPolicy::DropRow,
        }
    }

    #[test]
    fn test_canonicalize_sorts_keys_and_elements() {
        let a = RawValue::Mapping(vec![
            ("priority".into(), RawValue::text("high")),
            ("tags".into(), tags(&["order", "delivery"])),
        ]);
        let b = RawValue::Mapping(vec![
            ("tags".into(), tags(&["delivery", "order"])),
            ("priority".into(), RawValue::text("high")),
        ]);
        let ca = canonicalize(&a).unwrap();
        assert_eq!(ca, canonicalize(&b).unwrap());
        assert_eq!(ca, r#"{"priority":"high","tags":["delivery","order"]}"#);

        let parsed: serde_json::Value = serde_json::from_str(&ca).unwrap();
        assert_eq!(parsed["priority"], "high");
    }

    #[test]
    fn test_canonicalize_scalars_pass_through() {
        assert_eq!(canonical_cell(RawValue::int(42)).unwrap(), Some(Scalar::Int(42)));
        assert_eq!(
            canonical_cell(RawValue::text("hello")).unwrap(),
            Some(Scalar::Text("hello".into()))
        );
        assert_eq!(canonical_cell(RawValue::Null).unwrap(), None);
        assert_eq!(canonicalize(&RawValue::float(3.14)).unwrap(), "3.14");
    }

    #[test]
    fn test_canonicalize_rejects_non_finite() {
        let v = RawValue::Sequence(vec![RawValue::float(f64::NAN)]);
        assert!(canonicalize(&v).is_err());
    }

    #[test]
    fn test_nested_order_duplicates_collapse() {
        let table = raw(
            &["id", "name", "tags"],
            vec![
                vec![RawValue::int(1), RawValue::text("Alice"), tags(&["a", "b"])],
                vec![RawValue::int(1), RawValue::text("Alice"), tags(&["b", "a"])],
            ],
        );
        let (clean, report) =
            clean_table(Entity::Customers, table, &CleaningOptions::default()).unwrap();

        assert_eq!(clean.len(), 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(clean.rows[0][2], Scalar::Text(r#"["a","b"]"#.into()));
    }

    #[test]
    fn test_customers_dedup_and_nulls() {
        let table = raw(
            &["id", "name", "email"],
            vec![
                vec![RawValue::int(1), RawValue::text("Alice"), RawValue::text("a@test.com")],
                vec![RawValue::int(2), RawValue::text("Bob"), RawValue::text("b@test.com")],
                vec![RawValue::int(1), RawValue::text("Alice"), RawValue::text("a@test.com")],
                vec![RawValue::int(3), RawValue::Null, RawValue::text("c@test.com")],
            ],
        );
        let (clean, report) =
            clean_table(Entity::Customers, table, &CleaningOptions::default()).unwrap();

        assert_eq!(clean.len(), 2);
        assert_eq!(clean.rows[0][1], Scalar::Text("Alice".into()));
        assert_eq!(clean.rows[1][1], Scalar::Text("Bob".into()));
        assert_eq!(report.input_rows, 4);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.null_rows_removed, 1);
        assert_eq!(report.output_rows, 2);
    }

    #[test]
    fn test_empty_and_all_null_inputs() {
        let (clean, _) = clean_table(
            Entity::Products,
            RawTable::new(vec!["sku".into()]),
            &CleaningOptions::default(),
        )
        .unwrap();
        assert!(clean.is_empty());
        assert_eq!(clean.columns, vec!["sku"]);

        let table = raw(&["sku", "price"], vec![vec![RawValue::Null, RawValue::Null]; 3]);
        let (clean, report) =
            clean_table(Entity::Items, table, &CleaningOptions::default()).unwrap();
        assert!(clean.is_empty());
        // Identical all-null rows dedup first, then the survivor is dropped.
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(report.null_rows_removed, 1);
    }

    #[test]
    fn test_null_inside_nested_value_keeps_row() {
        let table = raw(
            &["ticket_id", "order_id", "meta"],
            vec![vec![
                RawValue::text("T1"),
                RawValue::text("O1"),
                RawValue::Mapping(vec![("note".into(), RawValue::Null)]),
            ]],
        );
        let (clean, _) = clean_table(Entity::Tickets, table, &CleaningOptions::default()).unwrap();
        assert_eq!(clean.rows[0][2], Scalar::Text(r#"{"note":null}"#.into()));
    }

    fn orders_raw(ordered_at: &[&str]) -> RawTable {
        raw(
            &["id", "customer", "ordered_at", "subtotal"],
            ordered_at
                .iter()
                .enumerate()
                .map(|(i, ts)| {
                    vec![
                        RawValue::text(format!("ORD-{:03}", i + 1)),
                        RawValue::int(i as i64 + 1),
                        RawValue::text(*ts),
                        RawValue::float(100.0 + 50.0 * i as f64),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_orders_rename_and_parse() {
        let (clean, _) = clean_table(
            Entity::Orders,
            orders_raw(&["2024-01-01", "2024-01-02T10:30:00", "2024-01-03T08:00:00+02:00"]),
            &CleaningOptions::default(),
        )
        .unwrap();

        assert_eq!(clean.columns[0], "order_id");
        assert!(!clean.columns.contains(&"id".to_string()));
        let day = |d: u32, h: u32, m: u32| {
            NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(h, m, 0).unwrap()
        };
        assert_eq!(clean.rows[0][2], Scalar::Timestamp(day(1, 0, 0)));
        assert_eq!(clean.rows[1][2], Scalar::Timestamp(day(2, 10, 30)));
        assert_eq!(clean.rows[2][2], Scalar::Timestamp(day(3, 6, 0)));
        assert_eq!(clean.rows[1][3], Scalar::Float(150.0));
    }

    #[test]
    fn test_bad_timestamp_aborts_by_default() {
        let err = clean_table(
            Entity::Orders,
            orders_raw(&["2024-01-01", "not a date"]),
            &CleaningOptions::default(),
        )
        .unwrap_err();
        match err {
            CleanError::MalformedTimestamp { row, value, .. } => {
                assert_eq!(row, 1);
                assert_eq!(value, "not a date");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp_drop_row() {
        let (clean, report) = clean_table(
            Entity::Orders,
            orders_raw(&["2024-01-01", "not a date", "2024-01-03"]),
            &drop_all(),
        )
        .unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(report.malformed_dropped, 1);
        assert_eq!(clean.rows[1][0], Scalar::Text("ORD-003".into()));
    }

    #[test]
    fn test_drop_row_logs_a_warning() {
        let mut rx = LOG_BROADCASTER.subscribe();
        clean_table(
            Entity::Orders,
            orders_raw(&["2024-01-01", "half past noon"]),
            &drop_all(),
        )
        .unwrap();

        let warnings = drain_warnings(&mut rx);
        assert!(warnings
            .iter()
            .any(|w| w.starts_with("Dropping row") && w.contains("half past noon")));
    }

    #[test]
    fn test_repeated_identifiers_are_kept_with_a_warning() {
        let mut rx = LOG_BROADCASTER.subscribe();
        let tickets = raw(
            &["ticket_id", "order_id", "channel"],
            vec![
                vec![RawValue::text("TK-REPEAT"), RawValue::text("O1"), RawValue::text("email")],
                vec![RawValue::text("TK-REPEAT"), RawValue::text("O1"), RawValue::text("phone")],
                vec![RawValue::text("TK-ONCE"), RawValue::text("O2"), RawValue::text("email")],
            ],
        );

        let (clean, report) = clean_table(Entity::Tickets, tickets, &CleaningOptions::default())
            .unwrap();
        assert_eq!(clean.len(), 3);
        assert_eq!(report.duplicates_removed, 0);

        let warnings = drain_warnings(&mut rx);
        assert!(warnings
            .iter()
            .any(|w| w == "tickets: 1 identifier(s) appear on more than one cleaned row"));
    }

    #[test]
    fn test_unserializable_nested_value_policies() {
        let build = || {
            raw(
                &["ticket_id", "order_id", "scores"],
                vec![
                    vec![
                        RawValue::text("T1"),
                        RawValue::text("O1"),
                        RawValue::Sequence(vec![RawValue::float(f64::INFINITY)]),
                    ],
                    vec![
                        RawValue::text("T2"),
                        RawValue::text("O1"),
                        RawValue::Sequence(vec![RawValue::float(1.0)]),
                    ],
                ],
            )
        };

        let err = clean_table(Entity::Tickets, build(), &CleaningOptions::default()).unwrap_err();
        assert!(matches!(err, CleanError::MalformedNested { row: 0, .. }));

        let (clean, report) = clean_table(Entity::Tickets, build(), &drop_all()).unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.rows[0][0], Scalar::Text("T2".into()));
        assert_eq!(report.malformed_dropped, 1);
    }

    #[test]
    fn test_schema_violation_policies() {
        let build = || {
            raw(
                &["id", "ordered_at", "subtotal"],
                vec![
                    vec![RawValue::int(1), RawValue::text("2024-01-01"), RawValue::float(10.0)],
                    vec![RawValue::int(2), RawValue::text("2024-01-02"), RawValue::text("ten")],
                ],
            )
        };

        let err = clean_table(Entity::Orders, build(), &CleaningOptions::default()).unwrap_err();
        assert!(matches!(err, CleanError::SchemaViolation { row: 1, .. }));

        let (clean, report) = clean_table(Entity::Orders, build(), &drop_all()).unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(report.malformed_dropped, 1);
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let options = CleaningOptions::default();
        let mut orders = orders_raw(&["2024-01-01", "2024-01-02"]);
        orders.rows.push(orders.rows[0].clone());
        let (once, _) = clean_table(Entity::Orders, orders, &options).unwrap();
        let (twice, report) = clean_table(Entity::Orders, once.to_raw(), &options).unwrap();
        assert_eq!(once, twice);
        assert_eq!(report.duplicates_removed, 0);

        let tickets = raw(
            &["ticket_id", "order_id", "tags"],
            vec![vec![RawValue::text("T1"), RawValue::text("O1"), tags(&["z", "a"])]],
        );
        let (once, _) = clean_table(Entity::Tickets, tickets, &options).unwrap();
        let (twice, _) = clean_table(Entity::Tickets, once.to_raw(), &options).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2024-01-01 12:00:00").is_some());
        assert!(parse_timestamp("2024-01-01T12:00:00.250").is_some());
        assert!(parse_timestamp("2024-01-01T12:00:00Z").is_some());
        assert!(parse_timestamp("01/02/2024").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_parse_timestamp_truncates_to_microseconds() {
        let ts = parse_timestamp("2024-01-01T12:00:00.123456789").unwrap();
        assert_eq!(ts.nanosecond(), 123_456_000);
        let ts = parse_timestamp("2024-01-01T12:00:00.999999999Z").unwrap();
        assert_eq!(ts.second(), 0);
        assert_eq!(ts.nanosecond(), 999_999_000);
    }
}
