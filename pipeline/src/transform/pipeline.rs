//! Stage orchestration: bronze → silver → gold.
//!
//! # Example
//!
//! ```rust,ignore
//! use restaurant_pipeline::{run, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::load(Path::new("pipeline.json"))?;
//!     let manifest = run(&config).await?;
//!     println!("Run {} done", manifest.run_id);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::artifact::{read_silver, remove_artifact, write_csv_table, write_json, write_silver};
use crate::config::{PipelineConfig, SourceLocation};
use crate::error::PipelineResult;
use crate::logs::{drain_warnings, log_info, log_success, log_warning, LOG_BROADCASTER};
use crate::models::{Entity, RawTable};
use crate::report::{
    average_order_value, orders_from_table, tickets_from_table, tickets_per_order,
    total_revenue, AverageOrderValue, TicketsPerOrder, TotalRevenue,
    AVERAGE_ORDER_VALUE_FILE, TICKETS_PER_ORDER_FILE, TOTAL_REVENUE_FILE,
};
use crate::source::{load_source, SourceFormat};

use super::normalize::{clean_table, CleanReport, ORDER_ID};

/// Manifest file written to the gold directory after a full run
pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";

/// Result of the reporting stage
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub average_order_value: AverageOrderValue,
    pub total_revenue: TotalRevenue,
    pub tickets_per_order: TicketsPerOrder,
    pub outputs: Vec<PathBuf>,
}

/// Summary of a full run, persisted as JSON
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cleaning: Vec<CleanReport>,
    pub report: ReportOutcome,
    /// Warnings logged while the run was in progress
    pub warnings: Vec<String>,
}

/// Entities to load, with their configured location and payload format.
fn planned_sources(config: &PipelineConfig) -> Vec<(Entity, Option<&SourceLocation>, SourceFormat)> {
    let s = &config.sources;
    vec![
        (Entity::Customers, Some(&s.customers), SourceFormat::Csv),
        (Entity::Orders, Some(&s.orders), SourceFormat::Csv),
        (Entity::Products, s.products.as_ref(), SourceFormat::Csv),
        (Entity::Items, s.items.as_ref(), SourceFormat::Csv),
        (Entity::Tickets, Some(&s.tickets), SourceFormat::Ndjson),
    ]
}

/// An empty NDJSON payload has no columns at all; give tickets the
/// columns the reporting stage joins on.
fn ensure_ticket_columns(entity: Entity, raw: &mut RawTable) {
    if entity == Entity::Tickets && raw.columns.is_empty() {
        raw.columns = vec!["ticket_id".to_string(), ORDER_ID.to_string()];
    }
}

/// Cleaning stage: load every configured source, clean it and write its
/// silver artifact.
pub async fn run_cleaning(config: &PipelineConfig) -> PipelineResult<Vec<CleanReport>> {
    log_info("🧹 Cleaning stage");
    let mut reports = Vec::new();

    for (entity, location, format) in planned_sources(config) {
        let Some(location) = location else {
            log_info(format!("No source configured for {}, skipping", entity));
            let stale = config.silver_path(entity);
            if remove_artifact(&stale)? {
                log_info(format!("Removed stale {}", stale.display()));
            }
            continue;
        };

        let mut raw = load_source(entity.name(), location, format, config.csv_delimiter).await?;
        ensure_ticket_columns(entity, &mut raw);

        let (table, report) = clean_table(entity, raw, &config.cleaning)?;
        let path = config.silver_path(entity);
        write_silver(&path, &table)?;
        log_success(format!("Wrote {} ({} rows)", path.display(), table.len()));
        reports.push(report);
    }

    Ok(reports)
}

/// Reporting stage: read silver orders and tickets, compute the metrics and
/// write the gold tables.
pub fn run_reporting(config: &PipelineConfig) -> PipelineResult<ReportOutcome> {
    log_info("📊 Reporting stage");

    let orders = orders_from_table(&read_silver(&config.silver_path(Entity::Orders))?)?;
    let tickets = tickets_from_table(&read_silver(&config.silver_path(Entity::Tickets))?)?;
    log_info(format!("{} orders, {} tickets", orders.len(), tickets.len()));

    let aov = average_order_value(&orders);
    if aov.average_order_value.is_undefined() {
        log_warning("Average order value is undefined: no cleaned orders");
    }
    let revenue = total_revenue(&orders);
    let per_order = tickets_per_order(&orders, &tickets);
    if per_order.unmatched_tickets > 0 {
        log_warning(format!(
            "{} ticket(s) reference unknown orders and were not counted",
            per_order.unmatched_tickets
        ));
    }

    let gold = &config.gold_dir;
    let outputs = vec![
        gold.join(AVERAGE_ORDER_VALUE_FILE),
        gold.join(TICKETS_PER_ORDER_FILE),
        gold.join(TOTAL_REVENUE_FILE),
    ];
    write_csv_table(&outputs[0], &AverageOrderValue::HEADERS, &aov.to_rows())?;
    write_csv_table(&outputs[1], &TicketsPerOrder::HEADERS, &per_order.to_rows())?;
    write_csv_table(&outputs[2], &TotalRevenue::HEADERS, &revenue.to_rows())?;
    for path in &outputs {
        log_success(format!("Wrote {}", path.display()));
    }

    Ok(ReportOutcome {
        average_order_value: aov,
        total_revenue: revenue,
        tickets_per_order: per_order,
        outputs,
    })
}

/// Full run: cleaning, reporting, then the run manifest.
pub async fn run(config: &PipelineConfig) -> PipelineResult<RunManifest> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let mut log_rx = LOG_BROADCASTER.subscribe();
    log_info(format!("🚀 Run {}", run_id));

    let cleaning = run_cleaning(config).await?;
    let report = run_reporting(config)?;

    let manifest = RunManifest {
        run_id,
        started_at,
        finished_at: Utc::now(),
        cleaning,
        report,
        warnings: drain_warnings(&mut log_rx),
    };
    let path = config.gold_dir.join(RUN_MANIFEST_FILE);
    write_json(&path, &manifest)?;
    log_success(format!("Run manifest: {}", path.display()));

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleaningOptions, Sources};

    fn config_with(products: Option<SourceLocation>) -> PipelineConfig {
        PipelineConfig {
            sources: Sources {
                customers: SourceLocation::file("c.csv"),
                orders: SourceLocation::file("o.csv"),
                products,
                items: None,
                tickets: SourceLocation::file("t.jsonl"),
            },
            silver_dir: PathBuf::from("silver"),
            gold_dir: PathBuf::from("gold"),
            cleaning: CleaningOptions::default(),
            csv_delimiter: None,
        }
    }

    #[test]
    fn test_planned_sources() {
        let config = config_with(Some(SourceLocation::file("p.csv")));
        let plan = planned_sources(&config);
        assert_eq!(plan.len(), 5);
        assert!(plan[2].1.is_some());
        assert!(plan[3].1.is_none());
        assert_eq!(plan[4].2, SourceFormat::Ndjson);
    }

    #[test]
    fn test_ensure_ticket_columns() {
        let mut raw = RawTable::default();
        ensure_ticket_columns(Entity::Tickets, &mut raw);
        assert_eq!(raw.columns, vec!["ticket_id", "order_id"]);

        let mut other = RawTable::default();
        ensure_ticket_columns(Entity::Items, &mut other);
        assert!(other.columns.is_empty());
    }
}
