//! Gold-layer metrics computed from cleaned orders and tickets.
//!
//! Three independent computations:
//!
//! - [`average_order_value`] - mean `subtotal`; explicitly undefined on zero orders
//! - [`total_revenue`] - sum of `subtotal`; zero on zero orders
//! - [`tickets_per_order`] - left join of orders against tickets on `order_id`
//!
//! Every order appears in the tickets-per-order table, with 0 when no
//! ticket references it. Tickets pointing at unknown orders are counted
//! separately and left out.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::ReportError;
use crate::models::{format_float, CleanTable, Order, Scalar, SupportTicket};
use crate::transform::normalize::{ORDERED_AT, ORDER_ID};

/// Output file names in the gold directory
pub const AVERAGE_ORDER_VALUE_FILE: &str = "average_order_value.csv";
pub const TICKETS_PER_ORDER_FILE: &str = "tickets_per_order.csv";
pub const TOTAL_REVENUE_FILE: &str = "total_revenue.csv";

/// A metric that may have no meaningful value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, MetricValue::Undefined)
    }
}

// =============================================================================
// Typed views
// =============================================================================

fn require_column(table: &CleanTable, entity: &str, column: &str) -> Result<usize, ReportError> {
    table
        .column_index(column)
        .ok_or_else(|| ReportError::MissingColumn {
            entity: entity.to_string(),
            column: column.to_string(),
        })
}

/// Typed orders from a cleaned orders table.
pub fn orders_from_table(table: &CleanTable) -> Result<Vec<Order>, ReportError> {
    let id_idx = require_column(table, "orders", ORDER_ID)?;
    let subtotal_idx = require_column(table, "orders", "subtotal")?;
    let ts_idx = table.column_index(ORDERED_AT);

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row, cells)| {
            let subtotal = cells[subtotal_idx]
                .as_f64()
                .ok_or_else(|| ReportError::WrongType {
                    entity: "orders".into(),
                    row,
                    column: "subtotal".into(),
                    expected: "a number",
                })?;
            let ordered_at = match ts_idx.map(|i| &cells[i]) {
                None => None,
                Some(Scalar::Timestamp(t)) => Some(*t),
                Some(_) => {
                    return Err(ReportError::WrongType {
                        entity: "orders".into(),
                        row,
                        column: ORDERED_AT.into(),
                        expected: "a timestamp",
                    })
                }
            };
            Ok(Order {
                order_id: cells[id_idx].as_key(),
                subtotal,
                ordered_at,
            })
        })
        .collect()
}

/// Typed tickets from a cleaned tickets table.
pub fn tickets_from_table(table: &CleanTable) -> Result<Vec<SupportTicket>, ReportError> {
    let order_idx = require_column(table, "tickets", ORDER_ID)?;
    let ticket_idx = table.column_index("ticket_id");

    Ok(table
        .rows
        .iter()
        .map(|cells| SupportTicket {
            ticket_id: ticket_idx.map(|i| cells[i].as_key()),
            order_id: cells[order_idx].as_key(),
        })
        .collect())
}

// =============================================================================
// Average order value
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageOrderValue {
    pub average_order_value: MetricValue,
    pub order_count: usize,
}

pub fn average_order_value(orders: &[Order]) -> AverageOrderValue {
    let value = if orders.is_empty() {
        MetricValue::Undefined
    } else {
        MetricValue::Defined(sum_subtotals(orders) / orders.len() as f64)
    };
    AverageOrderValue {
        average_order_value: value,
        order_count: orders.len(),
    }
}

impl AverageOrderValue {
    pub const HEADERS: [&'static str; 2] = ["average_order_value", "order_count"];

    /// Undefined renders as an empty cell.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let value = self
            .average_order_value
            .value()
            .map(format_float)
            .unwrap_or_default();
        vec![vec![value, self.order_count.to_string()]]
    }
}

// =============================================================================
// Total revenue
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalRevenue {
    pub total_revenue: f64,
}

pub fn total_revenue(orders: &[Order]) -> TotalRevenue {
    TotalRevenue {
        total_revenue: sum_subtotals(orders),
    }
}

impl TotalRevenue {
    pub const HEADERS: [&'static str; 1] = ["total_revenue"];

    pub fn to_rows(&self) -> Vec<Vec<String>> {
        vec![vec![format_float(self.total_revenue)]]
    }
}

/// An empty order set sums to positive zero.
fn sum_subtotals(orders: &[Order]) -> f64 {
    orders.iter().fold(0.0, |acc, o| acc + o.subtotal)
}

// =============================================================================
// Tickets per order
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketCount {
    pub order_id: String,
    pub number_of_tickets: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketsPerOrder {
    /// One row per distinct order, in first-seen order
    pub rows: Vec<TicketCount>,
    /// Tickets whose `order_id` matches no cleaned order
    pub unmatched_tickets: usize,
}

pub fn tickets_per_order(orders: &[Order], tickets: &[SupportTicket]) -> TicketsPerOrder {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(orders.len());
    let mut rows: Vec<TicketCount> = Vec::with_capacity(orders.len());

    for order in orders {
        if !index.contains_key(order.order_id.as_str()) {
            index.insert(order.order_id.as_str(), rows.len());
            rows.push(TicketCount {
                order_id: order.order_id.clone(),
                number_of_tickets: 0,
            });
        }
    }

    let mut unmatched_tickets = 0;
    for ticket in tickets {
        match index.get(ticket.order_id.as_str()) {
            Some(&i) => rows[i].number_of_tickets += 1,
            None => unmatched_tickets += 1,
        }
    }

    TicketsPerOrder {
        rows,
        unmatched_tickets,
    }
}

impl TicketsPerOrder {
    pub const HEADERS: [&'static str; 2] = ["order_id", "number_of_tickets"];

    pub fn to_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| vec![r.order_id.clone(), r.number_of_tickets.to_string()])
            .collect()
    }

    /// Tickets matched to a known order.
    pub fn matched_tickets(&self) -> usize {
        self.rows.iter().map(|r| r.number_of_tickets).sum()
    }
}
