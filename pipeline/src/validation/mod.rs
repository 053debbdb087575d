//! JSON Schema validation of silver rows.
//!
//! Cleaned orders and tickets must satisfy a small contract before they
//! are persisted, since the aggregator relies on it:
//!
//! - `silver-order.json` - `order_id`, numeric `subtotal`, `ordered_at`
//! - `silver-ticket.json` - `ticket_id`, `order_id`
//!
//! Schemas are embedded at compile time from the `schemas/` directory.

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::models::Entity;

static ORDER_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/silver-order.json"))
        .expect("Invalid embedded schema")
});

static TICKET_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/silver-ticket.json"))
        .expect("Invalid embedded schema")
});

fn collect_errors(validator: &Validator, data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The silver schema for an entity, if it has one.
pub fn silver_schema(entity: Entity) -> Option<&'static Value> {
    match entity {
        Entity::Orders => Some(&ORDER_SCHEMA),
        Entity::Tickets => Some(&TICKET_SCHEMA),
        _ => None,
    }
}

/// Compiled validator for an entity's silver rows.
pub struct SilverValidator {
    validator: Validator,
}

impl SilverValidator {
    /// `None` when the entity carries no silver contract.
    pub fn for_entity(entity: Entity) -> Option<Self> {
        let schema = silver_schema(entity)?;
        let validator = jsonschema::draft7::new(schema).expect("Invalid embedded schema");
        Some(Self { validator })
    }

    pub fn validate(&self, row: &Value) -> Result<(), Vec<String>> {
        collect_errors(&self.validator, row)
    }
}
