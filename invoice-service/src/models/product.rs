//! Product model for invoice-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Product catalog row.
///
/// At most one row per uppercased name is active at a time; a
/// re-registration with a different price or tax rate deactivates the
/// old row and inserts a replacement. Inactive rows are kept so line
/// snapshots keep a valid reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub description: String,
    /// Tax-inclusive unit price.
    pub unit_price: Decimal,
    /// Tax rate as a percentage.
    pub tax_rate: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for inserting an active product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}
