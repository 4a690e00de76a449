//! Invoice and invoice-line models for invoice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice header. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    /// Insertion order; the allocator derives its base from the newest row.
    pub seq: i64,
    /// Human-facing number, unique across all invoices.
    pub number: String,
    pub invoice_date: NaiveDate,
    pub client_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

/// Line item with the unit price and tax rate snapshotted at invoice
/// time, independent of later changes to the product row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub line_id: Uuid,
    pub invoice_id: Uuid,
    pub product_id: Uuid,
    pub line_no: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Invoice row joined with its client's name, for listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceSummary {
    pub invoice_id: Uuid,
    pub number: String,
    pub invoice_date: NaiveDate,
    pub client_name: String,
}

/// Header input for the transactional header+lines insert.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub number: String,
    pub invoice_date: NaiveDate,
    pub client_id: Uuid,
}

/// Line input for the transactional header+lines insert.
#[derive(Debug, Clone)]
pub struct NewInvoiceLine {
    pub product_id: Uuid,
    pub line_no: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}
