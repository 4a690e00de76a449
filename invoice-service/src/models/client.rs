//! Client model for invoice-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoiced party. Optional postal fields are stored as empty strings.
///
/// Clients are never updated once created; repeat invoices for the same
/// (name, tax id) pair reuse the first stored row as-is.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub address: String,
    pub locality: String,
    pub postal_code: String,
    pub region: String,
    pub tax_id: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for inserting a client. Field values are stored as given,
/// so callers trim before handing them over.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub address: String,
    pub locality: String,
    pub postal_code: String,
    pub region: String,
    pub tax_id: String,
}
