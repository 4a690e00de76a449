//! Request and response shapes for the invoicing endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Invoice-creation request body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    /// Invoice date, `YYYY-MM-DD`.
    #[validate(length(min = 1, message = "date is required"))]
    pub date: String,
    /// Caller-proposed invoice number; allocated automatically when absent.
    #[serde(default)]
    pub number: Option<String>,
    #[validate(nested)]
    pub client: ClientPayload,
    #[validate(length(min = 1, message = "at least one line is required"), nested)]
    pub lines: Vec<LinePayload>,
}

/// Client as submitted on an invoice.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClientPayload {
    #[validate(length(min = 1, message = "client name is required"))]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[validate(length(min = 1, message = "client tax id is required"))]
    pub tax_id: String,
}

/// One invoice line as submitted.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LinePayload {
    #[validate(length(min = 1, message = "product name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Tax-inclusive unit price.
    pub unit_price: Decimal,
    /// Tax rate as a percentage.
    pub tax_rate: Decimal,
    pub quantity: i32,
    /// Consent to supersede an active product whose price or tax rate
    /// differs. The caller is expected to have confirmed the divergence
    /// with the end user before setting this.
    #[serde(default)]
    pub allow_replace: bool,
}

/// Successful invoice-creation (or re-render) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub document_reference: String,
}

/// Typeahead query string.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub search: Option<String>,
}

/// Exact-name product lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct FindProductParams {
    pub name: String,
}
