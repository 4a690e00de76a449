//! Persistent store abstraction.
//!
//! The core consumes storage through this trait so the workflow can run
//! against PostgreSQL in production and the in-memory backend in tests.
//! Name lookups match case-insensitively against trimmed input; callers
//! pass trimmed values.

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Client, Invoice, InvoiceLine, InvoiceSummary, NewClient, NewInvoice, NewInvoiceLine,
    NewProduct, Product,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    async fn get_client_by_name_and_tax_id(
        &self,
        name: &str,
        tax_id: &str,
    ) -> Result<Option<Client>, AppError>;

    async fn insert_client(&self, input: &NewClient) -> Result<Client, AppError>;

    async fn search_clients(&self, search: &str, limit: i64) -> Result<Vec<Client>, AppError>;

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, AppError>;

    async fn get_active_product_by_name(&self, name: &str) -> Result<Option<Product>, AppError>;

    /// Insert an active product. Fails with `Conflict` when another
    /// active row already holds the same uppercased name.
    async fn insert_product(&self, input: &NewProduct) -> Result<Product, AppError>;

    /// Flip the active flag off. Returns false when the row was already
    /// inactive (or missing), so callers can detect lost races.
    async fn deactivate_product(&self, product_id: Uuid) -> Result<bool, AppError>;

    async fn search_products(&self, search: &str, limit: i64) -> Result<Vec<Product>, AppError>;

    /// All product rows, active first, for the history view.
    async fn product_history(&self) -> Result<Vec<Product>, AppError>;

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    /// The most recently created invoice, by insertion order.
    async fn latest_invoice(&self) -> Result<Option<Invoice>, AppError>;

    async fn invoice_number_exists(&self, number: &str) -> Result<bool, AppError>;

    /// Insert header and lines as one atomic unit. A duplicate number
    /// fails the whole operation with `Conflict` and writes nothing.
    async fn insert_invoice_with_lines(
        &self,
        header: &NewInvoice,
        lines: &[NewInvoiceLine],
    ) -> Result<Invoice, AppError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn get_invoice_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError>;

    async fn list_invoices_with_client(&self) -> Result<Vec<InvoiceSummary>, AppError>;
}
