//! In-memory store backend.
//!
//! Backs integration tests and storeless demo runs. Every operation
//! holds the single mutex for its whole duration, which serializes the
//! check-then-insert sequences the same way the database constraints do.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Client, Invoice, InvoiceLine, InvoiceSummary, NewClient, NewInvoice, NewInvoiceLine,
    NewProduct, Product,
};
use crate::services::store::Store;

#[derive(Default)]
struct Inner {
    clients: Vec<Client>,
    products: Vec<Product>,
    invoices: Vec<Invoice>,
    lines: Vec<InvoiceLine>,
    next_seq: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn norm(value: &str) -> String {
    value.trim().to_uppercase()
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .clients
            .iter()
            .find(|c| c.client_id == client_id)
            .cloned())
    }

    async fn get_client_by_name_and_tax_id(
        &self,
        name: &str,
        tax_id: &str,
    ) -> Result<Option<Client>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .clients
            .iter()
            .find(|c| norm(&c.name) == norm(name) && norm(&c.tax_id) == norm(tax_id))
            .cloned())
    }

    async fn insert_client(&self, input: &NewClient) -> Result<Client, AppError> {
        let mut inner = self.inner.lock().await;
        let client = Client {
            client_id: Uuid::new_v4(),
            name: input.name.clone(),
            address: input.address.clone(),
            locality: input.locality.clone(),
            postal_code: input.postal_code.clone(),
            region: input.region.clone(),
            tax_id: input.tax_id.clone(),
            created_utc: Utc::now(),
        };
        inner.clients.push(client.clone());
        Ok(client)
    }

    async fn search_clients(&self, search: &str, limit: i64) -> Result<Vec<Client>, AppError> {
        let inner = self.inner.lock().await;
        let needle = norm(search);
        let mut matches: Vec<Client> = inner
            .clients
            .iter()
            .filter(|c| norm(&c.name).contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .iter()
            .find(|p| p.product_id == product_id)
            .cloned())
    }

    async fn get_active_product_by_name(&self, name: &str) -> Result<Option<Product>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .iter()
            .find(|p| p.active && norm(&p.name) == norm(name))
            .cloned())
    }

    async fn insert_product(&self, input: &NewProduct) -> Result<Product, AppError> {
        let mut inner = self.inner.lock().await;
        if inner
            .products
            .iter()
            .any(|p| p.active && norm(&p.name) == norm(&input.name))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An active product named '{}' already exists",
                input.name
            )));
        }
        let product = Product {
            product_id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            unit_price: input.unit_price,
            tax_rate: input.tax_rate,
            active: true,
            created_utc: Utc::now(),
        };
        inner.products.push(product.clone());
        Ok(product)
    }

    async fn deactivate_product(&self, product_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        match inner
            .products
            .iter_mut()
            .find(|p| p.product_id == product_id && p.active)
        {
            Some(product) => {
                product.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search_products(&self, search: &str, limit: i64) -> Result<Vec<Product>, AppError> {
        let inner = self.inner.lock().await;
        let needle = norm(search);
        let mut matches: Vec<Product> = inner
            .products
            .iter()
            .filter(|p| p.active && norm(&p.name).contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn product_history(&self) -> Result<Vec<Product>, AppError> {
        let inner = self.inner.lock().await;
        // Newest first within a name; the stable sort keeps that while
        // ordering active rows ahead.
        let mut history: Vec<Product> = inner.products.iter().rev().cloned().collect();
        history.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then_with(|| norm(&a.name).cmp(&norm(&b.name)))
        });
        Ok(history)
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    async fn latest_invoice(&self) -> Result<Option<Invoice>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.invoices.last().cloned())
    }

    async fn invoice_number_exists(&self, number: &str) -> Result<bool, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.invoices.iter().any(|i| i.number == number))
    }

    async fn insert_invoice_with_lines(
        &self,
        header: &NewInvoice,
        lines: &[NewInvoiceLine],
    ) -> Result<Invoice, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.invoices.iter().any(|i| i.number == header.number) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number '{}' already exists",
                header.number
            )));
        }

        inner.next_seq += 1;
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            seq: inner.next_seq,
            number: header.number.clone(),
            invoice_date: header.invoice_date,
            client_id: header.client_id,
            created_utc: Utc::now(),
        };
        inner.invoices.push(invoice.clone());

        for line in lines {
            let line_row = InvoiceLine {
                line_id: Uuid::new_v4(),
                invoice_id: invoice.invoice_id,
                product_id: line.product_id,
                line_no: line.line_no,
                quantity: line.quantity,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                created_utc: Utc::now(),
            };
            inner.lines.push(line_row);
        }

        Ok(invoice)
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .invoices
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned())
    }

    async fn get_invoice_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError> {
        let inner = self.inner.lock().await;
        let mut lines: Vec<InvoiceLine> = inner
            .lines
            .iter()
            .filter(|l| l.invoice_id == invoice_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.line_no);
        Ok(lines)
    }

    async fn list_invoices_with_client(&self) -> Result<Vec<InvoiceSummary>, AppError> {
        let inner = self.inner.lock().await;
        let mut summaries = Vec::with_capacity(inner.invoices.len());
        for invoice in inner.invoices.iter().rev() {
            let client_name = inner
                .clients
                .iter()
                .find(|c| c.client_id == invoice.client_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            summaries.push(InvoiceSummary {
                invoice_id: invoice.invoice_id,
                number: invoice.number.clone(),
                invoice_date: invoice.invoice_date,
                client_name,
            });
        }
        Ok(summaries)
    }
}
