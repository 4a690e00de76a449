//! Invoice assembly workflow.
//!
//! One strictly sequential pass per creation request: validate, resolve
//! the client, resolve every line's product in request order, allocate a
//! number, persist header and lines in a single transaction, compute the
//! tax breakdown, render the document. The first failing step ends the
//! workflow.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ClientPayload, CreateInvoiceRequest, LinePayload};
use crate::models::{Invoice, NewClient, NewInvoice, NewInvoiceLine, NewProduct};
use crate::services::allocator::InvoiceNumberAllocator;
use crate::services::metrics::{DOCUMENTS_RENDERED_TOTAL, INVOICES_CREATED_TOTAL};
use crate::services::reconciler::EntityReconciler;
use crate::services::renderer::{ClientView, DocumentRenderer, InvoiceDocument, LineView};
use crate::services::store::Store;
use crate::services::tax::{self, TaxableLine};

/// Retries when an allocated number loses the insert race to a
/// concurrent request.
const MAX_NUMBER_RETRIES: u32 = 5;

/// Successful outcome of the creation workflow.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub document_reference: String,
}

/// Stages of the creation workflow, used for error context and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Validate,
    ResolveClient,
    ResolveProducts,
    AllocateNumber,
    Persist,
    Render,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::Validate => "validate",
            WorkflowStep::ResolveClient => "resolve_client",
            WorkflowStep::ResolveProducts => "resolve_products",
            WorkflowStep::AllocateNumber => "allocate_number",
            WorkflowStep::Persist => "persist",
            WorkflowStep::Render => "render",
        }
    }
}

/// Failure of the creation workflow.
///
/// `RenderFailed` carries the identity of the already-persisted invoice:
/// the data writes succeeded, so the caller should retry rendering
/// instead of re-creating the invoice.
#[derive(Debug, thiserror::Error)]
pub enum CreateInvoiceError {
    #[error("invoice creation failed at {}: {source}", .step.as_str())]
    Rejected {
        step: WorkflowStep,
        #[source]
        source: AppError,
    },

    #[error("invoice {invoice_number} was persisted but rendering failed: {source}")]
    RenderFailed {
        invoice_id: Uuid,
        invoice_number: String,
        #[source]
        source: AppError,
    },
}

fn reject(step: WorkflowStep, source: AppError) -> CreateInvoiceError {
    CreateInvoiceError::Rejected { step, source }
}

pub struct InvoiceAssembler {
    store: Arc<dyn Store>,
    renderer: Arc<dyn DocumentRenderer>,
    allocator: InvoiceNumberAllocator,
    reconciler: EntityReconciler,
}

impl InvoiceAssembler {
    pub fn new(store: Arc<dyn Store>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            allocator: InvoiceNumberAllocator::new(store.clone()),
            reconciler: EntityReconciler::new(store.clone()),
            store,
            renderer,
        }
    }

    /// Run the full creation workflow for one request.
    #[instrument(
        skip(self, request),
        fields(client_name = %request.client.name, line_count = request.lines.len())
    )]
    pub async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<CreatedInvoice, CreateInvoiceError> {
        let invoice_date =
            validate_request(request).map_err(|e| reject(WorkflowStep::Validate, e))?;

        let client_id = self
            .reconciler
            .resolve_client(&new_client(&request.client))
            .await
            .map_err(|e| reject(WorkflowStep::ResolveClient, e))?;

        // Sequential on purpose: a later line for the same product name
        // must observe an earlier line's replacement.
        let mut lines = Vec::with_capacity(request.lines.len());
        for (index, line) in request.lines.iter().enumerate() {
            let product_id = self
                .reconciler
                .resolve_product(&new_product(line), line.allow_replace)
                .await
                .map_err(|e| reject(WorkflowStep::ResolveProducts, e))?;
            lines.push(NewInvoiceLine {
                product_id,
                line_no: index as i32 + 1,
                quantity: line.quantity,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
            });
        }

        let invoice = self
            .persist_with_number(request, invoice_date, client_id, &lines)
            .await?;

        INVOICES_CREATED_TOTAL.inc();
        info!(
            invoice_id = %invoice.invoice_id,
            number = %invoice.number,
            "Invoice persisted"
        );

        let document = build_document(&invoice.number, invoice_date, &request.client, &request.lines)
            .map_err(|e| render_failed(&invoice, e))?;

        let reference = match self.renderer.render(&document).await {
            Ok(reference) => reference,
            Err(e) => {
                DOCUMENTS_RENDERED_TOTAL.with_label_values(&["failed"]).inc();
                error!(
                    invoice_id = %invoice.invoice_id,
                    error = %e,
                    "Renderer failed after the invoice was persisted"
                );
                return Err(render_failed(&invoice, e));
            }
        };
        DOCUMENTS_RENDERED_TOTAL
            .with_label_values(&["rendered"])
            .inc();

        Ok(CreatedInvoice {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.number,
            document_reference: reference.file_name,
        })
    }

    /// Re-render the document for an already-persisted invoice, rebuilt
    /// from the stored snapshot.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn render_existing(&self, invoice_id: Uuid) -> Result<CreatedInvoice, AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
        let client = self.store.get_client(invoice.client_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Client {} not found", invoice.client_id))
        })?;
        let lines = self.store.get_invoice_lines(invoice.invoice_id).await?;

        let mut line_views = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self.store.get_product(line.product_id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Product {} not found", line.product_id))
            })?;
            line_views.push(LineView {
                name: product.name,
                description: product.description,
                // Snapshot values, not the product's current ones.
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                quantity: line.quantity,
                line_total: tax::round2(line.unit_price * Decimal::from(line.quantity)),
            });
        }

        let taxable: Vec<TaxableLine> = lines
            .iter()
            .map(|line| TaxableLine {
                unit_price: line.unit_price,
                quantity: line.quantity,
                tax_rate: line.tax_rate,
            })
            .collect();
        let breakdown = tax::compute_breakdown(&taxable)?;

        let document = InvoiceDocument {
            number: invoice.number.clone(),
            date: invoice.invoice_date,
            client: ClientView {
                name: client.name,
                address: client.address,
                locality: client.locality,
                postal_code: client.postal_code,
                region: client.region,
                tax_id: client.tax_id,
            },
            lines: line_views,
            tax_breakdown: breakdown.buckets,
            grand_total: breakdown.grand_total,
        };

        let reference = self.renderer.render(&document).await?;
        DOCUMENTS_RENDERED_TOTAL
            .with_label_values(&["rendered"])
            .inc();

        Ok(CreatedInvoice {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.number,
            document_reference: reference.file_name,
        })
    }

    /// Allocate a number and run the transactional insert, re-allocating
    /// when a concurrent request claims the number first.
    async fn persist_with_number(
        &self,
        request: &CreateInvoiceRequest,
        invoice_date: NaiveDate,
        client_id: Uuid,
        lines: &[NewInvoiceLine],
    ) -> Result<Invoice, CreateInvoiceError> {
        let proposed = request
            .number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        for attempt in 0..MAX_NUMBER_RETRIES {
            let number = self
                .allocator
                .allocate(proposed)
                .await
                .map_err(|e| reject(WorkflowStep::AllocateNumber, e))?;

            let header = NewInvoice {
                number: number.clone(),
                invoice_date,
                client_id,
            };
            match self.store.insert_invoice_with_lines(&header, lines).await {
                Ok(invoice) => return Ok(invoice),
                // Lost the number race; the winner's row now exists, so
                // the next allocation probes past it.
                Err(AppError::Conflict(_)) => {
                    warn!(
                        number = %number,
                        attempt = attempt + 1,
                        "Invoice number taken at insert, re-allocating"
                    );
                }
                Err(e) => return Err(reject(WorkflowStep::Persist, e)),
            }
        }

        Err(reject(
            WorkflowStep::Persist,
            AppError::ResourceExhausted(anyhow::anyhow!(
                "Could not claim a unique invoice number after {} attempts",
                MAX_NUMBER_RETRIES
            )),
        ))
    }
}

fn render_failed(invoice: &Invoice, source: AppError) -> CreateInvoiceError {
    CreateInvoiceError::RenderFailed {
        invoice_id: invoice.invoice_id,
        invoice_number: invoice.number.clone(),
        source,
    }
}

/// Reject the request before any write: structural validation, date
/// parsing, line-level numeric rules, and the proposed number's syntax.
fn validate_request(request: &CreateInvoiceRequest) -> Result<NaiveDate, AppError> {
    request.validate()?;

    let invoice_date = NaiveDate::parse_from_str(request.date.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!(
            "Date '{}' is not a valid YYYY-MM-DD date",
            request.date
        ))
    })?;

    if let Some(number) = request.number.as_deref().map(str::trim) {
        if !number.is_empty() && number.parse::<i64>().is_err() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Proposed invoice number '{}' is not an integer",
                number
            )));
        }
    }

    if request.client.name.trim().is_empty() || request.client.tax_id.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Client name and tax id are required"
        )));
    }

    for (index, line) in request.lines.iter().enumerate() {
        let line_no = index + 1;
        if line.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line {}: product name is required",
                line_no
            )));
        }
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line {}: quantity must be a positive integer",
                line_no
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line {}: unit price must not be negative",
                line_no
            )));
        }
        if line.tax_rate < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Line {}: tax rate must not be negative",
                line_no
            )));
        }
    }

    Ok(invoice_date)
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}

fn new_client(payload: &ClientPayload) -> NewClient {
    NewClient {
        name: payload.name.trim().to_string(),
        address: trimmed(&payload.address),
        locality: trimmed(&payload.locality),
        postal_code: trimmed(&payload.postal_code),
        region: trimmed(&payload.region),
        tax_id: payload.tax_id.trim().to_string(),
    }
}

fn new_product(line: &LinePayload) -> NewProduct {
    NewProduct {
        name: line.name.trim().to_string(),
        description: trimmed(&line.description),
        unit_price: line.unit_price,
        tax_rate: line.tax_rate,
    }
}

/// Build the renderer view model from the request data and the
/// snapshotted line values.
fn build_document(
    number: &str,
    invoice_date: NaiveDate,
    client: &ClientPayload,
    lines: &[LinePayload],
) -> Result<InvoiceDocument, AppError> {
    let taxable: Vec<TaxableLine> = lines
        .iter()
        .map(|line| TaxableLine {
            unit_price: line.unit_price,
            quantity: line.quantity,
            tax_rate: line.tax_rate,
        })
        .collect();
    let breakdown = tax::compute_breakdown(&taxable)?;

    Ok(InvoiceDocument {
        number: number.to_string(),
        date: invoice_date,
        client: ClientView {
            name: client.name.trim().to_string(),
            address: trimmed(&client.address),
            locality: trimmed(&client.locality),
            postal_code: trimmed(&client.postal_code),
            region: trimmed(&client.region),
            tax_id: client.tax_id.trim().to_string(),
        },
        lines: lines
            .iter()
            .map(|line| LineView {
                name: line.name.trim().to_string(),
                description: trimmed(&line.description),
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                quantity: line.quantity,
                line_total: tax::round2(line.unit_price * Decimal::from(line.quantity)),
            })
            .collect(),
        tax_breakdown: breakdown.buckets,
        grand_total: breakdown.grand_total,
    })
}
