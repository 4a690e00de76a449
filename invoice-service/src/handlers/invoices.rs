use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use tracing::warn;
use uuid::Uuid;

use crate::dtos::{CreateInvoiceRequest, CreateInvoiceResponse};
use crate::services::assembler::CreateInvoiceError;
use crate::services::metrics::ERRORS_TOTAL;
use crate::startup::AppState;

/// Run the invoice-creation workflow.
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<Response, AppError> {
    match state.assembler.create_invoice(&request).await {
        Ok(created) => Ok((
            StatusCode::CREATED,
            Json(CreateInvoiceResponse {
                invoice_id: created.invoice_id,
                invoice_number: created.invoice_number,
                document_reference: created.document_reference,
            }),
        )
            .into_response()),

        Err(CreateInvoiceError::Rejected { step, source }) => {
            warn!(
                step = step.as_str(),
                kind = source.kind(),
                "Invoice creation rejected"
            );
            ERRORS_TOTAL.with_label_values(&[source.kind()]).inc();
            Err(source)
        }

        // The invoice exists; expose its identity so the caller can
        // retry rendering instead of re-submitting the request.
        Err(CreateInvoiceError::RenderFailed {
            invoice_id,
            invoice_number,
            source,
        }) => {
            ERRORS_TOTAL.with_label_values(&[source.kind()]).inc();
            Ok((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Invoice was created but the document could not be rendered; retry rendering",
                    "kind": "renderer_error",
                    "invoice_id": invoice_id,
                    "invoice_number": invoice_number,
                    "details": source.to_string(),
                })),
            )
                .into_response())
        }
    }
}

/// Re-render the document for an existing invoice.
pub async fn render_document(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rendered = state.assembler.render_existing(invoice_id).await?;
    Ok(Json(CreateInvoiceResponse {
        invoice_id: rendered.invoice_id,
        invoice_number: rendered.invoice_number,
        document_reference: rendered.document_reference,
    }))
}

/// List invoices with their client's name, newest first.
pub async fn list_invoices(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let invoices = state.store.list_invoices_with_client().await?;
    Ok(Json(invoices))
}
