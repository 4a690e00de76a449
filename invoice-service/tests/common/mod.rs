//! Common test utilities for invoice-service integration tests.

use async_trait::async_trait;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use invoice_service::config::{DatabaseConfig, DocumentsConfig, InvoiceConfig, StoreBackend};
use invoice_service::dtos::{ClientPayload, CreateInvoiceRequest, LinePayload};
use invoice_service::services::assembler::InvoiceAssembler;
use invoice_service::services::memory::MemoryStore;
use invoice_service::services::renderer::{DocumentReference, DocumentRenderer, InvoiceDocument};
use invoice_service::startup::AppState;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,invoice_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Renderer fake that records every document instead of writing files.
#[derive(Default)]
pub struct RecordingRenderer {
    documents: Mutex<Vec<InvoiceDocument>>,
}

impl RecordingRenderer {
    pub fn rendered(&self) -> Vec<InvoiceDocument> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentRenderer for RecordingRenderer {
    async fn render(&self, document: &InvoiceDocument) -> Result<DocumentReference, AppError> {
        self.documents.lock().unwrap().push(document.clone());
        let file_name = format!("INVOICE_{}.html", document.number);
        Ok(DocumentReference {
            path: PathBuf::from(&file_name),
            file_name,
        })
    }
}

/// Renderer fake that always fails.
pub struct FailingRenderer;

#[async_trait]
impl DocumentRenderer for FailingRenderer {
    async fn render(&self, _document: &InvoiceDocument) -> Result<DocumentReference, AppError> {
        Err(AppError::RendererError(anyhow::anyhow!(
            "renderer unavailable"
        )))
    }
}

pub fn test_config() -> InvoiceConfig {
    InvoiceConfig {
        common: service_core::config::Config {
            port: 0,
            log_level: "debug".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        store_backend: StoreBackend::Memory,
        documents: DocumentsConfig {
            output_dir: "documents".to_string(),
        },
    }
}

/// In-process application over the in-memory store and a recording
/// renderer, with direct access to both for assertions.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub renderer: Arc<RecordingRenderer>,
}

pub fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let renderer = Arc::new(RecordingRenderer::default());
    let assembler = Arc::new(InvoiceAssembler::new(store.clone(), renderer.clone()));

    let state = AppState {
        config: test_config(),
        store: store.clone(),
        renderer: renderer.clone(),
        assembler,
    };

    TestApp {
        state,
        store,
        renderer,
    }
}

/// The canonical single-line request: 10 bolts at 1.21 inclusive, 21% tax.
pub fn acme_bolt_request() -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        date: "2024-01-01".to_string(),
        number: None,
        client: ClientPayload {
            name: "ACME".to_string(),
            address: Some("Main St 1".to_string()),
            locality: None,
            postal_code: None,
            region: None,
            tax_id: "B123".to_string(),
        },
        lines: vec![LinePayload {
            name: "Bolt".to_string(),
            description: Some("Steel bolt".to_string()),
            unit_price: "1.21".parse().unwrap(),
            tax_rate: "21".parse().unwrap(),
            quantity: 10,
            allow_replace: false,
        }],
    }
}
