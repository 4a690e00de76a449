//! Application startup and lifecycle management.

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{InvoiceConfig, StoreBackend};
use crate::handlers;
use crate::services::assembler::InvoiceAssembler;
use crate::services::database::Database;
use crate::services::memory::MemoryStore;
use crate::services::metrics::{get_metrics, init_metrics};
use crate::services::renderer::{DocumentRenderer, HtmlRenderer};
use crate::services::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoiceConfig,
    pub store: Arc<dyn Store>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub assembler: Arc<InvoiceAssembler>,
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the HTTP router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route(
            "/invoices/:invoice_id/document",
            post(handlers::invoices::render_document),
        )
        .route("/clients", get(handlers::clients::search_clients))
        .route("/products/find", get(handlers::products::find_product))
        .route("/products/history", get(handlers::products::product_history))
        .route(
            "/products/suggestions",
            get(handlers::products::product_suggestions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoiceConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Postgres => {
                let database = Database::new(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                database.run_migrations().await?;
                Arc::new(database)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let renderer: Arc<dyn DocumentRenderer> =
            Arc::new(HtmlRenderer::new(&config.documents.output_dir).await?);
        let assembler = Arc::new(InvoiceAssembler::new(store.clone(), renderer.clone()));

        let state = AppState {
            config: config.clone(),
            store,
            renderer,
            assembler,
        };

        // Bind listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Invoice service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state for sharing with tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}
