//! Application startup and lifecycle management.

use crate::config::{StorageBackend, WorkshopConfig};
use crate::handlers::{health, invoices, quotations};
use crate::middleware::http_metrics_middleware;
use crate::services::{
    init_metrics, Clock, Database, DocumentRepository, InMemoryRepository, InvoiceService,
    QuotationService, SystemClock,
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: WorkshopConfig,
    pub repo: Arc<dyn DocumentRepository>,
    pub quotations: QuotationService,
    pub invoices: InvoiceService,
}

impl AppState {
    pub fn new(
        config: WorkshopConfig,
        repo: Arc<dyn DocumentRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quotations = QuotationService::new(repo.clone(), clock.clone(), config.billing);
        let invoices = InvoiceService::new(repo.clone(), clock, config.billing);
        Self {
            config,
            repo,
            quotations,
            invoices,
        }
    }
}

/// Build the HTTP router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/quotations",
            post(quotations::create_quotation).get(quotations::list_quotations),
        )
        .route("/quotations/stats", get(quotations::quotation_stats))
        .route(
            "/quotations/:id",
            get(quotations::get_quotation).patch(quotations::update_quotation),
        )
        .route("/quotations/:id/line-items", post(quotations::add_line_item))
        .route(
            "/quotations/:id/line-items/:item_id",
            patch(quotations::update_line_item).delete(quotations::remove_line_item),
        )
        .route("/quotations/:id/send", post(quotations::send_quotation))
        .route("/quotations/:id/approve", post(quotations::approve_quotation))
        .route("/quotations/:id/reject", post(quotations::reject_quotation))
        .route("/quotations/:id/revise", post(quotations::revise_quotation))
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route("/invoices/stats", get(invoices::invoice_stats))
        .route("/invoices/:id", get(invoices::get_invoice))
        .route("/invoices/:id/payments", post(invoices::record_payment))
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    actor_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Open the configured storage backend.
pub async fn connect_repository(
    config: &WorkshopConfig,
    run_migrations: bool,
) -> Result<Arc<dyn DocumentRepository>, AppError> {
    match (&config.storage, &config.database) {
        (StorageBackend::Postgres, Some(database)) => {
            let db = Database::new(
                &database.url,
                database.max_connections,
                database.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                e
            })?;

            if run_migrations {
                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
            }

            Ok(Arc::new(db))
        }
        (StorageBackend::Postgres, None) => Err(AppError::ConfigError(anyhow::anyhow!(
            "PostgreSQL storage selected without database settings"
        ))),
        (StorageBackend::Memory, _) => {
            tracing::warn!("Using in-memory storage; documents are lost on restart");
            Ok(Arc::new(InMemoryRepository::new()))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: WorkshopConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this when the schema is managed outside the service.
    pub async fn build_without_migrations(config: WorkshopConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: WorkshopConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let repo = connect_repository(&config, run_migrations).await?;
        let addr = config.common.socket_addr();
        let state = AppState::new(config, repo, Arc::new(SystemClock));

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Workshop billing service listener bound");

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = "workshop-billing-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, self.router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
