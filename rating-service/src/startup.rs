//! Application startup and lifecycle management.

use crate::config::RatingConfig;
use crate::handlers;
use crate::services::{
    get_metrics, init_metrics, CalculationService, CycleEngine, ForecastEngine, InvoiceGenerator,
    LocalInvoiceGenerator, RatingEngine, Store,
};
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RatingConfig,
    pub store: Arc<Store>,
    pub rating: Arc<RatingEngine>,
    pub cycles: Arc<CycleEngine>,
    pub calculations: Arc<CalculationService>,
    pub forecasts: Arc<ForecastEngine>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "rating-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RatingConfig) -> Result<Self, AppError> {
        Self::build_with_invoicer(config, Arc::new(LocalInvoiceGenerator::new())).await
    }

    /// Build with a specific invoice generator. Tests wire in failing
    /// collaborators here.
    pub async fn build_with_invoicer(
        config: RatingConfig,
        invoicer: Arc<dyn InvoiceGenerator>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let store = Arc::new(Store::new());
        let rating = Arc::new(RatingEngine::new(store.clone()));
        let cycles = Arc::new(CycleEngine::new(
            store.clone(),
            rating.clone(),
            invoicer,
            &config.billing,
            Duration::from_millis(config.rating.straggler_grace_millis),
            Duration::from_millis(config.rating.straggler_retry_millis),
        ));
        let calculations = Arc::new(CalculationService::new(
            store.clone(),
            config.billing.default_currency.clone(),
        ));
        let forecasts = Arc::new(ForecastEngine::new(store.clone(), &config.forecast));

        let state = AppState {
            config: config.clone(),
            store,
            rating,
            cycles,
            calculations,
            forecasts,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Rating service listener bound");

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

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        // Background rating sweep over PENDING records.
        let rating = self.state.rating.clone();
        let sweep_interval = Duration::from_secs(self.state.config.rating.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let summary = rating.sweep().await;
                if summary.rated > 0 || summary.failed > 0 {
                    tracing::info!(
                        rated = summary.rated,
                        failed = summary.failed,
                        "Rating sweep pass"
                    );
                }
            }
        });

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route(
                "/billing/usage-records",
                post(handlers::usage::ingest_usage_record).get(handlers::usage::list_usage_records),
            )
            .route(
                "/billing/usage-records/:id",
                get(handlers::usage::get_usage_record),
            )
            .route(
                "/billing/cycles",
                post(handlers::cycles::create_cycle).get(handlers::cycles::list_cycles),
            )
            .route("/billing/cycles/:id", get(handlers::cycles::get_cycle))
            .route(
                "/billing/cycles/:id/process",
                post(handlers::cycles::process_cycle),
            )
            .route(
                "/api/monitoring/cost-models",
                post(handlers::cost_models::create_cost_model)
                    .get(handlers::cost_models::list_cost_models),
            )
            .route(
                "/api/monitoring/cost-models/:id",
                get(handlers::cost_models::get_cost_model)
                    .put(handlers::cost_models::update_cost_model)
                    .delete(handlers::cost_models::delete_cost_model),
            )
            .route(
                "/api/monitoring/cost-calculations",
                post(handlers::calculations::calculate)
                    .get(handlers::calculations::list_calculations),
            )
            .route(
                "/api/monitoring/cost-calculations/:id/recalculate",
                post(handlers::calculations::recalculate),
            )
            .route(
                "/api/monitoring/cost-calculations/:id/finalize",
                post(handlers::calculations::finalize),
            )
            .route(
                "/api/monitoring/cost-forecasts/generate",
                post(handlers::forecasts::generate_forecast),
            )
            .route(
                "/api/monitoring/cost-forecasts/customer/:id",
                get(handlers::forecasts::forecasts_by_customer),
            )
            .route(
                "/api/monitoring/cost-forecasts/customer/:id/resource/:type",
                get(handlers::forecasts::forecasts_by_customer_resource),
            )
            .route(
                "/api/monitoring/cost-forecasts/period/:start",
                get(handlers::forecasts::forecasts_by_period),
            )
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "rating-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
