//! Dualcalc API: streams calculation records over HTTP
pub mod handlers;
pub mod metrics;

use axum::{routing::get, Router};
use dualcalc_core::{CalcConfig, CalculationService};
use metrics::Metrics;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CalculationService>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &CalcConfig) -> anyhow::Result<Self> {
        Ok(Self {
            service: Arc::new(CalculationService::new(config)),
            metrics: Metrics::new()?,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/calculate", get(handlers::calculate))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: &str, config: &CalcConfig) -> anyhow::Result<()> {
    let app = create_app(AppState::new(config)?);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Dualcalc API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
