//! API Handlers
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use dualcalc_core::{StreamMode, DUALCALC_VERSION};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct CalculateParams {
    #[serde(default = "default_count")]
    pub count: i64,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_count() -> i64 {
    10
}

fn default_ordered() -> bool {
    true
}

/// `GET /api/calculate?count=10&ordered=true`: one SSE event per CSV line.
pub async fn calculate(
    State(state): State<AppState>,
    Query(params): Query<CalculateParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mode = StreamMode::from_ordered(params.ordered);
    let count = params.count.max(0) as u64;
    let metrics = state.metrics.clone();

    let events = state
        .service
        .stream_ticks(count, mode)
        .filter_map(move |item| {
            let metrics = metrics.clone();
            async move {
                match item {
                    Ok(record) => {
                        metrics.observe(mode, &record);
                        Some(Ok::<_, Infallible>(Event::default().data(record.to_string())))
                    }
                    Err(err) => {
                        error!(error = %err, "calculation stream stopped");
                        None
                    }
                }
            }
        });

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": DUALCALC_VERSION })),
    )
}
