use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::AppState;
use crate::domain::{GridCell, IssuanceCycle};
use crate::forecast::CacheStats;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    grid_cell: GridCell,
    current_cycle: IssuanceCycle,
    checks: HealthChecks,
    cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    forecast: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_cycle: Option<IssuanceCycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// GET /health - cache state for the configured grid cell
///
/// Never triggers a fetch. A missing or outdated bundle is reported as
/// `degraded`; the next forecast request recomputes it.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let current_cycle = state.cache.current_cycle();
    let forecast = check_forecast(&state, current_cycle);
    let healthy = forecast.status == "healthy";

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        grid_cell: state.cell,
        current_cycle,
        checks: HealthChecks { forecast },
        cache: state.cache.stats(),
    };
    tracing::debug!(healthy, cycle = %current_cycle, "health check completed");

    (StatusCode::OK, Json(response))
}

fn check_forecast(state: &AppState, current: IssuanceCycle) -> ComponentHealth {
    match state.cache.cached(state.cell) {
        Some(bundle) if bundle.cycle() == current => ComponentHealth {
            status: "healthy".to_string(),
            cached_cycle: Some(bundle.cycle()),
            detail: None,
        },
        Some(bundle) => ComponentHealth {
            status: "stale".to_string(),
            cached_cycle: Some(bundle.cycle()),
            detail: Some(format!("cycle {current} not fetched yet")),
        },
        None => ComponentHealth {
            status: "empty".to_string(),
            cached_cycle: None,
            detail: Some("no forecast computed yet".to_string()),
        },
    }
}

/// GET /healthz - liveness check
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
