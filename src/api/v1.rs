use axum::{
    routing::{get, post},
    Router,
};

use super::{forecast, health};
use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/forecast", get(forecast::get_forecast))
        .route("/forecast/summary", get(forecast::get_summary))
        .route("/forecast/refresh", post(forecast::refresh_forecast))
        .route("/health", get(health::health_check))
        .route("/healthz", get(health::liveness_check))
        .with_state(state)
}
