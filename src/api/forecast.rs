use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::AppState,
    domain::{AnalyzedPoint, ForecastBundle, ForecastVariable, GridCell, Horizon, IssuanceCycle, Quality},
    forecast::{summarize_daily, DailyEnergy},
};

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    /// Include the extrapolated tail past the last forecast step
    #[serde(default = "default_true")]
    pub include_extrapolated: bool,
}

fn default_true() -> bool {
    true
}

/// Forecast payload
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    grid_cell: GridCell,
    cycle: IssuanceCycle,
    generated_at: DateTime<Utc>,
    model: String,
    step_minutes: i64,
    horizon: Horizon,
    anomalies: usize,
    interpolated_counts: BTreeMap<ForecastVariable, usize>,
    omitted_variables: Vec<ForecastVariable>,
    dropped_samples: usize,
    points: Vec<AnalyzedPoint>,
}

impl ForecastResponse {
    fn new(bundle: &ForecastBundle, step_minutes: i64, include_extrapolated: bool) -> Self {
        let points = bundle
            .points()
            .iter()
            .filter(|p| include_extrapolated || p.estimate.quality != Quality::Extrapolated)
            .cloned()
            .collect();

        Self {
            grid_cell: bundle.grid_cell(),
            cycle: bundle.cycle(),
            generated_at: bundle.generated_at(),
            model: bundle.model().to_string(),
            step_minutes,
            horizon: bundle.horizon(),
            anomalies: bundle.anomaly_count(),
            interpolated_counts: bundle.interpolated_counts().clone(),
            omitted_variables: bundle.omitted_variables().to_vec(),
            dropped_samples: bundle.dropped_samples(),
            points,
        }
    }
}

/// GET /api/v1/forecast
pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<ApiResponse<ForecastResponse>, ApiError> {
    let started = Instant::now();
    let bundle = state.cache.get_forecast(state.cell).await?;

    let response = ForecastResponse::new(
        &bundle,
        state.cache.step().num_minutes(),
        query.include_extrapolated,
    );
    let count = response.points.len();
    Ok(ApiResponse::success(response)
        .with_count(count)
        .with_duration(started.elapsed().as_millis() as u64))
}

/// POST /api/v1/forecast/refresh - drop the cached bundle and recompute
pub async fn refresh_forecast(
    State(state): State<AppState>,
) -> Result<ApiResponse<ForecastResponse>, ApiError> {
    let started = Instant::now();
    tracing::info!(cell = %state.cell, "forecast refresh requested");
    let bundle = state.cache.refresh(state.cell).await?;

    let response = ForecastResponse::new(&bundle, state.cache.step().num_minutes(), true);
    let count = response.points.len();
    Ok(ApiResponse::success(response)
        .with_count(count)
        .with_duration(started.elapsed().as_millis() as u64))
}

#[derive(Debug, Serialize)]
pub struct LoadSummary {
    power_kw: f64,
    hours_per_day: f64,
    daily_kwh: f64,
}

/// Per-day energy and power balance
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    grid_cell: GridCell,
    cycle: IssuanceCycle,
    timezone: String,
    load: LoadSummary,
    days: Vec<DailyEnergy>,
}

/// GET /api/v1/forecast/summary
pub async fn get_summary(
    State(state): State<AppState>,
) -> Result<ApiResponse<SummaryResponse>, ApiError> {
    let bundle = state.cache.get_forecast(state.cell).await?;
    let tz = state.cache.schedule().timezone();
    let load = &state.cfg.load;

    let days = summarize_daily(&bundle, state.cache.step(), tz, load.daily_kwh());
    let count = days.len();

    Ok(ApiResponse::success(SummaryResponse {
        grid_cell: bundle.grid_cell(),
        cycle: bundle.cycle(),
        timezone: tz.name().to_string(),
        load: LoadSummary {
            power_kw: load.power_kw,
            hours_per_day: load.hours_per_day,
            daily_kwh: load.daily_kwh(),
        },
        days,
    })
    .with_count(count))
}
