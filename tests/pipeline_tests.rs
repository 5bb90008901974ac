//! End-to-end runs of the forecast pipeline behind the cache

mod common;

use chrono::Duration;
use common::{kst, test_config, village_forecast, CannedSource, FixedClock};
use std::sync::Arc;

use weather_power_forecast::controller::AppState;
use weather_power_forecast::domain::{ForecastSample, ForecastVariable, GridCell, IssuanceCycle, Quality, RawUnit};
use weather_power_forecast::forecast::{summarize_daily, ForecastError, ForecastPipeline};

fn state_with(source: Arc<CannedSource>) -> AppState {
    AppState::with_source(test_config(), source, Arc::new(FixedClock(kst(2025, 6, 1, 5, 30)))).unwrap()
}

#[tokio::test]
async fn test_full_day_forecast() {
    let source = Arc::new(CannedSource::ok());
    let state = state_with(source.clone());

    let bundle = state.cache.get_forecast(state.cell).await.unwrap();

    assert_eq!(bundle.grid_cell(), GridCell::new(54, 124));
    assert_eq!(bundle.cycle().start(), kst(2025, 6, 1, 5, 0));
    assert_eq!(bundle.points().len(), 24 + 3);
    assert!(bundle.omitted_variables().is_empty());
    assert_eq!(bundle.dropped_samples(), 0);

    let points = bundle.points();
    assert!(points.windows(2).all(|w| w[1].estimate.timestamp - w[0].estimate.timestamp == Duration::hours(1)));
    assert!(points.iter().all(|p| (0.0..=3.0).contains(&p.estimate.power_kw)));
    assert!(points[..24].iter().all(|p| p.estimate.quality == Quality::Observed));
    assert!(points[24..].iter().all(|p| p.estimate.quality == Quality::Extrapolated));

    // midnight is dark, noon under a clear sky is not
    let midnight = bundle.point_at(kst(2025, 6, 2, 0, 0)).unwrap();
    assert_eq!(midnight.estimate.power_kw, 0.0);
    let noon = bundle.point_at(kst(2025, 6, 1, 12, 0)).unwrap();
    assert!(noon.estimate.power_kw > 1.0, "noon {}", noon.estimate.power_kw);

    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_idempotent_within_cycle() {
    let source = Arc::new(CannedSource::ok());
    let state = state_with(source.clone());

    let a = state.cache.get_forecast(state.cell).await.unwrap();
    let b = state.cache.get_forecast(state.cell).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(source.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_under_concurrency() {
    let source = Arc::new(CannedSource::slow(std::time::Duration::from_millis(150)));
    let state = state_with(source.clone());

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let state = state.clone();
        set.spawn(async move { state.cache.get_forecast(state.cell).await });
    }

    let mut bundles = Vec::new();
    while let Some(result) = set.join_next().await {
        bundles.push(result.unwrap().unwrap());
    }

    assert_eq!(source.calls(), 1);
    assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &bundles[0])));
}

#[tokio::test]
async fn test_source_failure_reaches_caller_and_is_retried() {
    let source = Arc::new(CannedSource::failing());
    let state = state_with(source.clone());

    for _ in 0..2 {
        let err = state.cache.get_forecast(state.cell).await.unwrap_err();
        match err {
            ForecastError::SourceUnavailable(msg) => assert!(msg.contains("HTTP 500")),
            other => panic!("unexpected error {other:?}"),
        }
    }
    // nothing cached, so every request tried again
    assert_eq!(source.calls(), 2);
    assert_eq!(state.cache.stats().fetch_failures, 2);
}

#[test]
fn test_duplicate_samples_latest_wins() {
    let cfg = test_config();
    let pipeline = ForecastPipeline::from_config(&cfg).unwrap();
    let cycle = IssuanceCycle::new(kst(2025, 6, 1, 5, 0));

    let mut samples = village_forecast(cycle);
    let noon = kst(2025, 6, 1, 12, 0);
    samples.push(ForecastSample::code(noon, ForecastVariable::SkyCondition, "4"));
    let overcast = pipeline.run(cfg.site.grid_cell(), cycle, &samples, noon).unwrap();

    samples.push(ForecastSample::code(noon, ForecastVariable::SkyCondition, "1"));
    let clear = pipeline.run(cfg.site.grid_cell(), cycle, &samples, noon).unwrap();

    let at = |b: &weather_power_forecast::domain::ForecastBundle| b.point_at(noon).unwrap().estimate.power_kw;
    assert!(at(&clear) > at(&overcast));
}

#[test]
fn test_kelvin_and_celsius_agree() {
    let cfg = test_config();
    let pipeline = ForecastPipeline::from_config(&cfg).unwrap();
    let cycle = IssuanceCycle::new(kst(2025, 6, 1, 5, 0));

    let celsius = village_forecast(cycle);
    let kelvin: Vec<_> = celsius
        .iter()
        .map(|s| match (s.variable, &s.value) {
            (ForecastVariable::Temperature, weather_power_forecast::domain::RawValue::Number(c)) => {
                ForecastSample::number(s.valid_time, s.variable, c + 273.15, RawUnit::Kelvin)
            }
            _ => s.clone(),
        })
        .collect();

    let now = kst(2025, 6, 1, 5, 30);
    let a = pipeline.run(cfg.site.grid_cell(), cycle, &celsius, now).unwrap();
    let b = pipeline.run(cfg.site.grid_cell(), cycle, &kelvin, now).unwrap();
    for (x, y) in a.points().iter().zip(b.points()) {
        assert!((x.estimate.power_kw - y.estimate.power_kw).abs() < 1e-9);
    }
}

#[test]
fn test_disjoint_variables_fail() {
    let cfg = test_config();
    let pipeline = ForecastPipeline::from_config(&cfg).unwrap();
    let cycle = IssuanceCycle::new(kst(2025, 6, 1, 5, 0));
    let t = |h: i64| cycle.start() + Duration::hours(h);

    let samples = vec![
        ForecastSample::number(t(1), ForecastVariable::Temperature, 20.0, RawUnit::Celsius),
        ForecastSample::number(t(2), ForecastVariable::Temperature, 21.0, RawUnit::Celsius),
        ForecastSample::code(t(5), ForecastVariable::SkyCondition, "1"),
        ForecastSample::code(t(6), ForecastVariable::SkyCondition, "1"),
    ];
    let err = pipeline.run(cfg.site.grid_cell(), cycle, &samples, t(0)).unwrap_err();
    assert_eq!(err, ForecastError::DisjointHorizon);
}

#[tokio::test]
async fn test_daily_summary_matches_points() {
    let state = state_with(Arc::new(CannedSource::ok()));
    let bundle = state.cache.get_forecast(state.cell).await.unwrap();

    let days = summarize_daily(&bundle, state.cache.step(), chrono_tz::Asia::Seoul, state.cfg.load.daily_kwh());
    let total: f64 = days.iter().map(|d| d.energy_kwh).sum();
    let expected: f64 = bundle.points().iter().map(|p| p.estimate.power_kw).sum();

    assert!((total - expected).abs() < 1e-9);
    assert!(days.iter().all(|d| d.load_kwh == 18.0));
    assert_eq!(days.iter().map(|d| d.points).sum::<usize>(), bundle.points().len());
}
