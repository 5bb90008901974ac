//! Load Testing Suite for the forecast cache
//!
//! - Many concurrent clients reading the cached bundle
//! - Miss storms while the issuance cycle rolls over
//! - Raw hit throughput

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use weather_power_forecast::controller::AppState;
use weather_power_forecast::forecast::Clock;

use crate::common::{kst, test_config, CannedSource, FixedClock};

struct SteppingClock(Mutex<DateTime<Utc>>);

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

fn fixed_state(source: Arc<CannedSource>) -> AppState {
    AppState::with_source(test_config(), source, Arc::new(FixedClock(kst(2025, 6, 1, 9, 0)))).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_hit_latency_under_api_load() {
    let source = Arc::new(CannedSource::ok());
    let state = fixed_state(source.clone());
    state.cache.get_forecast(state.cell).await.unwrap();

    let mut clients = JoinSet::new();
    for _ in 0..50 {
        let state = state.clone();
        clients.spawn(async move {
            let mut worst = Duration::ZERO;
            for _ in 0..200 {
                let start = Instant::now();
                state.cache.get_forecast(state.cell).await.unwrap();
                worst = worst.max(start.elapsed());
            }
            worst
        });
    }

    let mut max_latency = Duration::ZERO;
    while let Some(worst) = clients.join_next().await {
        max_latency = max_latency.max(worst.unwrap());
    }

    println!("cache hit latency - max: {max_latency:?}");
    assert_eq!(source.calls(), 1);
    assert!(max_latency < Duration::from_millis(100), "hit latency {max_latency:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_one_run_per_cycle_while_cycles_roll() {
    let source = Arc::new(CannedSource::slow(Duration::from_millis(50)));
    let clock = Arc::new(SteppingClock(Mutex::new(kst(2025, 6, 1, 9, 0))));
    let state = AppState::with_source(test_config(), source.clone(), clock.clone()).unwrap();

    let cycles = 6;
    for _ in 0..cycles {
        let mut clients = JoinSet::new();
        for _ in 0..32 {
            let state = state.clone();
            clients.spawn(async move { state.cache.get_forecast(state.cell).await });
        }
        while let Some(result) = clients.join_next().await {
            result.unwrap().unwrap();
        }

        let mut now = clock.0.lock();
        *now += ChronoDuration::hours(3);
    }

    println!("stats after {cycles} cycles: {:?}", state.cache.stats());
    assert_eq!(source.calls(), cycles);
    assert_eq!(state.cache.stats().misses, cycles as u64);
}

#[tokio::test]
#[ignore] // Ignore by default as this is a slow test
async fn test_throughput_benchmark() {
    let state = fixed_state(Arc::new(CannedSource::ok()));
    state.cache.get_forecast(state.cell).await.unwrap();

    let start = Instant::now();
    let test_duration = Duration::from_secs(2);
    let mut operation_count = 0u64;

    while start.elapsed() < test_duration {
        state.cache.get_forecast(state.cell).await.unwrap();
        operation_count += 1;
    }

    let ops_per_second = operation_count as f64 / start.elapsed().as_secs_f64();
    println!("Throughput: {ops_per_second:.0} hits/second ({operation_count} hits)");

    assert!(ops_per_second > 10_000.0, "Throughput too low: {ops_per_second:.0} ops/s");
}
