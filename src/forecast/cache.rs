//! Single-flight forecast cache
//!
//! One bundle per grid cell, valid until the source publishes the next
//! issuance cycle. Concurrent misses for the same (cell, cycle) share one
//! fetch and pipeline run through a [`Shared`] future; the run itself is
//! spawned so it finishes and publishes even if every caller goes away.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::engine::ForecastPipeline;
use super::error::{ForecastError, ForecastResult};
use super::schedule::{Clock, IssuanceSchedule};
use super::weather::WeatherSource;
use crate::domain::{ForecastBundle, GridCell, IssuanceCycle};

type SharedRun = Shared<BoxFuture<'static, ForecastResult<Arc<ForecastBundle>>>>;

/// Counters since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Runs started
    pub misses: u64,
    /// Callers that joined a run already in flight
    pub joined: u64,
    pub fetch_failures: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    fetch_failures: AtomicU64,
}

#[derive(Default)]
struct CacheState {
    ready: HashMap<GridCell, Arc<ForecastBundle>>,
    in_flight: HashMap<(GridCell, IssuanceCycle), SharedRun>,
}

struct Inner {
    source: Arc<dyn WeatherSource>,
    pipeline: Arc<ForecastPipeline>,
    schedule: IssuanceSchedule,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
    counters: Counters,
}

#[derive(Clone)]
pub struct ForecastCache {
    inner: Arc<Inner>,
}

impl ForecastCache {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        pipeline: ForecastPipeline,
        schedule: IssuanceSchedule,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                pipeline: Arc::new(pipeline),
                schedule,
                clock,
                fetch_timeout,
                state: Mutex::new(CacheState::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Bundle for `cell` and the cycle current right now.
    ///
    /// Repeated calls within a cycle return the same `Arc`. Failures are
    /// handed to every waiter of the run and leave nothing cached.
    pub async fn get_forecast(&self, cell: GridCell) -> ForecastResult<Arc<ForecastBundle>> {
        let cycle = self.current_cycle();

        let run = {
            let mut state = self.inner.state.lock();
            if let Some(bundle) = state.ready.get(&cell) {
                if bundle.cycle() == cycle {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(bundle.clone());
                }
            }

            match state.in_flight.get(&(cell, cycle)) {
                Some(run) => {
                    self.inner.counters.joined.fetch_add(1, Ordering::Relaxed);
                    debug!(%cell, %cycle, "joining in-flight forecast run");
                    run.clone()
                }
                None => {
                    self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                    let run = self.start_run(cell, cycle);
                    state.in_flight.insert((cell, cycle), run.clone());
                    run
                }
            }
        };

        run.await
    }

    /// Drop the stored bundle for `cell`; returns whether one was present.
    /// A run already in flight is left alone.
    pub fn invalidate(&self, cell: GridCell) -> bool {
        let removed = self.inner.state.lock().ready.remove(&cell).is_some();
        if removed {
            info!(%cell, "forecast cache entry invalidated");
        }
        removed
    }

    /// Invalidate and recompute
    pub async fn refresh(&self, cell: GridCell) -> ForecastResult<Arc<ForecastBundle>> {
        self.invalidate(cell);
        self.get_forecast(cell).await
    }

    /// Stored bundle regardless of cycle, without triggering a run
    pub fn cached(&self, cell: GridCell) -> Option<Arc<ForecastBundle>> {
        self.inner.state.lock().ready.get(&cell).cloned()
    }

    pub fn current_cycle(&self) -> IssuanceCycle {
        self.inner.schedule.current_cycle(self.inner.clock.now())
    }

    pub fn schedule(&self) -> &IssuanceSchedule {
        &self.inner.schedule
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Step of the pipeline's resampling grid
    pub fn step(&self) -> chrono::Duration {
        self.inner.pipeline.step()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            joined: c.joined.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
        }
    }

    fn start_run(&self, cell: GridCell, cycle: IssuanceCycle) -> SharedRun {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.execute(cell, cycle).await });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ForecastError::PipelineAborted(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn execute(
        self: Arc<Self>,
        cell: GridCell,
        cycle: IssuanceCycle,
    ) -> ForecastResult<Arc<ForecastBundle>> {
        let mut guard = InFlightGuard {
            inner: self.clone(),
            key: (cell, cycle),
            published: false,
        };

        let result = match AssertUnwindSafe(self.fetch_and_run(cell, cycle))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(ForecastError::PipelineAborted(panic_message(panic.as_ref()))),
        };

        self.publish(cell, cycle, &result);
        guard.published = true;
        result
    }

    async fn fetch_and_run(
        &self,
        cell: GridCell,
        cycle: IssuanceCycle,
    ) -> ForecastResult<Arc<ForecastBundle>> {
        debug!(%cell, %cycle, "starting forecast run");

        let samples = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(cell, cycle))
            .await
        {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%cell, %cycle, error = %format!("{e:#}"), "weather fetch failed");
                return Err(ForecastError::SourceUnavailable(format!("{e:#}")));
            }
            Err(_) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%cell, %cycle, timeout = ?self.fetch_timeout, "weather fetch timed out");
                return Err(ForecastError::SourceUnavailable(format!(
                    "fetch timed out after {:?}",
                    self.fetch_timeout
                )));
            }
        };

        let pipeline = self.pipeline.clone();
        let generated_at = self.clock.now();
        let bundle = tokio::task::spawn_blocking(move || {
            pipeline.run(cell, cycle, &samples, generated_at)
        })
        .await
        .map_err(|e| ForecastError::PipelineAborted(e.to_string()))??;

        Ok(Arc::new(bundle))
    }

    /// Retire the in-flight entry and store a successful bundle, unless a
    /// newer cycle got there first.
    fn publish(
        &self,
        cell: GridCell,
        cycle: IssuanceCycle,
        result: &ForecastResult<Arc<ForecastBundle>>,
    ) {
        let mut state = self.state.lock();
        state.in_flight.remove(&(cell, cycle));

        match result {
            Ok(bundle) => {
                let newer_stored = state
                    .ready
                    .get(&cell)
                    .is_some_and(|existing| existing.cycle() > cycle);
                if !newer_stored {
                    state.ready.insert(cell, bundle.clone());
                }
            }
            Err(e) => {
                warn!(%cell, %cycle, error = %e, "forecast run failed, nothing cached");
            }
        }
    }
}

/// Retires the in-flight entry of a run dropped before it could publish,
/// e.g. when the runtime cancels the task at shutdown.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: (GridCell, IssuanceCycle),
    published: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let (cell, cycle) = self.key;
        let _abandoned = self.inner.state.lock().in_flight.remove(&self.key);
        warn!(%cell, %cycle, "forecast run dropped before publishing");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic in forecast run".to_string())
}
