use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::GridCell;
use crate::forecast::{Clock, ForecastCache, ForecastPipeline, KmaClient, SystemClock, WeatherSource};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub cache: ForecastCache,
    /// The one grid cell this deployment serves
    pub cell: GridCell,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        if cfg.source.service_key.is_empty() {
            warn!("no KMA service key configured (PVF__SOURCE__SERVICE_KEY); fetches will be rejected");
        }
        let source = Arc::new(KmaClient::new(&cfg.source)?);
        Self::with_source(cfg, source, Arc::new(SystemClock))
    }

    /// Wire the cache around an arbitrary source and clock
    pub fn with_source(
        cfg: Config,
        source: Arc<dyn WeatherSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pipeline = ForecastPipeline::from_config(&cfg)?;
        let cache = ForecastCache::new(
            source,
            pipeline,
            cfg.issuance.schedule()?,
            clock,
            Duration::from_secs(cfg.source.timeout_seconds),
        );

        Ok(Self {
            cell: cfg.site.grid_cell(),
            cfg: Arc::new(cfg),
            cache,
        })
    }
}

pub fn spawn_controller_tasks(state: AppState) {
    if !state.cfg.prefetch.enabled {
        debug!("forecast prefetch disabled");
        return;
    }

    tokio::spawn(async move {
        prefetch_loop(state).await;
    });
}

/// Warm the cache as soon as each issuance cycle becomes available
async fn prefetch_loop(state: AppState) {
    info!(cell = %state.cell, "forecast prefetch started");
    loop {
        match state.cache.get_forecast(state.cell).await {
            Ok(bundle) => info!(
                cell = %state.cell,
                cycle = %bundle.cycle(),
                points = bundle.points().len(),
                "forecast prefetched"
            ),
            // left for the next request to retry
            Err(e) => warn!(cell = %state.cell, error = %e, "forecast prefetch failed"),
        }

        let now = state.cache.clock().now();
        let next = state.cache.schedule().next_available_after(now);
        let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
        debug!(%next, wait_secs = wait.as_secs(), "prefetch waiting for next cycle");
        tokio::time::sleep(wait).await;
    }
}
