use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::analyzer::TimeSeriesAnalyzer;
use super::error::{ForecastError, ForecastResult};
use super::estimator::PowerEstimator;
use super::normalizer::ForecastNormalizer;
use super::resample::Resampler;
use super::solar::SolarPosition;
use crate::config::Config;
use crate::domain::{ForecastBundle, ForecastSample, GridCell, Horizon, IssuanceCycle};

/// Normalize → resample → estimate → analyze, for one fetched cycle.
///
/// Every stage is synchronous and free of I/O; fetching and caching live in
/// [`super::cache::ForecastCache`].
pub struct ForecastPipeline {
    normalizer: ForecastNormalizer,
    resampler: Resampler,
    estimator: PowerEstimator,
    analyzer: TimeSeriesAnalyzer,
    solar: SolarPosition,
}

impl ForecastPipeline {
    pub fn new(
        normalizer: ForecastNormalizer,
        resampler: Resampler,
        estimator: PowerEstimator,
        analyzer: TimeSeriesAnalyzer,
        solar: SolarPosition,
    ) -> Self {
        Self {
            normalizer,
            resampler,
            estimator,
            analyzer,
            solar,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let capacity_kw = cfg.site.capacity_kw;
        let model = cfg.model.build(capacity_kw);

        Ok(Self::new(
            ForecastNormalizer::new(cfg.pipeline.normalizer.clone()),
            Resampler::new(Duration::minutes(cfg.pipeline.step_minutes)),
            PowerEstimator::new(model, capacity_kw),
            TimeSeriesAnalyzer::new(cfg.pipeline.analyzer.clone(), capacity_kw),
            SolarPosition::new(cfg.site.latitude, cfg.site.longitude),
        ))
    }

    pub fn step(&self) -> Duration {
        self.resampler.step()
    }

    pub fn model_name(&self) -> &str {
        self.estimator.model().name()
    }

    pub fn run(
        &self,
        cell: GridCell,
        cycle: IssuanceCycle,
        samples: &[ForecastSample],
        generated_at: DateTime<Utc>,
    ) -> ForecastResult<ForecastBundle> {
        let normalized = self.normalizer.normalize(samples, cycle.start())?;
        debug!(
            %cell,
            variables = normalized.series.len(),
            omitted = normalized.omitted.len(),
            "normalized forecast samples"
        );

        let series = self.resampler.resample(&normalized.series)?;
        let estimates = self
            .estimator
            .estimate_series(&series, |ts| self.solar.elevation_deg(ts))?;
        let points = self.analyzer.analyze(&estimates, self.resampler.step())?;

        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(ForecastError::EmptySeries);
        };
        let horizon = Horizon {
            start: first.estimate.timestamp,
            end: last.estimate.timestamp,
        };

        let bundle = ForecastBundle {
            grid_cell: cell,
            cycle,
            generated_at,
            model: self.model_name().to_string(),
            horizon,
            interpolated_counts: series.interpolated_counts(),
            omitted_variables: normalized.omitted,
            dropped_samples: normalized.dropped_out_of_horizon,
            points,
        };

        info!(
            %cell,
            %cycle,
            points = bundle.points().len(),
            anomalies = bundle.anomaly_count(),
            start = %horizon.start,
            end = %horizon.end,
            "forecast pipeline completed"
        );
        Ok(bundle)
    }
}
