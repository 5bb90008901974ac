//! Trend smoothing, short-horizon extrapolation and anomaly flags.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use super::error::{ForecastError, ForecastResult};
use crate::domain::{AnalyzedPoint, PowerEstimate, Quality};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Moving-average window in samples (odd values centre cleanly)
    #[validate(range(min = 1, max = 25))]
    pub window: usize,
    /// Steps projected past the last estimate
    #[validate(range(max = 24))]
    pub extrapolation_steps: usize,
    /// Anomaly threshold as a multiple of local variability
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub anomaly_threshold: f64,
    /// Variability floor so flat stretches do not flag every ripple (kW)
    #[validate(range(min = 0.0))]
    pub min_variability_kw: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window: 3,
            extrapolation_steps: 3,
            anomaly_threshold: 3.0,
            min_variability_kw: 0.05,
        }
    }
}

pub struct TimeSeriesAnalyzer {
    config: AnalyzerConfig,
    capacity_kw: f64,
}

impl TimeSeriesAnalyzer {
    pub fn new(config: AnalyzerConfig, capacity_kw: f64) -> Self {
        Self {
            config: AnalyzerConfig {
                window: config.window.max(1),
                ..config
            },
            capacity_kw,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze an ascending estimate sequence spaced `step` apart.
    ///
    /// Short series degrade instead of failing: anomaly detection needs a full
    /// window and extrapolation needs two points.
    pub fn analyze(
        &self,
        estimates: &[PowerEstimate],
        step: Duration,
    ) -> ForecastResult<Vec<AnalyzedPoint>> {
        if estimates.is_empty() {
            return Err(ForecastError::EmptySeries);
        }

        let values: Vec<f64> = estimates.iter().map(|e| e.power_kw).collect();
        let trend = moving_average(&values, self.config.window);
        let anomalies = if values.len() >= self.config.window {
            self.flag_anomalies(&values)
        } else {
            vec![false; values.len()]
        };

        let mut points: Vec<AnalyzedPoint> = estimates
            .iter()
            .zip(trend.iter())
            .zip(anomalies.iter())
            .map(|((estimate, trend_kw), anomalous)| AnalyzedPoint {
                estimate: estimate.clone(),
                trend_kw: *trend_kw,
                anomalous: *anomalous,
            })
            .collect();

        let projected = self.extrapolate(estimates, &trend, step);
        debug!(
            points = points.len(),
            anomalies = anomalies.iter().filter(|a| **a).count(),
            extrapolated = projected.len(),
            "analyzed power series"
        );
        points.extend(projected);

        Ok(points)
    }

    fn flag_anomalies(&self, values: &[f64]) -> Vec<bool> {
        let half = self.config.window / 2;
        let last = values.len() - 1;

        (0..values.len())
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half).min(last);
                let neighbours: Vec<f64> = (lo..=hi).filter(|j| *j != i).map(|j| values[j]).collect();
                // one neighbour says nothing about spread
                if neighbours.len() < 2 {
                    return false;
                }

                let n = neighbours.len() as f64;
                let baseline = neighbours.iter().sum::<f64>() / n;
                let variability =
                    (neighbours.iter().map(|v| (v - baseline).powi(2)).sum::<f64>() / n).sqrt();
                let limit = self.config.anomaly_threshold
                    * variability.max(self.config.min_variability_kw);

                (values[i] - baseline).abs() > limit
            })
            .collect()
    }

    fn extrapolate(
        &self,
        estimates: &[PowerEstimate],
        trend: &[f64],
        step: Duration,
    ) -> Vec<AnalyzedPoint> {
        let n = trend.len();
        if n < 2 || self.config.extrapolation_steps == 0 {
            return Vec::new();
        }

        // slope over the trailing window, not just the last pair
        let span = self.config.window.clamp(1, n - 1);
        let slope = (trend[n - 1] - trend[n - 1 - span]) / span as f64;
        let last_ts = estimates[n - 1].timestamp;
        let timestamps = std::iter::successors(Some(last_ts + step), |ts| Some(*ts + step));

        (1..=self.config.extrapolation_steps)
            .zip(timestamps)
            .map(|(k, timestamp)| {
                let raw = trend[n - 1] + slope * k as f64;
                let power_kw = raw.clamp(0.0, self.capacity_kw);
                AnalyzedPoint {
                    estimate: PowerEstimate {
                        timestamp,
                        power_kw,
                        quality: Quality::Extrapolated,
                        input_clamped: false,
                        output_clamped: power_kw != raw,
                    },
                    trend_kw: power_kw,
                    anomalous: false,
                }
            })
            .collect()
    }
}

/// Centered moving average; windows shrink at the edges instead of dropping points
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let half = window.max(1) / 2;
    let last = values.len() - 1;

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(last);
            let slice = &values[lo..=hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
