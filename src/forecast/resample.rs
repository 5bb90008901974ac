//! Gap filling and resampling onto a fixed-step grid.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::{ForecastError, ForecastResult};
use crate::domain::ForecastVariable;

/// One variable's values on the shared grid
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub values: Vec<f64>,
    /// `true` where the value was filled by interpolation
    pub interpolated: Vec<bool>,
}

/// Every variable sampled on the same timestamp grid, no missing slots
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedSeries {
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<ForecastVariable, Column>,
}

impl NormalizedSeries {
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn variables(&self) -> impl Iterator<Item = ForecastVariable> + '_ {
        self.columns.keys().copied()
    }

    pub fn contains(&self, variable: ForecastVariable) -> bool {
        self.columns.contains_key(&variable)
    }

    pub fn column(&self, variable: ForecastVariable) -> Option<&Column> {
        self.columns.get(&variable)
    }

    /// All variable values at grid index `idx`
    pub fn row(&self, idx: usize) -> BTreeMap<ForecastVariable, f64> {
        self.columns
            .iter()
            .map(|(v, c)| (*v, c.values[idx]))
            .collect()
    }

    /// Whether any variable at grid index `idx` was interpolated
    pub fn row_interpolated(&self, idx: usize) -> bool {
        self.columns.values().any(|c| c.interpolated[idx])
    }

    pub fn interpolated_counts(&self) -> BTreeMap<ForecastVariable, usize> {
        self.columns
            .iter()
            .map(|(v, c)| (*v, c.interpolated.iter().filter(|i| **i).count()))
            .collect()
    }
}

pub struct Resampler {
    step: Duration,
}

impl Resampler {
    /// `step` must be positive; it is floored to one minute.
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::minutes(1)),
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Resample per-variable sequences onto one step-aligned grid.
    ///
    /// The grid covers only the span every variable has data for; values are
    /// never extrapolated beyond a variable's own first or last sample.
    /// Input sequences must be ascending and duplicate-free, as produced by
    /// the normalizer.
    pub fn resample(
        &self,
        series: &BTreeMap<ForecastVariable, Vec<(DateTime<Utc>, f64)>>,
    ) -> ForecastResult<NormalizedSeries> {
        for (variable, points) in series {
            if points.len() < 2 {
                return Err(ForecastError::InsufficientData {
                    variable: *variable,
                    samples: points.len(),
                });
            }
        }

        let (Some(first), Some(last)) = (
            series.values().map(|p| p[0].0).max(),
            series.values().map(|p| p[p.len() - 1].0).min(),
        ) else {
            return Ok(NormalizedSeries::default());
        };

        let start = self.align_up(first);
        let end = self.align_down(last);
        if start > end {
            return Err(ForecastError::DisjointHorizon);
        }

        let mut timestamps = Vec::new();
        let mut t = start;
        while t <= end {
            timestamps.push(t);
            t += self.step;
        }

        let columns: BTreeMap<_, _> = series
            .iter()
            .map(|(variable, points)| (*variable, interpolate_column(points, &timestamps)))
            .collect();

        debug!(
            slots = timestamps.len(),
            %start,
            %end,
            interpolated = columns.values().map(|c| c.interpolated.iter().filter(|i| **i).count()).sum::<usize>(),
            "resampled forecast onto fixed grid"
        );

        Ok(NormalizedSeries {
            timestamps,
            columns,
        })
    }

    fn align_up(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.step.num_seconds();
        let secs = t.timestamp();
        let rem = secs.rem_euclid(step);
        let aligned = if rem == 0 && t.timestamp_subsec_nanos() == 0 {
            secs
        } else {
            secs - rem + step
        };
        DateTime::from_timestamp(aligned, 0).unwrap_or(t)
    }

    fn align_down(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.step.num_seconds();
        let secs = t.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(t)
    }
}

fn interpolate_column(points: &[(DateTime<Utc>, f64)], grid: &[DateTime<Utc>]) -> Column {
    let mut values = Vec::with_capacity(grid.len());
    let mut interpolated = Vec::with_capacity(grid.len());

    for &ts in grid {
        let idx = points.partition_point(|(t, _)| *t < ts);
        match points.get(idx) {
            Some((t, v)) if *t == ts => {
                values.push(*v);
                interpolated.push(false);
            }
            _ => {
                // grid lies inside the span, so both neighbours exist
                let (t0, v0) = points[idx - 1];
                let (t1, v1) = points[idx];
                let span = (t1 - t0).num_milliseconds() as f64;
                let frac = (ts - t0).num_milliseconds() as f64 / span;
                values.push(v0 + (v1 - v0) * frac);
                interpolated.push(true);
            }
        }
    }

    Column {
        values,
        interpolated,
    }
}
