use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

use super::types::{ForecastVariable, GridCell, IssuanceCycle};

/// Where a power value came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Quality {
    /// Every input was an actual forecast slot
    Observed,
    /// At least one input was filled by interpolation
    Interpolated,
    /// Projected past the end of the estimated series
    Extrapolated,
}

/// Estimated PV output at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEstimate {
    pub timestamp: DateTime<Utc>,
    /// Estimated AC output (kW), always within [0, capacity]
    pub power_kw: f64,
    pub quality: Quality,
    /// An input variable was outside its plausible range and was clamped
    pub input_clamped: bool,
    /// The model result was outside [0, capacity] and was clamped
    pub output_clamped: bool,
}

impl PowerEstimate {
    pub fn is_clamped(&self) -> bool {
        self.input_clamped || self.output_clamped
    }
}

/// Power estimate enriched by the time-series analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedPoint {
    #[serde(flatten)]
    pub estimate: PowerEstimate,
    /// Moving-average trend (kW)
    pub trend_kw: f64,
    /// Deviates from its neighbourhood more than the configured threshold
    pub anomalous: bool,
}

/// First and last instant covered by a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Complete pipeline output for one grid cell and one issuance cycle.
///
/// Bundles are built once by the forecast engine and then shared read-only
/// behind an `Arc`; there are no mutating methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastBundle {
    pub(crate) grid_cell: GridCell,
    pub(crate) cycle: IssuanceCycle,
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) model: String,
    pub(crate) horizon: Horizon,
    pub(crate) points: Vec<AnalyzedPoint>,
    pub(crate) interpolated_counts: BTreeMap<ForecastVariable, usize>,
    pub(crate) omitted_variables: Vec<ForecastVariable>,
    pub(crate) dropped_samples: usize,
}

impl ForecastBundle {
    pub fn grid_cell(&self) -> GridCell {
        self.grid_cell
    }

    pub fn cycle(&self) -> IssuanceCycle {
        self.cycle
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Name of the conversion model that produced the estimates
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Points sorted ascending by timestamp, extrapolated tail included
    pub fn points(&self) -> &[AnalyzedPoint] {
        &self.points
    }

    pub fn interpolated_counts(&self) -> &BTreeMap<ForecastVariable, usize> {
        &self.interpolated_counts
    }

    /// Declared variables the source did not deliver at all
    pub fn omitted_variables(&self) -> &[ForecastVariable] {
        &self.omitted_variables
    }

    /// Samples discarded for falling outside the accepted horizon
    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples
    }

    pub fn anomaly_count(&self) -> usize {
        self.points.iter().filter(|p| p.anomalous).count()
    }

    /// Latest point at or before `timestamp`
    pub fn point_at(&self, timestamp: DateTime<Utc>) -> Option<&AnalyzedPoint> {
        let idx = self
            .points
            .partition_point(|p| p.estimate.timestamp <= timestamp);
        idx.checked_sub(1).map(|i| &self.points[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(hour: u32, power_kw: f64) -> AnalyzedPoint {
        AnalyzedPoint {
            estimate: PowerEstimate {
                timestamp: Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
                power_kw,
                quality: Quality::Observed,
                input_clamped: false,
                output_clamped: false,
            },
            trend_kw: power_kw,
            anomalous: false,
        }
    }

    fn bundle(points: Vec<AnalyzedPoint>) -> ForecastBundle {
        let start = points[0].estimate.timestamp;
        let end = points[points.len() - 1].estimate.timestamp;
        ForecastBundle {
            grid_cell: GridCell::new(54, 124),
            cycle: IssuanceCycle::new(start),
            generated_at: start,
            model: "test".to_string(),
            horizon: Horizon { start, end },
            points,
            interpolated_counts: BTreeMap::new(),
            omitted_variables: vec![],
            dropped_samples: 0,
        }
    }

    #[test]
    fn test_point_at_picks_latest_not_after() {
        let b = bundle(vec![point(1, 0.5), point(2, 1.0), point(3, 1.5)]);
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 2, 30, 0).unwrap();
        assert_eq!(b.point_at(t).unwrap().estimate.power_kw, 1.0);
        let before = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert!(b.point_at(before).is_none());
    }

    #[test]
    fn test_estimate_serializes_flat() {
        let json = serde_json::to_value(point(4, 2.0)).unwrap();
        assert_eq!(json["power_kw"], 2.0);
        assert_eq!(json["quality"], "observed");
        assert_eq!(json["anomalous"], false);
    }

    #[test]
    fn test_quality_display_matches_serde_name() {
        for quality in [Quality::Observed, Quality::Interpolated, Quality::Extrapolated] {
            let json = serde_json::to_value(quality).unwrap();
            assert_eq!(json, quality.to_string());
        }
        assert_eq!(Quality::Extrapolated.to_string(), "extrapolated");
    }
}
