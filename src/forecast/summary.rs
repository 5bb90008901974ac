//! Per-day energy totals and the power balance against a constant load

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::Serialize;

use crate::domain::{ForecastBundle, Quality};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEnergy {
    /// Calendar day in the site time zone
    pub date: NaiveDate,
    pub energy_kwh: f64,
    pub peak_kw: f64,
    pub peak_at: DateTime<Utc>,
    pub points: usize,
    pub extrapolated_points: usize,
    pub load_kwh: f64,
    pub balance_kwh: f64,
    pub sufficient: bool,
    /// Production as a share of the load; absent without a load
    pub sufficiency_percent: Option<f64>,
}

/// Group a bundle's points by local day.
///
/// Each point stands for one grid step of constant power, so a day's energy
/// is `Σ power × step`. Days only partly covered by the horizon are reported
/// as they are.
pub fn summarize_daily(
    bundle: &ForecastBundle,
    step: Duration,
    tz: Tz,
    load_kwh_per_day: f64,
) -> Vec<DailyEnergy> {
    let step_hours = step.num_seconds() as f64 / 3600.0;

    bundle
        .points()
        .iter()
        .chunk_by(|p| p.estimate.timestamp.with_timezone(&tz).date_naive())
        .into_iter()
        .filter_map(|(date, group)| {
            let day: Vec<_> = group.collect();
            let peak = day
                .iter()
                .max_by(|a, b| a.estimate.power_kw.total_cmp(&b.estimate.power_kw))?;

            let energy_kwh = day.iter().map(|p| p.estimate.power_kw).sum::<f64>() * step_hours;
            let balance_kwh = energy_kwh - load_kwh_per_day;

            Some(DailyEnergy {
                date,
                energy_kwh,
                peak_kw: peak.estimate.power_kw,
                peak_at: peak.estimate.timestamp,
                points: day.len(),
                extrapolated_points: day
                    .iter()
                    .filter(|p| p.estimate.quality == Quality::Extrapolated)
                    .count(),
                load_kwh: load_kwh_per_day,
                balance_kwh,
                sufficient: balance_kwh >= 0.0,
                sufficiency_percent: (load_kwh_per_day > 0.0)
                    .then(|| energy_kwh / load_kwh_per_day.max(0.0001) * 100.0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalyzedPoint, GridCell, Horizon, IssuanceCycle, PowerEstimate};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn bundle(start: DateTime<Utc>, values: &[f64]) -> ForecastBundle {
        let points: Vec<AnalyzedPoint> = values
            .iter()
            .enumerate()
            .map(|(i, v)| AnalyzedPoint {
                estimate: PowerEstimate {
                    timestamp: start + Duration::hours(i as i64),
                    power_kw: *v,
                    quality: if i + 1 == values.len() {
                        Quality::Extrapolated
                    } else {
                        Quality::Observed
                    },
                    input_clamped: false,
                    output_clamped: false,
                },
                trend_kw: *v,
                anomalous: false,
            })
            .collect();

        ForecastBundle {
            grid_cell: GridCell::new(54, 124),
            cycle: IssuanceCycle::new(start),
            generated_at: start,
            model: "test".to_string(),
            horizon: Horizon {
                start,
                end: start + Duration::hours(values.len() as i64 - 1),
            },
            points,
            interpolated_counts: BTreeMap::new(),
            omitted_variables: Vec::new(),
            dropped_samples: 0,
        }
    }

    #[test]
    fn test_energy_is_power_times_step() {
        // 22:00 KST on June 1st
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap();
        let b = bundle(start, &[0.0, 0.0, 1.0, 2.0, 1.5]);

        let days = summarize_daily(&b, Duration::hours(1), chrono_tz::Asia::Seoul, 2.0);
        assert_eq!(days.len(), 2);

        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(days[0].energy_kwh, 0.0);
        assert!(!days[0].sufficient);
        assert_eq!(days[0].sufficiency_percent, Some(0.0));

        let june2 = &days[1];
        assert_eq!(june2.points, 3);
        assert!((june2.energy_kwh - 4.5).abs() < 1e-9);
        assert_eq!(june2.peak_kw, 2.0);
        assert_eq!(june2.peak_at, start + Duration::hours(3));
        assert_eq!(june2.extrapolated_points, 1);
        assert!((june2.balance_kwh - 2.5).abs() < 1e-9);
        assert!(june2.sufficient);
        assert!((june2.sufficiency_percent.unwrap() - 225.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_hour_step_and_no_load() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        let b = bundle(start, &[2.0, 2.0]);
        let days = summarize_daily(&b, Duration::minutes(30), chrono_tz::UTC, 0.0);

        assert_eq!(days.len(), 1);
        assert!((days[0].energy_kwh - 2.0).abs() < 1e-9);
        assert!(days[0].sufficient);
        assert_eq!(days[0].sufficiency_percent, None);
    }
}
