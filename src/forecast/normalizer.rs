//! Forecast normalization
//!
//! Turns the loose bag of provider samples into one ascending, duplicate-free
//! `(timestamp, value)` sequence per declared variable, expressed in the
//! variable's canonical unit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use validator::Validate;

use super::error::{ForecastError, ForecastResult};
use crate::domain::{ForecastSample, ForecastVariable, RawUnit, RawValue};

/// What to do with a category code missing from its lookup table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCodePolicy {
    /// Abort the run with `UnknownCategoryCode`
    #[default]
    FailFast,
    /// Use the table's neutral value and keep going
    SubstituteDefault,
}

/// Fixed mapping from provider category codes to a continuous proxy value
#[derive(Debug)]
pub struct CategoryTable {
    pub variable: ForecastVariable,
    entries: &'static [(&'static str, f64)],
    neutral: f64,
}

impl CategoryTable {
    pub fn lookup(&self, code: &str) -> Option<f64> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| *v)
    }

    /// Value substituted for unknown codes under `SubstituteDefault`
    pub fn neutral(&self) -> f64 {
        self.neutral
    }

    pub fn for_variable(variable: ForecastVariable) -> Option<&'static CategoryTable> {
        match variable {
            ForecastVariable::SkyCondition => Some(&SKY_CONDITION),
            ForecastVariable::PrecipitationType => Some(&PRECIPITATION_TYPE),
            _ => None,
        }
    }
}

/// KMA `SKY` code → estimated clear-sky fraction
pub static SKY_CONDITION: CategoryTable = CategoryTable {
    variable: ForecastVariable::SkyCondition,
    entries: &[
        ("1", 1.0),  // clear
        ("2", 0.75), // partly cloudy (retired code, still seen in old payloads)
        ("3", 0.45), // mostly cloudy
        ("4", 0.2),  // overcast
    ],
    neutral: 0.45,
};

/// KMA `PTY` code → irradiance transmittance under that precipitation
pub static PRECIPITATION_TYPE: CategoryTable = CategoryTable {
    variable: ForecastVariable::PrecipitationType,
    entries: &[
        ("0", 1.0),  // none
        ("1", 0.55), // rain
        ("2", 0.5),  // rain and snow
        ("3", 0.6),  // snow
        ("4", 0.5),  // shower
        ("5", 0.8),  // drizzle
        ("6", 0.75), // drizzle and snow flurries
        ("7", 0.85), // snow flurries
    ],
    neutral: 1.0,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Variables the pipeline asks for
    #[validate(length(min = 1))]
    pub variables: Vec<ForecastVariable>,
    /// Samples older than issuance minus this are dropped
    #[validate(range(min = 0, max = 48))]
    pub max_past_hours: i64,
    /// Samples later than issuance plus this are dropped
    #[validate(range(min = 1, max = 240))]
    pub max_future_hours: i64,
    pub unknown_code_policy: UnknownCodePolicy,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            variables: vec![
                ForecastVariable::Temperature,
                ForecastVariable::SkyCondition,
                ForecastVariable::PrecipitationProbability,
                ForecastVariable::PrecipitationType,
                ForecastVariable::Humidity,
                ForecastVariable::WindSpeed,
            ],
            max_past_hours: 3,
            max_future_hours: 72,
            unknown_code_policy: UnknownCodePolicy::FailFast,
        }
    }
}

/// Normalizer output, before resampling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedInput {
    /// Ascending, duplicate-free canonical values per delivered variable
    pub series: BTreeMap<ForecastVariable, Vec<(DateTime<Utc>, f64)>>,
    /// Declared variables without a single usable sample
    pub omitted: Vec<ForecastVariable>,
    pub dropped_out_of_horizon: usize,
    pub duplicates_replaced: usize,
    pub substituted_codes: usize,
    pub invalid_values: usize,
}

pub struct ForecastNormalizer {
    config: NormalizerConfig,
}

impl ForecastNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize samples received for the cycle issued at `issued_at`.
    ///
    /// Samples are taken in arrival order: when a variable's valid time shows
    /// up twice the later sample replaces the earlier one.
    pub fn normalize(
        &self,
        samples: &[ForecastSample],
        issued_at: DateTime<Utc>,
    ) -> ForecastResult<NormalizedInput> {
        let earliest = issued_at - Duration::hours(self.config.max_past_hours);
        let latest_allowed = issued_at + Duration::hours(self.config.max_future_hours);

        let mut out = NormalizedInput::default();
        let mut latest: BTreeMap<(ForecastVariable, DateTime<Utc>), &ForecastSample> =
            BTreeMap::new();
        let mut undeclared = 0usize;

        // Revisions are resolved on the raw samples so a superseded value never
        // reaches conversion.
        for sample in samples {
            if !self.config.variables.contains(&sample.variable) {
                undeclared += 1;
                continue;
            }
            if sample.valid_time < earliest || sample.valid_time > latest_allowed {
                out.dropped_out_of_horizon += 1;
                continue;
            }
            if matches!(sample.value, RawValue::Number(n) if !n.is_finite()) {
                out.invalid_values += 1;
                continue;
            }
            if latest
                .insert((sample.variable, sample.valid_time), sample)
                .is_some()
            {
                out.duplicates_replaced += 1;
            }
        }

        // Keys sort by variable then time, so each series comes out ascending
        let mut by_variable: BTreeMap<ForecastVariable, Vec<(DateTime<Utc>, f64)>> =
            BTreeMap::new();
        for ((variable, valid_time), sample) in latest {
            let value = match self.canonical_value(sample)? {
                Canonical::Value(v) => v,
                Canonical::Substituted(v) => {
                    out.substituted_codes += 1;
                    v
                }
            };
            by_variable
                .entry(variable)
                .or_default()
                .push((valid_time, value));
        }

        if out.dropped_out_of_horizon > 0 {
            warn!(
                dropped = out.dropped_out_of_horizon,
                %earliest,
                latest = %latest_allowed,
                "dropped forecast samples outside the accepted horizon"
            );
        }
        if out.duplicates_replaced > 0 {
            debug!(
                replaced = out.duplicates_replaced,
                "duplicate valid times resolved in favour of the latest sample"
            );
        }
        if out.substituted_codes > 0 {
            warn!(
                substituted = out.substituted_codes,
                "unknown category codes replaced by neutral defaults"
            );
        }
        if out.invalid_values > 0 {
            warn!(invalid = out.invalid_values, "non-finite sample values skipped");
        }
        if undeclared > 0 {
            debug!(ignored = undeclared, "samples for undeclared variables ignored");
        }

        for variable in &self.config.variables {
            match by_variable.remove(variable) {
                Some(points) => {
                    out.series.insert(*variable, points);
                }
                None => {
                    warn!(%variable, "variable missing from forecast payload");
                    out.omitted.push(*variable);
                }
            }
        }

        Ok(out)
    }

    fn canonical_value(&self, sample: &ForecastSample) -> ForecastResult<Canonical> {
        let variable = sample.variable;

        if let Some(table) = CategoryTable::for_variable(variable) {
            let code = match &sample.value {
                RawValue::Code(code) => code.clone(),
                RawValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
                RawValue::Number(_) => return Err(mismatch(sample)),
            };
            return match table.lookup(&code) {
                Some(v) => Ok(Canonical::Value(v)),
                None => match self.config.unknown_code_policy {
                    UnknownCodePolicy::FailFast => {
                        Err(ForecastError::UnknownCategoryCode { variable, code })
                    }
                    UnknownCodePolicy::SubstituteDefault => {
                        Ok(Canonical::Substituted(table.neutral()))
                    }
                },
            };
        }

        let RawValue::Number(raw) = sample.value else {
            return Err(mismatch(sample));
        };
        convert_unit(variable, sample.unit, raw)
            .map(Canonical::Value)
            .ok_or_else(|| mismatch(sample))
    }
}

enum Canonical {
    Value(f64),
    Substituted(f64),
}

/// Convert a numeric raw value into the variable's canonical unit
pub fn convert_unit(variable: ForecastVariable, unit: RawUnit, raw: f64) -> Option<f64> {
    use ForecastVariable::*;
    use RawUnit::*;

    match (variable, unit) {
        (Temperature, Celsius) => Some(raw),
        (Temperature, Kelvin) => Some(raw - 273.15),
        (CloudCover, Percent) => Some(raw),
        (CloudCover, Fraction) => Some(raw * 100.0),
        (CloudCover, Okta) => Some(raw * 12.5),
        (PrecipitationProbability | Humidity, Percent) => Some(raw),
        (PrecipitationProbability | Humidity, Fraction) => Some(raw * 100.0),
        (WindSpeed, MetersPerSecond) => Some(raw),
        (WindSpeed, KilometersPerHour) => Some(raw / 3.6),
        _ => None,
    }
}

fn mismatch(sample: &ForecastSample) -> ForecastError {
    ForecastError::UnitMismatch {
        variable: sample.variable,
        unit: sample.unit,
        value: sample.value.to_string(),
    }
}
