use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ============================================================================
// Site Identity
// ============================================================================

/// KMA forecast grid cell (Lambert conformal grid, 5 km resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub nx: u16,
    pub ny: u16,
}

impl GridCell {
    pub fn new(nx: u16, ny: u16) -> Self {
        Self { nx, ny }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.nx, self.ny)
    }
}

/// Start of one forecast publication cycle, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssuanceCycle(DateTime<Utc>);

impl IssuanceCycle {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(start)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for IssuanceCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%MZ"))
    }
}

// ============================================================================
// Forecast Variables
// ============================================================================

/// Weather variable kinds understood by the pipeline
///
/// Every kind has one canonical unit; the normalizer converts raw encodings
/// into it and the estimator clamps to [`ForecastVariable::plausible_range`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastVariable {
    /// Air temperature (°C)
    Temperature,
    /// Sky condition mapped to an estimated clear-sky fraction (0-1)
    SkyCondition,
    /// Total cloud cover (%)
    CloudCover,
    /// Probability of precipitation (%)
    PrecipitationProbability,
    /// Precipitation type mapped to an irradiance transmittance (0-1)
    PrecipitationType,
    /// Relative humidity (%)
    Humidity,
    /// Wind speed (m/s)
    WindSpeed,
}

impl ForecastVariable {
    /// Unit every value of this kind is expressed in after normalization
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::SkyCondition | Self::PrecipitationType => "fraction",
            Self::CloudCover | Self::PrecipitationProbability | Self::Humidity => "%",
            Self::WindSpeed => "m/s",
        }
    }

    /// Inclusive range of physically plausible canonical values
    pub fn plausible_range(&self) -> (f64, f64) {
        match self {
            Self::Temperature => (-50.0, 60.0),
            Self::SkyCondition | Self::PrecipitationType => (0.0, 1.0),
            Self::CloudCover | Self::PrecipitationProbability | Self::Humidity => (0.0, 100.0),
            Self::WindSpeed => (0.0, 75.0),
        }
    }

    /// Categorical kinds arrive as provider codes rather than numbers
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::SkyCondition | Self::PrecipitationType)
    }

    /// Clamp a canonical value into the plausible range.
    ///
    /// Returns the clamped value and whether clamping changed it. NaN is
    /// pulled to the lower bound.
    pub fn clamp(&self, value: f64) -> (f64, bool) {
        let (min, max) = self.plausible_range();
        if value.is_nan() {
            return (min, true);
        }
        let clamped = value.clamp(min, max);
        (clamped, clamped != value)
    }
}

/// Encoding a raw sample value arrives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RawUnit {
    Celsius,
    Kelvin,
    Percent,
    Fraction,
    /// Eighths of sky covered (0-8)
    Okta,
    MetersPerSecond,
    KilometersPerHour,
    /// Provider category code
    Code,
}

/// Raw sample value as received from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Code(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Code(c) => write!(f, "{c}"),
        }
    }
}

/// One forecast value for one variable at one valid time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub valid_time: DateTime<Utc>,
    pub variable: ForecastVariable,
    pub value: RawValue,
    pub unit: RawUnit,
}

impl ForecastSample {
    pub fn number(
        valid_time: DateTime<Utc>,
        variable: ForecastVariable,
        value: f64,
        unit: RawUnit,
    ) -> Self {
        Self {
            valid_time,
            variable,
            value: RawValue::Number(value),
            unit,
        }
    }

    pub fn code(valid_time: DateTime<Utc>, variable: ForecastVariable, code: impl Into<String>) -> Self {
        Self {
            valid_time,
            variable,
            value: RawValue::Code(code.into()),
            unit: RawUnit::Code,
        }
    }
}
