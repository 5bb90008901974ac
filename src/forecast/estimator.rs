//! Weather → power conversion
//!
//! [`PowerEstimator`] owns the clamping rules; the formula itself sits behind
//! the [`PowerModel`] trait. A deployment picks [`ClearSkyPowerModel`] (PV) or
//! [`WindTurbinePowerModel`] through [`ModelConfig`] without touching the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use super::error::{ForecastError, ForecastResult};
use super::resample::NormalizedSeries;
use super::solar::clear_sky_irradiance;
use crate::domain::{ForecastVariable, PowerEstimate, Quality};

/// One grid row handed to a model: clamped canonical values plus sun position
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    values: BTreeMap<ForecastVariable, f64>,
    pub solar_elevation_deg: f64,
}

impl ModelInputs {
    pub fn new(values: BTreeMap<ForecastVariable, f64>, solar_elevation_deg: f64) -> Self {
        Self {
            values,
            solar_elevation_deg,
        }
    }

    pub fn get(&self, variable: ForecastVariable) -> Option<f64> {
        self.values.get(&variable).copied()
    }
}

/// Conversion from a weather vector to raw PV output (kW)
pub trait PowerModel: Send + Sync {
    fn name(&self) -> &str;

    /// Variables without which `compute` cannot give a meaningful answer
    fn required_variables(&self) -> &[ForecastVariable];

    /// Raw output in kW. May fall outside [0, capacity]; the estimator clamps.
    fn compute(&self, inputs: &ModelInputs) -> f64;
}

/// Conversion model selected by the `[model]` section's `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    ClearSky(ClearSkyModelParams),
    WindTurbine(WindTurbineParams),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::ClearSky(ClearSkyModelParams::default())
    }
}

impl Validate for ModelConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::ClearSky(params) => params.validate(),
            Self::WindTurbine(params) => params.validate(),
        }
    }
}

impl ModelConfig {
    /// Instantiate the configured model for a site of `capacity_kw`
    pub fn build(&self, capacity_kw: f64) -> Arc<dyn PowerModel> {
        match self {
            Self::ClearSky(params) => Arc::new(ClearSkyPowerModel::new(capacity_kw, params.clone())),
            Self::WindTurbine(params) => Arc::new(WindTurbinePowerModel::new(params.clone())),
        }
    }
}

/// Coefficients of the default clear-sky model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClearSkyModelParams {
    /// Zenith clear-sky transmittance of the atmosphere
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub atmospheric_transmittance: f64,
    /// Kasten-Czeplak `a` in `1 - a·C^b`
    #[validate(range(min = 0.0, max = 1.0))]
    pub cloud_attenuation: f64,
    /// Kasten-Czeplak `b` in `1 - a·C^b`
    #[validate(range(exclusive_min = 0.0, max = 10.0))]
    pub cloud_exponent: f64,
    /// Irradiance lost at 100% precipitation probability when no type is given
    #[validate(range(min = 0.0, max = 1.0))]
    pub precipitation_probability_weight: f64,
    /// Relative power change per °C of cell temperature above 25 °C
    #[validate(range(min = -0.02, max = 0.0))]
    pub temperature_coefficient: f64,
    /// Faiman constant heat-loss factor (W/m²K)
    #[validate(range(exclusive_min = 0.0))]
    pub faiman_u0: f64,
    /// Faiman convective heat-loss factor (W·s/m³K)
    #[validate(range(min = 0.0))]
    pub faiman_u1: f64,
    /// Wind speed assumed when the forecast has none (m/s)
    #[validate(range(min = 0.0, max = 75.0))]
    pub default_wind_speed_ms: f64,
    /// Inverter, wiring and soiling losses
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub performance_ratio: f64,
}

impl Default for ClearSkyModelParams {
    fn default() -> Self {
        Self {
            atmospheric_transmittance: 0.7,
            cloud_attenuation: 0.75,
            cloud_exponent: 3.4,
            precipitation_probability_weight: 0.3,
            temperature_coefficient: -0.004,
            faiman_u0: 25.0,
            faiman_u1: 6.84,
            default_wind_speed_ms: 3.0,
            performance_ratio: 0.85,
        }
    }
}

/// Default empirical model.
///
/// ```text
/// G   = G_cs(elev) · (1 − a·C^b) · precip
/// T_c = T_amb + G / (u0 + u1·wind)
/// P   = capacity · G/1000 · (1 + γ·(T_c − 25)) · PR
/// ```
///
/// `C` is cloud cover when forecast, otherwise `1 − sky condition`. `precip`
/// is the precipitation-type transmittance when forecast, otherwise derived
/// from precipitation probability, otherwise 1.
pub struct ClearSkyPowerModel {
    capacity_kw: f64,
    params: ClearSkyModelParams,
}

impl ClearSkyPowerModel {
    const REQUIRED: [ForecastVariable; 2] =
        [ForecastVariable::Temperature, ForecastVariable::SkyCondition];

    pub fn new(capacity_kw: f64, params: ClearSkyModelParams) -> Self {
        Self {
            capacity_kw,
            params,
        }
    }
}

impl PowerModel for ClearSkyPowerModel {
    fn name(&self) -> &str {
        "clear_sky_v1"
    }

    fn required_variables(&self) -> &[ForecastVariable] {
        &Self::REQUIRED
    }

    fn compute(&self, inputs: &ModelInputs) -> f64 {
        let p = &self.params;
        let clear_sky = clear_sky_irradiance(inputs.solar_elevation_deg, p.atmospheric_transmittance);
        if clear_sky <= 0.0 {
            return 0.0;
        }

        let cloud_fraction = inputs
            .get(ForecastVariable::CloudCover)
            .map(|c| c / 100.0)
            .or_else(|| inputs.get(ForecastVariable::SkyCondition).map(|s| 1.0 - s))
            .unwrap_or(0.0);
        let cloud_factor = 1.0 - p.cloud_attenuation * cloud_fraction.powf(p.cloud_exponent);

        let precip_factor = inputs
            .get(ForecastVariable::PrecipitationType)
            .or_else(|| {
                inputs
                    .get(ForecastVariable::PrecipitationProbability)
                    .map(|pop| 1.0 - p.precipitation_probability_weight * pop / 100.0)
            })
            .unwrap_or(1.0);

        let irradiance = clear_sky * cloud_factor * precip_factor;

        let ambient_c = inputs.get(ForecastVariable::Temperature).unwrap_or(25.0);
        let wind = inputs
            .get(ForecastVariable::WindSpeed)
            .unwrap_or(p.default_wind_speed_ms);
        let cell_c = ambient_c + irradiance / (p.faiman_u0 + p.faiman_u1 * wind);
        let temp_factor = 1.0 + p.temperature_coefficient * (cell_c - 25.0);

        self.capacity_kw * (irradiance / 1000.0) * temp_factor * p.performance_ratio
    }
}

/// Turbine installation fed by the wind speed forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WindTurbineParams {
    /// Nameplate output of one turbine (kW)
    #[validate(range(exclusive_min = 0.0))]
    pub rated_power_kw: f64,
    /// Below this speed the rotor does not turn (m/s)
    #[validate(range(min = 0.0, max = 25.0))]
    pub cut_in_speed_ms: f64,
    /// Rotor swept area (m²)
    #[validate(range(exclusive_min = 0.0))]
    pub swept_area_m2: f64,
    /// Share of the wind's kinetic power the rotor captures, at most the Betz limit
    #[validate(range(exclusive_min = 0.0, max = 0.593))]
    pub rotor_efficiency: f64,
    #[validate(range(min = 1, max = 1000))]
    pub turbine_count: u32,
    /// kg/m³
    #[validate(range(exclusive_min = 0.0, max = 2.0))]
    pub air_density: f64,
    /// AC → DC conversion losses towards storage
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub conversion_efficiency: f64,
}

impl Default for WindTurbineParams {
    /// Two 1 kW vertical-axis turbines
    fn default() -> Self {
        Self {
            rated_power_kw: 1.0,
            cut_in_speed_ms: 1.5,
            swept_area_m2: 3.14,
            rotor_efficiency: 0.35,
            turbine_count: 2,
            air_density: 1.225,
            conversion_efficiency: 0.7,
        }
    }
}

/// Small wind turbine model.
///
/// ```text
/// P_turbine = min(½·ρ·A·v³·η, rated)     v ≥ cut-in, else 0
/// P         = count · P_turbine · η_conv
/// ```
pub struct WindTurbinePowerModel {
    params: WindTurbineParams,
}

impl WindTurbinePowerModel {
    const REQUIRED: [ForecastVariable; 1] = [ForecastVariable::WindSpeed];

    pub fn new(params: WindTurbineParams) -> Self {
        Self { params }
    }

    /// Largest output the installation can deliver (kW)
    pub fn installed_kw(&self) -> f64 {
        let p = &self.params;
        p.rated_power_kw * p.turbine_count as f64 * p.conversion_efficiency
    }
}

impl PowerModel for WindTurbinePowerModel {
    fn name(&self) -> &str {
        "wind_turbine_v1"
    }

    fn required_variables(&self) -> &[ForecastVariable] {
        &Self::REQUIRED
    }

    fn compute(&self, inputs: &ModelInputs) -> f64 {
        let p = &self.params;
        let Some(speed) = inputs.get(ForecastVariable::WindSpeed) else {
            return 0.0;
        };
        if speed < p.cut_in_speed_ms {
            return 0.0;
        }

        let kinetic_kw =
            0.5 * p.air_density * p.swept_area_m2 * speed.powi(3) * p.rotor_efficiency / 1000.0;
        kinetic_kw.min(p.rated_power_kw) * p.turbine_count as f64 * p.conversion_efficiency
    }
}

/// Applies a [`PowerModel`] row by row with input and output clamping
#[derive(Clone)]
pub struct PowerEstimator {
    model: Arc<dyn PowerModel>,
    capacity_kw: f64,
}

impl PowerEstimator {
    pub fn new(model: Arc<dyn PowerModel>, capacity_kw: f64) -> Self {
        Self {
            model,
            capacity_kw: capacity_kw.max(0.0),
        }
    }

    pub fn model(&self) -> &dyn PowerModel {
        self.model.as_ref()
    }

    pub fn capacity_kw(&self) -> f64 {
        self.capacity_kw
    }

    /// Fail when the series lacks a variable the model requires
    pub fn check_inputs(&self, series: &NormalizedSeries) -> ForecastResult<()> {
        match self
            .model
            .required_variables()
            .iter()
            .find(|v| !series.contains(**v))
        {
            Some(variable) => Err(ForecastError::InsufficientData {
                variable: *variable,
                samples: 0,
            }),
            None => Ok(()),
        }
    }

    /// Estimate one instant.
    ///
    /// `interpolated` says whether any of `values` was gap-filled.
    pub fn estimate_point(
        &self,
        timestamp: DateTime<Utc>,
        values: &BTreeMap<ForecastVariable, f64>,
        solar_elevation_deg: f64,
        interpolated: bool,
    ) -> PowerEstimate {
        let mut input_clamped = false;
        let clamped: BTreeMap<_, _> = values
            .iter()
            .map(|(variable, value)| {
                let (v, changed) = variable.clamp(*value);
                input_clamped |= changed;
                (*variable, v)
            })
            .collect();

        let raw = self
            .model
            .compute(&ModelInputs::new(clamped, solar_elevation_deg));
        let (power_kw, output_clamped) = if raw.is_finite() {
            let bounded = raw.clamp(0.0, self.capacity_kw);
            (bounded, bounded != raw)
        } else {
            (0.0, true)
        };

        PowerEstimate {
            timestamp,
            power_kw,
            quality: if interpolated {
                Quality::Interpolated
            } else {
                Quality::Observed
            },
            input_clamped,
            output_clamped,
        }
    }

    /// Estimate every row of a resampled series.
    ///
    /// `solar_elevation` supplies the sun position for each grid timestamp.
    pub fn estimate_series<F>(
        &self,
        series: &NormalizedSeries,
        solar_elevation: F,
    ) -> ForecastResult<Vec<PowerEstimate>>
    where
        F: Fn(DateTime<Utc>) -> f64,
    {
        self.check_inputs(series)?;

        Ok(series
            .timestamps()
            .iter()
            .enumerate()
            .map(|(idx, ts)| {
                self.estimate_point(
                    *ts,
                    &series.row(idx),
                    solar_elevation(*ts),
                    series.row_interpolated(idx),
                )
            })
            .collect())
    }
}
