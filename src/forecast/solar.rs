//! Solar geometry and clear-sky irradiance
//!
//! Solar position follows the usual declination / hour-angle formulation with
//! a Spencer equation-of-time correction; irradiance uses a simple air-mass
//! attenuation model. Accurate to within a degree or so, which is well below
//! the uncertainty of a 5 km weather forecast.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::PI;

/// Solar constant at top of atmosphere (W/m²)
pub const SOLAR_CONSTANT: f64 = 1367.0;

/// Sun position calculator for a fixed site
#[derive(Debug, Clone, Copy)]
pub struct SolarPosition {
    latitude_deg: f64,
    longitude_deg: f64,
}

impl SolarPosition {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
        }
    }

    /// Solar elevation above the horizon in degrees (negative at night)
    pub fn elevation_deg(&self, time: DateTime<Utc>) -> f64 {
        let day_of_year = time.ordinal() as f64;
        let utc_hour =
            time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0;

        // Varies from -23.45° (winter solstice) to +23.45° (summer solstice)
        let declination_rad =
            (23.45 * (360.0 / 365.0 * (day_of_year + 284.0) * PI / 180.0).sin()).to_radians();
        let latitude_rad = self.latitude_deg.to_radians();

        // Equation of time in minutes (Spencer 1971)
        let b = 2.0 * PI * (day_of_year - 1.0) / 365.0;
        let eot_min = 229.18
            * (0.000075 + 0.001868 * b.cos()
                - 0.032077 * b.sin()
                - 0.014615 * (2.0 * b).cos()
                - 0.04089 * (2.0 * b).sin());

        let solar_time = utc_hour + self.longitude_deg / 15.0 + eot_min / 60.0;
        let hour_angle_rad = (15.0 * (solar_time - 12.0)).to_radians();

        let elevation_sin = latitude_rad.sin() * declination_rad.sin()
            + latitude_rad.cos() * declination_rad.cos() * hour_angle_rad.cos();
        elevation_sin.clamp(-1.0, 1.0).asin().to_degrees()
    }
}

/// Clear-sky global horizontal irradiance (W/m²) for a solar elevation.
///
/// `transmittance` is the zenith clear-sky transmittance, typically 0.7.
pub fn clear_sky_irradiance(elevation_deg: f64, transmittance: f64) -> f64 {
    if elevation_deg <= 0.0 {
        return 0.0;
    }

    let elevation_rad = elevation_deg.to_radians();

    // AM ≈ 1/sin(elevation); linear approximation near the horizon avoids the singularity
    let air_mass = if elevation_deg > 5.0 {
        1.0 / elevation_rad.sin()
    } else {
        12.0 - elevation_deg / 5.0
    };

    SOLAR_CONSTANT * transmittance.powf(air_mass.powf(0.678)) * elevation_rad.sin()
}
