//! Weather-to-power forecasting service.
//!
//! Short-range KMA village forecasts are normalized, resampled onto a fixed
//! grid, converted to PV output and post-processed; the result is cached per
//! grid cell and issuance cycle and served over HTTP.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod telemetry;
