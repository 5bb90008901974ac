use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use validator::Validate;

use crate::domain::GridCell;
use crate::forecast::{AnalyzerConfig, IssuanceSchedule, ModelConfig, NormalizerConfig};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub source: SourceConfig,
    #[validate(nested)]
    pub site: SiteConfig,
    #[validate(nested)]
    pub issuance: IssuanceConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    #[validate(nested)]
    pub model: ModelConfig,
    #[serde(default)]
    #[validate(nested)]
    pub load: LoadConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub enable_cors: bool,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// KMA village forecast endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SourceConfig {
    #[validate(url)]
    pub base_url: String,
    /// Supplied through `PVF__SOURCE__SERVICE_KEY`, never committed
    #[serde(default)]
    pub service_key: String,
    #[validate(range(min = 1, max = 10000))]
    pub num_of_rows: u32,
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SiteConfig {
    pub nx: u16,
    pub ny: u16,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Installed PV peak power
    #[validate(range(min = 0.0))]
    pub capacity_kw: f64,
}

impl SiteConfig {
    pub fn grid_cell(&self) -> GridCell {
        GridCell::new(self.nx, self.ny)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IssuanceConfig {
    pub timezone: String,
    #[validate(length(min = 1, max = 24))]
    pub hours: Vec<u32>,
    #[validate(range(min = 0, max = 180))]
    pub availability_delay_minutes: i64,
}

impl IssuanceConfig {
    pub fn schedule(&self) -> Result<IssuanceSchedule> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid issuance timezone '{}': {e}", self.timezone))?;
        IssuanceSchedule::new(
            tz,
            self.hours.clone(),
            chrono::Duration::minutes(self.availability_delay_minutes),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Resampling grid step
    #[validate(range(min = 1, max = 360))]
    pub step_minutes: i64,
    #[serde(default)]
    #[validate(nested)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub analyzer: AnalyzerConfig,
}

/// Constant consumer the daily summary balances production against
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoadConfig {
    #[validate(range(min = 0.0))]
    pub power_kw: f64,
    #[validate(range(min = 0.0, max = 24.0))]
    pub hours_per_day: f64,
}

impl LoadConfig {
    pub fn daily_kwh(&self) -> f64 {
        self.power_kw * self.hours_per_day
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrefetchConfig {
    pub enabled: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("PVF__").split("__"));
        let cfg: Self = figment.extract().context("Failed to load configuration")?;
        cfg.validate().context("Invalid configuration")?;
        cfg.issuance.schedule()?;
        Ok(cfg)
    }
}
