#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use figment::{providers::{Format, Toml}, Figment};
use std::sync::atomic::{AtomicUsize, Ordering};

use weather_power_forecast::config::Config;
use weather_power_forecast::domain::{ForecastSample, ForecastVariable, GridCell, IssuanceCycle, RawUnit};
use weather_power_forecast::forecast::{Clock, WeatherSource};

pub const CONFIG: &str = r#"
    [server]
    host = "127.0.0.1"
    port = 0
    request_timeout_secs = 10

    [source]
    base_url = "http://127.0.0.1:9"
    service_key = "test-key"
    num_of_rows = 1000
    timeout_seconds = 2

    [site]
    nx = 54
    ny = 124
    latitude = 37.45
    longitude = 126.65
    capacity_kw = 3.0

    [issuance]
    timezone = "Asia/Seoul"
    hours = [2, 5, 8, 11, 14, 17, 20, 23]
    availability_delay_minutes = 10

    [pipeline]
    step_minutes = 60

    [load]
    power_kw = 1.5
    hours_per_day = 12.0
"#;

pub fn test_config() -> Config {
    Figment::new()
        .merge(Toml::string(CONFIG))
        .extract()
        .expect("test config parses")
}

pub fn kst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Seoul
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One day of hourly samples shaped like a KMA village forecast
pub fn village_forecast(cycle: IssuanceCycle) -> Vec<ForecastSample> {
    let sky = ["1", "1", "3", "3", "4", "1"];
    let mut out = Vec::new();

    for h in 1..=24i64 {
        let ts = cycle.start() + Duration::hours(h);
        let temp = 18.0 + 6.0 * ((h as f64 - 6.0) / 24.0 * std::f64::consts::TAU).sin();
        out.push(ForecastSample::number(ts, ForecastVariable::Temperature, temp, RawUnit::Celsius));
        out.push(ForecastSample::code(ts, ForecastVariable::SkyCondition, sky[(h / 4) as usize % sky.len()]));
        out.push(ForecastSample::number(ts, ForecastVariable::PrecipitationProbability, 20.0, RawUnit::Percent));
        out.push(ForecastSample::code(ts, ForecastVariable::PrecipitationType, "0"));
        out.push(ForecastSample::number(ts, ForecastVariable::Humidity, 60.0, RawUnit::Percent));
        out.push(ForecastSample::number(ts, ForecastVariable::WindSpeed, 2.5, RawUnit::MetersPerSecond));
    }
    out
}

/// Source returning [`village_forecast`] after an optional delay, or failing
pub struct CannedSource {
    pub calls: AtomicUsize,
    pub delay: std::time::Duration,
    pub fail: bool,
}

impl CannedSource {
    pub fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: std::time::Duration::ZERO,
            fail: false,
        }
    }

    pub fn slow(delay: std::time::Duration) -> Self {
        Self { delay, ..Self::ok() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::ok() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for CannedSource {
    async fn fetch(&self, _cell: GridCell, cycle: IssuanceCycle) -> Result<Vec<ForecastSample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("KMA API error: HTTP 500 Internal Server Error");
        }
        Ok(village_forecast(cycle))
    }
}
