//! Weather forecast integration (KMA - Korea Meteorological Administration)
//!
//! Fetches the short-range "village forecast" (`getVilageFcst`) for one grid
//! cell and issuance cycle and hands it to the pipeline as raw samples.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::domain::{ForecastSample, ForecastVariable, GridCell, IssuanceCycle, RawUnit};

/// Upper bound on result pages followed for one cycle
const MAX_PAGES: u32 = 10;

/// Provider of raw forecast samples for a grid cell and issuance cycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, cell: GridCell, cycle: IssuanceCycle) -> Result<Vec<ForecastSample>>;
}

/// KMA open API client for the village forecast
pub struct KmaClient {
    client: Client,
    base_url: String,
    service_key: String,
    num_of_rows: u32,
}

impl KmaClient {
    pub fn new(cfg: &SourceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("weather-power-forecast/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to build KMA HTTP client")?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            service_key: cfg.service_key.clone(),
            num_of_rows: cfg.num_of_rows,
        })
    }

    async fn fetch_page(
        &self,
        cell: GridCell,
        base_date: &str,
        base_time: &str,
        page: u32,
    ) -> Result<KmaBody> {
        // Portal keys are often handed out already percent-encoded; pass those through untouched
        let (url, key_param) = if self.service_key.contains('%') {
            (
                format!("{}/getVilageFcst?serviceKey={}", self.base_url, self.service_key),
                None,
            )
        } else {
            (
                format!("{}/getVilageFcst", self.base_url),
                Some(self.service_key.as_str()),
            )
        };

        let mut request = self.client.get(&url);
        if let Some(key) = key_param {
            request = request.query(&[("serviceKey", key)]);
        }
        let response = request
            .query(&[
                ("numOfRows", self.num_of_rows.to_string()),
                ("pageNo", page.to_string()),
                ("dataType", "JSON".to_string()),
                ("base_date", base_date.to_string()),
                ("base_time", base_time.to_string()),
                ("nx", cell.nx.to_string()),
                ("ny", cell.ny.to_string()),
            ])
            .send()
            .await
            .context("Failed to send request to KMA API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("KMA API error: HTTP {status}");
        }

        let parsed: KmaResponse = response
            .json()
            .await
            .context("Failed to parse KMA response")?;
        let header = parsed.response.header;
        if header.result_code != "00" {
            anyhow::bail!(
                "KMA API returned result code {}: {}",
                header.result_code,
                header.result_msg
            );
        }

        parsed
            .response
            .body
            .context("KMA response has no body")
    }
}

#[async_trait]
impl WeatherSource for KmaClient {
    async fn fetch(&self, cell: GridCell, cycle: IssuanceCycle) -> Result<Vec<ForecastSample>> {
        let local = cycle.start().with_timezone(&chrono_tz::Asia::Seoul);
        let base_date = local.format("%Y%m%d").to_string();
        let base_time = local.format("%H%M").to_string();

        debug!(%cell, %base_date, %base_time, "fetching KMA village forecast");

        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let body = self.fetch_page(cell, &base_date, &base_time, page).await?;
            let total = body.total_count;
            items.extend(body.items.item);
            if items.len() as u64 >= total || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        let samples = parse_items(&items);
        info!(
            %cell,
            %cycle,
            items = items.len(),
            samples = samples.len(),
            "fetched KMA village forecast"
        );
        Ok(samples)
    }
}

/// Convert KMA items into raw samples, skipping categories the pipeline does
/// not use and the provider's missing-value sentinels.
pub fn parse_items(items: &[KmaItem]) -> Vec<ForecastSample> {
    let mut samples = Vec::with_capacity(items.len());
    let mut skipped = 0usize;

    for item in items {
        let Some((variable, unit)) = category_variable(&item.category) else {
            continue;
        };
        let Some(valid_time) = item.valid_time() else {
            warn!(
                date = %item.fcst_date,
                time = %item.fcst_time,
                "unparseable KMA forecast time"
            );
            skipped += 1;
            continue;
        };

        let raw = item.fcst_value.trim();
        let sample = if variable.is_categorical() {
            ForecastSample::code(valid_time, variable, raw)
        } else {
            match raw.parse::<f64>() {
                // KMA marks missing values with -999 / +900 and above
                Ok(v) if v <= -900.0 || v >= 900.0 => {
                    skipped += 1;
                    continue;
                }
                Ok(v) => ForecastSample::number(valid_time, variable, v, unit),
                Err(_) => ForecastSample::code(valid_time, variable, raw),
            }
        };
        samples.push(sample);
    }

    if skipped > 0 {
        debug!(skipped, "skipped KMA items with missing values or times");
    }
    samples
}

fn category_variable(category: &str) -> Option<(ForecastVariable, RawUnit)> {
    match category {
        "TMP" => Some((ForecastVariable::Temperature, RawUnit::Celsius)),
        "SKY" => Some((ForecastVariable::SkyCondition, RawUnit::Code)),
        "POP" => Some((ForecastVariable::PrecipitationProbability, RawUnit::Percent)),
        "PTY" => Some((ForecastVariable::PrecipitationType, RawUnit::Code)),
        "REH" => Some((ForecastVariable::Humidity, RawUnit::Percent)),
        "WSD" => Some((ForecastVariable::WindSpeed, RawUnit::MetersPerSecond)),
        _ => None,
    }
}

// KMA API response structures
#[derive(Debug, Deserialize)]
struct KmaResponse {
    response: KmaEnvelope,
}

#[derive(Debug, Deserialize)]
struct KmaEnvelope {
    header: KmaHeader,
    body: Option<KmaBody>,
}

#[derive(Debug, Deserialize)]
struct KmaHeader {
    #[serde(rename = "resultCode")]
    result_code: String,
    #[serde(rename = "resultMsg")]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct KmaBody {
    items: KmaItems,
    #[serde(rename = "totalCount", default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct KmaItems {
    #[serde(default)]
    item: Vec<KmaItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KmaItem {
    pub category: String,
    #[serde(rename = "fcstDate")]
    pub fcst_date: String,
    #[serde(rename = "fcstTime")]
    pub fcst_time: String,
    #[serde(rename = "fcstValue")]
    pub fcst_value: String,
}

impl KmaItem {
    /// Forecast valid time; KMA dates and times are KST
    fn valid_time(&self) -> Option<chrono::DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(&self.fcst_date, "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(&self.fcst_time, "%H%M").ok()?;
        chrono_tz::Asia::Seoul
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawValue;

    fn item(category: &str, date: &str, time: &str, value: &str) -> KmaItem {
        KmaItem {
            category: category.to_string(),
            fcst_date: date.to_string(),
            fcst_time: time.to_string(),
            fcst_value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_items_maps_categories_and_kst() {
        let samples = parse_items(&[
            item("TMP", "20250601", "0600", "18"),
            item("SKY", "20250601", "0600", "3"),
            item("PCP", "20250601", "0600", "강수없음"),
            item("WSD", "20250601", "0600", "2.4"),
        ]);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].variable, ForecastVariable::Temperature);
        assert_eq!(samples[0].value, RawValue::Number(18.0));
        assert_eq!(
            samples[0].valid_time,
            Utc.with_ymd_and_hms(2025, 5, 31, 21, 0, 0).unwrap()
        );
        assert_eq!(samples[1].value, RawValue::Code("3".to_string()));
        assert_eq!(samples[1].unit, RawUnit::Code);
    }

    #[test]
    fn test_parse_items_skips_missing_sentinels_and_bad_times() {
        let samples = parse_items(&[
            item("REH", "20250601", "0600", "-999"),
            item("REH", "20250601", "0700", "900"),
            item("REH", "2025-06-01", "0800", "60"),
            item("REH", "20250601", "0900", "65"),
        ]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, RawValue::Number(65.0));
    }

    #[test]
    fn test_unparseable_numeric_kept_as_code() {
        let samples = parse_items(&[item("TMP", "20250601", "0600", "N/A")]);
        assert_eq!(samples[0].value, RawValue::Code("N/A".to_string()));
    }

    #[test]
    fn test_response_without_body_deserializes() {
        let json = r#"{"response":{"header":{"resultCode":"03","resultMsg":"NO_DATA"}}}"#;
        let parsed: KmaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response.header.result_code, "03");
        assert!(parsed.response.body.is_none());
    }
}
