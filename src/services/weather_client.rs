//! HTTP client for the weather service collaborator: given `(lat, lon,
//! horizon_days)`, returns hourly air temperature, apparent temperature,
//! precipitation and cloud cover. Mirrors this house's established pattern for
//! a small typed JSON client with a descriptive `User-Agent` and fixed timeout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherFetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("weather service returned status {0}")]
    UnexpectedStatus(u16),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyWeatherPoint {
    pub valid_time: DateTime<Utc>,
    pub air_temp_c: Option<f64>,
    pub apparent_temp_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    hourly: Vec<HourlyWeatherPoint>,
}

#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build weather HTTP client");
        WeatherClient { client, base_url: base_url.into() }
    }

    pub async fn fetch_hourly(
        &self,
        lat: f64,
        lon: f64,
        horizon_days: u32,
    ) -> Result<Vec<HourlyWeatherPoint>, WeatherFetchError> {
        let url = format!(
            "{}/hourly?lat={:.4}&lon={:.4}&horizon_days={}",
            self.base_url.trim_end_matches('/'),
            lat,
            lon,
            horizon_days
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherFetchError::UnexpectedStatus(response.status().as_u16()));
        }
        let parsed: WeatherResponse = response.json().await?;
        Ok(parsed.hourly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_does_not_panic() {
        let _ = WeatherClient::new("https://weather.example.org", "hydro-core/0.1");
    }
}
