//! HTTP client for the forecast archive. Resolves the documented path
//! convention `products/{product}/{cycle_date}/{cycle_hour}/{artifact_name}`
//! and fetches the raw binary artifact bytes.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

use crate::products::Product;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("archive reports artifact not yet published")]
    NotYetPublished,
    #[error("archive returned status {0}")]
    UnexpectedStatus(u16),
}

#[derive(Clone)]
pub struct ArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArchiveClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build archive HTTP client");
        ArchiveClient { client, base_url: base_url.into() }
    }

    pub fn artifact_url(&self, product: Product, cycle_time: DateTime<Utc>, artifact_name: &str) -> String {
        let cycle_date = format!("{:04}{:02}{:02}", cycle_time.year(), cycle_time.month(), cycle_time.day());
        let cycle_hour = format!("{:02}", cycle_time.format("%H"));
        format!(
            "{}/products/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            product.as_str(),
            cycle_date,
            cycle_hour,
            artifact_name
        )
    }

    /// Fetch one artifact. A 404 is translated to `NotYetPublished` so the
    /// caller can skip gracefully rather than treating it as a hard failure.
    pub async fn fetch_artifact(
        &self,
        product: Product,
        cycle_time: DateTime<Utc>,
        artifact_name: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.artifact_url(product, cycle_time, artifact_name);
        let response = self.client.get(&url).send().await?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(response.bytes().await?.to_vec()),
            reqwest::StatusCode::NOT_FOUND => Err(FetchError::NotYetPublished),
            status => Err(FetchError::UnexpectedStatus(status.as_u16())),
        }
    }
}

/// Capped exponential backoff: attempt 0 waits `base`, attempt 1 waits `2*base`, etc.,
/// never exceeding `cap`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let scaled = base.checked_mul(multiplier as u32).unwrap_or(cap);
    scaled.min(cap)
}

/// Retry `fetch_artifact` up to `max_retries` times on `NotYetPublished` or
/// network error, sleeping with capped exponential backoff between attempts.
/// Returns `Ok(None)` (graceful skip) if the artifact is still absent after
/// exhausting retries; the parent job must not fail on that outcome.
pub async fn fetch_with_retry(
    client: &ArchiveClient,
    product: Product,
    cycle_time: DateTime<Utc>,
    artifact_name: &str,
    max_retries: u32,
    base_delay: Duration,
    cap_delay: Duration,
) -> Result<Option<Vec<u8>>, FetchError> {
    let mut attempt = 0;
    loop {
        match client.fetch_artifact(product, cycle_time, artifact_name).await {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(FetchError::NotYetPublished) if attempt < max_retries => {
                tracing::info!(
                    product = product.as_str(),
                    %cycle_time,
                    attempt,
                    "artifact not yet published, retrying"
                );
                tokio::time::sleep(backoff_delay(attempt, base_delay, cap_delay)).await;
                attempt += 1;
            }
            Err(FetchError::NotYetPublished) => {
                tracing::warn!(
                    product = product.as_str(),
                    %cycle_time,
                    "artifact still not published after {attempt} retries, skipping gracefully"
                );
                return Ok(None);
            }
            Err(FetchError::Network(e)) if attempt < max_retries => {
                tracing::warn!(product = product.as_str(), %cycle_time, attempt, error = %e, "transient fetch error, retrying");
                tokio::time::sleep(backoff_delay(attempt, base_delay, cap_delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn artifact_url_follows_documented_path_convention() {
        let client = ArchiveClient::new("https://archive.example.org", "hydro-core/0.1");
        let cycle = Utc.with_ymd_and_hms(2026, 3, 4, 6, 0, 0).unwrap();
        let url = client.artifact_url(Product::Analysis, cycle, "channel_rt.nc");
        assert_eq!(url, "https://archive.example.org/products/analysis/20260304/06/channel_rt.nc");
    }

    #[test]
    fn backoff_delay_doubles_until_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, base, cap), cap);
    }
}
