//! Weather ingestion worker: one long-running task that refreshes hourly air
//! temperature observations for every reach centroid, mirroring the per-product
//! hydrology worker's loop shape but driven by the reference cache rather than
//! a fetched artifact.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::db::queries;
use crate::domain::{ReachCentroid, Source, TemperatureRecord};
use crate::services::weather_client::WeatherClient;

/// How many days ahead to request on each refresh; the weather service's own
/// `hourly` response is the unit of work, not something this worker paginates.
const WEATHER_HORIZON_DAYS: u32 = 2;

/// Runs forever, refreshing every known reach centroid's hourly observations
/// on `poll_interval`. A single centroid's fetch failure is logged and skipped;
/// it never blocks the rest of the sweep.
pub async fn run_weather_worker(
    pool: PgPool,
    client: WeatherClient,
    centroids: Arc<HashMap<i64, ReachCentroid>>,
    poll_interval: Duration,
) {
    loop {
        for centroid in centroids.values() {
            match client.fetch_hourly(centroid.latitude, centroid.longitude, WEATHER_HORIZON_DAYS).await {
                Ok(points) => {
                    let records: Vec<TemperatureRecord> = points
                        .into_iter()
                        .map(|p| TemperatureRecord {
                            feature_id: centroid.feature_id,
                            valid_time: p.valid_time,
                            air_temp_c: p.air_temp_c,
                            apparent_temp_c: p.apparent_temp_c,
                            precipitation_mm: p.precipitation_mm,
                            cloud_cover_pct: p.cloud_cover_pct,
                            source: Source::ShortForecast,
                            forecast_hour: None,
                        })
                        .collect();
                    if let Err(e) = queries::upsert_temperature_records(&pool, &records).await {
                        tracing::error!(
                            feature_id = centroid.feature_id,
                            error = %e,
                            "failed to store weather observations"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(feature_id = centroid.feature_id, error = %e, "weather fetch failed, skipping reach this cycle");
                }
            }
        }
        tracing::debug!(reaches = centroids.len(), at = %Utc::now(), "weather sweep complete");
        tokio::time::sleep(poll_interval).await;
    }
}
