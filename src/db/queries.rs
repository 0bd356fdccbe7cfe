//! Raw SQL against the time-series store and reference tables. Uses
//! `sqlx::query_as::<_, T>` with hand-written SQL rather than the
//! compile-time-checked `query!` macro family, since no live database is
//! available to check against at build time in this environment.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{
    FlowlineRow, HydroRecordRow, IngestionLogRow, MonthlyFlowStatisticsRow, ReachCentroidRow,
    TemperatureRecordRow,
};
use crate::domain::HydroRecord;

/// `HydroRecord` column list, kept in sync with `HydroRecordRow` by hand.
const HYDRO_COLS: &str = "feature_id, valid_time, variable, value, source, forecast_hour, ingested_at";

/// Default chunk size for the batched upsert, bounding statement size while
/// keeping typical per-cycle jobs at a handful of round trips.
pub const LOAD_BATCH_SIZE: usize = 5_000;

/// Bulk upsert one chunk of `HydroRecord`s via `UNNEST`, matching the
/// archive's own batch point-lookup idiom. On `(feature_id, valid_time,
/// variable, source)` collision the new value overwrites the old one — late
/// corrections are expected and safe.
pub async fn upsert_hydro_records(
    pool: &PgPool,
    records: &[HydroRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let feature_ids: Vec<i64> = records.iter().map(|r| r.feature_id).collect();
    let valid_times: Vec<DateTime<Utc>> = records.iter().map(|r| r.valid_time).collect();
    let variables: Vec<String> = records.iter().map(|r| r.variable.as_str().to_string()).collect();
    let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();
    let sources: Vec<String> = records.iter().map(|r| r.source.as_str().to_string()).collect();
    let forecast_hours: Vec<Option<i32>> = records.iter().map(|r| r.forecast_hour).collect();
    let ingested_at: Vec<DateTime<Utc>> = records.iter().map(|r| r.ingested_at).collect();

    let sql = format!(
        "INSERT INTO nwm.hydro_record ({HYDRO_COLS}) \
         SELECT * FROM UNNEST($1::bigint[], $2::timestamptz[], $3::text[], $4::double precision[], \
                               $5::text[], $6::integer[], $7::timestamptz[]) \
         ON CONFLICT (feature_id, valid_time, variable, source) \
         DO UPDATE SET value = EXCLUDED.value, forecast_hour = EXCLUDED.forecast_hour, \
                       ingested_at = EXCLUDED.ingested_at"
    );

    let result = sqlx::query(&sql)
        .bind(feature_ids)
        .bind(valid_times)
        .bind(variables)
        .bind(values)
        .bind(sources)
        .bind(forecast_hours)
        .bind(ingested_at)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn get_hydro_series(
    pool: &PgPool,
    feature_id: i64,
    variable: &str,
    source: Option<&str>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<HydroRecordRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {HYDRO_COLS} FROM nwm.hydro_record \
         WHERE feature_id = $1 AND variable = $2 AND valid_time BETWEEN $3 AND $4 \
           AND ($5::text IS NULL OR source = $5) \
         ORDER BY valid_time ASC"
    );
    sqlx::query_as::<_, HydroRecordRow>(&sql)
        .bind(feature_id)
        .bind(variable)
        .bind(from)
        .bind(to)
        .bind(source)
        .fetch_all(pool)
        .await
}

pub async fn get_latest_hydro_record(
    pool: &PgPool,
    feature_id: i64,
    variable: &str,
    source: &str,
    not_after: DateTime<Utc>,
) -> Result<Option<HydroRecordRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {HYDRO_COLS} FROM nwm.hydro_record \
         WHERE feature_id = $1 AND variable = $2 AND source = $3 AND valid_time <= $4 \
         ORDER BY valid_time DESC LIMIT 1"
    );
    sqlx::query_as::<_, HydroRecordRow>(&sql)
        .bind(feature_id)
        .bind(variable)
        .bind(source)
        .bind(not_after)
        .fetch_optional(pool)
        .await
}

/// Nearest upcoming forecast value: smallest `valid_time >= not_before` for a
/// forward-looking source (short_forecast/medium_forecast_blend), where
/// `forecast_hour >= 1` means every row is ahead of the cycle it came from.
pub async fn get_nearest_upcoming_hydro_record(
    pool: &PgPool,
    feature_id: i64,
    variable: &str,
    source: &str,
    not_before: DateTime<Utc>,
) -> Result<Option<HydroRecordRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {HYDRO_COLS} FROM nwm.hydro_record \
         WHERE feature_id = $1 AND variable = $2 AND source = $3 AND valid_time >= $4 \
         ORDER BY valid_time ASC LIMIT 1"
    );
    sqlx::query_as::<_, HydroRecordRow>(&sql)
        .bind(feature_id)
        .bind(variable)
        .bind(source)
        .bind(not_before)
        .fetch_optional(pool)
        .await
}

pub async fn insert_ingestion_log_started(
    pool: &PgPool,
    id: uuid::Uuid,
    product: &str,
    cycle_time: DateTime<Utc>,
    domain: &str,
    started_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO nwm.ingestion_log (id, product, cycle_time, domain, status, records_ingested, started_at) \
         VALUES ($1, $2, $3, $4, 'started', 0, $5)",
    )
    .bind(id)
    .bind(product)
    .bind(cycle_time)
    .bind(domain)
    .bind(started_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn complete_ingestion_log(
    pool: &PgPool,
    id: uuid::Uuid,
    status: &str,
    records_ingested: i64,
    error_message: Option<&str>,
    completed_at: DateTime<Utc>,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE nwm.ingestion_log \
         SET status = $2, records_ingested = $3, error_message = $4, completed_at = $5, duration_ms = $6 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(records_ingested)
    .bind(error_message)
    .bind(completed_at)
    .bind(duration_ms)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_last_successful_ingestion(
    pool: &PgPool,
    product: &str,
) -> Result<Option<IngestionLogRow>, sqlx::Error> {
    sqlx::query_as::<_, IngestionLogRow>(
        "SELECT id, product, cycle_time, domain, status, records_ingested, error_message, \
                started_at, completed_at, duration_ms \
         FROM nwm.ingestion_log \
         WHERE product = $1 AND status = 'success' \
         ORDER BY cycle_time DESC LIMIT 1",
    )
    .bind(product)
    .fetch_optional(pool)
    .await
}

pub async fn get_flowline(pool: &PgPool, feature_id: i64) -> Result<Option<FlowlineRow>, sqlx::Error> {
    sqlx::query_as::<_, FlowlineRow>(
        "SELECT feature_id, geometry_wkt, stream_name, drainage_area_km2, stream_order, \
                slope, min_elevation_m, max_elevation_m \
         FROM nhd.flowline WHERE feature_id = $1",
    )
    .bind(feature_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_monthly_flow_statistics(
    pool: &PgPool,
    feature_id: i64,
) -> Result<Vec<MonthlyFlowStatisticsRow>, sqlx::Error> {
    sqlx::query_as::<_, MonthlyFlowStatisticsRow>(
        "SELECT feature_id, month, mean_flow_m3s, mean_velocity_ms \
         FROM derived.monthly_flow_statistics WHERE feature_id = $1 ORDER BY month",
    )
    .bind(feature_id)
    .fetch_all(pool)
    .await
}

/// Loads every flowline in the store. Called once at startup to populate the
/// in-process reference cache; the table is small relative to the time series.
pub async fn get_all_flowlines(pool: &PgPool) -> Result<Vec<FlowlineRow>, sqlx::Error> {
    sqlx::query_as::<_, FlowlineRow>(
        "SELECT feature_id, geometry_wkt, stream_name, drainage_area_km2, stream_order, \
                slope, min_elevation_m, max_elevation_m \
         FROM nhd.flowline",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_all_monthly_flow_statistics(
    pool: &PgPool,
) -> Result<Vec<MonthlyFlowStatisticsRow>, sqlx::Error> {
    sqlx::query_as::<_, MonthlyFlowStatisticsRow>(
        "SELECT feature_id, month, mean_flow_m3s, mean_velocity_ms FROM derived.monthly_flow_statistics",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_all_reach_centroids(pool: &PgPool) -> Result<Vec<ReachCentroidRow>, sqlx::Error> {
    sqlx::query_as::<_, ReachCentroidRow>("SELECT feature_id, latitude, longitude FROM nhd.reach_centroid")
        .fetch_all(pool)
        .await
}

pub async fn get_reach_centroid(
    pool: &PgPool,
    feature_id: i64,
) -> Result<Option<ReachCentroidRow>, sqlx::Error> {
    sqlx::query_as::<_, ReachCentroidRow>(
        "SELECT feature_id, latitude, longitude FROM nhd.reach_centroid WHERE feature_id = $1",
    )
    .bind(feature_id)
    .fetch_optional(pool)
    .await
}

pub async fn upsert_temperature_records(
    pool: &PgPool,
    records: &[crate::domain::TemperatureRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }
    let feature_ids: Vec<i64> = records.iter().map(|r| r.feature_id).collect();
    let valid_times: Vec<DateTime<Utc>> = records.iter().map(|r| r.valid_time).collect();
    let air_temp: Vec<Option<f64>> = records.iter().map(|r| r.air_temp_c).collect();
    let apparent_temp: Vec<Option<f64>> = records.iter().map(|r| r.apparent_temp_c).collect();
    let precip: Vec<Option<f64>> = records.iter().map(|r| r.precipitation_mm).collect();
    let cloud: Vec<Option<f64>> = records.iter().map(|r| r.cloud_cover_pct).collect();
    let sources: Vec<String> = records.iter().map(|r| r.source.as_str().to_string()).collect();
    let forecast_hours: Vec<Option<i32>> = records.iter().map(|r| r.forecast_hour).collect();

    let sql = "INSERT INTO observations.temperature_record \
               (feature_id, valid_time, air_temp_c, apparent_temp_c, precipitation_mm, cloud_cover_pct, source, forecast_hour) \
               SELECT * FROM UNNEST($1::bigint[], $2::timestamptz[], $3::double precision[], $4::double precision[], \
                                     $5::double precision[], $6::double precision[], $7::text[], $8::integer[]) \
               ON CONFLICT (feature_id, valid_time, source, (COALESCE(forecast_hour, -1))) \
               DO UPDATE SET air_temp_c = EXCLUDED.air_temp_c, apparent_temp_c = EXCLUDED.apparent_temp_c, \
                             precipitation_mm = EXCLUDED.precipitation_mm, cloud_cover_pct = EXCLUDED.cloud_cover_pct";

    let result = sqlx::query(sql)
        .bind(feature_ids)
        .bind(valid_times)
        .bind(air_temp)
        .bind(apparent_temp)
        .bind(precip)
        .bind(cloud)
        .bind(sources)
        .bind(forecast_hours)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn get_latest_temperature_record(
    pool: &PgPool,
    feature_id: i64,
    not_after: DateTime<Utc>,
) -> Result<Option<TemperatureRecordRow>, sqlx::Error> {
    sqlx::query_as::<_, TemperatureRecordRow>(
        "SELECT feature_id, valid_time, air_temp_c, apparent_temp_c, precipitation_mm, cloud_cover_pct, source, forecast_hour \
         FROM observations.temperature_record \
         WHERE feature_id = $1 AND valid_time <= $2 \
         ORDER BY valid_time DESC LIMIT 1",
    )
    .bind(feature_id)
    .bind(not_after)
    .fetch_optional(pool)
    .await
}

/// Records one job's validation failures for operator visibility, alongside
/// the `IngestionLog` row it supplements. Never blocks the job outcome.
pub async fn insert_validation_failures(
    pool: &PgPool,
    ingestion_log_id: uuid::Uuid,
    product: &str,
    cycle_time: DateTime<Utc>,
    kinds: &[String],
    variables: &[Option<String>],
    counts: &[Option<i64>],
    messages: &[String],
) -> Result<(), sqlx::Error> {
    if kinds.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO validation.validation_failure \
         (ingestion_log_id, product, cycle_time, kind, variable, count, message) \
         SELECT $1, $2, $3, * FROM UNNEST($4::text[], $5::text[], $6::bigint[], $7::text[])",
    )
    .bind(ingestion_log_id)
    .bind(product)
    .bind(cycle_time)
    .bind(kinds)
    .bind(variables)
    .bind(counts)
    .bind(messages)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_batch_size_is_positive() {
        assert!(LOAD_BATCH_SIZE > 0);
    }
}
