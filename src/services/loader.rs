//! Loader: idempotent bulk insert into the time-series store, one transaction
//! per (product, cycle_time) job. On any mid-job error the transaction rolls
//! back and the job's `IngestionLog` row is marked `failed`.

use chrono::Utc;
use sqlx::PgPool;

use crate::db::queries::{self, LOAD_BATCH_SIZE};
use crate::domain::{HydroRecord, JobStatus};
use crate::products::Product;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub struct LoadOutcome {
    pub records_ingested: i64,
}

/// Loads `records` for one (product, cycle_time) job inside a single
/// transaction, chunked at `LOAD_BATCH_SIZE`. Re-running the identical job is
/// safe: the primary-key overwrite makes every chunk idempotent.
pub async fn load_job(
    pool: &PgPool,
    product: Product,
    cycle_time: chrono::DateTime<Utc>,
    domain: &str,
    records: Vec<HydroRecord>,
) -> Result<LoadOutcome, LoadError> {
    let job_id = uuid::Uuid::new_v4();
    let started_at = Utc::now();
    queries::insert_ingestion_log_started(pool, job_id, product.as_str(), cycle_time, domain, started_at)
        .await?;

    let result = load_records_in_transaction(pool, &records).await;

    let completed_at = Utc::now();
    let duration_ms = (completed_at - started_at).num_milliseconds();
    match &result {
        Ok(count) => {
            queries::complete_ingestion_log(
                pool,
                job_id,
                status_str(JobStatus::Success),
                *count as i64,
                None,
                completed_at,
                duration_ms,
            )
            .await?;
            tracing::info!(product = product.as_str(), %cycle_time, records = count, "ingestion job succeeded");
        }
        Err(e) => {
            queries::complete_ingestion_log(
                pool,
                job_id,
                status_str(JobStatus::Failed),
                0,
                Some(&e.to_string()),
                completed_at,
                duration_ms,
            )
            .await?;
            tracing::error!(product = product.as_str(), %cycle_time, error = %e, "ingestion job failed, rolled back");
        }
    }

    result.map(|count| LoadOutcome { records_ingested: count as i64 })
}

async fn load_records_in_transaction(pool: &PgPool, records: &[HydroRecord]) -> Result<usize, LoadError> {
    let mut tx = pool.begin().await?;
    let mut total = 0usize;
    for chunk in records.chunks(LOAD_BATCH_SIZE) {
        // upsert_hydro_records takes a &PgPool; route chunk inserts through the
        // same connection by committing per-chunk against the pool directly is
        // not transactionally correct here, so we issue the statement against
        // the transaction's executor instead.
        let affected = upsert_chunk(&mut tx, chunk).await?;
        total += affected as usize;
    }
    tx.commit().await?;
    Ok(total)
}

async fn upsert_chunk(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    records: &[HydroRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }
    let feature_ids: Vec<i64> = records.iter().map(|r| r.feature_id).collect();
    let valid_times: Vec<chrono::DateTime<Utc>> = records.iter().map(|r| r.valid_time).collect();
    let variables: Vec<String> = records.iter().map(|r| r.variable.as_str().to_string()).collect();
    let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();
    let sources: Vec<String> = records.iter().map(|r| r.source.as_str().to_string()).collect();
    let forecast_hours: Vec<Option<i32>> = records.iter().map(|r| r.forecast_hour).collect();
    let ingested_at: Vec<chrono::DateTime<Utc>> = records.iter().map(|r| r.ingested_at).collect();

    let sql = "INSERT INTO nwm.hydro_record \
               (feature_id, valid_time, variable, value, source, forecast_hour, ingested_at) \
               SELECT * FROM UNNEST($1::bigint[], $2::timestamptz[], $3::text[], $4::double precision[], \
                                     $5::text[], $6::integer[], $7::timestamptz[]) \
               ON CONFLICT (feature_id, valid_time, variable, source) \
               DO UPDATE SET value = EXCLUDED.value, forecast_hour = EXCLUDED.forecast_hour, \
                             ingested_at = EXCLUDED.ingested_at";

    let result = sqlx::query(sql)
        .bind(feature_ids)
        .bind(valid_times)
        .bind(variables)
        .bind(values)
        .bind(sources)
        .bind(forecast_hours)
        .bind(ingested_at)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Started => "started",
        JobStatus::Success => "success",
        JobStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_str_matches_log_taxonomy() {
        assert_eq!(status_str(JobStatus::Started), "started");
        assert_eq!(status_str(JobStatus::Success), "success");
        assert_eq!(status_str(JobStatus::Failed), "failed");
    }
}
