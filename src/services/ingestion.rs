//! Per-product ingestion worker: fetch -> parse -> validate -> normalize ->
//! load, executed as a single logical task on the product's own cadence.
//! Mirrors this house's background-poller loop shape, one task per product
//! instead of one task for the whole fleet.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Timelike, Utc};
use sqlx::PgPool;

use crate::artifact::parse_artifact;
use crate::products::Product;
use crate::services::archive_client::{fetch_with_retry, ArchiveClient};
use crate::services::loader::load_job;
use crate::services::normalizer::normalize;
use crate::services::validator::{validate, ValidatorConfig};

pub struct IngestionConfig {
    pub domain: String,
    pub artifact_name: String,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub poll_interval: Duration,
    pub expected_record_count: usize,
    pub size_tolerance: f64,
}

/// Runs forever, polling on `config.poll_interval` and attempting one job per
/// retained forecast offset whenever `now`'s hour matches the product's
/// schedule. A non-matching hour is a silent no-op, never an error — this is
/// the Fetcher's core safety rule for mixing cadences at one dispatch point.
pub async fn run_ingestion_worker(
    pool: PgPool,
    archive: ArchiveClient,
    product: Product,
    domain_feature_ids: HashSet<i64>,
    config: IngestionConfig,
) {
    let profile = product.profile();
    loop {
        let now = Utc::now();
        match profile.cycle_time_for(now) {
            Some(cycle_time) if profile.is_valid_cycle_hour(cycle_time.hour()) => {
                for forecast_hour in profile.forecast_offsets.iter().copied() {
                    let fh = match product {
                        Product::Analysis | Product::AnalysisNoAssim => None,
                        _ => Some(forecast_hour),
                    };
                    run_one_job(&pool, &archive, product, cycle_time, fh, &domain_feature_ids, &config).await;
                    if matches!(product, Product::Analysis | Product::AnalysisNoAssim) {
                        break;
                    }
                }
            }
            _ => {
                tracing::debug!(product = product.as_str(), "no valid cycle hour at this trigger, skipping");
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

async fn run_one_job(
    pool: &PgPool,
    archive: &ArchiveClient,
    product: Product,
    cycle_time: chrono::DateTime<Utc>,
    forecast_hour: Option<i32>,
    domain_feature_ids: &HashSet<i64>,
    config: &IngestionConfig,
) {
    let fetch_result = fetch_with_retry(
        archive,
        product,
        cycle_time,
        &config.artifact_name,
        config.max_retries,
        config.backoff_base,
        config.backoff_cap,
    )
    .await;

    let bytes = match fetch_result {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::info!(product = product.as_str(), %cycle_time, "artifact not yet published, skipping gracefully");
            record_job_outcome(pool, product, cycle_time, &config.domain, "skipped", None).await;
            return;
        }
        Err(e) => {
            tracing::warn!(product = product.as_str(), %cycle_time, error = %e, "transient fetch failure, job not attempted");
            record_job_outcome(pool, product, cycle_time, &config.domain, "failed(transient)", Some(&e.to_string()))
                .await;
            return;
        }
    };

    let frame = match parse_artifact(&bytes) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(product = product.as_str(), %cycle_time, error = %e, "malformed artifact, job failed");
            record_job_outcome(pool, product, cycle_time, &config.domain, "failed(malformed)", Some(&e.to_string()))
                .await;
            return;
        }
    };

    let validator_config = ValidatorConfig {
        domain_feature_ids: domain_feature_ids.clone(),
        expected_record_count: config.expected_record_count,
        size_tolerance: config.size_tolerance,
    };
    let validated = match validate(frame, &validator_config) {
        Ok(validated) => validated,
        Err(errors) => {
            tracing::error!(product = product.as_str(), %cycle_time, ?errors, "validation failed, job failed");
            record_validation_failure(pool, product, cycle_time, &config.domain, &errors).await;
            return;
        }
    };

    let ingested_at = Utc::now();
    let records = normalize(validated, product, cycle_time, forecast_hour, ingested_at);

    if let Err(e) = load_job(pool, product, cycle_time, &config.domain, records).await {
        tracing::error!(product = product.as_str(), %cycle_time, error = %e, "load failed");
        record_job_outcome(pool, product, cycle_time, &config.domain, "failed(store)", Some(&e.to_string())).await;
    }
}

/// Records a `started` -> terminal-status `IngestionLog` row for an attempt
/// that never reaches the Loader (skip, transient fetch exhaustion, malformed
/// artifact, or a store failure the Loader itself reports). One row per
/// fetch+load attempt regardless of how far the job got.
async fn record_job_outcome(
    pool: &PgPool,
    product: Product,
    cycle_time: chrono::DateTime<Utc>,
    domain: &str,
    status: &str,
    error_message: Option<&str>,
) {
    let job_id = uuid::Uuid::new_v4();
    let started_at = Utc::now();
    if let Err(e) =
        crate::db::queries::insert_ingestion_log_started(pool, job_id, product.as_str(), cycle_time, domain, started_at)
            .await
    {
        tracing::error!(error = %e, "failed to record ingestion_log row for job outcome");
        return;
    }
    if let Err(e) = crate::db::queries::complete_ingestion_log(
        pool,
        job_id,
        status,
        0,
        error_message,
        Utc::now(),
        (Utc::now() - started_at).num_milliseconds(),
    )
    .await
    {
        tracing::error!(error = %e, "failed to complete ingestion_log row for job outcome");
    }
}

/// Logs a failed job and its structured validation failures for operator
/// visibility, supplementing the `IngestionLog` row with per-kind detail.
async fn record_validation_failure(
    pool: &PgPool,
    product: Product,
    cycle_time: chrono::DateTime<Utc>,
    domain: &str,
    errors: &[crate::services::validator::ValidationError],
) {
    let job_id = uuid::Uuid::new_v4();
    let started_at = Utc::now();
    if let Err(e) =
        crate::db::queries::insert_ingestion_log_started(pool, job_id, product.as_str(), cycle_time, domain, started_at)
            .await
    {
        tracing::error!(error = %e, "failed to record ingestion_log row for validation failure");
        return;
    }
    let message = errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("; ");
    if let Err(e) = crate::db::queries::complete_ingestion_log(
        pool,
        job_id,
        "failed(invalid)",
        0,
        Some(&message),
        Utc::now(),
        (Utc::now() - started_at).num_milliseconds(),
    )
    .await
    {
        tracing::error!(error = %e, "failed to complete ingestion_log row for validation failure");
    }

    let kinds: Vec<String> = errors.iter().map(|e| format!("{:?}", e.kind).to_lowercase()).collect();
    let variables: Vec<Option<String>> = errors.iter().map(|e| e.variable.map(|v| v.as_str().to_string())).collect();
    let counts: Vec<Option<i64>> = errors.iter().map(|e| e.count.map(|c| c as i64)).collect();
    let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
    if let Err(e) = crate::db::queries::insert_validation_failures(
        pool,
        job_id,
        product.as_str(),
        cycle_time,
        &kinds,
        &variables,
        &counts,
        &messages,
    )
    .await
    {
        tracing::error!(error = %e, "failed to record validation_failure rows");
    }
}
