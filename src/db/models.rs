//! sqlx `FromRow` mirrors of the domain types in `crate::domain`. Kept
//! separate from the domain module so the domain types themselves stay free
//! of any storage concern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct HydroRecordRow {
    pub feature_id: i64,
    pub valid_time: DateTime<Utc>,
    pub variable: String,
    pub value: Option<f64>,
    pub source: String,
    pub forecast_hour: Option<i32>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct IngestionLogRow {
    pub id: uuid::Uuid,
    pub product: String,
    pub cycle_time: DateTime<Utc>,
    pub domain: String,
    pub status: String,
    pub records_ingested: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FlowlineRow {
    pub feature_id: i64,
    pub geometry_wkt: String,
    pub stream_name: Option<String>,
    pub drainage_area_km2: f64,
    pub stream_order: i32,
    pub slope: f64,
    pub min_elevation_m: f64,
    pub max_elevation_m: f64,
}

#[derive(Debug, Clone, FromRow)]
pub struct MonthlyFlowStatisticsRow {
    pub feature_id: i64,
    pub month: i32,
    pub mean_flow_m3s: Option<f64>,
    pub mean_velocity_ms: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReachCentroidRow {
    pub feature_id: i64,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct TemperatureRecordRow {
    pub feature_id: i64,
    pub valid_time: DateTime<Utc>,
    pub air_temp_c: Option<f64>,
    pub apparent_temp_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
    pub source: String,
    pub forecast_hour: Option<i32>,
}
