use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::query::{HydrologyResponse, QueryService, Timeframe};
use crate::services::scoring::{HatchForecastResult, SpeciesScoreResult};

#[derive(Debug, Deserialize)]
pub struct TimeframeQuery {
    #[serde(default = "default_timeframe")]
    timeframe: String,
}

fn default_timeframe() -> String {
    "now".to_string()
}

fn parse_timeframe(raw: &str) -> Result<Timeframe, AppError> {
    Timeframe::parse(raw)
        .ok_or_else(|| AppError::BadRequest(format!("unknown timeframe '{raw}'; expected now/today/outlook/all")))
}

/// Current hydrologic snapshot for one reach.
#[utoipa::path(
    get,
    path = "/api/v1/reach/{feature_id}/hydrology",
    tag = "Reach",
    params(
        ("feature_id" = i64, Path, description = "NHDPlus flowline feature identifier"),
        ("timeframe" = Option<String>, Query, description = "now | today | outlook | all"),
    ),
    responses(
        (status = 200, description = "Hydrology snapshot", body = HydrologyResponse),
        (status = 404, description = "Unknown feature_id"),
        (status = 400, description = "Unknown timeframe"),
    )
)]
pub async fn reach_hydrology(
    State(service): State<QueryService>,
    Path(feature_id): Path<i64>,
    Query(query): Query<TimeframeQuery>,
) -> Result<Json<HydrologyResponse>, AppError> {
    let timeframe = parse_timeframe(&query.timeframe)?;
    let response = service.reach_hydrology(feature_id, timeframe).await?;
    Ok(Json(response))
}

/// Species habitat suitability score for one reach.
#[utoipa::path(
    get,
    path = "/api/v1/reach/{feature_id}/species/{species_id}",
    tag = "Reach",
    params(
        ("feature_id" = i64, Path, description = "NHDPlus flowline feature identifier"),
        ("species_id" = String, Path, description = "Configured species identifier"),
        ("timeframe" = Option<String>, Query, description = "now | today | outlook | all"),
    ),
    responses(
        (status = 200, description = "Species habitat score", body = SpeciesScoreResult),
        (status = 404, description = "Unknown feature_id or species_id"),
        (status = 400, description = "Unknown timeframe"),
    )
)]
pub async fn species_score(
    State(service): State<QueryService>,
    Path((feature_id, species_id)): Path<(i64, String)>,
    Query(query): Query<TimeframeQuery>,
) -> Result<Json<SpeciesScoreResult>, AppError> {
    let timeframe = parse_timeframe(&query.timeframe)?;
    let response = service.species_score(feature_id, &species_id, timeframe).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HatchQuery {
    date: Option<NaiveDate>,
}

/// Hatch likelihood forecast for one reach, across every configured hatch,
/// ranked most-likely first.
#[utoipa::path(
    get,
    path = "/api/v1/reach/{feature_id}/hatches",
    tag = "Reach",
    params(
        ("feature_id" = i64, Path, description = "NHDPlus flowline feature identifier"),
        ("date" = Option<String>, Query, description = "ISO date, defaults to today (UTC)"),
    ),
    responses(
        (status = 200, description = "Hatch forecasts, ordered by descending likelihood", body = [HatchForecastResult]),
        (status = 404, description = "Unknown feature_id"),
    )
)]
pub async fn hatch_forecasts(
    State(service): State<QueryService>,
    Path(feature_id): Path<i64>,
    Query(query): Query<HatchQuery>,
) -> Result<Json<Vec<HatchForecastResult>>, AppError> {
    let date = query.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let response = service.hatch_forecasts(feature_id, date).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeframe_rejects_unknown_token() {
        assert!(parse_timeframe("yesterday").is_err());
        assert!(parse_timeframe("now").is_ok());
    }
}
