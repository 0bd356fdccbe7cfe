use axum::extract::State;
use axum::Json;

use crate::services::query::{HealthResponse, QueryService};

/// Health check endpoint.
///
/// Reports store reachability and the last successful ingestion per product.
/// Never fabricates a value: a product with no successful ingestion yet reports `null`.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health summary", body = HealthResponse),
    )
)]
pub async fn health_check(State(service): State<QueryService>) -> Json<HealthResponse> {
    Json(service.health().await)
}
