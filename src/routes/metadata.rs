use axum::extract::State;
use axum::Json;

use crate::services::query::{MetadataResponse, QueryService};

/// Metadata endpoint.
///
/// Enumerates the configured species, hatches, timeframes and confidence
/// levels a client can query against.
#[utoipa::path(
    get,
    path = "/api/v1/metadata",
    tag = "Metadata",
    responses(
        (status = 200, description = "Configured species, hatches and enumerations", body = MetadataResponse),
    )
)]
pub async fn metadata(State(service): State<QueryService>) -> Json<MetadataResponse> {
    Json(service.metadata())
}
