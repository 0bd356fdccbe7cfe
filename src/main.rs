use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod artifact;
mod config;
mod db;
mod domain;
mod errors;
mod helpers;
mod products;
mod routes;
mod services;
mod species_config;

use config::AppConfig;
use domain::{Flowline, MonthlyFlowStatistics, ReachCentroid};
use products::Product;
use services::archive_client::ArchiveClient;
use services::ingestion::{run_ingestion_worker, IngestionConfig};
use services::query::{QueryService, ReferenceCaches};
use services::weather_client::WeatherClient;
use services::weather_ingestion::run_weather_worker;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 10;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Hydrologic reach forecast API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hydrologic Reach Forecast API",
        version = "0.1.0",
        description = "Ingests forecast-archive hydrology artifacts, derives per-reach \
            habitat and hatch-likelihood indices, and serves them read-only over HTTP.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Metadata", description = "Configured species/hatches and enumerations"),
        (name = "Reach", description = "Per-reach hydrology, habitat and hatch queries"),
    ),
    paths(
        routes::health::health_check,
        routes::metadata::metadata,
        routes::reach::reach_hydrology,
        routes::reach::species_score,
        routes::reach::hatch_forecasts,
    ),
    components(
        schemas(
            services::query::HealthResponse,
            services::query::MetadataResponse,
            services::query::HydrologyResponse,
            services::query::ConfidenceDto,
            services::scoring::SpeciesScoreResult,
            services::scoring::HabitatRating,
            services::scoring::HatchForecastResult,
            services::scoring::HatchMatchFlags,
            services::scoring::HatchRating,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hydro_reach_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    let config_dir = std::path::Path::new(&config.config_dir);
    let species = species_config::load_species_configs(config_dir)
        .expect("failed to load species configuration; refusing to start with unvalidated documents");
    let hatches = species_config::load_hatch_configs(config_dir)
        .expect("failed to load hatch configuration; refusing to start with unvalidated documents");
    tracing::info!(species = species.len(), hatches = hatches.len(), "configuration loaded");

    let reference = build_reference_caches(&pool).await;
    let domain_feature_ids: HashSet<i64> = reference.flowlines.keys().copied().collect();
    tracing::info!(reaches = domain_feature_ids.len(), "reference caches loaded");

    let archive = ArchiveClient::new(&config.archive_base_url, &config.archive_user_agent);

    for product in Product::ALL {
        let pool = pool.clone();
        let archive = archive.clone();
        let domain_feature_ids = domain_feature_ids.clone();
        let ingestion_config = IngestionConfig {
            domain: config.domain.clone(),
            artifact_name: "channel_rt.nc".to_string(),
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            poll_interval: config.poll_interval,
            expected_record_count: config.expected_record_count,
            size_tolerance: config.size_tolerance,
        };
        tokio::spawn(run_ingestion_worker(pool, archive, product, domain_feature_ids, ingestion_config));
    }

    let weather_client = WeatherClient::new(&config.weather_base_url, &config.weather_user_agent);
    tokio::spawn(run_weather_worker(
        pool.clone(),
        weather_client,
        reference.centroids.clone(),
        config.weather_poll_interval,
    ));

    let query_service = QueryService::new(pool, reference, species, hatches, config.domain.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/metadata", get(routes::metadata::metadata))
        .route("/api/v1/reach/:feature_id/hydrology", get(routes::reach::reach_hydrology))
        .route("/api/v1/reach/:feature_id/species/:species_id", get(routes::reach::species_score))
        .route("/api/v1/reach/:feature_id/hatches", get(routes::reach::hatch_forecasts))
        .with_state(query_service)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!("Swagger UI available at http://localhost:{}/swagger-ui/", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind TCP listener");
    axum::serve(listener, app).await.expect("Server terminated unexpectedly");
}

/// Loads the reference tables once at startup into immutable in-process caches.
async fn build_reference_caches(pool: &sqlx::PgPool) -> ReferenceCaches {
    let flowline_rows = db::queries::get_all_flowlines(pool).await.expect("failed to load flowlines");
    let flowlines: HashMap<i64, Flowline> = flowline_rows
        .into_iter()
        .map(|row| {
            let flowline = Flowline::new(
                row.feature_id,
                row.geometry_wkt,
                row.stream_name,
                row.drainage_area_km2,
                row.stream_order,
                row.slope,
                row.min_elevation_m,
                row.max_elevation_m,
            );
            (row.feature_id, flowline)
        })
        .collect();

    let monthly_rows =
        db::queries::get_all_monthly_flow_statistics(pool).await.expect("failed to load monthly flow statistics");
    let mut monthly_stats: HashMap<i64, MonthlyFlowStatistics> = HashMap::new();
    for row in monthly_rows {
        let entry = monthly_stats.entry(row.feature_id).or_insert_with(|| MonthlyFlowStatistics {
            feature_id: row.feature_id,
            ..Default::default()
        });
        if let Some(idx) = (1..=12).find(|m| *m == row.month) {
            let idx = (idx - 1) as usize;
            entry.mean_flow_m3s[idx] = row.mean_flow_m3s;
            entry.mean_velocity_ms[idx] = row.mean_velocity_ms;
        }
    }

    let centroid_rows =
        db::queries::get_all_reach_centroids(pool).await.expect("failed to load reach centroids");
    let centroids: HashMap<i64, ReachCentroid> = centroid_rows
        .into_iter()
        .map(|row| {
            (
                row.feature_id,
                ReachCentroid {
                    feature_id: row.feature_id,
                    latitude: helpers::dec_to_f64(row.latitude),
                    longitude: helpers::dec_to_f64(row.longitude),
                },
            )
        })
        .collect();

    ReferenceCaches {
        flowlines: Arc::new(flowlines),
        monthly_stats: Arc::new(monthly_stats),
        centroids: Arc::new(centroids),
    }
}
