//! QueryService: the read-side API over the time-series store, reference
//! tables and the scoring engine. Handlers in `routes/` call straight into
//! this module; it is the only place route DTOs are assembled.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries;
use crate::domain::{Flowline, MonthlyFlowStatistics, ReachCentroid, Source};
use crate::errors::AppError;
use crate::products::Product;
use crate::services::metrics::{
    baseflow_dominance_index, classify_confidence, detect_rising_limb, estimate_water_temperature,
    flow_percentile, thermal_suitability_score, velocity_suitability, FlowSample, RisingLimbThresholds,
    ThermalCurveParams,
};
use crate::services::scoring::{
    flow_percentile_category_label, score_hatch, score_species, HatchForecastResult, HatchInputs,
    SpeciesScoreInputs, SpeciesScoreResult,
};
use crate::species_config::{HatchConfig, SpeciesConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Now,
    Today,
    Outlook,
    All,
}

impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "now" => Some(Timeframe::Now),
            "today" => Some(Timeframe::Today),
            "outlook" => Some(Timeframe::Outlook),
            "all" => Some(Timeframe::All),
            _ => None,
        }
    }
}

/// Immutable in-process caches over the reference tables, indexed by
/// `feature_id` for fast point lookup. Loaded once at startup.
#[derive(Clone)]
pub struct ReferenceCaches {
    pub flowlines: Arc<HashMap<i64, Flowline>>,
    pub monthly_stats: Arc<HashMap<i64, MonthlyFlowStatistics>>,
    pub centroids: Arc<HashMap<i64, ReachCentroid>>,
}

#[derive(Clone)]
pub struct QueryService {
    pool: PgPool,
    reference: ReferenceCaches,
    species: Arc<HashMap<String, SpeciesConfig>>,
    hatches: Arc<HashMap<String, HatchConfig>>,
    domain: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfidenceDto {
    pub level: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HydrologyResponse {
    pub feature_id: i64,
    pub flow_m3s: Option<f64>,
    pub velocity_m_s: Option<f64>,
    pub bdi: Option<f64>,
    pub flow_percentile: Option<f64>,
    pub flow_percentile_category: String,
    pub confidence: ConfidenceDto,
    pub timestamp: DateTime<Utc>,
}

impl QueryService {
    pub fn new(
        pool: PgPool,
        reference: ReferenceCaches,
        species: HashMap<String, SpeciesConfig>,
        hatches: HashMap<String, HatchConfig>,
        domain: String,
    ) -> Self {
        QueryService { pool, reference, species: Arc::new(species), hatches: Arc::new(hatches), domain }
    }

    fn flowline(&self, feature_id: i64) -> Result<&Flowline, AppError> {
        self.reference
            .flowlines
            .get(&feature_id)
            .ok_or_else(|| AppError::NotFound(format!("unknown feature_id {feature_id}")))
    }

    async fn latest_value(
        &self,
        feature_id: i64,
        variable: &str,
        source: &str,
        not_after: DateTime<Utc>,
    ) -> Result<Option<f64>, AppError> {
        let row = queries::get_latest_hydro_record(&self.pool, feature_id, variable, source, not_after)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(row.and_then(|r| r.value))
    }

    /// `Now`/`All` (the analysis source) look backward for the most recent
    /// value; `Today`/`Outlook` are forward-looking forecast sources where
    /// every row's `valid_time` is ahead of the cycle that produced it, so
    /// they look forward for the nearest upcoming value instead.
    async fn timeframe_value(
        &self,
        feature_id: i64,
        variable: &str,
        source: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, AppError> {
        let row = match timeframe {
            Timeframe::Now | Timeframe::All => {
                queries::get_latest_hydro_record(&self.pool, feature_id, variable, source, now).await
            }
            Timeframe::Today | Timeframe::Outlook => {
                queries::get_nearest_upcoming_hydro_record(&self.pool, feature_id, variable, source, now).await
            }
        }
        .map_err(AppError::DatabaseError)?;
        Ok(row.and_then(|r| r.value))
    }

    pub async fn reach_hydrology(
        &self,
        feature_id: i64,
        timeframe: Timeframe,
    ) -> Result<HydrologyResponse, AppError> {
        self.flowline(feature_id)?;
        let now = Utc::now();

        let (source, forecast_hour): (&str, Option<i32>) = match timeframe {
            Timeframe::Now | Timeframe::All => (Source::Analysis.as_str(), None),
            Timeframe::Today => (Source::ShortForecast.as_str(), None),
            Timeframe::Outlook => (Source::MediumForecastBlend.as_str(), None),
        };

        let flow = self.timeframe_value(feature_id, "streamflow", source, timeframe, now).await?;
        let velocity = self.timeframe_value(feature_id, "velocity", source, timeframe, now).await?;
        let q_surface = self.timeframe_value(feature_id, "q_surface", source, timeframe, now).await?;
        let q_subsurface = self.timeframe_value(feature_id, "q_subsurface", source, timeframe, now).await?;
        let q_groundwater = self.timeframe_value(feature_id, "q_groundwater", source, timeframe, now).await?;

        let bdi = match (q_surface, q_subsurface, q_groundwater) {
            (Some(s), Some(ss), Some(gw)) => Some(baseflow_dominance_index(s, ss, gw).bdi),
            _ => None,
        };

        let month = now.month();
        let mean_flow = self.reference.monthly_stats.get(&feature_id).and_then(|s| s.mean_flow_for(month));
        let fp = flow.map(|q| flow_percentile(q, mean_flow));

        let confidence_source = Source::parse(source).unwrap_or(Source::Analysis);
        let confidence = classify_confidence(confidence_source, forecast_hour, None);

        Ok(HydrologyResponse {
            feature_id,
            flow_m3s: flow,
            velocity_m_s: velocity,
            bdi,
            flow_percentile: fp.as_ref().and_then(|r| r.percentile),
            flow_percentile_category: fp
                .map(|r| flow_percentile_category_label(r.category).to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            confidence: ConfidenceDto { level: format!("{:?}", confidence.level).to_lowercase(), reasoning: confidence.reasoning },
            timestamp: now,
        })
    }

    pub async fn species_score(
        &self,
        feature_id: i64,
        species_id: &str,
        timeframe: Timeframe,
    ) -> Result<SpeciesScoreResult, AppError> {
        let flowline = self.flowline(feature_id)?.clone();
        let species = self
            .species
            .get(species_id)
            .ok_or_else(|| AppError::NotFound(format!("unknown species_id {species_id}")))?;

        let now = Utc::now();
        let source = match timeframe {
            Timeframe::Now | Timeframe::All => Source::Analysis,
            Timeframe::Today => Source::ShortForecast,
            Timeframe::Outlook => Source::MediumForecastBlend,
        };

        let flow = self.timeframe_value(feature_id, "streamflow", source.as_str(), timeframe, now).await?;
        let velocity = self.timeframe_value(feature_id, "velocity", source.as_str(), timeframe, now).await?;
        let q_surface = self.timeframe_value(feature_id, "q_surface", source.as_str(), timeframe, now).await?;
        let q_subsurface =
            self.timeframe_value(feature_id, "q_subsurface", source.as_str(), timeframe, now).await?;
        let q_groundwater =
            self.timeframe_value(feature_id, "q_groundwater", source.as_str(), timeframe, now).await?;

        let bdi = match (q_surface, q_subsurface, q_groundwater) {
            (Some(s), Some(ss), Some(gw)) => Some(baseflow_dominance_index(s, ss, gw).bdi),
            _ => None,
        };

        let mean_flow = self.reference.monthly_stats.get(&feature_id).and_then(|s| s.mean_flow_for(now.month()));
        let fp = flow.and_then(|q| flow_percentile(q, mean_flow).percentile);

        let velocity_score = velocity.map(|v| velocity_suitability(v, species.velocity_range).score);

        let air_temp = queries::get_latest_temperature_record(&self.pool, feature_id, now)
            .await
            .map_err(AppError::DatabaseError)?
            .and_then(|r| r.air_temp_c);
        let tsi = match (air_temp, bdi) {
            (Some(air_temp), Some(bdi)) => {
                let elevation = Some((flowline.min_elevation_m + flowline.max_elevation_m) / 2.0);
                let t_w = estimate_water_temperature(air_temp, bdi, elevation, &ThermalCurveParams::default());
                Some(thermal_suitability_score(t_w, species.temperature_thresholds))
            }
            _ => None,
        };

        // Stability uses flow variability over the next 18h (today's horizon).
        let variability = self.short_horizon_flow_variability(feature_id, now).await?;

        let inputs = SpeciesScoreInputs {
            flow_percentile: fp,
            velocity_score,
            bdi,
            tsi,
            short_horizon_flow_variability: variability,
        };
        Ok(score_species(species, &inputs))
    }

    async fn short_horizon_flow_variability(
        &self,
        feature_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, AppError> {
        let rows = queries::get_hydro_series(
            &self.pool,
            feature_id,
            "streamflow",
            Some(Source::ShortForecast.as_str()),
            now,
            now + chrono::Duration::hours(18),
        )
        .await
        .map_err(AppError::DatabaseError)?;
        let values: Vec<f64> = rows.into_iter().filter_map(|r| r.value).collect();
        if values.is_empty() {
            return Ok(None);
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if mean <= 0.0 {
            return Ok(Some(0.0));
        }
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let normalized = (variance.sqrt() / mean).clamp(0.0, 1.0);
        Ok(Some(normalized))
    }

    pub async fn hatch_forecasts(
        &self,
        feature_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<HatchForecastResult>, AppError> {
        self.flowline(feature_id)?;
        let now_at_date: DateTime<Utc> =
            DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(12, 0, 0).unwrap(), Utc);
        let day_of_year = date.ordinal();

        let flow = self.latest_value(feature_id, "streamflow", Source::Analysis.as_str(), now_at_date).await?;
        let velocity =
            self.latest_value(feature_id, "velocity", Source::Analysis.as_str(), now_at_date).await?;
        let q_surface =
            self.latest_value(feature_id, "q_surface", Source::Analysis.as_str(), now_at_date).await?;
        let q_subsurface =
            self.latest_value(feature_id, "q_subsurface", Source::Analysis.as_str(), now_at_date).await?;
        let q_groundwater =
            self.latest_value(feature_id, "q_groundwater", Source::Analysis.as_str(), now_at_date).await?;
        let bdi = match (q_surface, q_subsurface, q_groundwater) {
            (Some(s), Some(ss), Some(gw)) => Some(baseflow_dominance_index(s, ss, gw).bdi),
            _ => None,
        };
        let mean_flow =
            self.reference.monthly_stats.get(&feature_id).and_then(|s| s.mean_flow_for(date.month()));
        let fp = flow.and_then(|q| flow_percentile(q, mean_flow).percentile);

        let series = queries::get_hydro_series(
            &self.pool,
            feature_id,
            "streamflow",
            Some(Source::Analysis.as_str()),
            now_at_date - chrono::Duration::hours(24),
            now_at_date,
        )
        .await
        .map_err(AppError::DatabaseError)?;
        let samples: Vec<FlowSample> = series
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let flow = r.value?;
                let hours_since_previous = if i == 0 {
                    None
                } else {
                    Some((r.valid_time - series[i - 1].valid_time).num_minutes() as f64 / 60.0)
                };
                Some(FlowSample { hours_since_previous, flow_m3s: flow })
            })
            .collect();
        let rising_limb = detect_rising_limb(&samples, &RisingLimbThresholds::default());

        let hatch_inputs =
            HatchInputs { flow_percentile: fp, rising_limb_intensity: rising_limb.intensity, velocity, bdi };

        let mut results: Vec<HatchForecastResult> = self
            .hatches
            .values()
            .map(|config| score_hatch(config, day_of_year, &hatch_inputs))
            .collect();
        results.sort_by(|a, b| b.likelihood.partial_cmp(&a.likelihood).unwrap());
        Ok(results)
    }

    pub async fn health(&self) -> HealthResponse {
        let store_reachable = sqlx::query("SELECT 1").execute(&self.pool).await.is_ok();
        let mut last_success = HashMap::new();
        for product in Product::ALL {
            if let Ok(Some(log)) = queries::get_last_successful_ingestion(&self.pool, product.as_str()).await {
                last_success.insert(product.as_str().to_string(), log.completed_at);
            }
        }
        HealthResponse { store_reachable, last_successful_ingestion: last_success }
    }

    pub fn metadata(&self) -> MetadataResponse {
        MetadataResponse {
            species: self.species.keys().cloned().collect(),
            hatches: self.hatches.keys().cloned().collect(),
            timeframes: vec!["now".into(), "today".into(), "outlook".into(), "all".into()],
            confidence_levels: vec!["high".into(), "medium".into(), "low".into()],
            domain: self.domain.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub store_reachable: bool,
    pub last_successful_ingestion: HashMap<String, Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetadataResponse {
    pub species: Vec<String>,
    pub hatches: Vec<String>,
    pub timeframes: Vec<String>,
    pub confidence_levels: Vec<String>,
    pub domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_known_tokens_only() {
        assert_eq!(Timeframe::parse("now"), Some(Timeframe::Now));
        assert_eq!(Timeframe::parse("today"), Some(Timeframe::Today));
        assert_eq!(Timeframe::parse("outlook"), Some(Timeframe::Outlook));
        assert_eq!(Timeframe::parse("all"), Some(Timeframe::All));
        assert_eq!(Timeframe::parse("yesterday"), None);
    }
}
