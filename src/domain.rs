//! Canonical domain types shared by every core component.
//!
//! These are the types that flow between Fetcher, Parser, Validator, Normalizer,
//! Loader, MetricsEngine, ScoringEngine and QueryService. Nothing in this module
//! talks to the database or the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of variables the archive exposes per reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Streamflow,
    Velocity,
    Nudge,
    QSurface,
    QSubsurface,
    QGroundwater,
}

impl Variable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Streamflow => "streamflow",
            Variable::Velocity => "velocity",
            Variable::Nudge => "nudge",
            Variable::QSurface => "q_surface",
            Variable::QSubsurface => "q_subsurface",
            Variable::QGroundwater => "q_groundwater",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "streamflow" => Some(Variable::Streamflow),
            "velocity" => Some(Variable::Velocity),
            "nudge" => Some(Variable::Nudge),
            "q_surface" => Some(Variable::QSurface),
            "q_subsurface" => Some(Variable::QSubsurface),
            "q_groundwater" => Some(Variable::QGroundwater),
            _ => None,
        }
    }
}

/// Closed set of canonical source tags. Original product filenames never survive
/// past the Normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Analysis,
    ShortForecast,
    MediumForecastBlend,
    AnalysisNoAssim,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Analysis => "analysis",
            Source::ShortForecast => "short_forecast",
            Source::MediumForecastBlend => "medium_forecast_blend",
            Source::AnalysisNoAssim => "analysis_no_assim",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(Source::Analysis),
            "short_forecast" => Some(Source::ShortForecast),
            "medium_forecast_blend" => Some(Source::MediumForecastBlend),
            "analysis_no_assim" => Some(Source::AnalysisNoAssim),
            _ => None,
        }
    }
}

/// The canonical ingested unit. Identity is `(feature_id, valid_time, variable, source)`;
/// `forecast_hour` is derived and carried only for observability/confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroRecord {
    pub feature_id: i64,
    pub valid_time: DateTime<Utc>,
    pub variable: Variable,
    /// `None` is the canonical absent marker; it must never be conflated with `Some(0.0)`.
    pub value: Option<f64>,
    pub source: Source,
    pub forecast_hour: Option<i32>,
    pub ingested_at: DateTime<Utc>,
}

/// Status of a single fetch+load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Success,
    Failed,
}

/// One row per fetch+load attempt, keyed by (product, cycle_time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLog {
    pub id: uuid::Uuid,
    pub product: String,
    pub cycle_time: DateTime<Utc>,
    pub domain: String,
    pub status: JobStatus,
    pub records_ingested: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Deterministic stream-gradient classification, a function of slope alone.
/// Thresholds are load-bearing: they must match exactly across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GradientClass {
    Pool,
    Run,
    Riffle,
    Cascade,
}

impl GradientClass {
    /// `slope` is dimensionless (m/m).
    pub fn from_slope(slope: f64) -> Self {
        if slope < 0.001 {
            GradientClass::Pool
        } else if slope < 0.01 {
            GradientClass::Run
        } else if slope < 0.04 {
            GradientClass::Riffle
        } else {
            GradientClass::Cascade
        }
    }
}

/// Deterministic stream-size classification, a function of drainage area alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Headwater,
    Creek,
    SmallRiver,
    River,
    LargeRiver,
}

impl SizeClass {
    /// `drainage_area_km2` is the upstream contributing area in km².
    pub fn from_drainage_area(drainage_area_km2: f64) -> Self {
        if drainage_area_km2 < 10.0 {
            SizeClass::Headwater
        } else if drainage_area_km2 < 100.0 {
            SizeClass::Creek
        } else if drainage_area_km2 < 1_000.0 {
            SizeClass::SmallRiver
        } else if drainage_area_km2 < 10_000.0 {
            SizeClass::River
        } else {
            SizeClass::LargeRiver
        }
    }
}

/// Reference geometry and static descriptors for one reach. Loaded once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flowline {
    pub feature_id: i64,
    pub geometry_wkt: String,
    pub stream_name: Option<String>,
    pub drainage_area_km2: f64,
    pub stream_order: i32,
    pub slope: f64,
    pub min_elevation_m: f64,
    pub max_elevation_m: f64,
    pub gradient_class: GradientClass,
    pub size_class: SizeClass,
}

impl Flowline {
    pub fn new(
        feature_id: i64,
        geometry_wkt: String,
        stream_name: Option<String>,
        drainage_area_km2: f64,
        stream_order: i32,
        slope: f64,
        min_elevation_m: f64,
        max_elevation_m: f64,
    ) -> Self {
        Flowline {
            feature_id,
            geometry_wkt,
            stream_name,
            drainage_area_km2,
            stream_order,
            slope,
            min_elevation_m,
            max_elevation_m,
            gradient_class: GradientClass::from_slope(slope),
            size_class: SizeClass::from_drainage_area(drainage_area_km2),
        }
    }
}

/// Historical monthly mean flow/velocity baseline for a reach, months 1..=6
/// guaranteed present, 7..=12 may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthlyFlowStatistics {
    pub feature_id: i64,
    pub mean_flow_m3s: [Option<f64>; 12],
    pub mean_velocity_ms: [Option<f64>; 12],
}

impl MonthlyFlowStatistics {
    /// `month` is 1-indexed (1 = January).
    pub fn mean_flow_for(&self, month: u32) -> Option<f64> {
        self.mean_flow_m3s.get((month as usize).wrapping_sub(1)).copied().flatten()
    }

    pub fn mean_velocity_for(&self, month: u32) -> Option<f64> {
        self.mean_velocity_ms.get((month as usize).wrapping_sub(1)).copied().flatten()
    }
}

/// Probe location for external weather inputs, derived from the flowline centroid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReachCentroid {
    pub feature_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Externally sourced air-temperature/precipitation observation or forecast,
/// keyed like `HydroRecord` but carrying weather, not hydrology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureRecord {
    pub feature_id: i64,
    pub valid_time: DateTime<Utc>,
    pub air_temp_c: Option<f64>,
    pub apparent_temp_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
    pub source: Source,
    pub forecast_hour: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_class_boundaries() {
        assert_eq!(GradientClass::from_slope(0.0), GradientClass::Pool);
        assert_eq!(GradientClass::from_slope(0.0009), GradientClass::Pool);
        assert_eq!(GradientClass::from_slope(0.001), GradientClass::Run);
        assert_eq!(GradientClass::from_slope(0.01), GradientClass::Riffle);
        assert_eq!(GradientClass::from_slope(0.04), GradientClass::Cascade);
        assert_eq!(GradientClass::from_slope(1.0), GradientClass::Cascade);
    }

    #[test]
    fn size_class_boundaries() {
        assert_eq!(SizeClass::from_drainage_area(0.0), SizeClass::Headwater);
        assert_eq!(SizeClass::from_drainage_area(9.99), SizeClass::Headwater);
        assert_eq!(SizeClass::from_drainage_area(10.0), SizeClass::Creek);
        assert_eq!(SizeClass::from_drainage_area(100.0), SizeClass::SmallRiver);
        assert_eq!(SizeClass::from_drainage_area(1_000.0), SizeClass::River);
        assert_eq!(SizeClass::from_drainage_area(10_000.0), SizeClass::LargeRiver);
    }

    #[test]
    fn variable_round_trips_through_str() {
        for v in [
            Variable::Streamflow,
            Variable::Velocity,
            Variable::Nudge,
            Variable::QSurface,
            Variable::QSubsurface,
            Variable::QGroundwater,
        ] {
            assert_eq!(Variable::parse(v.as_str()), Some(v));
        }
        assert_eq!(Variable::parse("bogus"), None);
    }

    #[test]
    fn monthly_statistics_month_is_one_indexed() {
        let mut stats = MonthlyFlowStatistics::default();
        stats.mean_flow_m3s[0] = Some(12.5);
        assert_eq!(stats.mean_flow_for(1), Some(12.5));
        assert_eq!(stats.mean_flow_for(7), None);
    }
}
