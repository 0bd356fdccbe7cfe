//! MetricsEngine: derives per-reach indices from `HydroRecord`s and reference
//! tables. Every function here is pure — deterministic in its inputs and
//! configuration, as required of the whole engine.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Source;

// ---------------------------------------------------------------------------
// 4.6.1 Rising-limb detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RisingLimbIntensity {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct RisingLimbResult {
    pub detected: bool,
    pub intensity: Option<RisingLimbIntensity>,
    pub max_slope: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct RisingLimbThresholds {
    pub min_slope: f64,
    pub min_duration_hours: usize,
    pub weak: f64,
    pub moderate: f64,
    pub strong: f64,
}

impl Default for RisingLimbThresholds {
    fn default() -> Self {
        RisingLimbThresholds {
            min_slope: 0.01,
            min_duration_hours: 3,
            weak: 0.01,
            moderate: 0.05,
            strong: 0.15,
        }
    }
}

/// One streamflow sample: elapsed hours since the previous sample (`None` for
/// the first sample or after a gap) plus the flow value. Missing samples are
/// simply absent from this slice — the caller never interpolates.
#[derive(Debug, Clone, Copy)]
pub struct FlowSample {
    pub hours_since_previous: Option<f64>,
    pub flow_m3s: f64,
}

/// Detects a sustained window of `min_duration_hours` consecutive samples
/// whose per-hour slope strictly exceeds `min_slope`. A gap (no
/// `hours_since_previous`) breaks any window straddling it.
pub fn detect_rising_limb(
    series: &[FlowSample],
    thresholds: &RisingLimbThresholds,
) -> RisingLimbResult {
    if series.len() < 2 {
        return RisingLimbResult { detected: false, intensity: None, max_slope: None };
    }

    // slopes[i] is the slope entering series[i+1], or None if it's a gap.
    let mut slopes: Vec<Option<f64>> = Vec::with_capacity(series.len() - 1);
    for i in 1..series.len() {
        let slope = series[i]
            .hours_since_previous
            .filter(|h| *h > 0.0)
            .map(|h| (series[i].flow_m3s - series[i - 1].flow_m3s) / h);
        slopes.push(slope);
    }

    let mut best_max_slope: Option<f64> = None;
    let mut run_len = 0usize;
    let mut run_max = f64::MIN;

    for slope in &slopes {
        match slope {
            Some(s) if *s > thresholds.min_slope => {
                run_len += 1;
                run_max = run_max.max(*s);
                if run_len >= thresholds.min_duration_hours {
                    best_max_slope = Some(best_max_slope.map_or(run_max, |m: f64| m.max(run_max)));
                }
            }
            _ => {
                run_len = 0;
                run_max = f64::MIN;
            }
        }
    }

    match best_max_slope {
        None => RisingLimbResult { detected: false, intensity: None, max_slope: None },
        Some(max_slope) => {
            let intensity = if max_slope >= thresholds.strong {
                RisingLimbIntensity::Strong
            } else if max_slope >= thresholds.moderate {
                RisingLimbIntensity::Moderate
            } else {
                RisingLimbIntensity::Weak
            };
            RisingLimbResult { detected: true, intensity: Some(intensity), max_slope: Some(max_slope) }
        }
    }
}

// ---------------------------------------------------------------------------
// 4.6.2 Baseflow Dominance Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BdiCategory {
    GroundwaterFed,
    StormDominated,
    Mixed,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct BdiResult {
    pub bdi: f64,
    pub category: BdiCategory,
}

/// `q_s`: surface lateral runoff. `q_ss`: shallow subsurface. `q_gw`: deep groundwater.
pub fn baseflow_dominance_index(q_s: f64, q_ss: f64, q_gw: f64) -> BdiResult {
    let total = q_s + q_ss + q_gw;
    if total <= 0.0 {
        return BdiResult { bdi: 0.0, category: BdiCategory::Undefined };
    }
    let bdi = ((q_ss + q_gw) / total).clamp(0.0, 1.0);
    let category = if bdi >= 0.65 {
        BdiCategory::GroundwaterFed
    } else if bdi < 0.35 {
        BdiCategory::StormDominated
    } else {
        BdiCategory::Mixed
    };
    BdiResult { bdi, category }
}

// ---------------------------------------------------------------------------
// 4.6.3 Velocity suitability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCategory {
    TooSlow,
    Slow,
    Optimal,
    Fast,
    TooFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct VelocitySuitability {
    pub score: f64,
    pub category: VelocityCategory,
}

/// `range` is `[min_tolerable, min_optimal, max_optimal, max_tolerable]`.
pub fn velocity_suitability(v: f64, range: [f64; 4]) -> VelocitySuitability {
    let [min_tol, min_opt, max_opt, max_tol] = range;
    if v < min_tol {
        return VelocitySuitability { score: 0.0, category: VelocityCategory::TooSlow };
    }
    if v > max_tol {
        return VelocitySuitability { score: 0.0, category: VelocityCategory::TooFast };
    }
    if v >= min_opt && v <= max_opt {
        return VelocitySuitability { score: 1.0, category: VelocityCategory::Optimal };
    }
    if v < min_opt {
        let span = (min_opt - min_tol).max(f64::EPSILON);
        let score = (v - min_tol) / span;
        return VelocitySuitability { score: score.clamp(0.0, 1.0), category: VelocityCategory::Slow };
    }
    let span = (max_tol - max_opt).max(f64::EPSILON);
    let score = (max_tol - v) / span;
    VelocitySuitability { score: score.clamp(0.0, 1.0), category: VelocityCategory::Fast }
}

// ---------------------------------------------------------------------------
// 4.6.4 Flow percentile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowPercentileCategory {
    ExtremeLow,
    Low,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    ExtremeHigh,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct FlowPercentileResult {
    pub percentile: Option<f64>,
    pub category: FlowPercentileCategory,
}

/// `q`: current flow. `mean_historical`: `MonthlyFlowStatistics[reach, month]`.
pub fn flow_percentile(q: f64, mean_historical: Option<f64>) -> FlowPercentileResult {
    let mu = match mean_historical {
        Some(mu) if mu > 0.0 => mu,
        _ => return FlowPercentileResult { percentile: None, category: FlowPercentileCategory::Unknown },
    };
    let r = q / mu;
    let percentile = (50.0 + 50.0 * ((r - 1.0) * 2.0).tanh()).clamp(0.0, 100.0);
    let category = categorize_flow_percentile(percentile);
    FlowPercentileResult { percentile: Some(percentile), category }
}

fn categorize_flow_percentile(p: f64) -> FlowPercentileCategory {
    if p < 10.0 {
        FlowPercentileCategory::ExtremeLow
    } else if p < 25.0 {
        FlowPercentileCategory::Low
    } else if p < 40.0 {
        FlowPercentileCategory::BelowNormal
    } else if p < 60.0 {
        FlowPercentileCategory::Normal
    } else if p < 75.0 {
        FlowPercentileCategory::AboveNormal
    } else if p < 90.0 {
        FlowPercentileCategory::High
    } else {
        FlowPercentileCategory::ExtremeHigh
    }
}

// ---------------------------------------------------------------------------
// 4.6.5 Thermal Suitability Index (TSI)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ThermalCurveParams {
    pub alpha: f64,
    pub mu: f64,
    pub gamma: f64,
    pub beta: f64,
    pub k_gw: f64,
    pub t_gw: f64,
    pub elevation_lapse_per_300m: f64,
    pub elevation_reference_m: f64,
}

impl Default for ThermalCurveParams {
    fn default() -> Self {
        ThermalCurveParams {
            alpha: 24.0,
            mu: 2.0,
            gamma: 0.20,
            beta: 15.0,
            k_gw: 0.35,
            t_gw: 10.0,
            elevation_lapse_per_300m: -0.6,
            elevation_reference_m: 0.0,
        }
    }
}

/// Stage 1: estimate water temperature from air temperature, BDI, and
/// (optionally) elevation.
pub fn estimate_water_temperature(
    air_temp_c: f64,
    bdi: f64,
    elevation_m: Option<f64>,
    params: &ThermalCurveParams,
) -> f64 {
    let t_w0 = params.mu
        + (params.alpha - params.mu) / (1.0 + (params.gamma * (params.beta - air_temp_c)).exp());
    let t_w1 = t_w0 - params.k_gw * bdi * (t_w0 - params.t_gw);
    match elevation_m {
        Some(z) => {
            t_w1 + ((z - params.elevation_reference_m) / 300.0) * params.elevation_lapse_per_300m
        }
        None => t_w1,
    }
}

/// Stage 2: score estimated water temperature against species thresholds.
pub fn thermal_suitability_score(
    water_temp_c: f64,
    thresholds: crate::species_config::TemperatureThresholds,
) -> f64 {
    let t = water_temp_c;
    if t >= thresholds.optimal_min && t <= thresholds.optimal_max {
        return 1.0;
    }
    if t < thresholds.optimal_min {
        if t <= thresholds.critical {
            return 0.0;
        }
        if t <= thresholds.stress {
            let span = (thresholds.stress - thresholds.critical).max(f64::EPSILON);
            return (0.5 * (t - thresholds.critical) / span).clamp(0.0, 0.5);
        }
        let span = (thresholds.optimal_min - thresholds.stress).max(f64::EPSILON);
        return (0.5 + 0.5 * (t - thresholds.stress) / span).clamp(0.5, 1.0);
    }
    // t > optimal_max
    if t >= thresholds.critical {
        return 0.0;
    }
    if t >= thresholds.stress {
        let span = (thresholds.critical - thresholds.stress).max(f64::EPSILON);
        return (0.5 * (thresholds.critical - t) / span).clamp(0.0, 0.5);
    }
    let span = (thresholds.stress - thresholds.optimal_max).max(f64::EPSILON);
    (0.5 + 0.5 * (thresholds.stress - t) / span).clamp(0.5, 1.0)
}

// ---------------------------------------------------------------------------
// 4.6.6 Ensemble spread and confidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct EnsembleSpread {
    pub mean: f64,
    pub std_dev: f64,
    pub cv: f64,
}

pub fn ensemble_spread(members: &[f64]) -> EnsembleSpread {
    let n = members.len() as f64;
    if members.is_empty() {
        return EnsembleSpread { mean: 0.0, std_dev: 0.0, cv: 0.0 };
    }
    let mean = members.iter().sum::<f64>() / n;
    let variance = members.iter().map(|q| (q - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    EnsembleSpread { mean, std_dev, cv }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfidenceResult {
    pub level: ConfidenceLevel,
    pub reasoning: String,
}

/// Deterministic top-to-bottom decision tree. `cv` is `None` when ensemble
/// spread is unavailable for this source/time.
pub fn classify_confidence(source: Source, forecast_hour: Option<i32>, cv: Option<f64>) -> ConfidenceResult {
    if source == Source::Analysis {
        return ConfidenceResult {
            level: ConfidenceLevel::High,
            reasoning: "rule 1: analysis sources are always high confidence".to_string(),
        };
    }

    if source == Source::ShortForecast {
        let h = forecast_hour.unwrap_or(0);
        if h <= 3 {
            return match cv {
                None => ConfidenceResult {
                    level: ConfidenceLevel::High,
                    reasoning: "rule 2: short_forecast at hour <= 3 with unknown spread".to_string(),
                },
                Some(cv) if cv < 0.15 => ConfidenceResult {
                    level: ConfidenceLevel::High,
                    reasoning: format!("rule 2: short_forecast at hour <= 3, CV {cv:.3} < 0.15"),
                },
                Some(cv) => ConfidenceResult {
                    level: ConfidenceLevel::Medium,
                    reasoning: format!("rule 2: short_forecast at hour <= 3, CV {cv:.3} >= 0.15"),
                },
            };
        }
        if (4..=12).contains(&h) {
            return match cv {
                Some(cv) if cv > 0.30 => ConfidenceResult {
                    level: ConfidenceLevel::Low,
                    reasoning: format!("rule 3: short_forecast hour {h} in [4,12], CV {cv:.3} > 0.30"),
                },
                _ => ConfidenceResult {
                    level: ConfidenceLevel::Medium,
                    reasoning: format!("rule 3: short_forecast hour {h} in [4,12], CV within bound"),
                },
            };
        }
    }

    if source == Source::MediumForecastBlend {
        return match cv {
            Some(cv) if cv > 0.40 => ConfidenceResult {
                level: ConfidenceLevel::Low,
                reasoning: format!("rule 4: medium_forecast_blend, CV {cv:.3} > 0.40"),
            },
            _ => ConfidenceResult {
                level: ConfidenceLevel::Medium,
                reasoning: "rule 4: medium_forecast_blend, CV within bound".to_string(),
            },
        };
    }

    ConfidenceResult { level: ConfidenceLevel::Medium, reasoning: "rule 5: default".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species_config::TemperatureThresholds;

    fn sample(hours: Option<f64>, flow: f64) -> FlowSample {
        FlowSample { hours_since_previous: hours, flow_m3s: flow }
    }

    #[test]
    fn flat_series_yields_no_rising_limb() {
        let series = vec![sample(None, 10.0), sample(Some(1.0), 10.0), sample(Some(1.0), 10.0)];
        let result = detect_rising_limb(&series, &RisingLimbThresholds::default());
        assert!(!result.detected);
    }

    #[test]
    fn ramp_of_exactly_min_duration_detects() {
        let thresholds = RisingLimbThresholds::default();
        // 4 samples -> 3 slopes, exactly min_duration_hours = 3, each slope 0.02 > 0.01
        let series = vec![
            sample(None, 10.0),
            sample(Some(1.0), 10.02),
            sample(Some(1.0), 10.04),
            sample(Some(1.0), 10.06),
        ];
        let result = detect_rising_limb(&series, &thresholds);
        assert!(result.detected);
    }

    #[test]
    fn shortening_by_one_sample_fails_to_detect() {
        let thresholds = RisingLimbThresholds::default();
        let series = vec![sample(None, 10.0), sample(Some(1.0), 10.02), sample(Some(1.0), 10.04)];
        let result = detect_rising_limb(&series, &thresholds);
        assert!(!result.detected);
    }

    #[test]
    fn gap_breaks_a_straddling_window() {
        let thresholds = RisingLimbThresholds::default();
        let series = vec![
            sample(None, 10.0),
            sample(Some(1.0), 10.02),
            sample(None, 10.04), // gap: hours_since_previous unknown
            sample(Some(1.0), 10.06),
        ];
        let result = detect_rising_limb(&series, &thresholds);
        assert!(!result.detected);
    }

    #[test]
    fn bdi_pure_baseflow_scenario() {
        let result = baseflow_dominance_index(0.0, 3.0, 5.0);
        assert_eq!(result.bdi, 1.0);
        assert_eq!(result.category, BdiCategory::GroundwaterFed);
    }

    #[test]
    fn bdi_pure_stormflow_scenario() {
        let result = baseflow_dominance_index(10.0, 0.0, 0.0);
        assert_eq!(result.bdi, 0.0);
        assert_eq!(result.category, BdiCategory::StormDominated);
    }

    #[test]
    fn bdi_non_positive_total_is_undefined() {
        let result = baseflow_dominance_index(0.0, 0.0, 0.0);
        assert_eq!(result.category, BdiCategory::Undefined);
    }

    #[test]
    fn bdi_is_always_in_unit_interval() {
        for (s, ss, gw) in [(1.0, 1.0, 1.0), (1000.0, 0.0, 0.0), (0.0, 0.0, 1000.0)] {
            let r = baseflow_dominance_index(s, ss, gw);
            assert!((0.0..=1.0).contains(&r.bdi));
        }
    }

    #[test]
    fn velocity_too_slow_and_too_fast_score_zero() {
        let range = [0.1, 0.3, 0.9, 1.5];
        assert_eq!(velocity_suitability(0.05, range).category, VelocityCategory::TooSlow);
        assert_eq!(velocity_suitability(0.05, range).score, 0.0);
        assert_eq!(velocity_suitability(2.0, range).category, VelocityCategory::TooFast);
        assert_eq!(velocity_suitability(2.0, range).score, 0.0);
    }

    #[test]
    fn velocity_within_optimal_scores_one() {
        let range = [0.1, 0.3, 0.9, 1.5];
        assert_eq!(velocity_suitability(0.6, range).score, 1.0);
        assert_eq!(velocity_suitability(0.6, range).category, VelocityCategory::Optimal);
    }

    #[test]
    fn velocity_gradient_between_tolerable_and_optimal() {
        let range = [0.1, 0.3, 0.9, 1.5];
        let below = velocity_suitability(0.2, range);
        assert!(below.score > 0.0 && below.score < 1.0);
        assert_eq!(below.category, VelocityCategory::Slow);
    }

    #[test]
    fn flow_percentile_mid_scenario() {
        let result = flow_percentile(41.64, Some(41.66));
        assert!((result.percentile.unwrap() - 50.0).abs() < 0.5);
        assert_eq!(result.category, FlowPercentileCategory::Normal);
    }

    #[test]
    fn flow_percentile_q_equals_mu_is_exactly_fifty() {
        let result = flow_percentile(10.0, Some(10.0));
        assert_eq!(result.percentile, Some(50.0));
    }

    #[test]
    fn flow_percentile_large_q_approaches_hundred() {
        let result = flow_percentile(10_000.0, Some(10.0));
        assert!(result.percentile.unwrap() > 99.0);
    }

    #[test]
    fn flow_percentile_q_near_zero_approaches_zero() {
        let result = flow_percentile(0.0001, Some(10.0));
        assert!(result.percentile.unwrap() < 1.0);
    }

    #[test]
    fn flow_percentile_undefined_when_mean_absent_or_non_positive() {
        assert_eq!(flow_percentile(10.0, None).category, FlowPercentileCategory::Unknown);
        assert_eq!(flow_percentile(10.0, Some(0.0)).category, FlowPercentileCategory::Unknown);
        assert_eq!(flow_percentile(10.0, Some(-5.0)).category, FlowPercentileCategory::Unknown);
    }

    #[test]
    fn flow_percentile_is_monotone_non_decreasing_in_q() {
        let mu = 10.0;
        let mut last = -1.0;
        for q in [0.1, 1.0, 5.0, 10.0, 20.0, 100.0] {
            let p = flow_percentile(q, Some(mu)).percentile.unwrap();
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn tsi_stays_in_unit_interval_across_wide_temperature_range() {
        let thresholds = TemperatureThresholds { optimal_min: 7.0, optimal_max: 16.0, stress: 21.0, critical: 25.0 };
        for t in [-10.0, 0.0, 7.0, 12.0, 16.0, 19.0, 23.0, 30.0, 50.0] {
            let score = thermal_suitability_score(t, thresholds);
            assert!((0.0..=1.0).contains(&score), "t={t} score={score}");
        }
    }

    #[test]
    fn tsi_optimal_range_scores_one() {
        let thresholds = TemperatureThresholds { optimal_min: 7.0, optimal_max: 16.0, stress: 21.0, critical: 25.0 };
        assert_eq!(thermal_suitability_score(10.0, thresholds), 1.0);
    }

    #[test]
    fn tsi_beyond_critical_scores_zero() {
        let thresholds = TemperatureThresholds { optimal_min: 7.0, optimal_max: 16.0, stress: 21.0, critical: 25.0 };
        assert_eq!(thermal_suitability_score(30.0, thresholds), 0.0);
        assert_eq!(thermal_suitability_score(-5.0, thresholds), 0.0);
    }

    #[test]
    fn ensemble_spread_zero_when_single_member() {
        let spread = ensemble_spread(&[12.0]);
        assert_eq!(spread.mean, 12.0);
        assert_eq!(spread.std_dev, 0.0);
        assert_eq!(spread.cv, 0.0);
    }

    #[test]
    fn ensemble_cv_zero_when_mean_non_positive() {
        let spread = ensemble_spread(&[-1.0, 1.0]);
        assert_eq!(spread.mean, 0.0);
        assert_eq!(spread.cv, 0.0);
    }

    #[test]
    fn confidence_analysis_is_always_high() {
        let result = classify_confidence(Source::Analysis, None, Some(0.9));
        assert_eq!(result.level, ConfidenceLevel::High);
        assert!(result.reasoning.contains("rule 1"));
    }

    #[test]
    fn confidence_spread_driven_scenario() {
        let result = classify_confidence(Source::ShortForecast, Some(10), Some(0.35));
        assert_eq!(result.level, ConfidenceLevel::Low);
    }

    #[test]
    fn confidence_short_forecast_early_hour_high_when_spread_unknown() {
        let result = classify_confidence(Source::ShortForecast, Some(2), None);
        assert_eq!(result.level, ConfidenceLevel::High);
    }

    #[test]
    fn confidence_medium_blend_high_cv_is_low() {
        let result = classify_confidence(Source::MediumForecastBlend, None, Some(0.5));
        assert_eq!(result.level, ConfidenceLevel::Low);
    }

    #[test]
    fn confidence_is_total_function() {
        for source in [Source::Analysis, Source::ShortForecast, Source::MediumForecastBlend, Source::AnalysisNoAssim] {
            for fh in [None, Some(0), Some(5), Some(20)] {
                for cv in [None, Some(0.05), Some(0.5)] {
                    let _ = classify_confidence(source, fh, cv);
                }
            }
        }
    }
}
