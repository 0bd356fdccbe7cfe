//! ScoringEngine: composes MetricsEngine outputs with species/hatch
//! configuration into explained scores. Any missing input becomes an explicit
//! "unknown" component — scores never silently incorporate absent signals
//! (`spec.md` §7).

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::metrics::{
    flow_percentile, ConfidenceResult, FlowPercentileCategory, RisingLimbIntensity,
    VelocityCategory,
};
use crate::species_config::{HatchConfig, SpeciesConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HabitatRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

fn rate_habitat(overall: f64) -> HabitatRating {
    if overall >= 0.8 {
        HabitatRating::Excellent
    } else if overall >= 0.6 {
        HabitatRating::Good
    } else if overall >= 0.3 {
        HabitatRating::Fair
    } else {
        HabitatRating::Poor
    }
}

/// Inputs the ScoringEngine needs for one species-score evaluation. Any field
/// left `None` is an explicit "unknown" for that signal, not a default value.
#[derive(Debug, Clone, Copy)]
pub struct SpeciesScoreInputs {
    pub flow_percentile: Option<f64>,
    pub velocity_score: Option<f64>,
    pub bdi: Option<f64>,
    pub tsi: Option<f64>,
    /// Normalized standard deviation (coefficient of variation-like, already
    /// clipped to `[0,1]`) of the next 18h forecast, feeding `score_stab`.
    pub short_horizon_flow_variability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SpeciesScoreResult {
    pub score_flow: Option<f64>,
    pub score_velocity: Option<f64>,
    pub score_thermal: Option<f64>,
    pub score_stability: Option<f64>,
    pub overall: Option<f64>,
    pub rating: HabitatRating,
    pub explanation: String,
}

/// `score_flow`: 1 within the optimal range; linear decay to 0 at the
/// percentile extremes (0 and 100).
fn score_flow_from_percentile(percentile: f64, optimal: (f64, f64)) -> f64 {
    let (opt_min, opt_max) = optimal;
    if percentile >= opt_min && percentile <= opt_max {
        return 1.0;
    }
    if percentile < opt_min {
        let span = opt_min.max(f64::EPSILON);
        return (percentile / span).clamp(0.0, 1.0);
    }
    let span = (100.0 - opt_max).max(f64::EPSILON);
    ((100.0 - percentile) / span).clamp(0.0, 1.0)
}

/// `score_stab`: equal blend of BDI and `1 - variability` (variability already
/// clipped to `[0,1]` by the caller).
fn score_stability(bdi: f64, variability: f64) -> f64 {
    let variability = variability.clamp(0.0, 1.0);
    (bdi.clamp(0.0, 1.0) + (1.0 - variability)) / 2.0
}

pub fn score_species(config: &SpeciesConfig, inputs: &SpeciesScoreInputs) -> SpeciesScoreResult {
    let score_flow = inputs.flow_percentile.map(|p| score_flow_from_percentile(p, config.flow_percentile_optimal));
    let score_velocity = inputs.velocity_score;
    let score_thermal = inputs.tsi;
    let score_stability = match (inputs.bdi, inputs.short_horizon_flow_variability) {
        (Some(bdi), Some(var)) => Some(score_stability(bdi, var)),
        _ => None,
    };

    let w = config.weights;
    let components = [
        (w.flow, score_flow, "flow"),
        (w.velocity, score_velocity, "velocity"),
        (w.thermal, score_thermal, "thermal"),
        (w.stability, score_stability, "stability"),
    ];

    let mut explanation_parts = Vec::new();
    let mut overall = None;
    if components.iter().all(|(_, s, _)| s.is_some()) {
        let sum: f64 = components.iter().map(|(weight, s, _)| weight * s.unwrap()).sum();
        overall = Some(sum.clamp(0.0, 1.0));
        for (weight, s, name) in components {
            explanation_parts.push(format!("{name}={:.2} (w={:.2})", s.unwrap(), weight));
        }
    } else {
        for (_, s, name) in components {
            if s.is_none() {
                explanation_parts.push(format!("{name}=unknown"));
            }
        }
    }

    let rating = overall.map(rate_habitat).unwrap_or(HabitatRating::Unknown);
    let explanation = if overall.is_some() {
        format!("habitat score {:.2} from {}", overall.unwrap(), explanation_parts.join(", "))
    } else {
        format!("habitat score unknown: missing {}", explanation_parts.join(", "))
    };

    SpeciesScoreResult {
        score_flow,
        score_velocity,
        score_thermal,
        score_stability,
        overall,
        rating,
        explanation,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HatchRating {
    VeryLikely,
    Likely,
    Possible,
    Unlikely,
}

fn rate_hatch(likelihood: f64) -> HatchRating {
    if likelihood >= 0.75 {
        HatchRating::VeryLikely
    } else if likelihood >= 0.50 {
        HatchRating::Likely
    } else if likelihood >= 0.25 {
        HatchRating::Possible
    } else {
        HatchRating::Unlikely
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HatchInputs {
    pub flow_percentile: Option<f64>,
    pub rising_limb_intensity: Option<RisingLimbIntensity>,
    pub velocity: Option<f64>,
    pub bdi: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HatchMatchFlags {
    pub flow_percentile: bool,
    pub rising_limb: bool,
    pub velocity: bool,
    pub bdi: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HatchForecastResult {
    pub hatch_id: String,
    pub in_season: bool,
    pub likelihood: f64,
    pub rating: HatchRating,
    pub matches: HatchMatchFlags,
    pub explanation: String,
}

pub fn score_hatch(config: &HatchConfig, day_of_year: u32, inputs: &HatchInputs) -> HatchForecastResult {
    if !config.in_season(day_of_year) {
        return HatchForecastResult {
            hatch_id: config.id.clone(),
            in_season: false,
            likelihood: 0.0,
            rating: HatchRating::Unlikely,
            matches: HatchMatchFlags { flow_percentile: false, rising_limb: false, velocity: false, bdi: false },
            explanation: format!(
                "day-of-year {day_of_year} is outside the hatch window [{}, {}]",
                config.day_of_year_start, config.day_of_year_end
            ),
        };
    }

    let flow_match = inputs
        .flow_percentile
        .map(|p| p >= config.flow_percentile_range.0 && p <= config.flow_percentile_range.1)
        .unwrap_or(false);
    let limb_match = inputs
        .rising_limb_intensity
        .map(|i| config.allowed_rising_limb_intensities.contains(&i))
        .unwrap_or(false);
    let velocity_match =
        inputs.velocity.map(|v| v >= config.velocity_range.0 && v <= config.velocity_range.1).unwrap_or(false);
    let bdi_match = inputs.bdi.map(|b| b >= config.min_bdi).unwrap_or(false);

    let matches = HatchMatchFlags {
        flow_percentile: flow_match,
        rising_limb: limb_match,
        velocity: velocity_match,
        bdi: bdi_match,
    };
    let true_count = [flow_match, limb_match, velocity_match, bdi_match].iter().filter(|b| **b).count();
    let likelihood = true_count as f64 / 4.0;
    let rating = rate_hatch(likelihood);

    let mut matched = Vec::new();
    let mut missed = Vec::new();
    for (name, ok) in [
        ("flow_percentile", flow_match),
        ("rising_limb", limb_match),
        ("velocity", velocity_match),
        ("bdi", bdi_match),
    ] {
        if ok {
            matched.push(name);
        } else {
            missed.push(name);
        }
    }
    let explanation = format!(
        "in season; matched [{}], missed [{}]",
        matched.join(", "),
        missed.join(", ")
    );

    HatchForecastResult { hatch_id: config.id.clone(), in_season: true, likelihood, rating, matches, explanation }
}

/// Confidence token carried alongside any QueryService-facing result.
pub fn confidence_token(result: &ConfidenceResult) -> (String, String) {
    (format!("{:?}", result.level).to_lowercase(), result.reasoning.clone())
}

pub fn flow_percentile_category_label(category: FlowPercentileCategory) -> &'static str {
    match category {
        FlowPercentileCategory::ExtremeLow => "extreme_low",
        FlowPercentileCategory::Low => "low",
        FlowPercentileCategory::BelowNormal => "below_normal",
        FlowPercentileCategory::Normal => "normal",
        FlowPercentileCategory::AboveNormal => "above_normal",
        FlowPercentileCategory::High => "high",
        FlowPercentileCategory::ExtremeHigh => "extreme_high",
        FlowPercentileCategory::Unknown => "unknown",
    }
}

pub fn velocity_category_label(category: VelocityCategory) -> &'static str {
    match category {
        VelocityCategory::TooSlow => "too_slow",
        VelocityCategory::Slow => "slow",
        VelocityCategory::Optimal => "optimal",
        VelocityCategory::Fast => "fast",
        VelocityCategory::TooFast => "too_fast",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species_config::{SpeciesWeights, TemperatureThresholds};

    fn species() -> SpeciesConfig {
        SpeciesConfig {
            id: "brown_trout".into(),
            display_name: "Brown Trout".into(),
            weights: SpeciesWeights { flow: 0.3, velocity: 0.3, thermal: 0.3, stability: 0.1 },
            velocity_range: [0.1, 0.3, 0.9, 1.5],
            flow_percentile_optimal: (40.0, 75.0),
            temperature_thresholds: TemperatureThresholds {
                optimal_min: 7.0,
                optimal_max: 16.0,
                stress: 21.0,
                critical: 25.0,
            },
            bdi_stability_threshold: 0.5,
        }
    }

    fn hatch() -> HatchConfig {
        HatchConfig {
            id: "pmd".into(),
            display_name: "Pale Morning Dun".into(),
            flow_percentile_range: (55.0, 80.0),
            allowed_rising_limb_intensities: vec![RisingLimbIntensity::Weak, RisingLimbIntensity::Moderate],
            velocity_range: (0.4, 0.9),
            min_bdi: 0.65,
            day_of_year_start: 135,
            day_of_year_end: 180,
        }
    }

    #[test]
    fn species_score_is_convex_combination_in_unit_interval() {
        let inputs = SpeciesScoreInputs {
            flow_percentile: Some(60.0),
            velocity_score: Some(0.8),
            bdi: Some(0.5),
            tsi: Some(0.9),
            short_horizon_flow_variability: Some(0.2),
        };
        let result = score_species(&species(), &inputs);
        let overall = result.overall.unwrap();
        assert!((0.0..=1.0).contains(&overall));
    }

    #[test]
    fn species_score_unknown_when_any_component_missing() {
        let inputs = SpeciesScoreInputs {
            flow_percentile: Some(60.0),
            velocity_score: Some(0.8),
            bdi: Some(0.5),
            tsi: None,
            short_horizon_flow_variability: Some(0.2),
        };
        let result = score_species(&species(), &inputs);
        assert!(result.overall.is_none());
        assert_eq!(result.rating, HabitatRating::Unknown);
    }

    #[test]
    fn species_rating_bands() {
        assert_eq!(rate_habitat(0.85), HabitatRating::Excellent);
        assert_eq!(rate_habitat(0.8), HabitatRating::Excellent);
        assert_eq!(rate_habitat(0.65), HabitatRating::Good);
        assert_eq!(rate_habitat(0.3), HabitatRating::Fair);
        assert_eq!(rate_habitat(0.1), HabitatRating::Poor);
    }

    #[test]
    fn hatch_out_of_season_scenario() {
        let inputs = HatchInputs {
            flow_percentile: Some(65.0),
            rising_limb_intensity: Some(RisingLimbIntensity::Weak),
            velocity: Some(0.6),
            bdi: Some(0.75),
        };
        let result = score_hatch(&hatch(), 100, &inputs);
        assert!(!result.in_season);
        assert_eq!(result.likelihood, 0.0);
        assert_eq!(result.rating, HatchRating::Unlikely);
    }

    #[test]
    fn hatch_full_match_scenario() {
        let inputs = HatchInputs {
            flow_percentile: Some(65.0),
            rising_limb_intensity: Some(RisingLimbIntensity::Weak),
            velocity: Some(0.6),
            bdi: Some(0.75),
        };
        let result = score_hatch(&hatch(), 150, &inputs);
        assert!(result.in_season);
        assert_eq!(result.likelihood, 1.0);
        assert_eq!(result.rating, HatchRating::VeryLikely);
        assert!(result.matches.flow_percentile);
        assert!(result.matches.rising_limb);
        assert!(result.matches.velocity);
        assert!(result.matches.bdi);
    }

    #[test]
    fn hatch_seasonal_gate_boundary_days_evaluate_normally() {
        let inputs = HatchInputs {
            flow_percentile: Some(65.0),
            rising_limb_intensity: Some(RisingLimbIntensity::Weak),
            velocity: Some(0.6),
            bdi: Some(0.75),
        };
        let first_day = score_hatch(&hatch(), 135, &inputs);
        let last_day = score_hatch(&hatch(), 180, &inputs);
        assert!(first_day.in_season);
        assert!(last_day.in_season);
        assert_eq!(first_day.likelihood, 1.0);
        assert_eq!(last_day.likelihood, 1.0);
    }

    #[test]
    fn hatch_determinism_same_inputs_same_outputs() {
        let inputs = HatchInputs {
            flow_percentile: Some(40.0),
            rising_limb_intensity: None,
            velocity: Some(0.2),
            bdi: Some(0.3),
        };
        let a = score_hatch(&hatch(), 150, &inputs);
        let b = score_hatch(&hatch(), 150, &inputs);
        assert_eq!(a.likelihood, b.likelihood);
        assert_eq!(a.rating, b.rating);
    }
}
