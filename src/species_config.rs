//! Static species/hatch configuration, loaded once at startup.
//!
//! These documents drive ScoringEngine entirely; no threshold in `scoring.rs` is
//! hard-coded against a species. A document that fails `validate()` must abort
//! startup rather than run with defaults silently substituted (`spec.md` §7).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config directory {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
    #[error("invalid config document {path}: {source}")]
    Invalid { path: String, source: ConfigValidationError },
    #[error("duplicate species id '{0}' across config documents")]
    DuplicateSpecies(String),
    #[error("duplicate hatch id '{0}' across config documents")]
    DuplicateHatch(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("species '{species}' weights sum to {sum}, expected 1.0 +/- 1e-6")]
    WeightsNotNormalized { species: String, sum: f64 },
    #[error("species '{species}' velocity range is not monotone: {0:?}", .range)]
    VelocityRangeNotMonotone { species: String, range: [f64; 4] },
    #[error("species '{species}' flow-percentile optimal range is not monotone: {min}..{max}")]
    FlowPercentileRangeNotMonotone { species: String, min: f64, max: f64 },
    #[error("species '{species}' temperature thresholds are not monotone: {0:?}", .thresholds)]
    TemperatureThresholdsNotMonotone { species: String, thresholds: [f64; 4] },
    #[error("hatch '{hatch}' day-of-year window out of [1, 366]: {start}..{end}")]
    DayOfYearWindowOutOfRange { hatch: String, start: u16, end: u16 },
    #[error("hatch '{hatch}' day-of-year window is not ordered: start {start} > end {end}")]
    DayOfYearWindowNotOrdered { hatch: String, start: u16, end: u16 },
}

/// Component weights for the species habitat score. Must sum to 1.0 +/- 1e-6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpeciesWeights {
    pub flow: f64,
    pub velocity: f64,
    pub thermal: f64,
    pub stability: f64,
}

impl SpeciesWeights {
    pub fn sum(&self) -> f64 {
        self.flow + self.velocity + self.thermal + self.stability
    }
}

/// `[min_tolerable, min_optimal, max_optimal, max_tolerable]`, monotone non-decreasing.
pub type VelocityRange = [f64; 4];

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureThresholds {
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub stress: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub id: String,
    pub display_name: String,
    pub weights: SpeciesWeights,
    pub velocity_range: VelocityRange,
    /// Flow-percentile optimal range, e.g. `(40.0, 75.0)`.
    pub flow_percentile_optimal: (f64, f64),
    pub temperature_thresholds: TemperatureThresholds,
    pub bdi_stability_threshold: f64,
}

impl SpeciesConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigValidationError::WeightsNotNormalized {
                species: self.id.clone(),
                sum,
            });
        }
        let v = self.velocity_range;
        if !(v[0] <= v[1] && v[1] <= v[2] && v[2] <= v[3]) {
            return Err(ConfigValidationError::VelocityRangeNotMonotone {
                species: self.id.clone(),
                range: v,
            });
        }
        if self.flow_percentile_optimal.0 > self.flow_percentile_optimal.1 {
            return Err(ConfigValidationError::FlowPercentileRangeNotMonotone {
                species: self.id.clone(),
                min: self.flow_percentile_optimal.0,
                max: self.flow_percentile_optimal.1,
            });
        }
        let t = self.temperature_thresholds;
        if !(t.optimal_min <= t.optimal_max && t.optimal_max <= t.stress && t.stress <= t.critical)
        {
            return Err(ConfigValidationError::TemperatureThresholdsNotMonotone {
                species: self.id.clone(),
                thresholds: [t.optimal_min, t.optimal_max, t.stress, t.critical],
            });
        }
        Ok(())
    }
}

/// Hydrologic signature + temporal window a hatch requires to be considered likely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatchConfig {
    pub id: String,
    pub display_name: String,
    pub flow_percentile_range: (f64, f64),
    pub allowed_rising_limb_intensities: Vec<crate::services::metrics::RisingLimbIntensity>,
    pub velocity_range: (f64, f64),
    pub min_bdi: f64,
    /// Inclusive day-of-year window, `[1, 366]`.
    pub day_of_year_start: u16,
    pub day_of_year_end: u16,
}

impl HatchConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.day_of_year_start < 1
            || self.day_of_year_start > 366
            || self.day_of_year_end < 1
            || self.day_of_year_end > 366
        {
            return Err(ConfigValidationError::DayOfYearWindowOutOfRange {
                hatch: self.id.clone(),
                start: self.day_of_year_start,
                end: self.day_of_year_end,
            });
        }
        if self.day_of_year_start > self.day_of_year_end {
            return Err(ConfigValidationError::DayOfYearWindowNotOrdered {
                hatch: self.id.clone(),
                start: self.day_of_year_start,
                end: self.day_of_year_end,
            });
        }
        Ok(())
    }

    pub fn in_season(&self, day_of_year: u32) -> bool {
        let d = day_of_year as u16;
        d >= self.day_of_year_start && d <= self.day_of_year_end
    }
}

/// Loads every `*.species.json` document in `dir`, validating each and
/// keying the result by `id`. Any read, parse or validation failure aborts
/// the whole load — no document is applied partially (`spec.md` §7).
pub fn load_species_configs(dir: &Path) -> Result<HashMap<String, SpeciesConfig>, ConfigLoadError> {
    let mut out = HashMap::new();
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigLoadError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ConfigLoadError::Io { path: dir.display().to_string(), source })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json")
            || !path.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.ends_with(".species"))
        {
            continue;
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| ConfigLoadError::Io { path: path.display().to_string(), source })?;
        let config: SpeciesConfig = serde_json::from_str(&contents)
            .map_err(|source| ConfigLoadError::Parse { path: path.display().to_string(), source })?;
        config
            .validate()
            .map_err(|source| ConfigLoadError::Invalid { path: path.display().to_string(), source })?;
        if out.contains_key(&config.id) {
            return Err(ConfigLoadError::DuplicateSpecies(config.id));
        }
        out.insert(config.id.clone(), config);
    }
    Ok(out)
}

/// Loads every `*.hatch.json` document in `dir`, analogous to
/// [`load_species_configs`].
pub fn load_hatch_configs(dir: &Path) -> Result<HashMap<String, HatchConfig>, ConfigLoadError> {
    let mut out = HashMap::new();
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigLoadError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ConfigLoadError::Io { path: dir.display().to_string(), source })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json")
            || !path.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.ends_with(".hatch"))
        {
            continue;
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| ConfigLoadError::Io { path: path.display().to_string(), source })?;
        let config: HatchConfig = serde_json::from_str(&contents)
            .map_err(|source| ConfigLoadError::Parse { path: path.display().to_string(), source })?;
        config
            .validate()
            .map_err(|source| ConfigLoadError::Invalid { path: path.display().to_string(), source })?;
        if out.contains_key(&config.id) {
            return Err(ConfigLoadError::DuplicateHatch(config.id));
        }
        out.insert(config.id.clone(), config);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metrics::RisingLimbIntensity;

    fn valid_species() -> SpeciesConfig {
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

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut cfg = valid_species();
        cfg.weights.stability = 0.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::WeightsNotNormalized { .. })
        ));
    }

    #[test]
    fn accepts_weights_within_epsilon() {
        let mut cfg = valid_species();
        cfg.weights.stability = 0.1 + 1e-9;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_non_monotone_velocity_range() {
        let mut cfg = valid_species();
        cfg.velocity_range = [0.3, 0.1, 0.9, 1.5];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::VelocityRangeNotMonotone { .. })
        ));
    }

    #[test]
    fn hatch_window_bounds_checked() {
        let mut cfg = HatchConfig {
            id: "pmd".into(),
            display_name: "Pale Morning Dun".into(),
            flow_percentile_range: (55.0, 80.0),
            allowed_rising_limb_intensities: vec![RisingLimbIntensity::Weak],
            velocity_range: (0.4, 0.9),
            min_bdi: 0.65,
            day_of_year_start: 135,
            day_of_year_end: 180,
        };
        assert!(cfg.validate().is_ok());
        cfg.day_of_year_end = 400;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::DayOfYearWindowOutOfRange { .. })
        ));
    }

    #[test]
    fn hatch_in_season_is_inclusive() {
        let cfg = HatchConfig {
            id: "pmd".into(),
            display_name: "Pale Morning Dun".into(),
            flow_percentile_range: (55.0, 80.0),
            allowed_rising_limb_intensities: vec![RisingLimbIntensity::Weak],
            velocity_range: (0.4, 0.9),
            min_bdi: 0.65,
            day_of_year_start: 135,
            day_of_year_end: 180,
        };
        assert!(cfg.in_season(135));
        assert!(cfg.in_season(180));
        assert!(!cfg.in_season(134));
        assert!(!cfg.in_season(181));
    }
}
