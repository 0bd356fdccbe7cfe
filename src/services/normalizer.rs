//! Normalizer: translates a validated frame plus `(product, cycle_time,
//! forecast_hour)` into canonical `HydroRecord`s with an absolute `valid_time`.
//! Product-specific filenames and offsets never reach this module's output.

use chrono::{DateTime, Utc};

use crate::domain::HydroRecord;
use crate::products::{analysis_valid_time, forecast_valid_time, Product};
use crate::services::validator::ValidatedFrame;

/// Normalize one cycle's validated frame into canonical records.
///
/// `forecast_hour` is the offset this artifact was fetched for; for the
/// analysis-family products it is ignored (analysis has no offset concept).
/// `ingested_at` is supplied by the caller (the Loader stamps it, but the
/// Normalizer's output is deterministic given this input so tests can pin it).
pub fn normalize(
    frame: ValidatedFrame,
    product: Product,
    cycle_time: DateTime<Utc>,
    forecast_hour: Option<i32>,
    ingested_at: DateTime<Utc>,
) -> Vec<HydroRecord> {
    let source = product.canonical_source();

    match product {
        Product::Analysis | Product::AnalysisNoAssim => frame
            .frame
            .rows
            .into_iter()
            .map(|row| HydroRecord {
                feature_id: row.feature_id,
                valid_time: analysis_valid_time(cycle_time),
                variable: row.variable,
                value: row.value,
                source,
                forecast_hour: None,
                ingested_at,
            })
            .collect(),

        Product::ShortForecast => {
            let h = match forecast_hour {
                Some(h) if h >= 1 => h,
                // h == 0 or absent: spec says 0 is never "current"; discard.
                _ => return Vec::new(),
            };
            frame
                .frame
                .rows
                .into_iter()
                .map(|row| HydroRecord {
                    feature_id: row.feature_id,
                    valid_time: forecast_valid_time(cycle_time, h),
                    variable: row.variable,
                    value: row.value,
                    source,
                    forecast_hour: Some(h),
                    ingested_at,
                })
                .collect()
        }

        Product::MediumForecastBlend => {
            let h = match forecast_hour {
                Some(h) => h,
                None => return Vec::new(),
            };
            frame
                .frame
                .rows
                .into_iter()
                .map(|row| HydroRecord {
                    feature_id: row.feature_id,
                    valid_time: forecast_valid_time(cycle_time, h),
                    variable: row.variable,
                    value: row.value,
                    source,
                    forecast_hour: Some(h),
                    ingested_at,
                })
                .collect()
        }
    }
}

/// Stable sort for round-trip comparisons: `(feature_id, valid_time, variable)`.
pub fn sort_key(record: &HydroRecord) -> (i64, DateTime<Utc>, &'static str) {
    (record.feature_id, record.valid_time, record.variable.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ParsedFrame, ParsedRow};
    use crate::domain::{Source, Variable};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn validated(rows: Vec<ParsedRow>) -> ValidatedFrame {
        ValidatedFrame { frame: ParsedFrame { domain: "t".into(), variable_units: HashMap::new(), rows } }
    }

    #[test]
    fn analysis_valid_time_equals_cycle_time_and_forecast_hour_absent() {
        let cycle = Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap();
        let now = Utc::now();
        let records = normalize(
            validated(vec![ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(5.0), unrecognized_sentinel: false }]),
            Product::Analysis,
            cycle,
            None,
            now,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].valid_time, cycle);
        assert_eq!(records[0].forecast_hour, None);
        assert_eq!(records[0].source, Source::Analysis);
    }

    #[test]
    fn short_forecast_offset_zero_is_discarded() {
        let cycle = Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap();
        let records = normalize(
            validated(vec![ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(5.0), unrecognized_sentinel: false }]),
            Product::ShortForecast,
            cycle,
            Some(0),
            Utc::now(),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn short_forecast_offset_one_sets_valid_time_and_forecast_hour() {
        let cycle = Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap();
        let records = normalize(
            validated(vec![ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(5.0), unrecognized_sentinel: false }]),
            Product::ShortForecast,
            cycle,
            Some(1),
            Utc::now(),
        );
        assert_eq!(records[0].valid_time, Utc.with_ymd_and_hms(2026, 1, 1, 7, 0, 0).unwrap());
        assert_eq!(records[0].forecast_hour, Some(1));
        assert_eq!(records[0].source, Source::ShortForecast);
    }

    #[test]
    fn medium_blend_offset_sets_valid_time() {
        let cycle = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let records = normalize(
            validated(vec![ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(5.0), unrecognized_sentinel: false }]),
            Product::MediumForecastBlend,
            cycle,
            Some(24),
            Utc::now(),
        );
        assert_eq!(records[0].valid_time, Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(records[0].source, Source::MediumForecastBlend);
    }

    #[test]
    fn normalizer_round_trip_is_order_independent_after_sort() {
        let cycle = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![
            ParsedRow { feature_id: 2, variable: Variable::Velocity, value: Some(1.0), unrecognized_sentinel: false },
            ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(2.0), unrecognized_sentinel: false },
        ];
        let a = normalize(validated(rows.clone()), Product::Analysis, cycle, None, Utc::now());
        let b = normalize(validated(rows), Product::Analysis, cycle, None, Utc::now());

        let mut a_sorted = a;
        let mut b_sorted = b;
        a_sorted.sort_by_key(|r| (r.feature_id, r.valid_time, r.variable.as_str()));
        b_sorted.sort_by_key(|r| (r.feature_id, r.valid_time, r.variable.as_str()));

        let strip_ts = |v: &Vec<HydroRecord>| {
            v.iter().map(|r| (r.feature_id, r.valid_time, r.variable, r.value, r.source, r.forecast_hour)).collect::<Vec<_>>()
        };
        assert_eq!(strip_ts(&a_sorted), strip_ts(&b_sorted));
    }
}
