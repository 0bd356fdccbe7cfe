//! Decimal ↔ f64 conversion for the one remaining Decimal usage: reach
//! centroid latitude/longitude, where geospatial precision matters enough to
//! store as `NUMERIC` rather than `double precision`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Convert an f64 to Decimal preserving full precision.
pub(crate) fn f64_to_decimal_full(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_full received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_f64(v).unwrap_or_else(|| Decimal::new(v as i64, 0))
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_f64_to_decimal_full_normal() {
        let d = f64_to_decimal_full(3.14);
        assert!(d > Decimal::ZERO);
    }

    #[test]
    fn test_f64_to_decimal_full_nan() {
        assert_eq!(f64_to_decimal_full(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_f64_to_decimal_full_infinity() {
        assert_eq!(f64_to_decimal_full(f64::INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_dec_to_f64_normal() {
        let d = Decimal::from_str("3.14").unwrap();
        assert!((dec_to_f64(d) - 3.14).abs() < 1e-10);
    }

    #[test]
    fn test_dec_to_f64_zero() {
        assert_eq!(dec_to_f64(Decimal::ZERO), 0.0);
    }
}
