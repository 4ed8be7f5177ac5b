//! Absorbance from voltage pairs.
//!
//! Absorbance is `log10(reference / sample)`. Both photodiodes deliver
//! negative-going pulses, so a valid pair has voltages of the same sign and
//! the ratio is positive.

use spectro_core::{AbsorbanceResult, SpectroError, SpectroResult};

/// Absorbance of one voltage pair.
///
/// Returns [`AbsorbanceResult::Invalid`] when the sample voltage is zero,
/// either voltage is not finite, or the ratio is not positive.
pub fn compute_absorbance(reference_v: f64, sample_v: f64) -> AbsorbanceResult {
    if sample_v == 0.0 || !reference_v.is_finite() || !sample_v.is_finite() {
        return AbsorbanceResult::Invalid;
    }
    let ratio = reference_v / sample_v;
    if !(ratio > 0.0) || !ratio.is_finite() {
        return AbsorbanceResult::Invalid;
    }
    AbsorbanceResult::from(ratio.log10())
}

/// Absorbance of one voltage pair, as an error when there is none.
///
/// A zero sample voltage is [`SpectroError::DivisionByZero`]; other invalid
/// pairs are [`SpectroError::Numeric`].
pub fn absorbance_checked(index: usize, reference_v: f64, sample_v: f64) -> SpectroResult<f64> {
    if sample_v == 0.0 {
        return Err(SpectroError::DivisionByZero {
            index,
            sample_voltage: sample_v,
        });
    }
    compute_absorbance(reference_v, sample_v).value().ok_or_else(|| {
        SpectroError::Numeric(format!(
            "no absorbance for reference {} V / sample {} V at point {}",
            reference_v, sample_v, index
        ))
    })
}

/// Absorbance of two parallel voltage series.
pub fn absorbance_series(reference: &[f64], sample: &[f64]) -> SpectroResult<Vec<AbsorbanceResult>> {
    check_lengths(reference, sample)?;
    Ok(reference
        .iter()
        .zip(sample)
        .map(|(&r, &s)| compute_absorbance(r, s))
        .collect())
}

/// Clamp sample voltages that exceed their reference in magnitude.
///
/// Where `|reference[i]| < |sample[i]|` (detector mismatch; impossible with
/// ideal photodiodes) the sample voltage is replaced by the reference
/// voltage, which makes the absorbance at that index exactly zero. Applying
/// the correction twice gives the same result as applying it once.
pub fn negative_absorbance_correction(
    reference: &[f64],
    sample: &[f64],
) -> SpectroResult<(Vec<f64>, Vec<f64>)> {
    check_lengths(reference, sample)?;
    let corrected = reference
        .iter()
        .zip(sample)
        .map(|(&r, &s)| if r.abs() < s.abs() { r } else { s })
        .collect();
    Ok((reference.to_vec(), corrected))
}

/// Replace invalid points with the previous finite value.
///
/// Leading invalid points take the first finite value. A series with no
/// finite value at all is a [`SpectroError::Numeric`] error.
pub fn fill_invalid(values: &[AbsorbanceResult]) -> SpectroResult<Vec<f64>> {
    let first = values
        .iter()
        .find_map(|v| v.value())
        .ok_or_else(|| SpectroError::Numeric("absorbance trace has no finite value".into()))?;

    let mut last = first;
    Ok(values
        .iter()
        .map(|v| {
            if let Some(x) = v.value() {
                last = x;
            }
            last
        })
        .collect())
}

fn check_lengths(reference: &[f64], sample: &[f64]) -> SpectroResult<()> {
    if reference.len() != sample.len() {
        return Err(SpectroError::Numeric(format!(
            "voltage series lengths differ: reference {} vs sample {}",
            reference.len(),
            sample.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_log_ratio() {
        let a = compute_absorbance(2.0, 0.5).value().unwrap();
        assert!((a - 4f64.log10()).abs() < 1e-12);
    }

    #[test]
    fn negative_pulses_are_valid() {
        let a = compute_absorbance(-1.2, -0.6).value().unwrap();
        assert!((a - 2f64.log10()).abs() < 1e-12);
    }

    #[test]
    fn zero_and_opposite_sign_are_invalid() {
        assert_eq!(compute_absorbance(1.0, 0.0), AbsorbanceResult::Invalid);
        assert_eq!(compute_absorbance(1.0, -0.5), AbsorbanceResult::Invalid);
        assert_eq!(compute_absorbance(f64::NAN, 0.5), AbsorbanceResult::Invalid);
        assert_eq!(compute_absorbance(0.0, 0.5), AbsorbanceResult::Invalid);
    }

    #[test]
    fn checked_reports_division_by_zero() {
        let err = absorbance_checked(7, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, SpectroError::DivisionByZero { index: 7, .. }));
        assert!(matches!(
            absorbance_checked(1, 1.0, -1.0),
            Err(SpectroError::Numeric(_))
        ));
    }

    #[test]
    fn correction_clamps_only_mismatched_points() {
        let reference = [-1.0, -1.0, -0.5];
        let sample = [-0.8, -1.3, -0.5];
        let (r, s) = negative_absorbance_correction(&reference, &sample).unwrap();
        assert_eq!(r, reference.to_vec());
        assert_eq!(s, vec![-0.8, -1.0, -0.5]);
    }

    #[test]
    fn correction_rejects_length_mismatch() {
        assert!(negative_absorbance_correction(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn fill_forward_and_leading() {
        let values = [
            AbsorbanceResult::Invalid,
            AbsorbanceResult::Value(0.2),
            AbsorbanceResult::Invalid,
            AbsorbanceResult::Value(0.4),
        ];
        assert_eq!(fill_invalid(&values).unwrap(), vec![0.2, 0.2, 0.2, 0.4]);
        assert!(fill_invalid(&[AbsorbanceResult::Invalid]).is_err());
    }
}
