//! Position/wavelength mapping.
//!
//! The grating screw is calibrated with a straight line,
//! `wavelength = slope * position + intercept`, position in mm of screw travel
//! from the limit switch and wavelength in nm.

use crate::error::{SpectroError, SpectroResult};
use serde::{Deserialize, Serialize};

/// Positions this close below zero are rounding noise, not sign errors.
const POSITION_EPSILON: f64 = 1e-9;

/// Affine screw calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// nm per mm of screw travel. Negative on this instrument.
    pub slope: f64,
    /// Wavelength at the limit switch, nm.
    pub intercept: f64,
    /// Usable screw travel, mm.
    pub max_travel_mm: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            slope: -31.104_199_07,
            intercept: 800.0,
            max_travel_mm: 26.0,
        }
    }
}

impl Calibration {
    /// Build and validate a calibration.
    pub fn new(slope: f64, intercept: f64, max_travel_mm: f64) -> SpectroResult<Self> {
        let cal = Self {
            slope,
            intercept,
            max_travel_mm,
        };
        cal.validate()?;
        Ok(cal)
    }

    /// Reject constants that cannot describe a screw.
    pub fn validate(&self) -> SpectroResult<()> {
        if !self.slope.is_finite() || self.slope == 0.0 {
            return Err(SpectroError::Configuration(format!(
                "calibration slope must be finite and non-zero, got {}",
                self.slope
            )));
        }
        if !self.intercept.is_finite() {
            return Err(SpectroError::Configuration(
                "calibration intercept must be finite".into(),
            ));
        }
        if !(self.max_travel_mm.is_finite() && self.max_travel_mm > 0.0) {
            return Err(SpectroError::Configuration(format!(
                "max travel must be positive, got {}",
                self.max_travel_mm
            )));
        }
        Ok(())
    }

    /// Wavelength at a screw position.
    pub fn wavelength_of(&self, position_mm: f64) -> f64 {
        self.slope * position_mm + self.intercept
    }

    /// Screw position for a wavelength.
    ///
    /// Travel is non-negative from the limit switch. A negative algebraic
    /// result means the wavelength lies on the wrong side of the intercept
    /// for this slope and is reported as [`SpectroError::InvalidCalibration`].
    pub fn position_of(&self, wavelength_nm: f64) -> SpectroResult<f64> {
        let raw = (wavelength_nm - self.intercept) / self.slope;
        if !raw.is_finite() {
            return Err(SpectroError::InvalidCalibration(format!(
                "no finite position for {} nm",
                wavelength_nm
            )));
        }
        if raw < -POSITION_EPSILON {
            return Err(SpectroError::InvalidCalibration(format!(
                "{} nm maps to negative travel {:.6} mm (slope {}, intercept {})",
                wavelength_nm, raw, self.slope, self.intercept
            )));
        }
        Ok(raw.abs())
    }

    /// Position for a wavelength, also checked against the usable travel.
    pub fn reachable_position_of(&self, wavelength_nm: f64) -> SpectroResult<f64> {
        let position = self.position_of(wavelength_nm)?;
        if position > self.max_travel_mm {
            return Err(SpectroError::Configuration(format!(
                "{} nm needs {:.4} mm of travel, beyond the {} mm available",
                wavelength_nm, position, self.max_travel_mm
            )));
        }
        Ok(position)
    }

    /// Wavelength range covered by the usable travel, as (low, high).
    pub fn wavelength_range(&self) -> (f64, f64) {
        let a = self.wavelength_of(0.0);
        let b = self.wavelength_of(self.max_travel_mm);
        (a.min(b), a.max(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_default() {
        let cal = Calibration::default();
        for i in 0..=260 {
            let p = i as f64 * 0.1;
            let back = cal.position_of(cal.wavelength_of(p)).unwrap();
            assert!((back - p).abs() < 1e-9, "p={} back={}", p, back);
        }
    }

    #[test]
    fn round_trip_alternate_constants() {
        let cal = Calibration::new(-32.02, 886.13, 26.0).unwrap();
        for p in [0.0, 0.5, 3.3, 12.75, 25.9] {
            let back = cal.position_of(cal.wavelength_of(p)).unwrap();
            assert!((back - p).abs() < 1e-9);
        }
    }

    #[test]
    fn wavelength_beyond_intercept_is_calibration_error() {
        let cal = Calibration::default();
        let err = cal.position_of(850.0).unwrap_err();
        assert!(matches!(err, SpectroError::InvalidCalibration(_)));
    }

    #[test]
    fn intercept_maps_to_zero() {
        let cal = Calibration::default();
        let p = cal.position_of(800.0).unwrap();
        assert_eq!(p, 0.0);
        assert!(p.is_sign_positive());
    }

    #[test]
    fn travel_limit_is_configuration_error() {
        let cal = Calibration::default();
        assert!(cal.reachable_position_of(400.0).is_ok());
        let err = cal.reachable_position_of(100.0).unwrap_err();
        assert!(matches!(err, SpectroError::Configuration(_)));
    }

    #[test]
    fn zero_slope_rejected() {
        assert!(Calibration::new(0.0, 800.0, 26.0).is_err());
    }

    #[test]
    fn range_is_ordered() {
        let (lo, hi) = Calibration::default().wavelength_range();
        assert!(lo < hi);
        assert_eq!(hi, 800.0);
    }
}
