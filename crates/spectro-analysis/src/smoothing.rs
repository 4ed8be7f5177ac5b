//! Savitzky-Golay smoothing.

use crate::linalg::{polyfit, polyval};
use spectro_core::{SpectroError, SpectroResult};

/// Moving least-squares polynomial smoother.
///
/// Each output point is the value at that point of an order-`order`
/// polynomial fitted to the `window` surrounding samples. Near the ends the
/// first (or last) full window is used and its polynomial evaluated at the
/// edge points, so the output has the same length as the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavitzkyGolay {
    /// Odd window length.
    pub window: usize,
    /// Polynomial order, below `window`.
    pub order: usize,
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self { window: 15, order: 2 }
    }
}

impl SavitzkyGolay {
    /// Validated smoother.
    pub fn new(window: usize, order: usize) -> SpectroResult<Self> {
        if window % 2 == 0 || window <= order {
            return Err(SpectroError::Configuration(format!(
                "Savitzky-Golay window {} must be odd and larger than order {}",
                window, order
            )));
        }
        Ok(Self { window, order })
    }

    /// Smooth `values`.
    ///
    /// Traces shorter than the window use the largest odd window that fits;
    /// when that is not larger than the order the trace is returned as is.
    pub fn apply(&self, values: &[f64]) -> SpectroResult<Vec<f64>> {
        let n = values.len();
        let mut window = self.window.min(n);
        if window % 2 == 0 {
            window = window.saturating_sub(1);
        }
        if window <= self.order {
            return Ok(values.to_vec());
        }

        let half = window / 2;
        let local_x: Vec<f64> = (0..window).map(|j| j as f64 - half as f64).collect();

        let mut out = Vec::with_capacity(n);
        let mut cached: Option<(usize, Vec<f64>)> = None;
        for i in 0..n {
            let start = i.saturating_sub(half).min(n - window);
            let coefficients = match &cached {
                Some((s, c)) if *s == start => c.clone(),
                _ => {
                    let c = polyfit(&local_x, &values[start..start + window], self.order)?;
                    cached = Some((start, c.clone()));
                    c
                }
            };
            let t = i as f64 - (start + half) as f64;
            out.push(polyval(&coefficients, t));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_even_window() {
        assert!(SavitzkyGolay::new(10, 2).is_err());
        assert!(SavitzkyGolay::new(3, 3).is_err());
        assert!(SavitzkyGolay::new(11, 2).is_ok());
    }

    #[test]
    fn preserves_quadratics() {
        let y: Vec<f64> = (0..40).map(|i| 0.5 + 0.1 * i as f64 - 0.003 * (i * i) as f64).collect();
        let out = SavitzkyGolay::default().apply(&y).unwrap();
        for (a, b) in out.iter().zip(&y) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn reduces_alternating_noise() {
        let y: Vec<f64> = (0..60)
            .map(|i| 1.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let out = SavitzkyGolay::new(11, 2).unwrap().apply(&y).unwrap();
        let spread = out.iter().fold(0.0f64, |m, v| m.max((v - 1.0).abs()));
        assert!(spread < 0.05);
        assert_eq!(out.len(), y.len());
    }

    #[test]
    fn short_traces_pass_through() {
        let y = [1.0, 5.0];
        assert_eq!(SavitzkyGolay::default().apply(&y).unwrap(), y.to_vec());
        assert!(SavitzkyGolay::default().apply(&[]).unwrap().is_empty());
    }
}
