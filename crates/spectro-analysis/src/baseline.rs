//! Baseline models.
//!
//! Three interchangeable ways to cancel the instrument offset of an
//! absorbance trace:
//!
//! - [`MeanBlank`]: subtract the mean of a recorded blank trace
//! - [`Als`]: asymmetric least squares smoothing of the trace itself
//!   (Eilers & Boelens, 2005)
//! - [`PolynomialBaseline`]: low-degree polynomial fitted to a recorded blank
//!
//! All of them implement [`BaselineModel`], which evaluates the baseline at
//! the wavelengths of the trace being corrected.

use crate::linalg::{polyfit, polyval, Pentadiagonal};
use spectro_core::config::BaselineSettings;
use spectro_core::{SpectroError, SpectroResult};
use tracing::debug;

/// Something that produces a baseline for a trace.
pub trait BaselineModel: Send + Sync {
    /// Short name for logs and file metadata.
    fn name(&self) -> &'static str;

    /// Baseline sampled at `wavelengths`, for trace `values`.
    fn baseline(&self, wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<f64>>;

    /// `values - baseline`, pointwise.
    fn subtract(&self, wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<f64>> {
        let base = self.baseline(wavelengths, values)?;
        Ok(values.iter().zip(&base).map(|(v, b)| v - b).collect())
    }
}

fn check_same_len(wavelengths: &[f64], values: &[f64]) -> SpectroResult<()> {
    if wavelengths.len() != values.len() {
        return Err(SpectroError::Numeric(format!(
            "{} wavelengths for {} values",
            wavelengths.len(),
            values.len()
        )));
    }
    if values.is_empty() {
        return Err(SpectroError::Numeric("empty trace".into()));
    }
    Ok(())
}

// =============================================================================
// Mean of a blank
// =============================================================================

/// Constant baseline: the mean absorbance of a blank recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanBlank {
    /// Mean blank absorbance.
    pub offset: f64,
}

impl MeanBlank {
    /// Mean of the finite values of a blank trace.
    pub fn from_blank(blank: &[f64]) -> SpectroResult<Self> {
        let finite: Vec<f64> = blank.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(SpectroError::Numeric("blank trace has no finite value".into()));
        }
        let offset = finite.iter().sum::<f64>() / finite.len() as f64;
        Ok(Self { offset })
    }
}

impl BaselineModel for MeanBlank {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn baseline(&self, _wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<f64>> {
        Ok(vec![self.offset; values.len()])
    }
}

// =============================================================================
// Asymmetric least squares
// =============================================================================

/// Asymmetric least squares baseline.
///
/// Each pass solves `(W + λ DᵀD) z = W y` with `D` the second-difference
/// operator, then re-weights: points above the fit get weight `p`, points at
/// or below it `1 - p`. Stops when the fit moves by less than `tolerance`
/// (max norm) between passes, or after `max_iter` passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Als {
    /// Smoothness weight.
    pub lambda: f64,
    /// Asymmetry weight in (0, 1).
    pub p: f64,
    /// Pass limit.
    pub max_iter: usize,
    /// Convergence threshold on the fitted curve.
    pub tolerance: f64,
}

impl Default for Als {
    fn default() -> Self {
        Self {
            lambda: 1e6,
            p: 0.1,
            max_iter: 10,
            tolerance: 1e-6,
        }
    }
}

/// Result of an ALS fit.
#[derive(Debug, Clone, PartialEq)]
pub struct AlsFit {
    /// Fitted baseline.
    pub baseline: Vec<f64>,
    /// Passes performed.
    pub iterations: usize,
    /// Max-norm change of the fit in the last pass.
    pub last_change: f64,
    /// Whether `last_change < tolerance`.
    pub converged: bool,
}

impl Als {
    /// Fit a baseline under `y`.
    pub fn fit(&self, y: &[f64]) -> SpectroResult<AlsFit> {
        if y.is_empty() {
            return Err(SpectroError::Numeric("ALS on empty trace".into()));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(SpectroError::Numeric("ALS input contains non-finite values".into()));
        }
        if !(self.p > 0.0 && self.p < 1.0) || !(self.lambda > 0.0) || self.max_iter == 0 {
            return Err(SpectroError::Configuration(format!(
                "invalid ALS parameters: lambda {}, p {}, max_iter {}",
                self.lambda, self.p, self.max_iter
            )));
        }

        let penalty = Pentadiagonal::second_difference_penalty(y.len(), self.lambda);
        let mut weights = vec![1.0; y.len()];
        let mut z: Vec<f64> = Vec::new();
        let mut last_change = f64::INFINITY;
        let mut iterations = 0;

        while iterations < self.max_iter {
            iterations += 1;
            let rhs: Vec<f64> = weights.iter().zip(y).map(|(w, v)| w * v).collect();
            let next = penalty.solve_with_diagonal(&weights, &rhs)?;

            if !z.is_empty() {
                last_change = next
                    .iter()
                    .zip(&z)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
            }
            for ((w, &yi), &zi) in weights.iter_mut().zip(y).zip(&next) {
                *w = if yi > zi { self.p } else { 1.0 - self.p };
            }
            z = next;

            if last_change < self.tolerance {
                break;
            }
        }

        let converged = last_change < self.tolerance;
        debug!(iterations, last_change, converged, "ALS baseline fitted");
        Ok(AlsFit {
            baseline: z,
            iterations,
            last_change,
            converged,
        })
    }
}

impl BaselineModel for Als {
    fn name(&self) -> &'static str {
        "als"
    }

    fn baseline(&self, wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<f64>> {
        check_same_len(wavelengths, values)?;
        Ok(self.fit(values)?.baseline)
    }
}

// =============================================================================
// Polynomial fit of a blank
// =============================================================================

/// Polynomial fitted to a blank recording.
///
/// Wavelengths are centered and scaled to [-1, 1] before fitting so the
/// normal equations stay well conditioned.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialBaseline {
    /// Coefficients in scaled wavelength, constant term first.
    pub coefficients: Vec<f64>,
    /// Chosen degree.
    pub degree: usize,
    /// Coefficient of determination on the blank.
    pub r_squared: f64,
    center: f64,
    half_span: f64,
}

impl PolynomialBaseline {
    /// Fit degrees `0..=max_degree` to the blank and keep the best.
    ///
    /// Degrees are compared by adjusted R², which only rewards an extra
    /// coefficient when it explains more than it costs; ties keep the lower
    /// degree.
    pub fn fit(wavelengths: &[f64], blank: &[f64], max_degree: usize) -> SpectroResult<Self> {
        check_same_len(wavelengths, blank)?;
        let (lo, hi) = wavelengths
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &w| (lo.min(w), hi.max(w)));
        let center = (lo + hi) / 2.0;
        let half_span = if hi > lo { (hi - lo) / 2.0 } else { 1.0 };
        let x: Vec<f64> = wavelengths.iter().map(|w| (w - center) / half_span).collect();

        let n = blank.len();
        let mean = blank.iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = blank.iter().map(|v| (v - mean).powi(2)).sum();
        let sum_sq: f64 = blank.iter().map(|v| v * v).sum();
        let flat = ss_tot <= f64::EPSILON * sum_sq;

        let mut best: Option<(f64, PolynomialBaseline)> = None;
        for degree in 0..=max_degree.min(2) {
            if n < degree + 1 {
                break;
            }
            let coefficients = polyfit(&x, blank, degree)?;
            let ss_res: f64 = x
                .iter()
                .zip(blank)
                .map(|(&xi, &yi)| (yi - polyval(&coefficients, xi)).powi(2))
                .sum();
            let r_squared = if flat { 1.0 } else { 1.0 - ss_res / ss_tot };
            let dof = n as f64 - degree as f64 - 1.0;
            let adjusted = if dof > 0.0 && !flat {
                1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / dof
            } else {
                r_squared
            };

            let better = match &best {
                None => true,
                Some((score, _)) => adjusted > *score + 1e-12,
            };
            if better {
                best = Some((
                    adjusted,
                    PolynomialBaseline {
                        coefficients,
                        degree,
                        r_squared,
                        center,
                        half_span,
                    },
                ));
            }
        }

        let (_, model) =
            best.ok_or_else(|| SpectroError::Numeric("polynomial baseline: no degree fits".into()))?;
        debug!(degree = model.degree, r_squared = model.r_squared, "polynomial baseline fitted");
        Ok(model)
    }

    /// Baseline value at one wavelength.
    pub fn evaluate(&self, wavelength_nm: f64) -> f64 {
        polyval(&self.coefficients, (wavelength_nm - self.center) / self.half_span)
    }
}

impl BaselineModel for PolynomialBaseline {
    fn name(&self) -> &'static str {
        "polynomial"
    }

    fn baseline(&self, wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<f64>> {
        check_same_len(wavelengths, values)?;
        Ok(wavelengths.iter().map(|&w| self.evaluate(w)).collect())
    }
}

// =============================================================================
// Construction from configuration
// =============================================================================

/// A recorded blank: wavelengths and absorbance.
#[derive(Debug, Clone, Copy)]
pub struct Blank<'a> {
    /// Wavelength column.
    pub wavelengths: &'a [f64],
    /// Absorbance column.
    pub absorbance: &'a [f64],
}

/// Build the configured baseline model.
///
/// `Mean` and `Polynomial` need a recorded blank; `Als` works on the trace
/// alone; `None` yields no model.
pub fn model_from_settings(
    settings: &BaselineSettings,
    blank: Option<Blank<'_>>,
) -> SpectroResult<Option<Box<dyn BaselineModel>>> {
    let need_blank = |method: &str| {
        blank.ok_or_else(|| {
            SpectroError::Configuration(format!("{} baseline needs a recorded blank", method))
        })
    };
    Ok(match settings {
        BaselineSettings::None => None,
        BaselineSettings::Mean => {
            let blank = need_blank("mean")?;
            Some(Box::new(MeanBlank::from_blank(blank.absorbance)?))
        }
        BaselineSettings::Als {
            lambda,
            p,
            max_iter,
            tolerance,
        } => Some(Box::new(Als {
            lambda: *lambda,
            p: *p,
            max_iter: *max_iter,
            tolerance: *tolerance,
        })),
        BaselineSettings::Polynomial { max_degree } => {
            let blank = need_blank("polynomial")?;
            Some(Box::new(PolynomialBaseline::fit(
                blank.wavelengths,
                blank.absorbance,
                *max_degree,
            )?))
        }
    })
}
