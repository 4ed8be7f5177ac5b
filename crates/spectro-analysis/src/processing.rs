//! Spectrum post-processing: correction, baseline, smoothing, peaks.

use crate::absorbance::{absorbance_series, fill_invalid, negative_absorbance_correction};
use crate::baseline::{model_from_settings, BaselineModel, Blank};
use crate::peaks::{global_max, PeakSearch};
use crate::smoothing::SavitzkyGolay;
use spectro_core::config::ProcessingConfig;
use spectro_core::{AbsorbanceResult, Peak, SpectroError, SpectroResult, Spectrum};
use tracing::{debug, info};

/// Output of [`SpectrumProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSpectrum {
    /// Abscissa (wavelength in nm, or seconds for kinetics).
    pub x: Vec<f64>,
    /// Absorbance before baseline correction, invalid points filled.
    pub raw: Vec<f64>,
    /// Baseline that was subtracted (zeros without a model).
    pub baseline: Vec<f64>,
    /// Baseline-corrected, optionally smoothed absorbance.
    pub corrected: Vec<f64>,
    /// Peaks of `corrected`.
    pub peaks: Vec<Peak>,
    /// Highest point of `corrected`.
    pub global_max: Option<Peak>,
    /// Points whose absorbance had to be filled.
    pub invalid_points: usize,
}

/// Configured processing chain.
pub struct SpectrumProcessor {
    negative_correction: bool,
    baseline: Option<Box<dyn BaselineModel>>,
    smoother: Option<SavitzkyGolay>,
    peaks: PeakSearch,
}

impl std::fmt::Debug for SpectrumProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumProcessor")
            .field("negative_correction", &self.negative_correction)
            .field("baseline", &self.baseline.as_ref().map(|b| b.name()))
            .field("smoother", &self.smoother)
            .field("peaks", &self.peaks)
            .finish()
    }
}

impl SpectrumProcessor {
    /// Build from configuration. `blank` is needed by the mean and
    /// polynomial baselines.
    pub fn from_config(config: &ProcessingConfig, blank: Option<Blank<'_>>) -> SpectroResult<Self> {
        let smoother = if config.smoothing_window == 0 {
            None
        } else {
            Some(SavitzkyGolay::new(config.smoothing_window, config.smoothing_order)?)
        };
        Ok(Self {
            negative_correction: config.negative_correction,
            baseline: model_from_settings(&config.baseline, blank)?,
            smoother,
            peaks: PeakSearch {
                distance: config.peak_window,
                min_height: config.min_peak_height,
                min_prominence: config.min_peak_prominence,
            },
        })
    }

    /// Chain without baseline or smoothing.
    pub fn plain(peaks: PeakSearch) -> Self {
        Self {
            negative_correction: false,
            baseline: None,
            smoother: None,
            peaks,
        }
    }

    /// Replace the baseline model.
    pub fn with_baseline(mut self, model: Option<Box<dyn BaselineModel>>) -> Self {
        self.baseline = model;
        self
    }

    /// Process raw voltages: optional negative-absorbance correction, then
    /// absorbance, then [`process_absorbance`](Self::process_absorbance).
    pub fn process_voltages(
        &self,
        x: &[f64],
        reference: &[f64],
        sample: &[f64],
    ) -> SpectroResult<ProcessedSpectrum> {
        let absorbance = if self.negative_correction {
            let (r, s) = negative_absorbance_correction(reference, sample)?;
            absorbance_series(&r, &s)?
        } else {
            absorbance_series(reference, sample)?
        };
        self.process_absorbance(x, &absorbance)
    }

    /// Process a recorded spectrum from its voltage columns.
    pub fn process_spectrum(&self, spectrum: &Spectrum) -> SpectroResult<ProcessedSpectrum> {
        self.process_voltages(
            &spectrum.wavelengths(),
            &spectrum.reference_voltages(),
            &spectrum.sample_voltages(),
        )
    }

    /// Fill invalid points, subtract the baseline, smooth, find peaks.
    pub fn process_absorbance(
        &self,
        x: &[f64],
        absorbance: &[AbsorbanceResult],
    ) -> SpectroResult<ProcessedSpectrum> {
        if x.len() != absorbance.len() {
            return Err(SpectroError::Numeric(format!(
                "{} abscissa values for {} absorbance values",
                x.len(),
                absorbance.len()
            )));
        }
        let invalid_points = absorbance.iter().filter(|a| !a.is_valid()).count();
        if invalid_points > 0 {
            debug!(invalid_points, "filling invalid absorbance points");
        }
        let raw = fill_invalid(absorbance)?;

        let baseline = match &self.baseline {
            Some(model) => model.baseline(x, &raw)?,
            None => vec![0.0; raw.len()],
        };
        let subtracted: Vec<f64> = raw.iter().zip(&baseline).map(|(a, b)| a - b).collect();
        let corrected = match &self.smoother {
            Some(sg) => sg.apply(&subtracted)?,
            None => subtracted,
        };

        let peaks = self.peaks.find(x, &corrected)?;
        let global_max = global_max(x, &corrected);
        if let Some(top) = &global_max {
            info!(
                wavelength = top.wavelength_nm,
                absorbance = top.absorbance,
                peaks = peaks.len(),
                baseline = self.baseline.as_ref().map(|b| b.name()).unwrap_or("none"),
                "spectrum processed"
            );
        }

        Ok(ProcessedSpectrum {
            x: x.to_vec(),
            raw,
            baseline,
            corrected,
            peaks,
            global_max,
            invalid_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MeanBlank;
    use spectro_core::config::BaselineSettings;

    #[test]
    fn plain_chain_reports_peak() {
        let x: Vec<f64> = (0..5).map(|i| 400.0 + i as f64).collect();
        let a: Vec<AbsorbanceResult> = [0.0, 1.0, 0.0, 0.9, 0.0]
            .iter()
            .map(|&v| AbsorbanceResult::Value(v))
            .collect();
        let out = SpectrumProcessor::plain(PeakSearch::with_distance(3))
            .process_absorbance(&x, &a)
            .unwrap();
        assert_eq!(out.peaks.len(), 1);
        assert_eq!(out.global_max.unwrap().wavelength_nm, 401.0);
    }

    #[test]
    fn mean_blank_shifts_trace() {
        let x = [1.0, 2.0, 3.0];
        let a = [
            AbsorbanceResult::Value(0.5),
            AbsorbanceResult::Invalid,
            AbsorbanceResult::Value(0.7),
        ];
        let out = SpectrumProcessor::plain(PeakSearch::default())
            .with_baseline(Some(Box::new(MeanBlank { offset: 0.1 })))
            .process_absorbance(&x, &a)
            .unwrap();
        assert_eq!(out.invalid_points, 1);
        assert!((out.corrected[1] - 0.4).abs() < 1e-12);
        assert!((out.corrected[2] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn negative_correction_applies_before_absorbance() {
        let config = ProcessingConfig {
            baseline: BaselineSettings::None,
            smoothing_window: 0,
            ..ProcessingConfig::default()
        };
        let processor = SpectrumProcessor::from_config(&config, None).unwrap();
        let out = processor
            .process_voltages(&[1.0, 2.0], &[-1.0, -1.0], &[-0.5, -2.0])
            .unwrap();
        assert!((out.raw[0] - 2f64.log10()).abs() < 1e-12);
        assert_eq!(out.raw[1], 0.0);
    }
}
