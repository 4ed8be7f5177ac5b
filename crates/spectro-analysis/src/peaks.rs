//! Peak detection.
//!
//! Built on the `find_peaks` crate. A flat top counts once, at its middle,
//! and the end points of a trace are never peaks. When two candidates are
//! closer than the separation window only the more prominent one is kept,
//! which for isolated maxima is also the taller one.

use find_peaks::PeakFinder;
use spectro_core::{Peak, SpectroError, SpectroResult};

/// Peak search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeakSearch {
    /// Minimum index distance between reported peaks; 0 or 1 disables.
    pub distance: usize,
    /// Peaks lower than this are dropped.
    pub min_height: Option<f64>,
    /// Peaks less prominent than this are dropped.
    pub min_prominence: Option<f64>,
}

impl PeakSearch {
    /// Search with only a separation window.
    pub fn with_distance(distance: usize) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    /// Peaks of `values`, labelled with `wavelengths`, in index order.
    pub fn find(&self, wavelengths: &[f64], values: &[f64]) -> SpectroResult<Vec<Peak>> {
        if wavelengths.len() != values.len() {
            return Err(SpectroError::Numeric(format!(
                "{} wavelengths for {} values",
                wavelengths.len(),
                values.len()
            )));
        }
        Ok(self
            .find_indices(values)
            .into_iter()
            .map(|index| Peak {
                index,
                wavelength_nm: wavelengths[index],
                absorbance: values[index],
            })
            .collect())
    }

    /// Indices of the peaks of `values`, ascending.
    pub fn find_indices(&self, values: &[f64]) -> Vec<usize> {
        if values.len() < 3 || values.iter().any(|v| !v.is_finite()) {
            return Vec::new();
        }

        let mut fp = PeakFinder::new(values);
        if let Some(h) = self.min_height {
            fp.with_min_height(h);
        }
        if let Some(p) = self.min_prominence {
            fp.with_min_prominence(p);
        }
        if self.distance > 1 {
            fp.with_min_distance(self.distance);
        }

        let last = values.len() - 1;
        let mut peaks: Vec<usize> = fp
            .find_peaks()
            .iter()
            .map(|p| p.middle_position())
            .filter(|&i| i > 0 && i < last)
            .collect();
        peaks.sort_unstable();
        peaks.dedup();
        peaks
    }
}

/// The single highest finite point, regardless of any window.
pub fn global_max(wavelengths: &[f64], values: &[f64]) -> Option<Peak> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .and_then(|(index, &absorbance)| {
            wavelengths.get(index).map(|&wavelength_nm| Peak {
                index,
                wavelength_nm,
                absorbance,
            })
        })
}
