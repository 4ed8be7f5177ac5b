//! `spectro-analysis`
//!
//! Turns raw (reference, sample) voltage series into baseline-corrected
//! absorbance with peaks. Everything here is pure and deterministic: the same
//! input and parameters always give bit-identical output.

pub mod absorbance;
pub mod baseline;
mod linalg;
pub mod peaks;
pub mod processing;
pub mod smoothing;

pub use absorbance::{
    absorbance_checked, absorbance_series, compute_absorbance, fill_invalid,
    negative_absorbance_correction,
};
pub use baseline::{model_from_settings, Als, AlsFit, BaselineModel, Blank, MeanBlank, PolynomialBaseline};
pub use peaks::{global_max, PeakSearch};
pub use processing::{ProcessedSpectrum, SpectrumProcessor};
pub use smoothing::SavitzkyGolay;
