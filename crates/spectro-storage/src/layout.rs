//! Session directory layout and table names.
//!
//! Files of one measurement day and slit setting are grouped as
//! `<output_dir>/<YYYY>/<MM>/<DD>/<slit label>/`.

use chrono::{Datelike, Local, NaiveDate};
use spectro_core::{SlitWidth, SpectroError, SpectroResult};
use std::path::{Path, PathBuf};

/// Columns of a sweep table, raw or processed.
pub const SWEEP_COLUMNS: [&str; 5] = [
    "wavelength_nm",
    "absorbance",
    "reference_v",
    "sample_v",
    "position_mm",
];

/// Columns of a processed spectrum table.
pub const PROCESSED_COLUMNS: [&str; 4] = ["wavelength_nm", "raw", "baseline", "corrected"];

/// Columns of a peak table.
pub const PEAK_COLUMNS: [&str; 3] = ["index", "wavelength_nm", "absorbance"];

/// Columns of a kinetics table.
pub const KINETICS_COLUMNS: [&str; 3] = ["elapsed_s", "sample_v", "absorbance"];

/// Directory for one day and slit setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    dir: PathBuf,
}

impl SessionLayout {
    /// Layout for a given date.
    pub fn for_date(output_dir: impl AsRef<Path>, date: NaiveDate, slit: SlitWidth) -> Self {
        let dir = output_dir
            .as_ref()
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
            .join(slit.label());
        Self { dir }
    }

    /// Layout for today (local time).
    pub fn today(output_dir: impl AsRef<Path>, slit: SlitWidth) -> Self {
        Self::for_date(output_dir, Local::now().date_naive(), slit)
    }

    /// The session directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and its parents.
    pub fn create(&self) -> SpectroResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SpectroError::Storage(format!("cannot create {}: {}", self.dir.display(), e))
        })
    }

    /// Path of a table in this session.
    pub fn path_of(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", table))
    }
}

/// Keep letters, digits, `-` and `_`; everything else becomes `_`.
pub fn sanitize(sample: &str) -> String {
    let cleaned: String = sample
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "sample".to_string()
    } else {
        cleaned
    }
}

/// Write-through table of a sweep.
pub fn raw_name(sample: &str) -> String {
    format!("raw_{}", sanitize(sample))
}

/// Processed spectrum table.
pub fn spectrum_name(sample: &str) -> String {
    format!("spectrum_{}", sanitize(sample))
}

/// Peak table.
pub fn peaks_name(sample: &str) -> String {
    format!("peaks_{}", sanitize(sample))
}

/// Kinetics table for one wavelength.
pub fn kinetics_name(sample: &str, wavelength_nm: f64) -> String {
    format!("kinetics_{}_{}nm", sanitize(sample), wavelength_nm)
}

/// Baseline-corrected kinetics table for one wavelength.
pub fn kinetics_corrected_name(sample: &str, wavelength_nm: f64) -> String {
    format!("{}_corrected", kinetics_name(sample, wavelength_nm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_slit_directory() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let layout = SessionLayout::for_date("data", date, SlitWidth::Nm0_5);
        assert_eq!(
            layout.dir(),
            Path::new("data").join("2024").join("03").join("07").join("slit_0_5nm")
        );
        assert_eq!(layout.path_of("raw_x"), layout.dir().join("raw_x.csv"));
    }

    #[test]
    fn create_makes_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = SessionLayout::today(tmp.path(), SlitWidth::Nm2);
        layout.create().unwrap();
        assert!(layout.dir().is_dir());
    }

    #[test]
    fn table_names() {
        assert_eq!(raw_name("Rhodamine B"), "raw_Rhodamine_B");
        assert_eq!(spectrum_name("blank"), "spectrum_blank");
        assert_eq!(peaks_name(""), "peaks_sample");
        assert_eq!(kinetics_name("dye", 520.0), "kinetics_dye_520nm");
        assert_eq!(kinetics_name("dye", 432.5), "kinetics_dye_432.5nm");
        assert_eq!(
            kinetics_corrected_name("dye", 520.0),
            "kinetics_dye_520nm_corrected"
        );
    }
}
