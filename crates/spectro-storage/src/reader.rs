//! Reading recorded tables back.

use spectro_core::{AbsorbanceResult, Spectrum, SpectrumPoint, SpectroError, SpectroResult};
use std::path::Path;

/// A numeric CSV table.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    /// Header.
    pub columns: Vec<String>,
    /// Rows; every row has `columns.len()` values.
    pub rows: Vec<Vec<f64>>,
}

impl NumericTable {
    /// Values of column `name`.
    pub fn column(&self, name: &str) -> SpectroResult<Vec<f64>> {
        let i = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SpectroError::Storage(format!("missing column '{}'", name)))?;
        Ok(self.rows.iter().map(|r| r[i]).collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn storage_err(path: &Path, e: impl std::fmt::Display) -> SpectroError {
    SpectroError::Storage(format!("{}: {}", path.display(), e))
}

/// Read a CSV file of numbers with a header row. `NaN` cells are allowed.
pub fn read_table(path: impl AsRef<Path>) -> SpectroResult<NumericTable> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| storage_err(path, e))?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| storage_err(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| storage_err(path, e))?;
        let row = record
            .iter()
            .map(|cell| {
                cell.trim().parse::<f64>().map_err(|e| {
                    storage_err(path, format!("row {}: '{}': {}", line + 1, cell, e))
                })
            })
            .collect::<SpectroResult<Vec<f64>>>()?;
        rows.push(row);
    }
    tracing::debug!(path = %path.display(), rows = rows.len(), "table read");
    Ok(NumericTable { columns, rows })
}

/// Read a sweep table (raw or spectrum) back into a [`Spectrum`].
pub fn read_spectrum(path: impl AsRef<Path>) -> SpectroResult<Spectrum> {
    let table = read_table(path)?;
    let wavelengths = table.column("wavelength_nm")?;
    let absorbance = table.column("absorbance")?;
    let reference = table.column("reference_v")?;
    let sample = table.column("sample_v")?;
    let position = table.column("position_mm")?;

    Ok((0..table.len())
        .map(|i| SpectrumPoint {
            wavelength_nm: wavelengths[i],
            absorbance: AbsorbanceResult::from(absorbance[i]),
            reference_v: reference[i],
            sample_v: sample[i],
            position_mm: position[i],
        })
        .collect())
}

/// Read the wavelength and absorbance columns of a recorded blank.
pub fn read_blank(path: impl AsRef<Path>) -> SpectroResult<(Vec<f64>, Vec<f64>)> {
    let table = read_table(path)?;
    Ok((table.column("wavelength_nm")?, table.column("absorbance")?))
}
