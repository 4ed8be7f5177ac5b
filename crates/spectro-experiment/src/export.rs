//! Writing processed results to an export sink.

use spectro_analysis::ProcessedSpectrum;
use spectro_core::capabilities::ExportSink;
use spectro_core::{SpectroError, SpectroResult};
use spectro_storage::{peaks_name, spectrum_name, PEAK_COLUMNS, PROCESSED_COLUMNS};
use tracing::info;

/// Write a whole table: open, every row, close.
pub async fn write_table(
    sink: &dyn ExportSink,
    name: &str,
    columns: &[&str],
    rows: impl IntoIterator<Item = Vec<f64>>,
) -> SpectroResult<usize> {
    let storage = |e: anyhow::Error| SpectroError::Storage(format!("{}: {:#}", name, e));
    sink.open(name, columns).await.map_err(storage)?;
    let mut written = 0;
    for row in rows {
        sink.append(name, &row).await.map_err(storage)?;
        written += 1;
    }
    sink.close(name).await.map_err(storage)?;
    Ok(written)
}

/// Write the processed spectrum and its peak list for `sample`.
///
/// Returns the two table names.
pub async fn export_processed(
    sink: &dyn ExportSink,
    sample: &str,
    processed: &ProcessedSpectrum,
) -> SpectroResult<(String, String)> {
    let spectrum_table = spectrum_name(sample);
    let rows = (0..processed.x.len()).map(|i| {
        vec![
            processed.x[i],
            processed.raw[i],
            processed.baseline[i],
            processed.corrected[i],
        ]
    });
    write_table(sink, &spectrum_table, &PROCESSED_COLUMNS, rows).await?;

    let peaks_table = peaks_name(sample);
    let rows = processed
        .peaks
        .iter()
        .map(|p| vec![p.index as f64, p.wavelength_nm, p.absorbance]);
    let n = write_table(sink, &peaks_table, &PEAK_COLUMNS, rows).await?;
    info!(sample, peaks = n, "processed spectrum exported");
    Ok((spectrum_table, peaks_table))
}
