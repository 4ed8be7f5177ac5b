//! Write-through CSV export.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use spectro_core::capabilities::ExportSink;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

struct Table {
    path: PathBuf,
    width: usize,
    writer: csv::Writer<File>,
}

/// CSV files in one directory, one file per table.
///
/// Every `append` writes one complete record and flushes it to the file
/// before returning, so a sweep that aborts halfway leaves a readable file
/// holding every row appended so far. A row whose width differs from the
/// header is refused before anything is written.
pub struct CsvSink {
    dir: PathBuf,
    tables: Mutex<HashMap<String, Table>>,
}

impl CsvSink {
    /// Sink writing into `dir` (created on first `open`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the tables.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing table `name`.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        v.to_string()
    }
}

#[async_trait]
impl ExportSink for CsvSink {
    async fn open(&self, name: &str, columns: &[&str]) -> Result<()> {
        if columns.is_empty() {
            return Err(anyhow!("table '{}' needs at least one column", name));
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_of(name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(columns)
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
        writer.flush()?;

        tracing::info!(path = %path.display(), "CSV table opened");
        self.tables.lock().insert(
            name.to_string(),
            Table {
                path,
                width: columns.len(),
                writer,
            },
        );
        Ok(())
    }

    async fn append(&self, name: &str, row: &[f64]) -> Result<()> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("table '{}' is not open", name))?;
        if row.len() != table.width {
            return Err(anyhow!(
                "row of {} values for table '{}' with {} columns",
                row.len(),
                name,
                table.width
            ));
        }
        table
            .writer
            .write_record(row.iter().map(|v| format_value(*v)))
            .with_context(|| format!("Failed to append to {}", table.path.display()))?;
        table
            .writer
            .flush()
            .with_context(|| format!("Failed to flush {}", table.path.display()))?;
        Ok(())
    }

    async fn close(&self, name: &str) -> Result<()> {
        if let Some(mut table) = self.tables.lock().remove(name) {
            table.writer.flush()?;
            tracing::info!(path = %table.path.display(), "CSV table closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rows_are_on_disk_after_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        sink.open("raw_test", &["a", "b"]).await.unwrap();
        sink.append("raw_test", &[1.0, 2.5]).await.unwrap();
        sink.append("raw_test", &[f64::NAN, -3.0]).await.unwrap();

        // read while the table is still open
        let text = std::fs::read_to_string(sink.path_of("raw_test")).unwrap();
        assert_eq!(text, "a,b\n1,2.5\nNaN,-3\n");
        sink.close("raw_test").await.unwrap();
    }

    #[tokio::test]
    async fn wrong_width_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        sink.open("t", &["a", "b"]).await.unwrap();
        assert!(sink.append("t", &[1.0]).await.is_err());
        let text = std::fs::read_to_string(sink.path_of("t")).unwrap();
        assert_eq!(text, "a,b\n");
    }

    #[tokio::test]
    async fn append_to_unknown_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        assert!(sink.append("missing", &[1.0]).await.is_err());
    }

    #[tokio::test]
    async fn reopen_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        sink.open("t", &["x"]).await.unwrap();
        sink.append("t", &[1.0]).await.unwrap();
        sink.close("t").await.unwrap();
        sink.open("t", &["y"]).await.unwrap();
        let text = std::fs::read_to_string(sink.path_of("t")).unwrap();
        assert_eq!(text, "y\n");
    }
}
