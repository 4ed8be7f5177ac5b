//! In-memory export sink.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use spectro_core::capabilities::ExportSink;
use std::collections::HashMap;

/// Table held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    /// Header.
    pub columns: Vec<String>,
    /// Rows in append order.
    pub rows: Vec<Vec<f64>>,
    /// Whether `close` was called.
    pub closed: bool,
}

/// Sink keeping every table in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of table `name`.
    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.tables.lock().get(name).cloned()
    }

    /// Rows of table `name` (empty when unknown).
    pub fn rows(&self, name: &str) -> Vec<Vec<f64>> {
        self.table(name).map(|t| t.rows).unwrap_or_default()
    }

    /// Names of all tables opened so far.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn open(&self, name: &str, columns: &[&str]) -> Result<()> {
        self.tables.lock().insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
                closed: false,
            },
        );
        Ok(())
    }

    async fn append(&self, name: &str, row: &[f64]) -> Result<()> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("table '{}' is not open", name))?;
        if row.len() != table.columns.len() {
            return Err(anyhow!("row width {} != {}", row.len(), table.columns.len()));
        }
        table.rows.push(row.to_vec());
        Ok(())
    }

    async fn close(&self, name: &str) -> Result<()> {
        if let Some(table) = self.tables.lock().get_mut(name) {
            table.closed = true;
        }
        Ok(())
    }
}
