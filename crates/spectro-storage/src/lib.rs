//! Export sinks and session files for the spectrophotometer.
//!
//! - [`CsvSink`]: one CSV file per table, each row flushed as it is appended
//! - [`MemorySink`]: tables in memory, for tests and dry runs
//! - [`SessionLayout`]: dated, per-slit session directories and table names
//! - [`reader`]: read recorded sweeps and blanks back for analysis

pub mod csv_sink;
pub mod layout;
pub mod memory;
pub mod reader;

pub use csv_sink::CsvSink;
pub use layout::{
    kinetics_corrected_name, kinetics_name, peaks_name, raw_name, spectrum_name, SessionLayout,
    KINETICS_COLUMNS, PEAK_COLUMNS, PROCESSED_COLUMNS, SWEEP_COLUMNS,
};
pub use memory::{MemorySink, MemoryTable};
pub use reader::{read_blank, read_spectrum, read_table, NumericTable};
