//! `spectro-core`
//!
//! Core types and capability traits for the scanning spectrophotometer.
//!
//! The instrument is a dual-beam UV-Vis spectrophotometer driven through a
//! G-code motion controller (grating screw, slit selector, cuvette mirror) and
//! an analog acquisition card sampling a chopped photodiode signal. This crate
//! holds what every other crate agrees on:
//!
//! - [`capabilities`]: async traits for motion, voltage bursts, sensors,
//!   export sinks, observers and operator confirmation
//! - [`types`]: axes, channels, cuvettes, spectra and kinetics traces
//! - [`calibration`]: the affine screw-position/wavelength mapping
//! - [`config`]: figment-backed configuration with validation
//! - [`poll`]: bounded polling that ends in `StallTimeout`
//! - [`error`]: [`SpectroError`] and [`DriverError`]
//! - `serial` (feature `serial`): shared serial port helpers for drivers

pub mod calibration;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod poll;
#[cfg(feature = "serial")]
pub mod serial;
pub mod types;

pub use calibration::Calibration;
pub use error::{DriverError, DriverErrorKind, SpectroError, SpectroResult};
pub use types::{
    AbsorbanceResult, AnalogChannel, Axis, BurstConfig, Cuvette, KineticsSample, KineticsTrace,
    MachinePosition, MoveMode, Peak, SensorPin, SlitWidth, Spectrum, SpectrumPoint,
    StepMeasurement,
};
