//! Hardware Capabilities
//!
//! Narrow capability traits the acquisition loop is written against. Each
//! physical collaborator of the instrument implements only what it supports:
//!
//! - the G-code motion controller implements `MotionController + DigitalInput`
//! - the acquisition card implements `VoltageSource`
//! - export sinks implement `ExportSink`
//! - live dashboards implement `PointObserver`
//! - the operator (terminal or automation) implements `Confirm`
//!
//! # Design Philosophy
//!
//! Hardware-facing traits:
//! - are async (`#[async_trait]`)
//! - are `Send + Sync` and take `&self`; drivers use interior mutability
//! - return `anyhow::Result`; the experiment layer maps failures into
//!   [`SpectroError::Hardware`](crate::error::SpectroError::Hardware)
//!
//! No trait exposes protocol strings. Status parsing and command formatting
//! stay private to each adapter.

use crate::types::{AnalogChannel, Axis, BurstConfig, MachinePosition, MoveMode, SensorPin};
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Motion
// =============================================================================

/// Capability: multi-axis motion controller.
///
/// # Contract
/// - `move_axis` queues motion and may return before it completes
/// - `is_idle` reports whether all queued motion has finished
/// - `position` may be approximate while moving
#[async_trait]
pub trait MotionController: Send + Sync {
    /// Move one axis by `distance` (relative) or to `distance` (absolute).
    async fn move_axis(&self, axis: Axis, distance: f64, mode: MoveMode) -> Result<()>;

    /// Whether the controller reports no motion in progress.
    async fn is_idle(&self) -> Result<bool>;

    /// Current machine position of all axes.
    async fn position(&self) -> Result<MachinePosition>;

    /// Set the maximum travel rate of one axis.
    async fn set_speed(&self, axis: Axis, mm_per_min: f64) -> Result<()>;

    /// Pause motion immediately (feed hold).
    async fn stop(&self) -> Result<()>;

    /// Resume motion paused by [`stop`](Self::stop).
    async fn resume(&self) -> Result<()>;

    /// Clear an alarm lock.
    ///
    /// # Default Implementation
    /// No-op for controllers without an alarm lock.
    async fn unlock(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Sensing
// =============================================================================

/// Capability: burst acquisition from an analog input.
///
/// # Contract
/// - returns exactly `config.samples_per_burst` samples in acquisition order
/// - volts, as delivered by the card; no scaling or filtering
#[async_trait]
pub trait VoltageSource: Send + Sync {
    /// Acquire one burst on `channel`.
    async fn read_burst(&self, channel: AnalogChannel, config: &BurstConfig) -> Result<Vec<f64>>;
}

/// Capability: boolean digital inputs (limit switches, optical fork).
#[async_trait]
pub trait DigitalInput: Send + Sync {
    /// Whether `pin` is currently triggered.
    async fn read_sensor(&self, pin: SensorPin) -> Result<bool>;
}

// =============================================================================
// Outputs
// =============================================================================

/// Capability: tabular export.
///
/// # Contract
/// - `open` starts a table with a header row; reopening the same name truncates
/// - `append` makes the row durable before returning, so a failure later in a
///   sweep leaves every appended row intact
/// - a row never appears partially
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Start a new table named `name` with the given columns.
    async fn open(&self, name: &str, columns: &[&str]) -> Result<()>;

    /// Append one row to table `name`.
    async fn append(&self, name: &str, row: &[f64]) -> Result<()>;

    /// Finish table `name`.
    async fn close(&self, name: &str) -> Result<()>;
}

/// Observer for live (x, y) points.
///
/// Synchronous and infallible: implementations must not block and drop
/// points they cannot deliver.
pub trait PointObserver: Send + Sync {
    /// Publish one point of `series`.
    fn publish(&self, series: &str, x: f64, y: f64);
}

/// Capability: operator confirmation.
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Ask the operator; `true` means proceed.
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}
