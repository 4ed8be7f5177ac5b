//! Wavelength sweep.
//!
//! The screw is driven from the long-wavelength end of the range to the
//! short-wavelength end (increasing position with the usual negative
//! calibration slope). At each point both cuvettes are read, the absorbance
//! is computed and the row is written through to the export sink before the
//! screw advances, so an aborted sweep leaves every completed row on disk.

use crate::observers::SERIES_ABSORBANCE;
use crate::session::{travel_time, Session};
use crate::step_reader::assign;
use spectro_analysis::compute_absorbance;
use spectro_core::{
    Axis, Calibration, Cuvette, MoveMode, SpectroError, SpectroResult, Spectrum, SpectrumPoint,
};
use spectro_storage::{raw_name, SWEEP_COLUMNS};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What to sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    /// Short-wavelength end, nm.
    pub wavelength_min: f64,
    /// Long-wavelength end, nm.
    pub wavelength_max: f64,
    /// Wavelength increment, nm.
    pub wavelength_step: f64,
    /// Cuvette holding the reference solution.
    pub reference: Cuvette,
    /// Sample name, used for table names.
    pub sample_name: String,
}

/// Positions and pacing derived from a [`SweepRequest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPlan {
    /// Number of steps between the two ends; the sweep records one more
    /// point than this.
    pub measurements: usize,
    /// Screw position of `wavelength_max`.
    pub position_start: f64,
    /// Screw position of `wavelength_min`.
    pub position_end: f64,
    /// Screw advance between points.
    pub step_distance: f64,
    /// Time the screw needs for one step.
    pub time_per_step: Duration,
}

impl SweepPlan {
    /// Points recorded by a complete sweep (both ends included).
    pub fn points(&self) -> usize {
        self.measurements + 1
    }

    /// Screw position of point `i`.
    pub fn position_at(&self, i: usize) -> f64 {
        self.position_start + i as f64 * self.step_distance
    }
}

impl SweepRequest {
    /// Validate the request and derive the plan. Nothing moves if this fails.
    pub fn plan(&self, calibration: &Calibration, screw_speed_mm_per_min: f64) -> SpectroResult<SweepPlan> {
        let (min, max, step) = (self.wavelength_min, self.wavelength_max, self.wavelength_step);
        if ![min, max, step].iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err(SpectroError::Configuration(format!(
                "sweep bounds and step must be positive, got min={} max={} step={}",
                min, max, step
            )));
        }
        if max <= min {
            return Err(SpectroError::Configuration(format!(
                "wavelength_max ({}) must exceed wavelength_min ({})",
                max, min
            )));
        }
        let measurements = ((max - min) / step + 1e-9).floor() as usize;
        if measurements == 0 {
            return Err(SpectroError::Configuration(format!(
                "step {} nm is larger than the range {}..{} nm",
                step, min, max
            )));
        }

        let position_start = calibration.reachable_position_of(max)?;
        let position_end = calibration.reachable_position_of(min)?;
        let step_distance = (position_end - position_start) / measurements as f64;
        Ok(SweepPlan {
            measurements,
            position_start,
            position_end,
            step_distance,
            time_per_step: travel_time(step_distance, screw_speed_mm_per_min),
        })
    }
}

/// Result of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    /// Points in acquisition order.
    pub spectrum: Spectrum,
    /// Plan that was executed.
    pub plan: SweepPlan,
    /// Whether the sweep ended early on a stop request.
    pub stopped: bool,
    /// Name of the write-through table.
    pub table: String,
}

impl Session {
    /// Run one sweep.
    ///
    /// On a hardware, numeric or storage error the sweep aborts at once;
    /// rows already appended stay in the sink. On a stop request the sweep
    /// ends after the current point and still returns the screw.
    #[instrument(skip(self, request), fields(sample = %request.sample_name), err)]
    pub async fn sweep(&mut self, request: &SweepRequest) -> SpectroResult<SweepReport> {
        let plan = request.plan(&self.calibration, self.config.motion.screw_speed_mm_per_min)?;
        let table = raw_name(&request.sample_name);
        info!(
            points = plan.points(),
            from = request.wavelength_max,
            to = request.wavelength_min,
            step_mm = plan.step_distance,
            "sweep starting"
        );

        self.sink
            .open(&table, &SWEEP_COLUMNS)
            .await
            .map_err(|e| Session::storage_error(&table, e))?;

        let mut spectrum = Spectrum::with_capacity(plan.points());
        let mut moves = 0usize;
        let outcome = self
            .acquire(&plan, request, &table, &mut spectrum, &mut moves)
            .await;
        let stopped = match outcome {
            Ok(stopped) => stopped,
            Err(e) => {
                error!(error = %e, rows = spectrum.len(), "sweep aborted");
                if let Err(close) = self.sink.close(&table).await {
                    warn!(error = %close, "could not close table after abort");
                }
                return Err(e);
            }
        };

        self.wait_idle("screw after sweep").await?;
        if moves > 0 {
            let back = -(plan.step_distance * moves as f64);
            self.motion
                .move_axis(Axis::X, back, MoveMode::Relative)
                .await
                .map_err(|e| SpectroError::hardware("screw return", e))?;
            tokio::time::sleep(self.screw_travel_time(back)).await;
            self.wait_idle("screw return").await?;
        }
        self.sink
            .close(&table)
            .await
            .map_err(|e| Session::storage_error(&table, e))?;

        if stopped {
            warn!(rows = spectrum.len(), "sweep stopped on request");
        } else {
            info!(rows = spectrum.len(), "sweep finished");
        }
        Ok(SweepReport {
            spectrum,
            plan,
            stopped,
            table,
        })
    }

    /// Pre-move and point loop. Returns whether a stop was requested.
    async fn acquire(
        &mut self,
        plan: &SweepPlan,
        request: &SweepRequest,
        table: &str,
        spectrum: &mut Spectrum,
        moves: &mut usize,
    ) -> SpectroResult<bool> {
        self.move_screw_to(plan.position_start, "screw pre-move").await?;

        for i in 0..plan.points() {
            if self.stop.is_stop_requested() {
                return Ok(true);
            }

            let voltages = self.step_reader.read().await?;
            let (reference_v, sample_v) = assign(voltages, request.reference);
            let position_mm = plan.position_at(i);
            let wavelength_nm = self.calibration.wavelength_of(position_mm);
            let absorbance = compute_absorbance(reference_v, sample_v);
            if !absorbance.is_valid() {
                warn!(step = i, reference_v, sample_v, "no finite absorbance at this point");
            }

            let point = SpectrumPoint {
                wavelength_nm,
                absorbance,
                reference_v,
                sample_v,
                position_mm,
            };
            self.sink
                .append(
                    table,
                    &[wavelength_nm, absorbance.as_f64(), reference_v, sample_v, position_mm],
                )
                .await
                .map_err(|e| Session::storage_error(table, e))?;
            spectrum.push(point);
            if let Some(a) = absorbance.value() {
                self.publish(SERIES_ABSORBANCE, wavelength_nm, a);
            }
            debug!(step = i, position_mm, wavelength_nm, reference_v, sample_v, ?absorbance, "sweep point");

            if i < plan.measurements {
                self.motion
                    .move_axis(Axis::X, plan.step_distance, MoveMode::Relative)
                    .await
                    .map_err(|e| SpectroError::hardware("screw step", e))?;
                *moves += 1;
                tokio::time::sleep(plan.time_per_step).await;
            }
        }
        Ok(false)
    }
}
