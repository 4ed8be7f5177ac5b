//! Fixed-wavelength kinetics.
//!
//! For each target wavelength: move the screw there, read the reference
//! cuvette once, then read the sample cuvette every `delay` until
//! `duration` has elapsed, then put the screw back where it was. With a
//! baseline model the corrected trace is written to its own table next to
//! the raw one.

use crate::export::write_table;
use crate::observers::SERIES_KINETICS;
use crate::session::Session;
use spectro_analysis::{compute_absorbance, BaselineModel};
use spectro_core::{
    Axis, Cuvette, KineticsSample, KineticsTrace, MoveMode, SpectroError, SpectroResult,
};
use spectro_storage::{kinetics_corrected_name, kinetics_name, KINETICS_COLUMNS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What to record.
#[derive(Clone)]
pub struct KineticsRequest {
    /// Target wavelengths, processed in order.
    pub wavelengths: Vec<f64>,
    /// Length of the timed loop at each wavelength.
    pub duration: Duration,
    /// Interval between sample reads, measured from the start of each read.
    pub delay: Duration,
    /// Cuvette holding the reference solution.
    pub reference: Cuvette,
    /// Sample name, used for table names.
    pub sample_name: String,
    /// Baseline subtracted from each trace, evaluated at the trace's
    /// wavelength.
    pub baseline: Option<Arc<dyn BaselineModel>>,
}

impl std::fmt::Debug for KineticsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KineticsRequest")
            .field("wavelengths", &self.wavelengths)
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("reference", &self.reference)
            .field("sample_name", &self.sample_name)
            .field("baseline", &self.baseline.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl KineticsRequest {
    fn validate(&self) -> SpectroResult<()> {
        if self.wavelengths.is_empty() {
            return Err(SpectroError::Configuration("no kinetics wavelength given".into()));
        }
        if self.duration.is_zero() || self.delay.is_zero() {
            return Err(SpectroError::Configuration(
                "kinetics duration and delay must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a kinetics run.
#[derive(Debug, Clone, PartialEq)]
pub struct KineticsReport {
    /// One trace per wavelength completed (or partially recorded when stopped).
    pub traces: Vec<KineticsTrace>,
    /// Whether the run ended early (stop request or operator declined).
    pub stopped: bool,
}

impl Session {
    /// Run the kinetics protocol at every requested wavelength.
    ///
    /// Every wavelength is validated against the calibration before the
    /// first move.
    #[instrument(skip(self, request), fields(sample = %request.sample_name), err)]
    pub async fn kinetics(&mut self, request: &KineticsRequest) -> SpectroResult<KineticsReport> {
        request.validate()?;
        let positions = request
            .wavelengths
            .iter()
            .map(|&wl| self.calibration.reachable_position_of(wl))
            .collect::<SpectroResult<Vec<f64>>>()?;

        let mut traces = Vec::with_capacity(request.wavelengths.len());
        for (&wavelength_nm, &position) in request.wavelengths.iter().zip(&positions) {
            if self.stop.is_stop_requested() {
                return Ok(KineticsReport {
                    traces,
                    stopped: true,
                });
            }
            let (trace, stopped) = self.kinetics_at(request, wavelength_nm, position).await?;
            if let Some(trace) = trace {
                traces.push(trace);
            }
            if stopped {
                return Ok(KineticsReport {
                    traces,
                    stopped: true,
                });
            }
        }
        Ok(KineticsReport {
            traces,
            stopped: false,
        })
    }

    async fn kinetics_at(
        &mut self,
        request: &KineticsRequest,
        wavelength_nm: f64,
        position: f64,
    ) -> SpectroResult<(Option<KineticsTrace>, bool)> {
        let before = self
            .motion
            .position()
            .await
            .map_err(|e| SpectroError::hardware("screw position", e))?
            .x;
        self.move_screw_to(position, "screw to kinetics wavelength").await?;

        let sample_cuvette = request.reference.other();
        let prompt = format!(
            "Reference in {}, sample in {}. Start kinetics at {} nm?",
            request.reference, sample_cuvette, wavelength_nm
        );
        let go = self
            .confirm
            .confirm(&prompt)
            .await
            .map_err(|e| SpectroError::hardware("operator confirmation", e))?;
        if !go {
            warn!(wavelength_nm, "kinetics declined by operator");
            self.move_screw_to(before, "screw return").await?;
            return Ok((None, true));
        }

        let result = self.timed_loop(request, wavelength_nm).await;
        // Back to cuvette one whatever happened in the loop.
        let restore = self.step_reader.mirror_mut().select(Cuvette::One).await;
        let (trace, stopped) = result?;
        restore?;

        self.move_screw_to(before, "screw return").await?;
        info!(wavelength_nm, samples = trace.samples.len(), "kinetics trace recorded");
        Ok((Some(trace), stopped))
    }

    async fn timed_loop(
        &mut self,
        request: &KineticsRequest,
        wavelength_nm: f64,
    ) -> SpectroResult<(KineticsTrace, bool)> {
        let reference_channel = self.step_reader.channel_for(request.reference);
        let sample_cuvette = request.reference.other();
        let sample_channel = self.step_reader.channel_for(sample_cuvette);

        self.step_reader.mirror_mut().select(request.reference).await?;
        let reference_v = self.kinetics_sampler.read(reference_channel).await?;
        self.step_reader.mirror_mut().select(sample_cuvette).await?;

        let table = kinetics_name(&request.sample_name, wavelength_nm);
        self.sink
            .open(&table, &KINETICS_COLUMNS)
            .await
            .map_err(|e| Session::storage_error(&table, e))?;

        let mut samples: Vec<KineticsSample> = Vec::new();
        let mut stopped = false;
        let start = Instant::now();
        loop {
            let iteration_start = Instant::now();
            let elapsed = iteration_start - start;
            if elapsed >= request.duration {
                break;
            }
            if self.stop.is_stop_requested() {
                stopped = true;
                break;
            }

            let sample_v = self.kinetics_sampler.read(sample_channel).await?;
            let elapsed_s = elapsed.as_secs_f64();
            let absorbance = compute_absorbance(reference_v, sample_v);
            self.sink
                .append(&table, &[elapsed_s, sample_v, absorbance.as_f64()])
                .await
                .map_err(|e| Session::storage_error(&table, e))?;
            if let Some(a) = absorbance.value() {
                self.publish(SERIES_KINETICS, elapsed_s, a);
            }
            debug!(elapsed_s, sample_v, ?absorbance, "kinetics sample");
            samples.push(KineticsSample {
                elapsed_s,
                sample_v,
                absorbance,
            });

            tokio::time::sleep_until(iteration_start + request.delay).await;
        }
        self.sink
            .close(&table)
            .await
            .map_err(|e| Session::storage_error(&table, e))?;

        if let Some(model) = &request.baseline {
            subtract_baseline(model.as_ref(), wavelength_nm, &mut samples)?;
            let corrected = kinetics_corrected_name(&request.sample_name, wavelength_nm);
            let rows = samples
                .iter()
                .map(|s| vec![s.elapsed_s, s.sample_v, s.absorbance.as_f64()]);
            write_table(&*self.sink, &corrected, &KINETICS_COLUMNS, rows).await?;
            debug!(table = %corrected, baseline = model.name(), "corrected trace written");
        }

        Ok((
            KineticsTrace {
                wavelength_nm,
                reference_v,
                samples,
            },
            stopped,
        ))
    }

    /// Absolute screw move, paced by travel time, then a bounded idle wait.
    pub(crate) async fn move_screw_to(&self, position: f64, what: &str) -> SpectroResult<()> {
        let current = self
            .motion
            .position()
            .await
            .map_err(|e| SpectroError::hardware("screw position", e))?
            .x;
        self.motion
            .move_axis(Axis::X, position, MoveMode::Absolute)
            .await
            .map_err(|e| SpectroError::hardware(what, e))?;
        tokio::time::sleep(self.screw_travel_time(position - current)).await;
        self.wait_idle(what).await
    }
}

/// Subtract `model` from the valid absorbances of a trace recorded at
/// `wavelength_nm`; invalid samples stay invalid.
fn subtract_baseline(
    model: &dyn BaselineModel,
    wavelength_nm: f64,
    samples: &mut [KineticsSample],
) -> SpectroResult<()> {
    let valid: Vec<usize> = (0..samples.len())
        .filter(|&i| samples[i].absorbance.is_valid())
        .collect();
    if valid.is_empty() {
        return Ok(());
    }
    let x = vec![wavelength_nm; valid.len()];
    let values: Vec<f64> = valid
        .iter()
        .map(|&i| samples[i].absorbance.as_f64())
        .collect();
    let corrected = model.subtract(&x, &values)?;
    for (&i, v) in valid.iter().zip(corrected) {
        samples[i].absorbance = v.into();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectro_analysis::{MeanBlank, PolynomialBaseline};
    use spectro_core::AbsorbanceResult;

    #[test]
    fn baseline_skips_invalid_samples() {
        let mut samples = vec![
            KineticsSample {
                elapsed_s: 0.0,
                sample_v: -0.5,
                absorbance: AbsorbanceResult::Value(0.30),
            },
            KineticsSample {
                elapsed_s: 1.0,
                sample_v: 0.0,
                absorbance: AbsorbanceResult::Invalid,
            },
        ];
        subtract_baseline(&MeanBlank { offset: 0.1 }, 520.0, &mut samples).unwrap();
        assert!((samples[0].absorbance.as_f64() - 0.2).abs() < 1e-12);
        assert_eq!(samples[1].absorbance, AbsorbanceResult::Invalid);
    }

    #[test]
    fn polynomial_blank_is_evaluated_at_trace_wavelength() {
        let w: Vec<f64> = (0..21).map(|i| 400.0 + 10.0 * i as f64).collect();
        let a: Vec<f64> = w.iter().map(|w| 0.1 + 0.001 * (w - 400.0)).collect();
        let model = PolynomialBaseline::fit(&w, &a, 2).unwrap();
        let mut samples: Vec<KineticsSample> = (0..4)
            .map(|i| KineticsSample {
                elapsed_s: i as f64 * 30.0,
                sample_v: -0.5,
                absorbance: AbsorbanceResult::Value(0.5),
            })
            .collect();
        subtract_baseline(&model, 520.0, &mut samples).unwrap();
        for s in &samples {
            assert!((s.absorbance.as_f64() - 0.28).abs() < 1e-6);
        }
    }

    #[test]
    fn request_validation() {
        let mut r = KineticsRequest {
            wavelengths: vec![],
            duration: Duration::from_secs(3),
            delay: Duration::from_secs(1),
            reference: Cuvette::One,
            sample_name: "k".into(),
            baseline: None,
        };
        assert!(r.validate().is_err());
        r.wavelengths.push(520.0);
        assert!(r.validate().is_ok());
        r.delay = Duration::ZERO;
        assert!(r.validate().is_err());
    }
}
