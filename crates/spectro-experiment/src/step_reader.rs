//! Mirror switching and the dual-channel step read.

use crate::sampler::ChoppedSignalSampler;
use spectro_core::capabilities::MotionController;
use spectro_core::{AnalogChannel, Axis, Cuvette, MoveMode, SpectroError, SpectroResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Cuvette-switching mirror on the Z axis.
///
/// The mirror starts on cuvette one (its reference position after homing);
/// cuvette two is `switch_distance` further along the axis. Every switch is
/// a relative move followed by a fixed settle delay.
pub struct Mirror {
    motion: Arc<dyn MotionController>,
    switch_distance: f64,
    settle: Duration,
    lit: Cuvette,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("switch_distance", &self.switch_distance)
            .field("settle", &self.settle)
            .field("lit", &self.lit)
            .finish()
    }
}

impl Mirror {
    /// Mirror resting on cuvette one.
    pub fn new(motion: Arc<dyn MotionController>, switch_distance: f64, settle: Duration) -> Self {
        Self {
            motion,
            switch_distance,
            settle,
            lit: Cuvette::One,
        }
    }

    /// Cuvette currently in the beam.
    pub fn lit(&self) -> Cuvette {
        self.lit
    }

    /// Declare the mirror to be on cuvette one again (after homing).
    pub fn reset(&mut self) {
        self.lit = Cuvette::One;
    }

    /// Put `cuvette` in the beam. No motion if it already is.
    #[instrument(skip(self), fields(from = %self.lit), err)]
    pub async fn select(&mut self, cuvette: Cuvette) -> SpectroResult<()> {
        if cuvette == self.lit {
            return Ok(());
        }
        let distance = match cuvette {
            Cuvette::Two => self.switch_distance,
            Cuvette::One => -self.switch_distance,
        };
        self.motion
            .move_axis(Axis::Z, distance, MoveMode::Relative)
            .await
            .map_err(|e| SpectroError::hardware("mirror switch", e))?;
        self.lit = cuvette;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

/// Reads both channels once, switching the mirror in between.
///
/// Channel one sits behind cuvette one and is read first; the mirror then
/// moves to cuvette two, channel two is read, and the mirror moves back.
/// Either read failing fails the whole step.
#[derive(Debug)]
pub struct DualChannelStepReader {
    sampler: ChoppedSignalSampler,
    channels: [AnalogChannel; 2],
    mirror: Mirror,
}

impl DualChannelStepReader {
    /// Reader over `sampler`; `channels[0]` is behind cuvette one.
    pub fn new(sampler: ChoppedSignalSampler, channels: [AnalogChannel; 2], mirror: Mirror) -> Self {
        Self {
            sampler,
            channels,
            mirror,
        }
    }

    /// Detector channel behind `cuvette`.
    pub fn channel_for(&self, cuvette: Cuvette) -> AnalogChannel {
        match cuvette {
            Cuvette::One => self.channels[0],
            Cuvette::Two => self.channels[1],
        }
    }

    /// The mirror, for protocols that hold one cuvette in the beam.
    pub fn mirror_mut(&mut self) -> &mut Mirror {
        &mut self.mirror
    }

    /// (voltage through cuvette one, voltage through cuvette two).
    pub async fn read(&mut self) -> SpectroResult<(f64, f64)> {
        self.mirror.select(Cuvette::One).await?;
        let first = self.sampler.read(self.channels[0]).await?;
        self.mirror.select(Cuvette::Two).await?;
        let second = self.sampler.read(self.channels[1]).await?;
        self.mirror.select(Cuvette::One).await?;
        debug!(first, second, "step read");
        Ok((first, second))
    }
}

/// Assign the step voltages to (reference, sample).
pub fn assign(voltages: (f64, f64), reference: Cuvette) -> (f64, f64) {
    match reference {
        Cuvette::One => voltages,
        Cuvette::Two => (voltages.1, voltages.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::ExtractionPolicy;
    use spectro_core::{BurstConfig, Calibration};
    use spectro_driver_mock::{MockMotion, MockPhotodiode, MotionCommand};

    fn burst() -> BurstConfig {
        BurstConfig {
            sample_rate: 10_000.0,
            samples_per_burst: 1_000,
            chop_frequency: 20.0,
            duty_cycle: 0.5,
        }
    }

    fn reader(motion: Arc<MockMotion>) -> DualChannelStepReader {
        let diode = Arc::new(MockPhotodiode::new(
            motion.clone(),
            Calibration::default(),
            0.333_34,
            [AnalogChannel(0), AnalogChannel(1)],
        ));
        let sampler =
            ChoppedSignalSampler::new(diode, burst(), ExtractionPolicy::MinOfBursts { repeats: 3 });
        let mirror = Mirror::new(motion, 0.333_34, Duration::from_secs(1));
        DualChannelStepReader::new(sampler, [AnalogChannel(0), AnalogChannel(1)], mirror)
    }

    #[tokio::test(start_paused = true)]
    async fn step_moves_mirror_out_and_back() {
        let motion = Arc::new(MockMotion::new());
        let mut reader = reader(motion.clone());
        let start = tokio::time::Instant::now();

        let (one, two) = reader.read().await.unwrap();
        assert!(one < -0.1 && two < -0.1, "both cuvettes lit: {one} {two}");
        assert_eq!(reader.mirror_mut().lit(), Cuvette::One);
        assert!(motion.snapshot().z.abs() < 1e-12);
        // two settle delays
        assert!(start.elapsed() >= Duration::from_secs(2));

        let moves: Vec<_> = motion
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                MotionCommand::Move { axis: Axis::Z, distance, .. } => Some(distance),
                _ => None,
            })
            .collect();
        assert_eq!(moves, vec![0.333_34, -0.333_34]);
    }

    #[test]
    fn assignment_follows_reference_cuvette() {
        assert_eq!(assign((1.0, 2.0), Cuvette::One), (1.0, 2.0));
        assert_eq!(assign((1.0, 2.0), Cuvette::Two), (2.0, 1.0));
    }
}
