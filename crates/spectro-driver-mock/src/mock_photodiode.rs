//! Simulated chopped photodiode pair behind the two cuvettes.

use crate::common::{ErrorConfig, MockMode, MockRng};
use crate::mock_motion::MockMotion;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use spectro_core::capabilities::VoltageSource;
use spectro_core::{AnalogChannel, Axis, BurstConfig, Calibration, Cuvette};
use std::sync::Arc;

const DRIVER: &str = "mock_photodiode";

/// Gaussian absorption band of the simulated sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsorptionBand {
    /// Band center, nm.
    pub center_nm: f64,
    /// Standard deviation, nm.
    pub width_nm: f64,
    /// Absorbance at the center.
    pub peak_absorbance: f64,
}

/// Light path model.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalModel {
    /// Lamp output at its maximum, volts at the detector.
    pub lamp_peak_v: f64,
    /// Wavelength of maximum lamp output.
    pub lamp_center_nm: f64,
    /// Spectral width of the lamp.
    pub lamp_width_nm: f64,
    /// Lamp output far from its maximum.
    pub lamp_floor_v: f64,
    /// Bands of the solution in the sample cuvette.
    pub sample_bands: Vec<AbsorptionBand>,
    /// Cuvette holding the sample.
    pub sample_cuvette: Cuvette,
    /// Detector gains behind cuvette one and cuvette two.
    pub detector_gain: [f64; 2],
    /// Constant offset present with the beam off, volts (positive).
    pub dark_v: f64,
    /// Gaussian noise, volts.
    pub noise_v: f64,
}

impl Default for OpticalModel {
    fn default() -> Self {
        Self {
            lamp_peak_v: 2.0,
            lamp_center_nm: 550.0,
            lamp_width_nm: 300.0,
            lamp_floor_v: 0.1,
            sample_bands: vec![
                AbsorptionBand {
                    center_nm: 520.0,
                    width_nm: 15.0,
                    peak_absorbance: 0.8,
                },
                AbsorptionBand {
                    center_nm: 430.0,
                    width_nm: 10.0,
                    peak_absorbance: 0.4,
                },
            ],
            sample_cuvette: Cuvette::Two,
            detector_gain: [1.0, 1.0],
            dark_v: 0.0,
            noise_v: 0.002,
        }
    }
}

impl OpticalModel {
    /// Lamp intensity at a wavelength, volts.
    pub fn lamp(&self, wavelength_nm: f64) -> f64 {
        let t = (wavelength_nm - self.lamp_center_nm) / self.lamp_width_nm;
        self.lamp_floor_v + (self.lamp_peak_v - self.lamp_floor_v) * (-t * t).exp()
    }

    /// Absorbance of the sample solution at a wavelength.
    pub fn sample_absorbance(&self, wavelength_nm: f64) -> f64 {
        self.sample_bands
            .iter()
            .map(|b| {
                let t = (wavelength_nm - b.center_nm) / b.width_nm;
                b.peak_absorbance * (-t * t / 2.0).exp()
            })
            .sum()
    }

    /// Pulse amplitude seen through `cuvette` at a wavelength.
    pub fn pulse_amplitude(&self, cuvette: Cuvette, wavelength_nm: f64) -> f64 {
        let gain = match cuvette {
            Cuvette::One => self.detector_gain[0],
            Cuvette::Two => self.detector_gain[1],
        };
        let transmission = if cuvette == self.sample_cuvette {
            10f64.powf(-self.sample_absorbance(wavelength_nm))
        } else {
            1.0
        };
        gain * self.lamp(wavelength_nm) * transmission
    }
}

/// Simulated acquisition card with two photodiodes.
///
/// The beam goes through cuvette one when the mirror axis is at its home
/// coordinate and through cuvette two one switch distance away; each
/// cuvette has its own detector channel. Reading a channel whose cuvette is
/// not lit returns only the dark level and noise, so a read taken with the
/// mirror in the wrong place is visibly wrong.
///
/// The chopped light shows up as negative-going square pulses at the chop
/// frequency and duty cycle, with an amplitude set by the lamp, the screw
/// wavelength and, for the sample cuvette, the sample absorbance.
pub struct MockPhotodiode {
    motion: Arc<MockMotion>,
    calibration: Calibration,
    mirror_home: f64,
    mirror_switch_distance: f64,
    channels: [AnalogChannel; 2],
    model: OpticalModel,
    rng: MockRng,
    mode: MockMode,
    error_config: ErrorConfig,
}

impl MockPhotodiode {
    /// Photodiodes reading the screw and mirror of `motion`.
    ///
    /// `channels[0]` sits behind cuvette one, `channels[1]` behind cuvette two.
    pub fn new(
        motion: Arc<MockMotion>,
        calibration: Calibration,
        mirror_switch_distance: f64,
        channels: [AnalogChannel; 2],
    ) -> Self {
        Self {
            motion,
            calibration,
            mirror_home: 0.0,
            mirror_switch_distance,
            channels,
            model: OpticalModel::default(),
            rng: MockRng::new(Some(0x5eed)),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
        }
    }

    /// Replace the optical model.
    pub fn with_model(mut self, model: OpticalModel) -> Self {
        self.model = model;
        self
    }

    /// Reseed the noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = MockRng::new(Some(seed));
        self
    }

    /// Set the timing mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mirror coordinate that lights cuvette one.
    pub fn with_mirror_home(mut self, home: f64) -> Self {
        self.mirror_home = home;
        self
    }

    /// Inject failures. Operation: `read`.
    pub fn with_error_config(mut self, error_config: ErrorConfig) -> Self {
        self.error_config = error_config;
        self
    }

    /// Optical model in use.
    pub fn model(&self) -> &OpticalModel {
        &self.model
    }

    /// Cuvette the mirror currently lights.
    pub fn lit_cuvette(&self) -> Cuvette {
        let offset = self.motion.snapshot().axis(Axis::Z) - self.mirror_home;
        if (offset - self.mirror_switch_distance).abs() < offset.abs() {
            Cuvette::Two
        } else {
            Cuvette::One
        }
    }

    fn cuvette_of(&self, channel: AnalogChannel) -> Result<Cuvette> {
        if channel == self.channels[0] {
            Ok(Cuvette::One)
        } else if channel == self.channels[1] {
            Ok(Cuvette::Two)
        } else {
            Err(anyhow!("{}: no detector on channel {}", DRIVER, channel))
        }
    }

    fn synthesize(&self, amplitude: f64, config: &BurstConfig) -> Vec<f64> {
        let n = config.samples_per_burst;
        let mut samples = vec![0.0; n];
        self.rng.fill_gaussian(&mut samples, self.model.noise_v);
        let cycles_per_sample = config.chop_frequency / config.sample_rate;
        for (k, v) in samples.iter_mut().enumerate() {
            let phase = (k as f64 * cycles_per_sample).fract();
            let light = if phase < config.duty_cycle { amplitude } else { 0.0 };
            *v += -light - self.model.dark_v;
        }
        samples
    }
}

#[async_trait]
impl VoltageSource for MockPhotodiode {
    async fn read_burst(&self, channel: AnalogChannel, config: &BurstConfig) -> Result<Vec<f64>> {
        self.error_config
            .check_operation(DRIVER, "read")
            .map_err(anyhow::Error::from)?;
        if config.samples_per_burst == 0 || !(config.sample_rate > 0.0) {
            return Err(anyhow!("{}: empty acquisition window", DRIVER));
        }

        let cuvette = self.cuvette_of(channel)?;
        let wavelength = self
            .calibration
            .wavelength_of(self.motion.snapshot().axis(Axis::X));
        let amplitude = if self.lit_cuvette() == cuvette {
            self.model.pulse_amplitude(cuvette, wavelength)
        } else {
            0.0
        };

        if self.mode == MockMode::Realistic {
            tokio::time::sleep(config.duration()).await;
        }
        tracing::trace!(%channel, %cuvette, wavelength, amplitude, "mock burst");
        Ok(self.synthesize(amplitude, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectro_core::capabilities::MotionController;
    use spectro_core::MoveMode;

    fn small_burst() -> BurstConfig {
        BurstConfig {
            sample_rate: 10_000.0,
            samples_per_burst: 2_000,
            chop_frequency: 20.0,
            duty_cycle: 0.5,
        }
    }

    fn rig() -> (Arc<MockMotion>, MockPhotodiode) {
        let motion = Arc::new(MockMotion::new());
        let diode = MockPhotodiode::new(
            motion.clone(),
            Calibration::default(),
            0.333_34,
            [AnalogChannel(0), AnalogChannel(1)],
        );
        (motion, diode)
    }

    #[tokio::test]
    async fn pulses_are_negative_with_lamp_amplitude() {
        let (_motion, diode) = rig();
        let burst = diode.read_burst(AnalogChannel(0), &small_burst()).await.unwrap();
        assert_eq!(burst.len(), 2_000);
        let min = burst.iter().copied().fold(f64::INFINITY, f64::min);
        let expected = diode.model().pulse_amplitude(Cuvette::One, 800.0);
        assert!((min + expected).abs() < 0.02, "min {min} expected -{expected}");
        let max = burst.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(max.abs() < 0.02);
    }

    #[tokio::test]
    async fn unlit_channel_reads_dark() {
        let (_motion, diode) = rig();
        let burst = diode.read_burst(AnalogChannel(1), &small_burst()).await.unwrap();
        let min = burst.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(min > -0.02);
    }

    #[tokio::test]
    async fn mirror_switch_lights_second_cuvette() {
        let (motion, diode) = rig();
        motion.move_axis(Axis::Z, 0.333_34, MoveMode::Relative).await.unwrap();
        assert_eq!(diode.lit_cuvette(), Cuvette::Two);
        let burst = diode.read_burst(AnalogChannel(1), &small_burst()).await.unwrap();
        let min = burst.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(min < -0.05);
    }

    #[tokio::test]
    async fn unknown_channel_is_error() {
        let (_motion, diode) = rig();
        assert!(diode.read_burst(AnalogChannel(5), &small_burst()).await.is_err());
    }

    #[test]
    fn sample_absorbance_peaks_at_band_center() {
        let model = OpticalModel::default();
        assert!((model.sample_absorbance(520.0) - 0.8).abs() < 1e-3);
        assert!(model.sample_absorbance(700.0) < 1e-6);
    }
}
