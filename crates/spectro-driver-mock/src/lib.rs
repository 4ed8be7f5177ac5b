//! Mock hardware for the spectrophotometer.
//!
//! Simulated devices for running sweeps and kinetics without the instrument.
//! All timing uses `tokio::time`, so tests can run on a paused clock.
//!
//! # Available Mock Drivers
//!
//! - [`MockMotion`] - three-axis G-code controller (screw, slit, mirror)
//!   with optional optical fork and realistic travel time
//! - [`MockPhotodiode`] - two chopped photodiodes whose signal follows the
//!   screw wavelength, the mirror position and a sample absorbance model
//!
//! ```rust,ignore
//! use spectro_driver_mock::{MockMode, SimulatedInstrument};
//!
//! let rig = SimulatedInstrument::from_config(&config, MockMode::Instant);
//! let session = Session::builder(config)
//!     .motion(rig.motion.clone())
//!     .voltage(rig.photodiode.clone())
//!     .sink(Arc::new(MemorySink::new()))
//!     .build()?;
//! ```

pub mod common;
mod mock_motion;
mod mock_photodiode;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng};
pub use mock_motion::{ForkSensor, MockMotion, MotionCommand};
pub use mock_photodiode::{AbsorptionBand, MockPhotodiode, OpticalModel};

use spectro_core::config::SpectroConfig;
use spectro_core::{Axis, SensorPin};
use std::sync::Arc;

/// Mirror coordinate at which the simulated fork triggers.
pub const SIMULATED_FORK_Z: f64 = 0.05;

/// Motion controller and photodiodes wired to each other.
#[derive(Clone)]
pub struct SimulatedInstrument {
    /// Screw, slit and mirror axes.
    pub motion: Arc<MockMotion>,
    /// Detectors behind both cuvettes.
    pub photodiode: Arc<MockPhotodiode>,
}

impl SimulatedInstrument {
    /// Build a rig matching `config`: same channels, calibration, mirror
    /// switch distance and axis speeds. When mirror homing on the fork is
    /// enabled the fork sits at [`SIMULATED_FORK_Z`] and cuvette one is lit
    /// there.
    pub fn from_config(config: &SpectroConfig, mode: MockMode) -> Self {
        Self::with_model(config, mode, OpticalModel::default())
    }

    /// Same as [`SimulatedInstrument::from_config`] with a custom optical model.
    pub fn with_model(config: &SpectroConfig, mode: MockMode, model: OpticalModel) -> Self {
        let mut motion = MockMotion::new().with_mode(mode);
        let mut mirror_home = 0.0;
        if config.motion.mirror_home_on_fork {
            motion = motion.with_fork(ForkSensor {
                pin: SensorPin::LimitZ,
                axis: Axis::Z,
                threshold: SIMULATED_FORK_Z,
            });
            mirror_home = SIMULATED_FORK_Z;
        }
        let motion = Arc::new(motion);

        let photodiode = MockPhotodiode::new(
            motion.clone(),
            config.calibration,
            config.motion.mirror_switch_distance,
            [
                config.acquisition.first_channel,
                config.acquisition.second_channel,
            ],
        )
        .with_mode(mode)
        .with_mirror_home(mirror_home)
        .with_model(model);

        tracing::info!(?mode, fork = config.motion.mirror_home_on_fork, "simulated instrument ready");
        Self {
            motion,
            photodiode: Arc::new(photodiode),
        }
    }
}
