//! Backend selection from configuration.

use anyhow::{Context, Result};
use spectro_core::capabilities::{DigitalInput, MotionController, VoltageSource};
use spectro_core::config::SpectroConfig;
use spectro_core::SpectroError;
use spectro_driver_grbl::{GrblConfig, GrblController};
use spectro_driver_mock::{MockMode, SimulatedInstrument};
use std::sync::Arc;
use tracing::info;

/// Hardware handles for one session.
pub struct Instrument {
    pub motion: Arc<dyn MotionController>,
    pub sensors: Option<Arc<dyn DigitalInput>>,
    pub voltage: Arc<dyn VoltageSource>,
}

/// Connect the motion controller alone, for commands that never acquire.
pub async fn connect_motion(config: &SpectroConfig) -> Result<Arc<GrblOrMock>> {
    match config.motion.backend.as_str() {
        "grbl" => {
            let grbl = GrblController::connect(&GrblConfig::from_motion(&config.motion))
                .await
                .with_context(|| format!("Failed to connect GRBL on {}", config.motion.port))?;
            Ok(Arc::new(GrblOrMock::Grbl(Arc::new(grbl))))
        }
        _ => Ok(Arc::new(GrblOrMock::Mock(SimulatedInstrument::from_config(
            config,
            MockMode::Realistic,
        )))),
    }
}

/// Either backend, kept concrete so `status` can print driver details.
pub enum GrblOrMock {
    Grbl(Arc<GrblController>),
    Mock(SimulatedInstrument),
}

impl GrblOrMock {
    pub fn motion(&self) -> Arc<dyn MotionController> {
        match self {
            GrblOrMock::Grbl(g) => g.clone(),
            GrblOrMock::Mock(rig) => rig.motion.clone(),
        }
    }

    pub fn sensors(&self) -> Arc<dyn DigitalInput> {
        match self {
            GrblOrMock::Grbl(g) => g.clone(),
            GrblOrMock::Mock(rig) => rig.motion.clone(),
        }
    }
}

/// Build motion, sensors and acquisition for a measurement.
///
/// The simulated photodiodes read the simulated screw position, so they can
/// only be paired with the simulated motion backend.
pub async fn connect(config: &SpectroConfig, instant: bool) -> Result<Instrument> {
    let acquisition = config.acquisition.backend.as_str();
    if acquisition != "simulated" {
        return Err(SpectroError::FeatureNotEnabled(format!(
            "acquisition backend '{}' is not compiled into this build",
            acquisition
        ))
        .into());
    }
    if config.motion.backend != "simulated" {
        return Err(SpectroError::Configuration(format!(
            "simulated acquisition needs the simulated motion backend, not '{}'",
            config.motion.backend
        ))
        .into());
    }

    let mode = if instant {
        MockMode::Instant
    } else {
        MockMode::Realistic
    };
    let rig = SimulatedInstrument::from_config(config, mode);
    info!(?mode, "using simulated instrument");
    Ok(Instrument {
        motion: rig.motion.clone(),
        sensors: Some(rig.motion.clone()),
        voltage: rig.photodiode,
    })
}
