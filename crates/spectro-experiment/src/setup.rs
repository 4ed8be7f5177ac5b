//! Instrument initialisation: axis speeds, mirror homing, slit selection.

use crate::session::Session;
use spectro_core::{Axis, MoveMode, SensorPin, SlitWidth, SpectroError, SpectroResult};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Input the mirror's optical fork is wired to.
pub const MIRROR_FORK_PIN: SensorPin = SensorPin::LimitZ;

impl Session {
    /// Configure speeds, home the mirror and select the default slit.
    #[instrument(skip(self), err)]
    pub async fn initialize(&mut self) -> SpectroResult<()> {
        self.apply_speeds().await?;
        self.motion
            .unlock()
            .await
            .map_err(|e| SpectroError::hardware("controller unlock", e))?;
        self.home_mirror().await?;
        self.select_slit(self.config.motion.default_slit).await?;
        info!("instrument initialised");
        Ok(())
    }

    /// Send the configured maximum rate of every axis.
    pub async fn apply_speeds(&self) -> SpectroResult<()> {
        let m = &self.config.motion;
        for (axis, speed) in [
            (Axis::X, m.screw_speed_mm_per_min),
            (Axis::Y, m.slit_speed_mm_per_min),
            (Axis::Z, m.mirror_speed_mm_per_min),
        ] {
            self.motion
                .set_speed(axis, speed)
                .await
                .map_err(|e| SpectroError::hardware(&format!("speed of axis {}", axis), e))?;
        }
        Ok(())
    }

    /// Step the mirror until the optical fork triggers.
    ///
    /// Returns `false` when homing is disabled or no sensor input is
    /// attached. Gives up with `StallTimeout` when the fork has not triggered
    /// after the maximum travel or the idle poll timeout.
    #[instrument(skip(self), err)]
    pub async fn home_mirror(&mut self) -> SpectroResult<bool> {
        let motion_cfg = self.config.motion.clone();
        if !motion_cfg.mirror_home_on_fork {
            return Ok(false);
        }
        let Some(sensors) = self.sensors.clone() else {
            warn!("mirror homing enabled but no sensor input attached, skipping");
            return Ok(false);
        };

        let policy = self.idle_policy();
        let start = Instant::now();
        let mut travelled = 0.0;
        loop {
            let triggered = sensors
                .read_sensor(MIRROR_FORK_PIN)
                .await
                .map_err(|e| SpectroError::hardware("mirror fork read", e))?;
            if triggered {
                break;
            }
            let exhausted = travelled + motion_cfg.mirror_home_step
                > motion_cfg.mirror_home_max_travel + 1e-9;
            if exhausted || start.elapsed() >= policy.timeout {
                return Err(SpectroError::StallTimeout {
                    what: format!("mirror optical fork after {:.3} mm", travelled),
                    waited: start.elapsed(),
                });
            }
            self.motion
                .move_axis(Axis::Z, motion_cfg.mirror_home_step, MoveMode::Relative)
                .await
                .map_err(|e| SpectroError::hardware("mirror homing step", e))?;
            travelled += motion_cfg.mirror_home_step;
            self.wait_idle("mirror homing step").await?;
        }

        self.step_reader.mirror_mut().reset();
        info!(travelled, "mirror on reference cuvette");
        Ok(true)
    }

    /// Move the slit selector to `slit` and wait for it.
    #[instrument(skip(self), err)]
    pub async fn select_slit(&self, slit: SlitWidth) -> SpectroResult<()> {
        let position = self.config.motion.slit_position(slit);
        self.motion
            .move_axis(Axis::Y, position, MoveMode::Absolute)
            .await
            .map_err(|e| SpectroError::hardware("slit move", e))?;
        self.wait_idle("slit selector").await?;
        info!(%slit, position, "slit selected");
        Ok(())
    }
}
