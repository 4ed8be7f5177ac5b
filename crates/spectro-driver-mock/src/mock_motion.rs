//! Simulated three-axis motion controller.

use crate::common::{ErrorConfig, MockMode};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use spectro_core::capabilities::{DigitalInput, MotionController};
use spectro_core::{Axis, MachinePosition, MoveMode, SensorPin};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

const DRIVER: &str = "mock_motion";

/// Command received by the simulated controller, for assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    /// `move_axis`
    Move {
        /// Axis moved
        axis: Axis,
        /// Distance or target
        distance: f64,
        /// Relative or absolute
        mode: MoveMode,
    },
    /// `set_speed`
    SetSpeed {
        /// Axis configured
        axis: Axis,
        /// Rate in mm/min
        mm_per_min: f64,
    },
    /// `stop`
    Stop,
    /// `resume`
    Resume,
    /// `unlock`
    Unlock,
}

#[derive(Debug)]
struct MotionState {
    position: [f64; 3],
    speed: [f64; 3],
    busy_until: Option<Instant>,
    /// Motion time left when a feed hold was issued.
    held: Option<Duration>,
    stalled: bool,
    sensors: HashMap<SensorPin, bool>,
    log: Vec<MotionCommand>,
}

/// Optical fork on one axis: triggered once the axis reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkSensor {
    /// Input the fork is wired to.
    pub pin: SensorPin,
    /// Axis carrying the flag.
    pub axis: Axis,
    /// Axis coordinate from which the fork reads `true`.
    pub threshold: f64,
}

/// Simulated G-code controller.
///
/// Positions update as soon as a move is accepted; in
/// [`MockMode::Realistic`] the controller then reports busy for
/// `distance * 60 / speed` seconds of tokio time. A stalled controller
/// never reports idle, which lets tests exercise the bounded idle wait.
///
/// # Example
///
/// ```rust,ignore
/// let motion = MockMotion::new().with_mode(MockMode::Realistic);
/// motion.move_axis(Axis::X, 0.5, MoveMode::Relative).await?;
/// assert!(!motion.is_idle().await?);
/// ```
#[derive(Clone)]
pub struct MockMotion {
    state: Arc<Mutex<MotionState>>,
    mode: MockMode,
    fork: Option<ForkSensor>,
    error_config: ErrorConfig,
}

impl Default for MockMotion {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMotion {
    /// Instant-mode controller at the origin, 10/14/20 mm/min.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MotionState {
                position: [0.0; 3],
                speed: [10.0, 14.0, 20.0],
                busy_until: None,
                held: None,
                stalled: false,
                sensors: HashMap::new(),
                log: Vec::new(),
            })),
            mode: MockMode::Instant,
            fork: None,
            error_config: ErrorConfig::none(),
        }
    }

    /// Set the timing mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Inject failures. Operations: `move`, `status`, `speed`, `sensor`.
    pub fn with_error_config(mut self, error_config: ErrorConfig) -> Self {
        self.error_config = error_config;
        self
    }

    /// Attach an optical fork.
    pub fn with_fork(mut self, fork: ForkSensor) -> Self {
        self.fork = Some(fork);
        self
    }

    /// Start at a given position.
    pub fn with_position(self, position: MachinePosition) -> Self {
        {
            let mut state = self.state.lock();
            state.position = [position.x, position.y, position.z];
        }
        self
    }

    /// Make the controller report busy forever (or recover).
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Force a digital input.
    pub fn set_sensor(&self, pin: SensorPin, value: bool) {
        self.state.lock().sensors.insert(pin, value);
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.state.lock().log.clone()
    }

    /// Current position without going through the capability (no error
    /// injection).
    pub fn snapshot(&self) -> MachinePosition {
        let p = self.state.lock().position;
        MachinePosition {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        self.error_config
            .check_operation(DRIVER, operation)
            .map_err(anyhow::Error::from)
    }
}

#[async_trait]
impl MotionController for MockMotion {
    async fn move_axis(&self, axis: Axis, distance: f64, mode: MoveMode) -> Result<()> {
        self.check("move")?;
        if !distance.is_finite() {
            return Err(anyhow!("{}: non-finite move on {}", DRIVER, axis));
        }

        let mut state = self.state.lock();
        let i = axis.index();
        let travel = match mode {
            MoveMode::Relative => distance,
            MoveMode::Absolute => distance - state.position[i],
        };
        state.position[i] += travel;
        state.log.push(MotionCommand::Move { axis, distance, mode });

        if self.mode == MockMode::Realistic {
            let seconds = travel.abs() * 60.0 / state.speed[i];
            let now = Instant::now();
            let start = state.busy_until.filter(|t| *t > now).unwrap_or(now);
            state.busy_until = Some(start + Duration::from_secs_f64(seconds));
        }
        tracing::debug!(%axis, distance, ?mode, "mock motion accepted move");
        Ok(())
    }

    async fn is_idle(&self) -> Result<bool> {
        self.check("status")?;
        let state = self.state.lock();
        if state.stalled || state.held.is_some() {
            return Ok(false);
        }
        Ok(state.busy_until.map_or(true, |t| Instant::now() >= t))
    }

    async fn position(&self) -> Result<MachinePosition> {
        self.check("status")?;
        Ok(self.snapshot())
    }

    async fn set_speed(&self, axis: Axis, mm_per_min: f64) -> Result<()> {
        self.check("speed")?;
        if !(mm_per_min > 0.0) {
            return Err(anyhow!("{}: speed must be positive, got {}", DRIVER, mm_per_min));
        }
        let mut state = self.state.lock();
        state.speed[axis.index()] = mm_per_min;
        state.log.push(MotionCommand::SetSpeed { axis, mm_per_min });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let remaining = state
            .busy_until
            .filter(|t| *t > now)
            .map(|t| t - now)
            .unwrap_or(Duration::ZERO);
        state.held = Some(remaining);
        state.log.push(MotionCommand::Stop);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.held.take() {
            state.busy_until = Some(Instant::now() + remaining);
        }
        state.log.push(MotionCommand::Resume);
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        self.state.lock().log.push(MotionCommand::Unlock);
        Ok(())
    }
}

#[async_trait]
impl DigitalInput for MockMotion {
    async fn read_sensor(&self, pin: SensorPin) -> Result<bool> {
        self.check("sensor")?;
        let state = self.state.lock();
        if let Some(fork) = self.fork.filter(|f| f.pin == pin) {
            return Ok(state.position[fork.axis.index()] >= fork.threshold);
        }
        Ok(state.sensors.get(&pin).copied().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[tokio::test]
    async fn relative_and_absolute_moves() {
        let motion = MockMotion::new();
        motion.move_axis(Axis::X, 1.5, MoveMode::Relative).await.unwrap();
        motion.move_axis(Axis::X, 0.5, MoveMode::Relative).await.unwrap();
        motion.move_axis(Axis::Y, 0.135, MoveMode::Absolute).await.unwrap();
        let p = motion.position().await.unwrap();
        assert!((p.x - 2.0).abs() < 1e-12);
        assert!((p.y - 0.135).abs() < 1e-12);
        assert!(motion.is_idle().await.unwrap());
        assert_eq!(motion.commands().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn realistic_mode_is_busy_for_travel_time() {
        let motion = MockMotion::new().with_mode(MockMode::Realistic);
        // 0.5 mm at 10 mm/min = 3 s
        motion.move_axis(Axis::X, 0.5, MoveMode::Relative).await.unwrap();
        assert!(!motion.is_idle().await.unwrap());
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(!motion.is_idle().await.unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(motion.is_idle().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn feed_hold_pauses_motion() {
        let motion = MockMotion::new().with_mode(MockMode::Realistic);
        motion.move_axis(Axis::X, 0.5, MoveMode::Relative).await.unwrap();
        motion.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!motion.is_idle().await.unwrap());
        motion.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(motion.is_idle().await.unwrap());
    }

    #[tokio::test]
    async fn stalled_controller_never_idle() {
        let motion = MockMotion::new();
        motion.set_stalled(true);
        assert!(!motion.is_idle().await.unwrap());
    }

    #[tokio::test]
    async fn fork_follows_axis() {
        let motion = MockMotion::new().with_fork(ForkSensor {
            pin: SensorPin::LimitZ,
            axis: Axis::Z,
            threshold: 0.05,
        });
        assert!(!motion.read_sensor(SensorPin::LimitZ).await.unwrap());
        motion.move_axis(Axis::Z, 0.06, MoveMode::Relative).await.unwrap();
        assert!(motion.read_sensor(SensorPin::LimitZ).await.unwrap());
        assert!(!motion.read_sensor(SensorPin::Probe).await.unwrap());
    }

    #[tokio::test]
    async fn injected_move_failure() {
        let motion = MockMotion::new().with_error_config(ErrorConfig::scenario(
            ErrorScenario::FailAfterN {
                operation: "move",
                count: 1,
            },
        ));
        assert!(motion.move_axis(Axis::X, 0.1, MoveMode::Relative).await.is_ok());
        assert!(motion.move_axis(Axis::X, 0.1, MoveMode::Relative).await.is_err());
    }
}
