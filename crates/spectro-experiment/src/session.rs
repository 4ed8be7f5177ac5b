//! Instrument session: the hardware handles and settings of one run.
//!
//! A [`Session`] owns everything a sweep or a kinetics run needs. Runs take
//! `&mut Session`, so only one can be in flight per instrument; stopping is
//! done from elsewhere through a cloned [`StopHandle`].

use crate::confirm::AutoConfirm;
use crate::sampler::ChoppedSignalSampler;
use crate::step_reader::{DualChannelStepReader, Mirror};
use spectro_core::capabilities::{
    Confirm, DigitalInput, ExportSink, MotionController, PointObserver, VoltageSource,
};
use spectro_core::config::SpectroConfig;
use spectro_core::poll::{poll_until, PollPolicy};
use spectro_core::{Calibration, SpectroError, SpectroResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative stop flag, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Flag in the "running" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the current run to stop at its next iteration boundary.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Hardware and settings for one instrument.
pub struct Session {
    pub(crate) config: SpectroConfig,
    pub(crate) calibration: Calibration,
    pub(crate) motion: Arc<dyn MotionController>,
    pub(crate) sensors: Option<Arc<dyn DigitalInput>>,
    pub(crate) sink: Arc<dyn ExportSink>,
    pub(crate) observers: Vec<Arc<dyn PointObserver>>,
    pub(crate) confirm: Arc<dyn Confirm>,
    pub(crate) stop: StopHandle,
    pub(crate) step_reader: DualChannelStepReader,
    pub(crate) kinetics_sampler: ChoppedSignalSampler,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("calibration", &self.calibration)
            .field("sensors", &self.sensors.is_some())
            .field("observers", &self.observers.len())
            .field("step_reader", &self.step_reader)
            .finish()
    }
}

impl Session {
    /// Start building a session from validated configuration.
    pub fn builder(config: SpectroConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            motion: None,
            sensors: None,
            voltage: None,
            sink: None,
            observers: Vec::new(),
            confirm: None,
            stop: StopHandle::new(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SpectroConfig {
        &self.config
    }

    /// Calibration in use.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Clone of the stop flag.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The motion controller.
    pub fn motion(&self) -> &Arc<dyn MotionController> {
        &self.motion
    }

    /// The export sink.
    pub fn sink(&self) -> &Arc<dyn ExportSink> {
        &self.sink
    }

    pub(crate) fn publish(&self, series: &str, x: f64, y: f64) {
        for observer in &self.observers {
            observer.publish(series, x, y);
        }
    }

    pub(crate) fn idle_policy(&self) -> PollPolicy {
        self.config.motion.idle_poll.policy()
    }

    /// Wait until the controller reports idle, bounded by the idle poll policy.
    pub async fn wait_idle(&self, what: &str) -> SpectroResult<()> {
        let policy = self.idle_policy();
        poll_until(what, &policy, || self.motion.is_idle()).await
    }

    /// Time the screw needs to travel `distance` mm.
    pub(crate) fn screw_travel_time(&self, distance: f64) -> Duration {
        travel_time(distance, self.config.motion.screw_speed_mm_per_min)
    }

    pub(crate) fn storage_error(context: &str, err: anyhow::Error) -> SpectroError {
        SpectroError::Storage(format!("{}: {:#}", context, err))
    }
}

/// `distance * 60 / speed`, as a duration.
pub fn travel_time(distance: f64, mm_per_min: f64) -> Duration {
    if !(mm_per_min > 0.0) || !distance.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(distance.abs() * 60.0 / mm_per_min)
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SpectroConfig,
    motion: Option<Arc<dyn MotionController>>,
    sensors: Option<Arc<dyn DigitalInput>>,
    voltage: Option<Arc<dyn VoltageSource>>,
    sink: Option<Arc<dyn ExportSink>>,
    observers: Vec<Arc<dyn PointObserver>>,
    confirm: Option<Arc<dyn Confirm>>,
    stop: StopHandle,
}

impl SessionBuilder {
    /// Motion controller (required).
    pub fn motion(mut self, motion: Arc<dyn MotionController>) -> Self {
        self.motion = Some(motion);
        self
    }

    /// Digital inputs, for mirror homing on the optical fork.
    pub fn sensors(mut self, sensors: Arc<dyn DigitalInput>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Acquisition card (required).
    pub fn voltage(mut self, voltage: Arc<dyn VoltageSource>) -> Self {
        self.voltage = Some(voltage);
        self
    }

    /// Export sink (required).
    pub fn sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Add a live observer.
    pub fn observer(mut self, observer: Arc<dyn PointObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Operator confirmation; defaults to [`AutoConfirm`].
    pub fn confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// Share an existing stop flag (e.g. one wired to Ctrl-C).
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Validate the configuration and assemble the session.
    pub fn build(self) -> SpectroResult<Session> {
        self.config.validate()?;
        let motion = self
            .motion
            .ok_or_else(|| SpectroError::Configuration("session needs a motion controller".into()))?;
        let voltage = self
            .voltage
            .ok_or_else(|| SpectroError::Configuration("session needs a voltage source".into()))?;
        let sink = self
            .sink
            .ok_or_else(|| SpectroError::Configuration("session needs an export sink".into()))?;

        let acquisition = &self.config.acquisition;
        let mirror = Mirror::new(
            motion.clone(),
            self.config.motion.mirror_switch_distance,
            self.config.motion.mirror_settle(),
        );
        let step_reader = DualChannelStepReader::new(
            ChoppedSignalSampler::for_sweeps(voltage.clone(), acquisition),
            [acquisition.first_channel, acquisition.second_channel],
            mirror,
        );
        let kinetics_sampler = ChoppedSignalSampler::for_kinetics(voltage, acquisition);

        Ok(Session {
            calibration: self.config.calibration,
            config: self.config,
            motion,
            sensors: self.sensors,
            sink,
            observers: self.observers,
            confirm: self.confirm.unwrap_or_else(|| Arc::new(AutoConfirm::default())),
            stop: self.stop,
            step_reader,
            kinetics_sampler,
        })
    }
}
