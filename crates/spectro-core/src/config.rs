//! Configuration System using Figment
//!
//! Strongly-typed instrument configuration, loaded from:
//! 1. a TOML file (base configuration, every field optional)
//! 2. environment variables prefixed with `SPECTRO_`, sections separated by
//!    a double underscore (`SPECTRO_MOTION__SCREW_SPEED_MM_PER_MIN=12`)
//!
//! Defaults reproduce the canonical instrument setup, so an empty file is a
//! valid configuration for the simulated backend.
//!
//! # Example
//! ```no_run
//! use spectro_core::config::SpectroConfig;
//!
//! let config = SpectroConfig::load_from("config/spectro.toml")?;
//! config.validate()?;
//! println!("slope: {}", config.calibration.slope);
//! # Ok::<(), spectro_core::error::SpectroError>(())
//! ```

use crate::calibration::Calibration;
use crate::error::{SpectroError, SpectroResult};
use crate::poll::PollPolicy;
use crate::types::{AnalogChannel, BurstConfig, SlitWidth};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectroConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Screw calibration
    pub calibration: Calibration,
    /// Detector acquisition
    pub acquisition: AcquisitionConfig,
    /// Motion controller and axes
    pub motion: MotionConfig,
    /// Post-processing
    pub processing: ProcessingConfig,
    /// Output files
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Varian 634 spectrophotometer".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How one representative voltage is extracted from chopped bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPolicyKind {
    /// Average of the minima of repeated bursts.
    MinOfBursts,
    /// Average amplitude of the chop pulses inside one burst.
    PeakAverage,
}

/// Detector acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Channel read with the mirror at home (beam through cuvette 1).
    pub first_channel: AnalogChannel,
    /// Channel read with the mirror switched (beam through cuvette 2).
    pub second_channel: AnalogChannel,
    /// Samples per second
    pub sample_rate: f64,
    /// Samples per burst
    pub samples_per_burst: usize,
    /// Chopper frequency in Hz
    pub chop_frequency: f64,
    /// Chopper duty cycle
    pub duty_cycle: f64,
    /// Bursts averaged by the min-of-bursts policy
    pub bursts_per_reading: usize,
    /// Policy for sweep readings
    pub sweep_policy: ExtractionPolicyKind,
    /// Policy for kinetics readings
    pub kinetics_policy: ExtractionPolicyKind,
    /// Backend name (`simulated`, or a card driver compiled into the build)
    pub backend: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let burst = BurstConfig::default();
        Self {
            first_channel: AnalogChannel(0),
            second_channel: AnalogChannel(1),
            sample_rate: burst.sample_rate,
            samples_per_burst: burst.samples_per_burst,
            chop_frequency: burst.chop_frequency,
            duty_cycle: burst.duty_cycle,
            bursts_per_reading: 3,
            sweep_policy: ExtractionPolicyKind::MinOfBursts,
            kinetics_policy: ExtractionPolicyKind::PeakAverage,
            backend: "simulated".to_string(),
        }
    }
}

impl AcquisitionConfig {
    /// Burst window described by this section.
    pub fn burst(&self) -> BurstConfig {
        BurstConfig {
            sample_rate: self.sample_rate,
            samples_per_burst: self.samples_per_burst,
            chop_frequency: self.chop_frequency,
            duty_cycle: self.duty_cycle,
        }
    }
}

/// Motion controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Backend name (`grbl` or `simulated`)
    pub backend: String,
    /// Serial port of the controller
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout for line commands, seconds
    pub timeout_secs: f64,
    /// Delay after the wake sequence, milliseconds
    pub wake_delay_ms: u64,
    /// Screw travel rate, mm/min. Paces the sweep.
    pub screw_speed_mm_per_min: f64,
    /// Slit axis travel rate, mm/min
    pub slit_speed_mm_per_min: f64,
    /// Mirror axis travel rate, mm/min
    pub mirror_speed_mm_per_min: f64,
    /// Mirror move between the two cuvettes
    pub mirror_switch_distance: f64,
    /// Settle time after a mirror move, milliseconds
    pub mirror_settle_ms: u64,
    /// Step used while homing the mirror on the optical fork
    pub mirror_home_step: f64,
    /// Maximum mirror travel while homing
    pub mirror_home_max_travel: f64,
    /// Home the mirror on the optical fork before acquisition
    pub mirror_home_on_fork: bool,
    /// Slit axis positions for 2, 1, 0.5 and 0.2 nm
    pub slit_positions: [f64; 4],
    /// Slit used when none is requested
    pub default_slit: SlitWidth,
    /// Idle polling
    pub idle_poll: PollSettings,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            backend: "simulated".to_string(),
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_secs: 5.0,
            wake_delay_ms: 2000,
            screw_speed_mm_per_min: 10.0,
            slit_speed_mm_per_min: 14.0,
            mirror_speed_mm_per_min: 20.0,
            mirror_switch_distance: 0.333_34,
            mirror_settle_ms: 1000,
            mirror_home_step: 0.01,
            mirror_home_max_travel: 1.0,
            mirror_home_on_fork: false,
            slit_positions: [0.0, 0.065, 0.135, 0.22],
            default_slit: SlitWidth::Nm2,
            idle_poll: PollSettings::default(),
        }
    }
}

impl MotionConfig {
    /// Slit axis position for a slit width.
    pub fn slit_position(&self, slit: SlitWidth) -> f64 {
        self.slit_positions[slit.index()]
    }

    /// Mirror settle delay.
    pub fn mirror_settle(&self) -> Duration {
        Duration::from_millis(self.mirror_settle_ms)
    }
}

/// Serializable form of a [`PollPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Give up after this many seconds
    pub timeout_secs: f64,
    /// First poll interval, milliseconds
    pub initial_interval_ms: u64,
    /// Upper bound on the poll interval, milliseconds
    pub max_interval_ms: u64,
    /// Interval multiplier between polls
    pub backoff_factor: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120.0,
            initial_interval_ms: 100,
            max_interval_ms: 1000,
            backoff_factor: 1.5,
        }
    }
}

impl PollSettings {
    /// Runtime policy.
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_secs_f64(self.timeout_secs.max(0.0)),
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

/// Baseline correction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BaselineSettings {
    /// No baseline correction.
    None,
    /// Subtract the mean absorbance of a recorded blank.
    Mean,
    /// Asymmetric least squares.
    Als {
        /// Smoothness weight
        lambda: f64,
        /// Asymmetry weight
        p: f64,
        /// Iteration cap
        max_iter: usize,
        /// Convergence tolerance on the fitted curve
        tolerance: f64,
    },
    /// Lowest-degree polynomial (0 to `max_degree`) fitted to a recorded blank.
    Polynomial {
        /// Highest degree tried
        max_degree: usize,
    },
}

impl Default for BaselineSettings {
    fn default() -> Self {
        BaselineSettings::Als {
            lambda: 1e6,
            p: 0.1,
            max_iter: 10,
            tolerance: 1e-6,
        }
    }
}

/// Post-processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Baseline policy
    pub baseline: BaselineSettings,
    /// Savitzky-Golay window (odd); 0 disables smoothing
    pub smoothing_window: usize,
    /// Savitzky-Golay polynomial order
    pub smoothing_order: usize,
    /// Minimum index separation between peaks
    pub peak_window: usize,
    /// Minimum peak height
    pub min_peak_height: Option<f64>,
    /// Minimum peak prominence
    pub min_peak_prominence: Option<f64>,
    /// Clamp sample voltages so absorbance is never negative
    pub negative_correction: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineSettings::default(),
            smoothing_window: 15,
            smoothing_order: 2,
            peak_window: 60,
            min_peak_height: None,
            min_peak_prominence: None,
            negative_correction: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for session folders
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl SpectroConfig {
    /// Load configuration from `config/spectro.toml` and the environment.
    pub fn load() -> SpectroResult<Self> {
        Self::load_from("config/spectro.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SpectroResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// Provider chain: defaults, then file, then environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SpectroConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPECTRO_").split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> SpectroResult<()> {
        let invalid = |msg: String| Err(SpectroError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        self.calibration.validate()?;

        let acq = &self.acquisition;
        if !(acq.sample_rate > 0.0) || acq.samples_per_burst == 0 {
            return invalid("sample_rate and samples_per_burst must be positive".into());
        }
        if !(acq.chop_frequency > 0.0) || acq.chop_frequency * 2.0 > acq.sample_rate {
            return invalid(format!(
                "chop_frequency {} Hz must be positive and below half the sample rate",
                acq.chop_frequency
            ));
        }
        if !(acq.duty_cycle > 0.0 && acq.duty_cycle < 1.0) {
            return invalid(format!("duty_cycle {} must be in (0, 1)", acq.duty_cycle));
        }
        if acq.bursts_per_reading == 0 {
            return invalid("bursts_per_reading must be at least 1".into());
        }
        if acq.first_channel == acq.second_channel {
            return invalid(format!(
                "first and second channel are both {}",
                acq.first_channel
            ));
        }

        let motion = &self.motion;
        let valid_backends = ["grbl", "simulated"];
        if !valid_backends.contains(&motion.backend.as_str()) {
            return invalid(format!(
                "Invalid motion backend '{}'. Must be one of: {}",
                motion.backend,
                valid_backends.join(", ")
            ));
        }
        for (name, speed) in [
            ("screw", motion.screw_speed_mm_per_min),
            ("slit", motion.slit_speed_mm_per_min),
            ("mirror", motion.mirror_speed_mm_per_min),
        ] {
            if !(speed > 0.0) {
                return invalid(format!("{} speed must be positive, got {}", name, speed));
            }
        }
        if motion.mirror_switch_distance == 0.0 || !motion.mirror_switch_distance.is_finite() {
            return invalid("mirror_switch_distance must be finite and non-zero".into());
        }
        if motion.mirror_home_on_fork && !(motion.mirror_home_step > 0.0) {
            return invalid("mirror_home_step must be positive".into());
        }
        let poll = &motion.idle_poll;
        if !(poll.timeout_secs > 0.0) || poll.initial_interval_ms == 0 || poll.backoff_factor < 1.0
        {
            return invalid("idle_poll needs a positive timeout and interval, backoff >= 1".into());
        }

        let proc = &self.processing;
        if proc.smoothing_window != 0 {
            if proc.smoothing_window % 2 == 0 {
                return invalid(format!(
                    "smoothing_window {} must be odd",
                    proc.smoothing_window
                ));
            }
            if proc.smoothing_order >= proc.smoothing_window {
                return invalid("smoothing_order must be below smoothing_window".into());
            }
        }
        match proc.baseline {
            BaselineSettings::Als { lambda, p, max_iter, tolerance } => {
                if !(lambda > 0.0) || !(p > 0.0 && p < 1.0) || max_iter == 0 || !(tolerance >= 0.0) {
                    return invalid(
                        "ALS needs lambda > 0, 0 < p < 1, max_iter >= 1, tolerance >= 0".into(),
                    );
                }
            }
            BaselineSettings::Polynomial { max_degree } if max_degree > 2 => {
                return invalid(format!("polynomial max_degree {} exceeds 2", max_degree));
            }
            _ => {}
        }

        Ok(())
    }
}
