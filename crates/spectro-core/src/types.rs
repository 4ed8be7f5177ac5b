//! Domain types shared by drivers, analysis and the acquisition loop.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Hardware addressing
// =============================================================================

/// Motion axis of the instrument.
///
/// The wiring is fixed by the retrofit: the grating screw is on X, the slit
/// selector on Y and the cuvette-switching mirror on Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Diffraction-grating screw (wavelength selection), mm.
    X,
    /// Slit selector.
    Y,
    /// Cuvette-switching mirror.
    Z,
}

impl Axis {
    /// All axes in controller order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// G-code axis letter.
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Zero-based index into per-axis arrays.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Interpretation of a move distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    /// Distance is an offset from the current position (`G91`).
    Relative,
    /// Distance is a machine coordinate (`G90`).
    Absolute,
}

/// Machine position reported by the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MachinePosition {
    /// Screw axis.
    pub x: f64,
    /// Slit axis.
    pub y: f64,
    /// Mirror axis.
    pub z: f64,
}

impl MachinePosition {
    /// Coordinate of one axis.
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Analog input channel of the acquisition card (`ai0`, `ai1`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalogChannel(pub u8);

impl fmt::Display for AnalogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ai{}", self.0)
    }
}

/// Digital inputs exposed by the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorPin {
    /// X limit switch (screw home).
    LimitX,
    /// Y limit switch.
    LimitY,
    /// Z limit switch. The mirror's optical fork is wired here.
    LimitZ,
    /// Probe input.
    Probe,
}

impl SensorPin {
    /// Letter used in GRBL's `Pn:` status field.
    pub fn pn_letter(self) -> char {
        match self {
            SensorPin::LimitX => 'X',
            SensorPin::LimitY => 'Y',
            SensorPin::LimitZ => 'Z',
            SensorPin::Probe => 'P',
        }
    }
}

// =============================================================================
// Optical path
// =============================================================================

/// Physical cuvette position.
///
/// The mirror's home position points the beam through cuvette one; the
/// switch move points it through cuvette two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cuvette {
    /// Beam through the first cuvette (mirror at home).
    One,
    /// Beam through the second cuvette (mirror switched).
    Two,
}

impl Cuvette {
    /// The other cuvette.
    pub fn other(self) -> Cuvette {
        match self {
            Cuvette::One => Cuvette::Two,
            Cuvette::Two => Cuvette::One,
        }
    }
}

impl fmt::Display for Cuvette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cuvette::One => write!(f, "cuvette 1"),
            Cuvette::Two => write!(f, "cuvette 2"),
        }
    }
}

/// Selectable slit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlitWidth {
    /// 2 nm bandwidth.
    #[serde(rename = "2nm")]
    Nm2,
    /// 1 nm bandwidth.
    #[serde(rename = "1nm")]
    Nm1,
    /// 0.5 nm bandwidth.
    #[serde(rename = "0.5nm")]
    Nm0_5,
    /// 0.2 nm bandwidth.
    #[serde(rename = "0.2nm")]
    Nm0_2,
}

impl SlitWidth {
    /// All widths, in slit-axis order.
    pub const ALL: [SlitWidth; 4] = [SlitWidth::Nm2, SlitWidth::Nm1, SlitWidth::Nm0_5, SlitWidth::Nm0_2];

    /// Index into the configured slit position table.
    pub fn index(self) -> usize {
        match self {
            SlitWidth::Nm2 => 0,
            SlitWidth::Nm1 => 1,
            SlitWidth::Nm0_5 => 2,
            SlitWidth::Nm0_2 => 3,
        }
    }

    /// Directory-safe label.
    pub fn label(self) -> &'static str {
        match self {
            SlitWidth::Nm2 => "slit_2nm",
            SlitWidth::Nm1 => "slit_1nm",
            SlitWidth::Nm0_5 => "slit_0_5nm",
            SlitWidth::Nm0_2 => "slit_0_2nm",
        }
    }
}

impl fmt::Display for SlitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlitWidth::Nm2 => "2nm",
            SlitWidth::Nm1 => "1nm",
            SlitWidth::Nm0_5 => "0.5nm",
            SlitWidth::Nm0_2 => "0.2nm",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SlitWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches("nm") {
            "2" => Ok(SlitWidth::Nm2),
            "1" => Ok(SlitWidth::Nm1),
            "0.5" | "0_5" => Ok(SlitWidth::Nm0_5),
            "0.2" | "0_2" => Ok(SlitWidth::Nm0_2),
            other => Err(format!("unknown slit width '{}' (expected 2, 1, 0.5 or 0.2 nm)", other)),
        }
    }
}

// =============================================================================
// Acquisition parameters
// =============================================================================

/// Acquisition window for one burst on one channel.
///
/// The chop parameters configure the synchronized square-wave output that
/// drives the light modulation; the sampler only uses them for timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Samples per second.
    pub sample_rate: f64,
    /// Number of samples in one burst.
    pub samples_per_burst: usize,
    /// Chopper frequency in Hz.
    pub chop_frequency: f64,
    /// Chopper duty cycle in (0, 1).
    pub duty_cycle: f64,
}

impl BurstConfig {
    /// Samples in one chop period.
    pub fn samples_per_period(&self) -> usize {
        if self.chop_frequency <= 0.0 {
            return self.samples_per_burst;
        }
        ((self.sample_rate / self.chop_frequency).round() as usize).max(1)
    }

    /// Wall-clock length of one burst.
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate <= 0.0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples_per_burst as f64 / self.sample_rate)
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250_000.0,
            samples_per_burst: 30_000,
            chop_frequency: 20.0,
            duty_cycle: 0.5,
        }
    }
}

// =============================================================================
// Measurements
// =============================================================================

/// Outcome of one absorbance computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AbsorbanceResult {
    /// Finite absorbance.
    Value(f64),
    /// The voltage pair has no finite absorbance (zero, non-finite or
    /// opposite-sign voltages).
    Invalid,
}

impl AbsorbanceResult {
    /// The value, if finite.
    pub fn value(self) -> Option<f64> {
        match self {
            AbsorbanceResult::Value(v) => Some(v),
            AbsorbanceResult::Invalid => None,
        }
    }

    /// Export representation: invalid points become `NaN`.
    pub fn as_f64(self) -> f64 {
        self.value().unwrap_or(f64::NAN)
    }

    /// Whether this is a finite value.
    pub fn is_valid(self) -> bool {
        matches!(self, AbsorbanceResult::Value(_))
    }
}

impl From<f64> for AbsorbanceResult {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            AbsorbanceResult::Value(v)
        } else {
            AbsorbanceResult::Invalid
        }
    }
}

/// One (reference, sample) voltage pair at one screw position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepMeasurement {
    /// Screw position in mm.
    pub position_mm: f64,
    /// Wavelength at that position.
    pub wavelength_nm: f64,
    /// Voltage through the reference cuvette.
    pub reference_v: f64,
    /// Voltage through the sample cuvette.
    pub sample_v: f64,
}

/// One record of a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    /// Wavelength in nm.
    pub wavelength_nm: f64,
    /// Absorbance, `log10(reference / sample)`.
    pub absorbance: AbsorbanceResult,
    /// Reference voltage.
    pub reference_v: f64,
    /// Sample voltage.
    pub sample_v: f64,
    /// Screw position in mm.
    pub position_mm: f64,
}

/// Ordered spectrum, in acquisition order.
///
/// Stored as a vector of records so every column has the same length by
/// construction; the column accessors build the parallel arrays on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    points: Vec<SpectrumPoint>,
}

impl Spectrum {
    /// Empty spectrum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty spectrum with room for `n` points.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            points: Vec::with_capacity(n),
        }
    }

    /// Append a record.
    pub fn push(&mut self, point: SpectrumPoint) {
        self.points.push(point);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Records in acquisition order.
    pub fn points(&self) -> &[SpectrumPoint] {
        &self.points
    }

    /// Wavelength column.
    pub fn wavelengths(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.wavelength_nm).collect()
    }

    /// Absorbance column with invalid points as `NaN`.
    pub fn absorbances(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.absorbance.as_f64()).collect()
    }

    /// Absorbance column as computed.
    pub fn absorbance_results(&self) -> Vec<AbsorbanceResult> {
        self.points.iter().map(|p| p.absorbance).collect()
    }

    /// Reference voltage column.
    pub fn reference_voltages(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.reference_v).collect()
    }

    /// Sample voltage column.
    pub fn sample_voltages(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.sample_v).collect()
    }

    /// Position column.
    pub fn positions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.position_mm).collect()
    }
}

impl FromIterator<SpectrumPoint> for Spectrum {
    fn from_iter<I: IntoIterator<Item = SpectrumPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// One kinetics sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KineticsSample {
    /// Seconds since the start of the timed loop.
    pub elapsed_s: f64,
    /// Sample-channel voltage.
    pub sample_v: f64,
    /// Absorbance against the trace's reference voltage.
    pub absorbance: AbsorbanceResult,
}

/// Time-resolved absorbance at one wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KineticsTrace {
    /// Target wavelength.
    pub wavelength_nm: f64,
    /// Reference voltage read once before the loop.
    pub reference_v: f64,
    /// Samples in time order.
    pub samples: Vec<KineticsSample>,
}

impl KineticsTrace {
    /// Elapsed-time column.
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.elapsed_s).collect()
    }

    /// Absorbance column with invalid points as `NaN`.
    pub fn absorbances(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.absorbance.as_f64()).collect()
    }
}

/// Local maximum of an absorbance trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Index into the trace.
    pub index: usize,
    /// Wavelength at the peak.
    pub wavelength_nm: f64,
    /// Absorbance at the peak.
    pub absorbance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_display() {
        assert_eq!(AnalogChannel(1).to_string(), "ai1");
    }

    #[test]
    fn cuvette_other_is_involution() {
        assert_eq!(Cuvette::One.other(), Cuvette::Two);
        assert_eq!(Cuvette::One.other().other(), Cuvette::One);
    }

    #[test]
    fn slit_width_parsing() {
        assert_eq!("0.5".parse::<SlitWidth>(), Ok(SlitWidth::Nm0_5));
        assert_eq!("2nm".parse::<SlitWidth>(), Ok(SlitWidth::Nm2));
        assert!("3".parse::<SlitWidth>().is_err());
    }

    #[test]
    fn samples_per_period_matches_chop() {
        let cfg = BurstConfig::default();
        assert_eq!(cfg.samples_per_period(), 12_500);
        assert!((cfg.duration().as_secs_f64() - 0.12).abs() < 1e-6);
    }

    #[test]
    fn invalid_absorbance_exports_nan() {
        assert!(AbsorbanceResult::Invalid.as_f64().is_nan());
        assert_eq!(AbsorbanceResult::from(0.25).value(), Some(0.25));
        assert_eq!(AbsorbanceResult::from(f64::INFINITY), AbsorbanceResult::Invalid);
    }

    #[test]
    fn spectrum_columns_share_length() {
        let spectrum: Spectrum = (0..4)
            .map(|i| SpectrumPoint {
                wavelength_nm: 500.0 - i as f64,
                absorbance: AbsorbanceResult::Value(0.1),
                reference_v: 1.0,
                sample_v: 0.8,
                position_mm: i as f64 * 0.03,
            })
            .collect();
        assert_eq!(spectrum.len(), 4);
        assert_eq!(spectrum.wavelengths().len(), 4);
        assert_eq!(spectrum.positions().len(), 4);
        assert_eq!(spectrum.absorbances().len(), 4);
    }
}
