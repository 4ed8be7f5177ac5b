//! GRBL real-time status reports.
//!
//! A reply to `?` looks like `<Idle|MPos:1.000,0.065,0.333|FS:0,0|Pn:Z>`.
//! Only the state, the machine position and the input pins are used here;
//! every other field is ignored.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use spectro_core::{MachinePosition, SensorPin};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static MPOS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"MPos:(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)")
        .expect("Invalid MPos regex")
});

#[allow(clippy::expect_used)]
static PINS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Pn:([A-Z]+)").expect("Invalid Pn regex"));

/// Parsed status report.
#[derive(Debug, Clone, PartialEq)]
pub struct GrblStatus {
    /// Machine state (`Idle`, `Run`, `Hold:0`, `Alarm`, ...).
    pub state: String,
    /// Machine position in mm.
    pub position: MachinePosition,
    /// Letters of the input pins currently triggered.
    pub pins: String,
}

impl GrblStatus {
    /// Whether the controller has finished all motion.
    pub fn is_idle(&self) -> bool {
        self.state.contains("Idle")
    }

    /// Whether an input pin is triggered.
    pub fn pin(&self, pin: SensorPin) -> bool {
        self.pins.contains(pin.pn_letter())
    }
}

/// Whether a line is a status report.
pub fn is_status_line(line: &str) -> bool {
    line.starts_with('<') && line.contains("MPos")
}

/// Parse a status report line.
pub fn parse_status(line: &str) -> Result<GrblStatus> {
    let body = line
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| anyhow!("not a GRBL status report: '{}'", line.trim()))?;

    let state = body.split('|').next().unwrap_or_default().to_string();

    let caps = MPOS
        .captures(body)
        .ok_or_else(|| anyhow!("no MPos field in status report: '{}'", body))?;
    let mut axes = [0.0f64; 3];
    for (i, axis) in axes.iter_mut().enumerate() {
        *axis = caps[i + 1]
            .parse()
            .with_context(|| format!("bad MPos coordinate '{}'", &caps[i + 1]))?;
    }

    let pins = PINS
        .captures(body)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    Ok(GrblStatus {
        state,
        position: MachinePosition {
            x: axes[0],
            y: axes[1],
            z: axes[2],
        },
        pins,
    })
}
