//! GRBL motion controller driver for the spectrophotometer.
//!
//! The instrument's three steppers hang off one GRBL board:
//!
//! | Axis | Mechanism |
//! |------|-----------|
//! | X | diffraction-grating screw (wavelength) |
//! | Y | slit selector |
//! | Z | cuvette-switching mirror |
//!
//! [`GrblController`] implements `MotionController` and `DigitalInput`, so
//! the acquisition code never sees G-code or status strings.

mod grbl;
pub mod status;

pub use grbl::{available_ports, GrblConfig, GrblController};
pub use status::{parse_status, GrblStatus};
