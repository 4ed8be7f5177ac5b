//! `spectro-experiment`
//!
//! Acquisition sequencing for the scanning spectrophotometer.
//!
//! A [`Session`] owns the motion controller, the acquisition card, the
//! export sink and the live observers of one instrument. On it:
//!
//! - [`Session::initialize`] configures axis speeds, homes the mirror and
//!   selects the default slit
//! - [`Session::sweep`] records an absorbance spectrum, writing every point
//!   through to the sink before the screw advances
//! - [`Session::kinetics`] records absorbance against time at fixed
//!   wavelengths
//!
//! Voltages come from a [`ChoppedSignalSampler`], which turns bursts of the
//! chopped photodiode signal into one voltage per read. Runs stop early and
//! cleanly through a [`StopHandle`].

pub mod confirm;
pub mod export;
pub mod kinetics;
pub mod observers;
pub mod sampler;
pub mod sequencer;
pub mod session;
pub mod setup;
pub mod step_reader;

pub use confirm::{is_yes, AutoConfirm, StdinConfirm};
pub use export::{export_processed, write_table};
pub use kinetics::{KineticsReport, KineticsRequest};
pub use observers::{BroadcastObserver, LivePoint, TracingObserver, SERIES_ABSORBANCE, SERIES_KINETICS};
pub use sampler::{min_of_bursts, peak_average, ChoppedSignalSampler, ExtractionPolicy};
pub use sequencer::{SweepPlan, SweepReport, SweepRequest};
pub use session::{travel_time, Session, SessionBuilder, StopHandle};
pub use setup::MIRROR_FORK_PIN;
pub use step_reader::{assign, DualChannelStepReader, Mirror};
