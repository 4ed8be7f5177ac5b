//! Common infrastructure for mock devices.
//!
//! - **mode**: Instant or realistic timing
//! - **errors**: Failure injection
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;

pub use errors::{ErrorConfig, ErrorScenario};
pub use mode::MockMode;
pub use rng::MockRng;
