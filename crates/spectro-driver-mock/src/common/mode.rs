//! Operational modes for mock devices.

/// Operational modes for mock devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Motion completes immediately and bursts return without delay.
    #[default]
    Instant,
    /// Motion takes `distance / speed` and bursts take
    /// `samples / sample_rate`, on the tokio clock.
    Realistic,
}
