//! Failure injection for the simulated devices.
//!
//! Lets tests kill a detector or a controller link part way through a run
//! and check what the acquisition loop keeps. Failures surface as
//! spectro-core's [`DriverError`].

use parking_lot::Mutex;
use spectro_core::error::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Failure plan shared by clones of one device.
#[derive(Clone, Debug, Default)]
pub struct ErrorConfig {
    scenarios: Arc<Vec<ErrorScenario>>,
    state: Arc<Mutex<Counters>>,
}

/// A deterministic failure pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorScenario {
    /// Every call of `operation` after the first `count` reports a hardware
    /// fault.
    FailAfterN {
        /// Operation name ("read", "move", "status", "speed", "sensor")
        operation: &'static str,
        /// Successful calls before the first failure
        count: u32,
    },
    /// Every call of `operation` times out.
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// The link drops after `after` successful calls of any operation and
    /// stays down.
    CommunicationLoss {
        /// Calls served before the drop
        after: u32,
    },
}

#[derive(Debug, Default)]
struct Counters {
    per_operation: HashMap<&'static str, u32>,
    total: u32,
    link_down: bool,
}

impl ErrorConfig {
    /// No injected failures.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single failure pattern.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several patterns, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self {
            scenarios: Arc::new(scenarios),
            state: Arc::default(),
        }
    }

    /// Count a call of `operation` and decide whether it fails.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut counters = self.state.lock();
        let lost = || DriverError::new(driver_type, DriverErrorKind::Communication, "link lost");
        if counters.link_down {
            return Err(lost());
        }
        counters.total += 1;
        let total = counters.total;
        let calls = {
            let n = counters.per_operation.entry(operation).or_insert(0);
            *n += 1;
            *n
        };

        for scenario in self.scenarios.iter() {
            match *scenario {
                ErrorScenario::CommunicationLoss { after } if total > after => {
                    counters.link_down = true;
                    return Err(lost());
                }
                ErrorScenario::FailAfterN { operation: op, count }
                    if op == operation && calls > count =>
                {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("injected fault after {} '{}' calls", count, operation),
                    ));
                }
                ErrorScenario::Timeout { operation: op } if op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("'{}' timed out", operation),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Clear counters and bring the link back up.
    pub fn reset(&self) {
        *self.state.lock() = Counters::default();
    }
}
