//! Chopped-signal voltage sampler.
//!
//! The photodiode output is a negative-going square pulse at the chop
//! frequency; the pulse depth measures the light intensity. A sampler turns
//! one or more raw bursts into a single voltage.

use spectro_analysis::PeakSearch;
use spectro_core::capabilities::VoltageSource;
use spectro_core::config::{AcquisitionConfig, ExtractionPolicyKind};
use spectro_core::{AnalogChannel, BurstConfig, SpectroError, SpectroResult};
use std::sync::Arc;
use tracing::{instrument, warn};

/// How a reading is extracted from raw bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// Acquire `repeats` bursts, take the minimum of each, average the minima.
    MinOfBursts {
        /// Bursts per reading.
        repeats: usize,
    },
    /// Acquire one burst, find the pulse extremes at least one chop period
    /// apart and average them.
    PeakAverage,
}

impl ExtractionPolicy {
    /// Policy named in configuration.
    pub fn from_kind(kind: ExtractionPolicyKind, repeats: usize) -> Self {
        match kind {
            ExtractionPolicyKind::MinOfBursts => ExtractionPolicy::MinOfBursts {
                repeats: repeats.max(1),
            },
            ExtractionPolicyKind::PeakAverage => ExtractionPolicy::PeakAverage,
        }
    }

    /// Bursts to acquire per reading.
    pub fn bursts(&self) -> usize {
        match self {
            ExtractionPolicy::MinOfBursts { repeats } => *repeats,
            ExtractionPolicy::PeakAverage => 1,
        }
    }
}

/// Mean of the per-burst minima.
pub fn min_of_bursts(bursts: &[Vec<f64>]) -> SpectroResult<f64> {
    let mut minima = Vec::with_capacity(bursts.len());
    for burst in bursts {
        let min = burst
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .min_by(f64::total_cmp)
            .ok_or_else(|| SpectroError::Numeric("burst has no finite sample".into()))?;
        minima.push(min);
    }
    if minima.is_empty() {
        return Err(SpectroError::Numeric("no burst acquired".into()));
    }
    Ok(minima.iter().sum::<f64>() / minima.len() as f64)
}

/// Mean of the pulse extremes, at least `period` samples apart.
///
/// Pulses go negative, so the extremes are the peaks of the inverted
/// signal. A burst with no interior extreme falls back to its minimum.
pub fn peak_average(burst: &[f64], period: usize) -> SpectroResult<f64> {
    if burst.iter().any(|v| !v.is_finite()) {
        return Err(SpectroError::Numeric("burst contains non-finite samples".into()));
    }
    let inverted: Vec<f64> = burst.iter().map(|v| -v).collect();
    let peaks = PeakSearch::with_distance(period).find_indices(&inverted);
    if peaks.is_empty() {
        warn!(samples = burst.len(), "no chop pulse found, using burst minimum");
        return burst
            .iter()
            .copied()
            .min_by(f64::total_cmp)
            .ok_or_else(|| SpectroError::Numeric("empty burst".into()));
    }
    Ok(peaks.iter().map(|&i| burst[i]).sum::<f64>() / peaks.len() as f64)
}

/// Reads one voltage per call from a [`VoltageSource`].
///
/// Hardware failures are not retried; they come back as
/// [`SpectroError::Hardware`].
#[derive(Clone)]
pub struct ChoppedSignalSampler {
    source: Arc<dyn VoltageSource>,
    burst: BurstConfig,
    policy: ExtractionPolicy,
}

impl std::fmt::Debug for ChoppedSignalSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoppedSignalSampler")
            .field("burst", &self.burst)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ChoppedSignalSampler {
    /// Sampler over `source`.
    pub fn new(source: Arc<dyn VoltageSource>, burst: BurstConfig, policy: ExtractionPolicy) -> Self {
        Self {
            source,
            burst,
            policy,
        }
    }

    /// Sampler for sweeps, as configured.
    pub fn for_sweeps(source: Arc<dyn VoltageSource>, config: &AcquisitionConfig) -> Self {
        Self::new(
            source,
            config.burst(),
            ExtractionPolicy::from_kind(config.sweep_policy, config.bursts_per_reading),
        )
    }

    /// Sampler for kinetics, as configured.
    pub fn for_kinetics(source: Arc<dyn VoltageSource>, config: &AcquisitionConfig) -> Self {
        Self::new(
            source,
            config.burst(),
            ExtractionPolicy::from_kind(config.kinetics_policy, config.bursts_per_reading),
        )
    }

    /// Extraction policy in use.
    pub fn policy(&self) -> ExtractionPolicy {
        self.policy
    }

    /// Acquire and reduce to one voltage.
    #[instrument(skip(self), err)]
    pub async fn read(&self, channel: AnalogChannel) -> SpectroResult<f64> {
        let mut bursts = Vec::with_capacity(self.policy.bursts());
        for _ in 0..self.policy.bursts() {
            let burst = self
                .source
                .read_burst(channel, &self.burst)
                .await
                .map_err(|e| SpectroError::hardware(&format!("burst on {}", channel), e))?;
            bursts.push(burst);
        }
        match self.policy {
            ExtractionPolicy::MinOfBursts { .. } => min_of_bursts(&bursts),
            ExtractionPolicy::PeakAverage => {
                let burst = bursts
                    .first()
                    .ok_or_else(|| SpectroError::Numeric("no burst acquired".into()))?;
                peak_average(burst, self.burst.samples_per_period())
            }
        }
    }
}
