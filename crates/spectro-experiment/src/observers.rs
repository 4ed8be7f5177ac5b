//! Live point observers.
//!
//! Observers see every computed point as it is produced. They are
//! fire-and-forget: `publish` never waits, and a point nobody is listening
//! for is dropped.

use serde::{Deserialize, Serialize};
use spectro_core::capabilities::PointObserver;
use tokio::sync::broadcast;

/// Series name for sweep absorbance points (x = wavelength).
pub const SERIES_ABSORBANCE: &str = "absorbance";
/// Series name for kinetics points (x = elapsed seconds).
pub const SERIES_KINETICS: &str = "kinetics";

/// One published point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    /// Series the point belongs to.
    pub series: String,
    /// Abscissa.
    pub x: f64,
    /// Ordinate.
    pub y: f64,
}

/// Publishes points on a tokio broadcast channel.
///
/// Slow subscribers lag and lose old points rather than slowing the
/// acquisition.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<LivePoint>,
}

impl BroadcastObserver {
    /// Observer with room for `capacity` undelivered points per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New receiver for points published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LivePoint> {
        self.tx.subscribe()
    }
}

impl PointObserver for BroadcastObserver {
    fn publish(&self, series: &str, x: f64, y: f64) {
        // Err only means there is no subscriber.
        let _ = self.tx.send(LivePoint {
            series: series.to_string(),
            x,
            y,
        });
    }
}

/// Logs every point at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PointObserver for TracingObserver {
    fn publish(&self, series: &str, x: f64, y: f64) {
        tracing::debug!(target: "spectro::live", series, x, y, "point");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscriber_is_ignored() {
        let obs = BroadcastObserver::new(4);
        obs.publish(SERIES_ABSORBANCE, 400.0, 0.1);
    }

    #[tokio::test]
    async fn subscriber_receives_points_in_order() {
        let obs = BroadcastObserver::new(8);
        let mut rx = obs.subscribe();
        obs.publish(SERIES_ABSORBANCE, 410.0, 0.2);
        obs.publish(SERIES_ABSORBANCE, 405.0, 0.3);
        assert_eq!(rx.recv().await.unwrap().x, 410.0);
        assert_eq!(rx.recv().await.unwrap().y, 0.3);
    }

    #[tokio::test]
    async fn lagging_subscriber_does_not_block() {
        let obs = BroadcastObserver::new(2);
        let mut rx = obs.subscribe();
        for i in 0..10 {
            obs.publish(SERIES_KINETICS, i as f64, 0.0);
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
