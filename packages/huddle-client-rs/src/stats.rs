//! Connection-quality sampling and classification.
//!
//! The media engine exposes raw per-session stats; this module folds them
//! into a single coarse [`QualityBand`] suitable for a UI indicator, and
//! runs the periodic sampler that keeps it fresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Raw stats for one peer session. Fields the media engine could not report
/// this interval are `None` and simply do not constrain the band.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    /// Inbound packet loss over the sample window, in percent.
    pub packet_loss_pct: Option<f64>,
    /// Round-trip time estimate, in milliseconds.
    pub round_trip_ms: Option<f64>,
}

/// Coarse connection-quality band, worst session wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityBand {
    Poor,
    Fair,
    Good,
    Excellent,
    /// No sessions, or no usable measurements yet.
    Unknown,
}

impl SessionStats {
    /// Classify this session. Each present metric imposes a ceiling; with
    /// neither metric present the band is `Unknown`.
    pub fn band(&self) -> QualityBand {
        let loss_band = self.packet_loss_pct.map(|loss| {
            if loss <= 1.0 {
                QualityBand::Excellent
            } else if loss <= 3.0 {
                QualityBand::Good
            } else if loss <= 8.0 {
                QualityBand::Fair
            } else {
                QualityBand::Poor
            }
        });
        let rtt_band = self.round_trip_ms.map(|rtt| {
            if rtt <= 100.0 {
                QualityBand::Excellent
            } else if rtt <= 250.0 {
                QualityBand::Good
            } else if rtt <= 500.0 {
                QualityBand::Fair
            } else {
                QualityBand::Poor
            }
        });
        match (loss_band, rtt_band) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => QualityBand::Unknown,
        }
    }
}

/// Fold per-session stats into one band: the worst measured session.
/// No sessions, or only unmeasured ones, yields `Unknown`.
pub fn classify(sessions: &[SessionStats]) -> QualityBand {
    sessions
        .iter()
        .map(SessionStats::band)
        .filter(|band| *band != QualityBand::Unknown)
        .min()
        .unwrap_or(QualityBand::Unknown)
}

/// Supplier of the current per-session stats, sampled on each tick.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn sample(&self) -> Vec<SessionStats>;
}

/// Periodic sampler publishing the current [`QualityBand`] on a watch
/// channel.
pub struct QualityMonitor {
    band_rx: watch::Receiver<QualityBand>,
    handle: JoinHandle<()>,
}

impl QualityMonitor {
    pub fn spawn(source: Arc<dyn StatsSource>, interval: Duration) -> Self {
        let (band_tx, band_rx) = watch::channel(QualityBand::Unknown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let band = classify(&source.sample().await);
                if *band_tx.borrow() != band {
                    debug!(?band, "Quality band changed");
                }
                if band_tx.send(band).is_err() {
                    return;
                }
            }
        });
        Self { band_rx, handle }
    }

    /// Latest published band.
    pub fn band(&self) -> QualityBand {
        *self.band_rx.borrow()
    }

    /// Observe band changes.
    pub fn watch(&self) -> watch::Receiver<QualityBand> {
        self.band_rx.clone()
    }

    /// Stop sampling. The last published band remains readable.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for QualityMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(loss: f64, rtt: f64) -> SessionStats {
        SessionStats {
            packet_loss_pct: Some(loss),
            round_trip_ms: Some(rtt),
        }
    }

    #[test]
    fn test_one_percent_loss_at_80ms_is_excellent() {
        assert_eq!(stats(1.0, 80.0).band(), QualityBand::Excellent);
    }

    #[test]
    fn test_band_is_worst_of_both_metrics() {
        // Low loss but terrible latency.
        assert_eq!(stats(0.1, 600.0).band(), QualityBand::Poor);
        // Low latency but heavy loss.
        assert_eq!(stats(12.0, 20.0).band(), QualityBand::Poor);
        assert_eq!(stats(2.5, 90.0).band(), QualityBand::Good);
        assert_eq!(stats(5.0, 300.0).band(), QualityBand::Fair);
    }

    #[test]
    fn test_missing_metrics_do_not_constrain() {
        let loss_only = SessionStats {
            packet_loss_pct: Some(0.5),
            round_trip_ms: None,
        };
        assert_eq!(loss_only.band(), QualityBand::Excellent);

        let rtt_only = SessionStats {
            packet_loss_pct: None,
            round_trip_ms: Some(400.0),
        };
        assert_eq!(rtt_only.band(), QualityBand::Fair);

        assert_eq!(SessionStats::default().band(), QualityBand::Unknown);
    }

    #[test]
    fn test_aggregate_takes_worst_session_and_handles_empty() {
        assert_eq!(classify(&[]), QualityBand::Unknown);
        assert_eq!(classify(&[SessionStats::default()]), QualityBand::Unknown);
        assert_eq!(
            classify(&[stats(0.2, 40.0), stats(6.0, 90.0), SessionStats::default()]),
            QualityBand::Fair
        );
    }

    struct FixedSource(Vec<SessionStats>);

    #[async_trait]
    impl StatsSource for FixedSource {
        async fn sample(&self) -> Vec<SessionStats> {
            self.0.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_band_on_interval() {
        let source = Arc::new(FixedSource(vec![stats(0.5, 60.0)]));
        let monitor = QualityMonitor::spawn(source, Duration::from_millis(2_000));
        let mut watcher = monitor.watch();

        tokio::time::advance(Duration::from_millis(2_100)).await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while *watcher.borrow() != QualityBand::Excellent {
                watcher.changed().await.expect("sampler alive");
            }
        })
        .await
        .expect("band published");

        monitor.stop();
    }
}
