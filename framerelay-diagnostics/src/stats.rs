//! Periodic logging of frame-adapter counters

use crate::connection_analyzer::{analyze, summarize};
use framerelay_core::ConnectionRegistry;
use framerelay_media::{AdapterSnapshot, AdapterStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Logs adapter throughput (and optionally connection counts) every interval
#[derive(Debug)]
pub struct StatsReporter {
    label: String,
    stats: Arc<AdapterStats>,
    registry: Option<ConnectionRegistry>,
}

impl StatsReporter {
    /// Reporter for one adapter's counters
    pub fn new(label: impl Into<String>, stats: Arc<AdapterStats>) -> Self {
        Self {
            label: label.into(),
            stats,
            registry: None,
        }
    }

    /// Also report the connections in `registry`
    pub fn with_registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Start a reporter task for `stats`
    ///
    /// The task stops when `cancel` fires and returns the final counters.
    pub fn spawn(
        label: impl Into<String>,
        stats: Arc<AdapterStats>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<AdapterSnapshot> {
        Self::new(label, stats).start(interval, cancel)
    }

    /// Start reporting every `interval` until `cancel` fires
    pub fn start(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<AdapterSnapshot> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            let mut previous = self.stats.snapshot();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = self.stats.snapshot();
                        self.report(&previous, &current, interval);
                        previous = current;
                    }
                }
            }

            let last = self.stats.snapshot();
            tracing::info!(
                "{}: {} frames total ({} transformed, {} failed open)",
                self.label,
                last.total(),
                last.processed,
                last.failed
            );
            last
        })
    }

    fn report(&self, previous: &AdapterSnapshot, current: &AdapterSnapshot, interval: Duration) {
        let delta = current.total().saturating_sub(previous.total());
        let failed = current.failed.saturating_sub(previous.failed);
        let fps = delta as f64 / interval.as_secs_f64().max(f64::EPSILON);

        match &self.registry {
            Some(registry) => {
                let summary = summarize(&analyze(registry));
                tracing::info!(
                    connections = summary.total,
                    connected = summary.connected,
                    "{}: {:.1} fps, {} failed open in the last {:?}",
                    self.label,
                    fps,
                    failed,
                    interval
                );
            }
            None => tracing::info!(
                "{}: {:.1} fps, {} failed open in the last {:?}",
                self.label,
                fps,
                failed,
                interval
            ),
        }
        if failed > 0 {
            tracing::warn!("{}: transform failing, frames forwarded unchanged", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framerelay_media::{BgrImage, FrameAdapter, MediaError, MediaResult, TimeBase};

    #[tokio::test]
    async fn test_reporter_returns_final_counts() {
        let adapter = FrameAdapter::with_transform(|_: &BgrImage| -> MediaResult<BgrImage> {
            Err(MediaError::CaptureNotActive)
        });
        let cancel = CancellationToken::new();
        let task = StatsReporter::spawn(
            "test",
            adapter.stats(),
            Duration::from_millis(10),
            cancel.clone(),
        );

        let image = BgrImage::solid(8, 8, [0, 0, 0]).unwrap();
        let frame = framerelay_media::bgr_to_i420(&image, 0, TimeBase::RTP_VIDEO).unwrap();
        for _ in 0..3 {
            adapter.process(frame.clone());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let last = tokio_test::assert_ok!(task.await);
        assert_eq!(last.failed, 3);
        assert_eq!(last.total(), 3);
    }

    #[tokio::test]
    async fn test_reporter_with_registry_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = StatsReporter::new("server", Arc::new(AdapterStats::default()))
            .with_registry(ConnectionRegistry::new())
            .start(Duration::from_millis(5), cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), AdapterSnapshot::default());
    }
}
