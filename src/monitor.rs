use std::time::Duration;

use futures::future::FutureExt;
use futures_util::future::RemoteHandle;

use crate::exposition::{self, SampleError};
use crate::gateway::Gateway;
use crate::model::Sample;

pub const SCAN_INTERVAL: Duration = Duration::from_secs(60);
pub const PACING_DELAY: Duration = Duration::from_millis(50);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Samples whose last push is at least this old get deleted.
    pub aging_time: Duration,
    pub scan_interval: Duration,
    pub pacing_delay: Duration,
}

impl MonitorConfig {
    pub fn new(aging_time: Duration) -> Self {
        Self {
            aging_time,
            scan_interval: SCAN_INTERVAL,
            pacing_delay: PACING_DELAY,
        }
    }

    /// One-off wait before the first scan interval, so the first scan lands a
    /// full aging window after startup. Zero when the aging time is shorter
    /// than a scan interval.
    pub fn warmup(&self) -> Duration {
        self.aging_time.saturating_sub(self.scan_interval)
    }
}

/// Outcome of one pass over the gateway's metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: usize,
    pub fresh: usize,
    pub stale: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A sample is stale when it was last pushed at or before `now - aging_time`.
pub fn is_stale(timestamp: f64, now: f64, aging_time: Duration) -> bool {
    let cutoff = now - aging_time.as_secs_f64();
    timestamp <= cutoff
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

pub struct AgingMonitorTask<G: Gateway> {
    gateway: G,
    config: MonitorConfig,
}

impl<G: Gateway> AgingMonitorTask<G> {
    pub fn new(gateway: G, config: MonitorConfig) -> Self {
        Self { gateway, config }
    }

    pub async fn run(self) {
        tracing::info!(
            aging_time = %humantime::format_duration(self.config.aging_time),
            "starting aging monitor"
        );
        tokio::time::sleep(self.config.warmup()).await;

        loop {
            tokio::time::sleep(self.config.scan_interval).await;

            match self.scan(now_seconds()).await {
                Ok(report) => tracing::info!(
                    matched = report.matched,
                    fresh = report.fresh,
                    stale = report.stale,
                    deleted = report.deleted,
                    failed = report.failed,
                    skipped = report.skipped,
                    "aging scan complete"
                ),
                Err(e) => tracing::error!("fetching gateway metrics failed: {}", e),
            }

            tokio::time::sleep(self.config.pacing_delay).await;
        }
    }

    /// Fetches the gateway metrics once and deletes every stale group, in
    /// payload order. Only the fetch can fail the scan; problems with a single
    /// sample are logged and the scan moves on.
    pub async fn scan(&self, now: f64) -> Result<ScanReport, G::Error> {
        let body = self.gateway.fetch_metrics().await?;

        let mut report = ScanReport::default();
        for line in exposition::find_push_samples(&body) {
            report.matched += 1;

            let sample = match exposition::parse_sample(line) {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!("skipping push sample {:?}: {}", line, e);
                    report.skipped += 1;
                    continue;
                }
            };

            if !is_stale(sample.timestamp, now, self.config.aging_time) {
                report.fresh += 1;
                continue;
            }
            report.stale += 1;

            let grouping_path = match grouping_path(&sample) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("cannot address stale sample {:?}: {}", sample.line, e);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.gateway.delete_group(&grouping_path).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::warn!("deleted stale metrics {}", sample.line);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("deleting stale metrics {} failed: {}", sample.line, e);
                }
            }
        }

        if report.matched == 0 {
            tracing::warn!("there is no push data in the gateway");
        }

        Ok(report)
    }
}

fn grouping_path(sample: &Sample) -> Result<String, SampleError> {
    exposition::parse_labels(&sample.identity)?.grouping_path()
}

/// Runs an [`AgingMonitorTask`] on its own task for as long as this value is
/// alive.
pub struct AgingMonitor {
    _remote_handle: RemoteHandle<()>,
}

impl AgingMonitor {
    pub fn new<G: Gateway + 'static>(gateway: G, config: MonitorConfig) -> Self {
        // hang onto a remote handle so dropping the monitor cancels the loop
        let (remote, remote_handle) = AgingMonitorTask::new(gateway, config).run().remote_handle();

        tokio::spawn(remote);

        Self {
            _remote_handle: remote_handle,
        }
    }
}
