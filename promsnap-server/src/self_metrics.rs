use chrono::Utc;
use promsnap_core::{MetricKind, MetricPoint, MetricRecord, MetricsPipeline};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Built-in pipeline so the standalone binary has something to serve:
/// the exporter observing itself.
pub struct SelfMetrics {
    started: Instant,
    scrapes: AtomicU64,
}

impl SelfMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            scrapes: AtomicU64::new(0),
        }
    }

    /// Called once per incoming scrape request, before collection.
    pub fn observe_scrape(&self) {
        self.scrapes.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SelfMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsPipeline for SelfMetrics {
    fn collect(&self) -> anyhow::Result<Vec<MetricRecord>> {
        let now = Utc::now();
        Ok(vec![
            MetricRecord::new("promsnap.uptime", MetricKind::Gauge)
                .with_unit("seconds")
                .with_description("Seconds since the exporter started")
                .with_point(MetricPoint::float(
                    self.started.elapsed().as_secs_f64(),
                    now,
                )),
            MetricRecord::new("promsnap.scrapes", MetricKind::Counter)
                .with_description("Scrape requests received")
                .with_point(MetricPoint::int(
                    self.scrapes.load(Ordering::Relaxed) as i64,
                    now,
                )),
            MetricRecord::new("promsnap.build.info", MetricKind::Gauge)
                .with_description("Build information")
                .with_point(
                    MetricPoint::int(1, now).with_tag("version", env!("CARGO_PKG_VERSION")),
                ),
        ])
    }
}
