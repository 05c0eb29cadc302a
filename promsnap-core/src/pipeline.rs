use crate::metric::MetricRecord;

/// Source of the metric batch for one collection pass.
///
/// `collect` is invoked synchronously by whichever scrape request ends up
/// driving a collection, and must return the current state of every
/// registered instrument. An empty batch or an `Err` is treated as a failed
/// pass by the coordinator, never propagated to scrapers.
pub trait MetricsPipeline: Send + Sync {
    fn collect(&self) -> anyhow::Result<Vec<MetricRecord>>;
}
