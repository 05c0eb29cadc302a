pub mod config;
pub mod error;
pub mod metric;
pub mod pipeline;

pub use config::{CollectorConfig, ExporterConfig, ServerConfig};
pub use error::CollectError;
pub use metric::{
    HistogramBucket, HistogramData, MetricKind, MetricPoint, MetricRecord, PointValue, ScalarValue,
};
pub use pipeline::MetricsPipeline;
