use chrono::{DateTime, Utc};

/// One instrument as handed over by the metrics pipeline for a single
/// collection pass. Read-only to the exporter; a fresh batch is produced
/// on every pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    /// Appended to the exposition name as `_<unit>` when non-empty.
    pub unit: Option<String>,
    /// Rendered as the `# HELP` line when non-blank.
    pub description: Option<String>,
    pub kind: MetricKind,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
    Untyped,
}

/// One sample of a metric: its tag set, the instant the measurement window
/// ended, and the measured value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    /// Insertion order is preserved in the output; duplicate keys are
    /// emitted as-is, not deduplicated.
    pub tags: Vec<(String, String)>,
    pub end_time: DateTime<Utc>,
    pub value: PointValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    Scalar(ScalarValue),
    Histogram(HistogramData),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
}

/// Bucketed histogram payload. Bucket counts are per-bucket; the encoder
/// emits the running cumulative sum the text format requires.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramData {
    /// Upper bounds in ascending order, `f64::INFINITY` last.
    pub buckets: Vec<HistogramBucket>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    pub count: u64,
}

impl MetricKind {
    /// The `# TYPE` word for this kind.
    pub fn type_word(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
            MetricKind::Histogram => "histogram",
            MetricKind::Untyped => "untyped",
        }
    }
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            unit: None,
            description: None,
            kind,
            points: Vec::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_point(mut self, point: MetricPoint) -> Self {
        self.points.push(point);
        self
    }
}

impl MetricPoint {
    pub fn int(value: i64, end_time: DateTime<Utc>) -> Self {
        Self {
            tags: Vec::new(),
            end_time,
            value: PointValue::Scalar(ScalarValue::Int(value)),
        }
    }

    pub fn float(value: f64, end_time: DateTime<Utc>) -> Self {
        Self {
            tags: Vec::new(),
            end_time,
            value: PointValue::Scalar(ScalarValue::Float(value)),
        }
    }

    pub fn histogram(data: HistogramData, end_time: DateTime<Utc>) -> Self {
        Self {
            tags: Vec::new(),
            end_time,
            value: PointValue::Histogram(data),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_words_match_exposition_format() {
        assert_eq!(MetricKind::Counter.type_word(), "counter");
        assert_eq!(MetricKind::Gauge.type_word(), "gauge");
        assert_eq!(MetricKind::Summary.type_word(), "summary");
        assert_eq!(MetricKind::Histogram.type_word(), "histogram");
        assert_eq!(MetricKind::Untyped.type_word(), "untyped");
    }

    #[test]
    fn builder_preserves_tag_order() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let point = MetricPoint::int(1, at)
            .with_tag("b", "2")
            .with_tag("a", "1")
            .with_tag("b", "3");
        let keys: Vec<&str> = point.tags.iter().map(|(k, _)| k.as_str()).collect();
        // Insertion order, duplicates kept
        assert_eq!(keys, vec!["b", "a", "b"]);
    }
}
