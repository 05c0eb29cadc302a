use crate::buffer::{BufferFull, ScrapeBuffer};
use promsnap_core::{HistogramData, MetricRecord, PointValue, ScalarValue};
use std::fmt::Write as _;

// Prometheus text exposition format, version 0.0.4.
//
// Every writer appends at the buffer's cursor and reports overflow to the
// caller, which grows the buffer and restarts the whole batch. No writer
// allocates.

/// Render one metric: optional `# HELP`, `# TYPE`, one line per sample
/// (or per bucket plus `_sum`/`_count` for histograms), then a blank-line
/// separator.
pub fn write_metric(buf: &mut ScrapeBuffer, metric: &MetricRecord) -> Result<(), BufferFull> {
    let unit = metric.unit.as_deref().filter(|u| !u.is_empty());

    if let Some(desc) = metric.description.as_deref().filter(|d| !d.trim().is_empty()) {
        write_help_line(buf, &metric.name, unit, desc)?;
    }
    write_type_line(buf, &metric.name, unit, metric.kind.type_word())?;

    for point in &metric.points {
        let timestamp_ms = point.end_time.timestamp_millis();
        match &point.value {
            PointValue::Scalar(value) => {
                write_metric_name(buf, &metric.name, unit)?;
                write_label_block(buf, &point.tags)?;
                buf.push(b' ')?;
                match *value {
                    ScalarValue::Int(v) => write_int(buf, v)?,
                    ScalarValue::Float(v) => write_f64(buf, v)?,
                }
                buf.push(b' ')?;
                write_int(buf, timestamp_ms)?;
                buf.push(b'\n')?;
            }
            PointValue::Histogram(histogram) => {
                write_histogram(buf, &metric.name, unit, &point.tags, histogram, timestamp_ms)?;
            }
        }
    }

    buf.push(b'\n')
}

fn write_histogram(
    buf: &mut ScrapeBuffer,
    name: &str,
    unit: Option<&str>,
    tags: &[(String, String)],
    histogram: &HistogramData,
    timestamp_ms: i64,
) -> Result<(), BufferFull> {
    // Bucket lines carry the running cumulative count.
    let mut cumulative: u64 = 0;
    for bucket in &histogram.buckets {
        cumulative = cumulative.saturating_add(bucket.count);

        write_metric_name(buf, name, unit)?;
        buf.extend(b"_bucket{")?;
        for (key, value) in tags {
            write_label(buf, key, value)?;
            buf.push(b',')?;
        }
        buf.extend(b"le=\"")?;
        if bucket.upper_bound == f64::INFINITY {
            buf.extend(b"+Inf")?;
        } else {
            write_f64(buf, bucket.upper_bound)?;
        }
        buf.extend(b"\"} ")?;
        write_int(buf, cumulative)?;
        buf.push(b' ')?;
        write_int(buf, timestamp_ms)?;
        buf.push(b'\n')?;
    }

    write_metric_name(buf, name, unit)?;
    buf.extend(b"_sum")?;
    write_label_block(buf, tags)?;
    buf.push(b' ')?;
    write_f64(buf, histogram.sum)?;
    buf.push(b' ')?;
    write_int(buf, timestamp_ms)?;
    buf.push(b'\n')?;

    write_metric_name(buf, name, unit)?;
    buf.extend(b"_count")?;
    write_label_block(buf, tags)?;
    buf.push(b' ')?;
    write_int(buf, histogram.count)?;
    buf.push(b' ')?;
    write_int(buf, timestamp_ms)?;
    buf.push(b'\n')
}

fn write_help_line(
    buf: &mut ScrapeBuffer,
    name: &str,
    unit: Option<&str>,
    description: &str,
) -> Result<(), BufferFull> {
    buf.extend(b"# HELP ")?;
    write_metric_name(buf, name, unit)?;
    buf.push(b' ')?;
    write_help_text(buf, description)?;
    buf.push(b'\n')
}

fn write_type_line(
    buf: &mut ScrapeBuffer,
    name: &str,
    unit: Option<&str>,
    type_word: &str,
) -> Result<(), BufferFull> {
    buf.extend(b"# TYPE ")?;
    write_metric_name(buf, name, unit)?;
    buf.push(b' ')?;
    buf.extend(type_word.as_bytes())?;
    buf.push(b'\n')
}

/// Exposition name: `.` and `-` become `_`; a non-empty unit is appended as
/// `_<unit>` with everything outside `[A-Za-z0-9]` replaced by `_`.
fn write_metric_name(
    buf: &mut ScrapeBuffer,
    name: &str,
    unit: Option<&str>,
) -> Result<(), BufferFull> {
    for ch in name.chars() {
        match ch {
            '.' | '-' => buf.push(b'_')?,
            _ => push_char(buf, ch)?,
        }
    }
    if let Some(unit) = unit {
        buf.push(b'_')?;
        for ch in unit.chars() {
            if ch.is_ascii_alphanumeric() {
                buf.push(ch as u8)?;
            } else {
                buf.push(b'_')?;
            }
        }
    }
    Ok(())
}

/// `{k1="v1",k2="v2"}` in original tag order; nothing when there are no tags.
fn write_label_block(buf: &mut ScrapeBuffer, tags: &[(String, String)]) -> Result<(), BufferFull> {
    let mut first = true;
    for (key, value) in tags {
        buf.push(if first { b'{' } else { b',' })?;
        first = false;
        write_label(buf, key, value)?;
    }
    if !first {
        buf.push(b'}')?;
    }
    Ok(())
}

fn write_label(buf: &mut ScrapeBuffer, key: &str, value: &str) -> Result<(), BufferFull> {
    write_label_key(buf, key)?;
    buf.extend(b"=\"")?;
    // An empty label value is equivalent to the label not existing; the key
    // is still emitted.
    write_label_value(buf, value)?;
    buf.push(b'"')
}

/// Label keys: a leading digit gets `_` prepended, and every character
/// outside `[A-Za-z0-9]` becomes `_`.
fn write_label_key(buf: &mut ScrapeBuffer, key: &str) -> Result<(), BufferFull> {
    if key.as_bytes().first().is_some_and(|b| b.is_ascii_digit()) {
        buf.push(b'_')?;
    }
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() {
            buf.push(ch as u8)?;
        } else {
            buf.push(b'_')?;
        }
    }
    Ok(())
}

fn write_label_value(buf: &mut ScrapeBuffer, value: &str) -> Result<(), BufferFull> {
    for ch in value.chars() {
        match ch {
            '"' => buf.extend(b"\\\"")?,
            '\\' => buf.extend(b"\\\\")?,
            '\n' => buf.extend(b"\\n")?,
            _ => push_char(buf, ch)?,
        }
    }
    Ok(())
}

/// HELP text escapes only backslash and newline.
fn write_help_text(buf: &mut ScrapeBuffer, text: &str) -> Result<(), BufferFull> {
    for ch in text.chars() {
        match ch {
            '\\' => buf.extend(b"\\\\")?,
            '\n' => buf.extend(b"\\n")?,
            _ => push_char(buf, ch)?,
        }
    }
    Ok(())
}

fn write_int(buf: &mut ScrapeBuffer, value: impl itoa::Integer) -> Result<(), BufferFull> {
    let mut scratch = itoa::Buffer::new();
    buf.extend(scratch.format(value).as_bytes())
}

/// Culture-invariant decimal rendering; `+Inf`, `-Inf` and `Nan` for the
/// non-finite values.
fn write_f64(buf: &mut ScrapeBuffer, value: f64) -> Result<(), BufferFull> {
    if value.is_finite() {
        write!(buf, "{value}").map_err(|_| BufferFull)
    } else if value == f64::INFINITY {
        buf.extend(b"+Inf")
    } else if value == f64::NEG_INFINITY {
        buf.extend(b"-Inf")
    } else {
        buf.extend(b"Nan")
    }
}

fn push_char(buf: &mut ScrapeBuffer, ch: char) -> Result<(), BufferFull> {
    let mut tmp = [0u8; 4];
    buf.extend(ch.encode_utf8(&mut tmp).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use promsnap_core::{HistogramBucket, MetricKind, MetricPoint, MetricRecord};

    const TS: i64 = 1_700_000_000_000;

    fn at() -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp_millis(TS).unwrap()
    }

    fn encode(metric: &MetricRecord) -> String {
        let mut buf = ScrapeBuffer::with_capacity(16 * 1024);
        write_metric(&mut buf, metric).unwrap();
        String::from_utf8(buf.as_slice().to_vec()).unwrap()
    }

    // ── Scalar samples ───────────────────────────────────────────

    #[test]
    fn counter_with_tag_renders_exact_bytes() {
        let metric = MetricRecord::new("http_requests", MetricKind::Counter)
            .with_point(MetricPoint::int(42, at()).with_tag("method", "GET"));
        assert_eq!(
            encode(&metric),
            "# TYPE http_requests counter\n\
             http_requests{method=\"GET\"} 42 1700000000000\n\n"
        );
    }

    #[test]
    fn help_line_emitted_before_type_when_description_present() {
        let metric = MetricRecord::new("http_requests", MetricKind::Counter)
            .with_description("Total requests")
            .with_point(MetricPoint::int(1, at()));
        let out = encode(&metric);
        assert_eq!(
            out,
            "# HELP http_requests Total requests\n\
             # TYPE http_requests counter\n\
             http_requests 1 1700000000000\n\n"
        );
    }

    #[test]
    fn blank_description_is_skipped() {
        let metric = MetricRecord::new("m", MetricKind::Gauge)
            .with_description("   ")
            .with_point(MetricPoint::int(1, at()));
        assert!(!encode(&metric).contains("# HELP"));
    }

    #[test]
    fn help_text_escapes_backslash_and_newline_only() {
        let metric = MetricRecord::new("m", MetricKind::Gauge)
            .with_description("path C:\\tmp\nnext \"quoted\"")
            .with_point(MetricPoint::int(1, at()));
        let out = encode(&metric);
        // Backslash and newline escaped; quotes untouched in HELP text
        assert!(out.contains("# HELP m path C:\\\\tmp\\nnext \"quoted\"\n"));
    }

    #[test]
    fn gauge_without_tags_has_no_label_block() {
        let metric = MetricRecord::new("active", MetricKind::Gauge)
            .with_point(MetricPoint::float(1.5, at()));
        assert_eq!(
            encode(&metric),
            "# TYPE active gauge\nactive 1.5 1700000000000\n\n"
        );
    }

    #[test]
    fn multiple_tags_keep_insertion_order() {
        let metric = MetricRecord::new("m", MetricKind::Counter).with_point(
            MetricPoint::int(7, at())
                .with_tag("zeta", "1")
                .with_tag("alpha", "2"),
        );
        assert!(encode(&metric).contains("m{zeta=\"1\",alpha=\"2\"} 7"));
    }

    // ── Name and unit sanitization ───────────────────────────────

    #[test]
    fn dots_and_hyphens_in_name_become_underscores() {
        let metric = MetricRecord::new("temp.c-max", MetricKind::Gauge)
            .with_point(MetricPoint::float(3.0, at()));
        assert!(encode(&metric).contains("# TYPE temp_c_max gauge\n"));
    }

    #[test]
    fn unit_is_appended_and_sanitized() {
        let metric = MetricRecord::new("disk.io", MetricKind::Counter)
            .with_unit("by/s")
            .with_point(MetricPoint::int(9, at()));
        let out = encode(&metric);
        assert!(out.contains("# TYPE disk_io_by_s counter\n"));
        assert!(out.contains("disk_io_by_s 9 "));
    }

    #[test]
    fn empty_unit_adds_no_suffix() {
        let metric = MetricRecord::new("plain", MetricKind::Counter)
            .with_unit("")
            .with_point(MetricPoint::int(1, at()));
        assert!(encode(&metric).contains("plain 1 "));
    }

    // ── Value rendering ──────────────────────────────────────────

    #[test]
    fn non_finite_floats_render_as_inf_and_nan() {
        for (value, expected) in [
            (f64::INFINITY, "+Inf"),
            (f64::NEG_INFINITY, "-Inf"),
            (f64::NAN, "Nan"),
        ] {
            let metric = MetricRecord::new("m", MetricKind::Gauge)
                .with_point(MetricPoint::float(value, at()));
            assert!(
                encode(&metric).contains(&format!("m {expected} ")),
                "{value} should render as {expected}"
            );
        }
    }

    #[test]
    fn whole_floats_render_without_fraction() {
        let metric =
            MetricRecord::new("m", MetricKind::Gauge).with_point(MetricPoint::float(1.0, at()));
        assert!(encode(&metric).contains("m 1 "));
    }

    #[test]
    fn negative_integers_render_in_decimal() {
        let metric =
            MetricRecord::new("m", MetricKind::Gauge).with_point(MetricPoint::int(-12, at()));
        assert!(encode(&metric).contains("m -12 1700000000000\n"));
    }

    // ── Label key / value sanitization ───────────────────────────

    #[test]
    fn label_key_with_leading_digit_gets_underscore_prefix() {
        let metric = MetricRecord::new("m", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()).with_tag("2xx", "yes"));
        assert!(encode(&metric).contains("m{_2xx=\"yes\"}"));
    }

    #[test]
    fn label_key_specials_become_underscores() {
        let metric = MetricRecord::new("m", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()).with_tag("http.method-x", "GET"));
        assert!(encode(&metric).contains("m{http_method_x=\"GET\"}"));
    }

    #[test]
    fn label_value_escapes_quote_backslash_newline() {
        let metric = MetricRecord::new("m", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()).with_tag("msg", "say \"hi\"\n"));
        assert!(encode(&metric).contains("m{msg=\"say \\\"hi\\\"\\n\"}"));
    }

    #[test]
    fn empty_label_value_still_emits_the_key() {
        let metric = MetricRecord::new("m", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()).with_tag("host", ""));
        assert!(encode(&metric).contains("m{host=\"\"}"));
    }

    #[test]
    fn unicode_label_value_passes_through_as_utf8() {
        let metric = MetricRecord::new("m", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()).with_tag("city", "Zürich 🌍"));
        assert!(encode(&metric).contains("m{city=\"Zürich 🌍\"}"));
    }

    // ── Histograms ───────────────────────────────────────────────

    #[test]
    fn histogram_renders_cumulative_buckets_sum_and_count() {
        let metric = MetricRecord::new("latency", MetricKind::Histogram).with_point(
            MetricPoint::histogram(
                HistogramData {
                    buckets: vec![
                        HistogramBucket { upper_bound: 1.0, count: 3 },
                        HistogramBucket { upper_bound: f64::INFINITY, count: 2 },
                    ],
                    sum: 12.5,
                    count: 5,
                },
                at(),
            ),
        );
        assert_eq!(
            encode(&metric),
            "# TYPE latency histogram\n\
             latency_bucket{le=\"1\"} 3 1700000000000\n\
             latency_bucket{le=\"+Inf\"} 5 1700000000000\n\
             latency_sum 12.5 1700000000000\n\
             latency_count 5 1700000000000\n\n"
        );
    }

    #[test]
    fn histogram_tags_precede_le_and_wrap_sum_count() {
        let metric = MetricRecord::new("latency", MetricKind::Histogram).with_point(
            MetricPoint::histogram(
                HistogramData {
                    buckets: vec![HistogramBucket { upper_bound: 0.5, count: 1 }],
                    sum: 0.25,
                    count: 1,
                },
                at(),
            )
            .with_tag("route", "/api"),
        );
        let out = encode(&metric);
        assert!(out.contains("latency_bucket{route=\"/api\",le=\"0.5\"} 1 "));
        assert!(out.contains("latency_sum{route=\"/api\"} 0.25 "));
        assert!(out.contains("latency_count{route=\"/api\"} 1 "));
    }

    // ── Structure ────────────────────────────────────────────────

    #[test]
    fn every_metric_ends_with_a_blank_line_separator() {
        let metric =
            MetricRecord::new("m", MetricKind::Untyped).with_point(MetricPoint::int(1, at()));
        let out = encode(&metric);
        assert!(out.ends_with("1700000000000\n\n"));
    }

    #[test]
    fn metric_with_no_points_still_emits_type_line() {
        let metric = MetricRecord::new("m", MetricKind::Summary);
        assert_eq!(encode(&metric), "# TYPE m summary\n\n");
    }

    #[test]
    fn overflow_propagates_to_the_caller() {
        let metric = MetricRecord::new("quite_a_long_metric_name", MetricKind::Counter)
            .with_point(MetricPoint::int(1, at()));
        let mut buf = ScrapeBuffer::with_capacity(8);
        assert_eq!(write_metric(&mut buf, &metric), Err(BufferFull));
    }
}
