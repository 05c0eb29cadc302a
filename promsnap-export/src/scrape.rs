use crate::coordinator::Snapshot;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Response, StatusCode, header};

/// Content type of the Prometheus text exposition format.
pub const TEXT_FORMAT_CONTENT_TYPE: &str = "text/plain; charset=utf-8; version=0.0.4";

/// Build the scrape response for a snapshot.
///
/// A non-empty snapshot answers 200 with the text-format content type and a
/// `Last-Modified` header carrying the generation instant; an empty one
/// answers 204 — no metrics to report is not an error.
pub fn scrape_response(snapshot: &Snapshot) -> Result<Response<Bytes>, http::Error> {
    if snapshot.is_empty() {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Bytes::new());
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, TEXT_FORMAT_CONTENT_TYPE)
        .header(header::LAST_MODIFIED, http_date(snapshot.generated_at()))
        .body(snapshot.body().clone())
}

/// RFC 7231 HTTP-date, e.g. `Tue, 14 Nov 2023 22:13:20 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_date_renders_rfc7231() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert_eq!(http_date(at), "Tue, 14 Nov 2023 22:13:20 GMT");
    }
}
