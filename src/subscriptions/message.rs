//! # Messages and handler context.
//!
//! [`Message`] is the handler's read-only view of one fetched work unit. It is
//! cheap to clone (reference-counted parts). [`HandlerContext`] carries the
//! cancellation token and the trace/correlation identifiers extracted from
//! the message headers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Message headers; a header may carry several values.
pub type Headers = HashMap<String, Vec<String>>;

/// W3C trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Correlation id header.
pub const CORRELATION_HEADER: &str = "CorrelationId";

/// One message as seen by a handler.
#[derive(Clone, Debug)]
pub struct Message {
    subject: Arc<str>,
    headers: Arc<Headers>,
    payload: Arc<[u8]>,
}

impl Message {
    /// Creates a message.
    pub fn new(subject: impl Into<Arc<str>>, headers: Headers, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            subject: subject.into(),
            headers: Arc::new(headers),
            payload: payload.into(),
        }
    }

    /// Subject the message was published on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// All headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of header `name`; falls back to a case-insensitive match.
    pub fn header(&self, name: &str) -> Option<&str> {
        let values = self.headers.get(name).or_else(|| {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })?;
        values.first().map(String::as_str)
    }

    /// Raw payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Trace identifiers propagated through message headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 hex chars from `traceparent`.
    pub trace_id: Option<String>,
    /// 16 hex chars from `traceparent`.
    pub parent_span_id: Option<String>,
    /// Value of the `CorrelationId` header.
    pub correlation_id: Option<String>,
}

impl TraceContext {
    /// Extracts trace identifiers from the message headers.
    ///
    /// A malformed `traceparent` is ignored rather than rejected.
    pub fn from_message(msg: &Message) -> Self {
        let (trace_id, parent_span_id) = msg
            .header(TRACEPARENT_HEADER)
            .and_then(parse_traceparent)
            .map_or((None, None), |(t, s)| (Some(t), Some(s)));

        Self {
            trace_id,
            parent_span_id,
            correlation_id: msg.header(CORRELATION_HEADER).map(str::to_string),
        }
    }
}

/// Parses `version-traceid-spanid-flags`.
fn parse_traceparent(value: &str) -> Option<(String, String)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    let hex = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit());
    if !hex(version, 2) || !hex(trace_id, 32) || !hex(span_id, 16) || !hex(flags, 2) {
        return None;
    }
    if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
        return None;
    }
    Some((trace_id.to_ascii_lowercase(), span_id.to_ascii_lowercase()))
}

/// Per-message context handed to handlers.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    /// Cancelled when the supervisor stops.
    ///
    /// Handlers are awaited to completion on stop; observing the token is optional.
    pub cancel: CancellationToken,
    /// Trace identifiers of the message.
    pub trace: TraceContext,
    /// Durable consumer name of the subscription.
    pub consumer: Arc<str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_with(headers: &[(&str, &str)]) -> Message {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect();
        Message::new("orders.created", headers, b"{}".to_vec())
    }

    #[test]
    fn header_lookup_is_case_insensitive_fallback() {
        let msg = msg_with(&[("Content-Type", "application/json")]);
        assert_eq!(msg.header("Content-Type"), Some("application/json"));
        assert_eq!(msg.header("content-type"), Some("application/json"));
        assert_eq!(msg.header("missing"), None);
    }

    #[test]
    fn extracts_traceparent_and_correlation() {
        let msg = msg_with(&[
            (
                "traceparent",
                "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
            ),
            ("CorrelationId", "req-42"),
        ]);

        let trace = TraceContext::from_message(&msg);
        assert_eq!(
            trace.trace_id.as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(trace.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_eq!(trace.correlation_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn malformed_traceparent_is_ignored() {
        for bad in [
            "garbage",
            "00-abc-00f067aa0ba902b7-01",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-zzzzzzzzzzzzzzzz-01",
        ] {
            let trace = TraceContext::from_message(&msg_with(&[("traceparent", bad)]));
            assert_eq!(trace.trace_id, None, "{bad}");
        }
    }
}
