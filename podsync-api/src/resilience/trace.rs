use rand::Rng;
use std::future::Future;
use tracing::{Span, info_span};

/// Header carrying the W3C trace context.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Only version of the `traceparent` format this service emits.
const TRACEPARENT_VERSION: &str = "00";
/// Flag set when the caller sampled the trace.
const SAMPLED_FLAG: u8 = 0x01;

tokio::task_local! {
    static CURRENT_TRACE: TraceContext;
}

/// Position of the current unit of work within a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex characters, shared by every span of the trace.
    pub trace_id: String,
    /// 16 lowercase hex characters identifying this span.
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub sampled: bool,
}

impl TraceContext {
    /// Starts a new trace.
    pub fn new_root() -> TraceContext {
        TraceContext {
            trace_id: format!("{:032x}", random_non_zero_u128()),
            span_id: new_span_id(),
            parent_span_id: None,
            sampled: true,
        }
    }

    /// Continues the trace of a W3C `traceparent` header value.
    ///
    /// Returns `None` for malformed values, in which case callers start a new trace.
    pub fn from_traceparent(value: &str) -> Option<TraceContext> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        // Later versions may append fields, version 00 may not.
        if version == TRACEPARENT_VERSION && parts.next().is_some() {
            return None;
        }
        if !is_lower_hex(version, 2) || version == "ff" {
            return None;
        }
        if !is_lower_hex(trace_id, 32) || is_all_zeros(trace_id) {
            return None;
        }
        if !is_lower_hex(parent_id, 16) || is_all_zeros(parent_id) {
            return None;
        }
        if !is_lower_hex(flags, 2) {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(TraceContext {
            trace_id: trace_id.to_string(),
            span_id: new_span_id(),
            parent_span_id: Some(parent_id.to_string()),
            sampled: flags & SAMPLED_FLAG != 0,
        })
    }

    /// Returns a context for a unit of work started from this one.
    pub fn child(&self) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            sampled: self.sampled,
        }
    }

    pub fn to_traceparent(&self) -> String {
        let flags = if self.sampled { SAMPLED_FLAG } else { 0 };

        format!(
            "{TRACEPARENT_VERSION}-{}-{}-{flags:02x}",
            self.trace_id, self.span_id
        )
    }

    /// Creates a span tagged with this context.
    pub fn span(&self, kind: &'static str, operation: &'static str) -> Span {
        info_span!(
            "trace",
            kind,
            operation,
            trace_id = %self.trace_id,
            span_id = %self.span_id,
            parent_span_id = self.parent_span_id.as_deref(),
        )
    }
}

/// Runs `future` with `trace` as the current trace context.
pub fn with_trace<F>(trace: TraceContext, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT_TRACE.scope(trace, future)
}

/// Returns the trace context of the running task, if any.
pub fn current_trace() -> Option<TraceContext> {
    CURRENT_TRACE.try_with(Clone::clone).ok()
}

fn new_span_id() -> String {
    let mut rng = rand::rng();
    loop {
        let id: u64 = rng.random();
        if id != 0 {
            return format!("{id:016x}");
        }
    }
}

fn random_non_zero_u128() -> u128 {
    let mut rng = rand::rng();
    loop {
        let id: u128 = rng.random();
        if id != 0 {
            return id;
        }
    }
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_all_zeros(value: &str) -> bool {
    value.bytes().all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn continues_a_valid_traceparent() {
        let trace = TraceContext::from_traceparent(TRACEPARENT).unwrap();

        assert_eq!(trace.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(trace.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_ne!(trace.span_id, "00f067aa0ba902b7");
        assert!(trace.sampled);
    }

    #[test]
    fn rejects_malformed_traceparents() {
        for value in [
            "",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
        ] {
            assert_eq!(TraceContext::from_traceparent(value), None, "{value}");
        }
    }

    #[test]
    fn roots_are_well_formed() {
        let trace = TraceContext::new_root();
        let parsed = TraceContext::from_traceparent(&trace.to_traceparent()).unwrap();

        assert_eq!(parsed.trace_id, trace.trace_id);
        assert_eq!(parsed.parent_span_id, Some(trace.span_id));
    }

    #[test]
    fn children_share_the_trace_id() {
        let root = TraceContext::new_root();
        let child = root.child();

        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
    }

    #[tokio::test]
    async fn current_trace_is_scoped_to_the_task() {
        assert_eq!(current_trace(), None);

        let trace = TraceContext::new_root();
        let seen = with_trace(trace.clone(), async { current_trace() }).await;

        assert_eq!(seen, Some(trace));
    }
}
