use actix_web::{
    HttpMessage,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
};
use tracing::{Span, field::Empty};
use tracing_actix_web::{DefaultRootSpanBuilder, RootSpanBuilder, root_span};

use crate::resilience::trace::{TRACEPARENT_HEADER, TraceContext};

/// Root span builder that continues the caller's W3C trace, or starts a new one.
///
/// The resulting [`TraceContext`] is stored in the request extensions for handlers to pass on.
pub struct ApiRootSpanBuilder;

impl RootSpanBuilder for ApiRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> Span {
        let trace = request
            .headers()
            .get(TRACEPARENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(TraceContext::from_traceparent)
            .unwrap_or_else(TraceContext::new_root);

        let span = root_span!(request, span_id = %trace.span_id, pod_id = Empty);
        span.record("trace_id", trace.trace_id.as_str());

        request.extensions_mut().insert(trace);

        span
    }

    fn on_request_end<B: MessageBody>(
        span: Span,
        outcome: &Result<ServiceResponse<B>, actix_web::Error>,
    ) {
        DefaultRootSpanBuilder::on_request_end(span, outcome);
    }
}
