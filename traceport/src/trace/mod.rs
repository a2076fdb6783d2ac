//! Trace data model: span contexts, spans, and the tracer that creates them.
//!
//! A [`SpanContext`] is the portable identity of a span — trace and span ids,
//! the sampling decision, parent links, and propagated baggage. A [`Span`] is
//! the mutable work-tracking side: operation name, timing, and tags. The
//! [`Tracer`] ties them together and owns the hand-off of finished spans to
//! the reporting pipeline.

mod span;
mod span_context;
mod tracer;

pub use span::{CompletedSpan, Span, SpanBuilder};
pub use span_context::{Parent, ServiceEndpoint, SpanContext, SpanContextBuilder};
pub use tracer::{Drained, Tracer};
