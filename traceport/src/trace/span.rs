use crate::common::Value;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::warn;

use super::span_context::{Parent, SpanContext};
use super::tracer::Tracer;

/// A single timed unit of work in a trace.
///
/// Spans are created through [`Tracer::start_span`] or a [`SpanBuilder`] and
/// completed by calling [`Span::finish`]. A span that goes out of scope
/// unfinished is finished by its destructor, so wrapping work in a span value
/// guarantees completion even on early returns and panics.
///
/// Only the first call to `finish` takes effect: it records the end time and
/// hands a [`CompletedSpan`] snapshot to the tracer's reporting queue exactly
/// once.
#[derive(Debug)]
pub struct Span {
    operation_name: String,
    context: SpanContext,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    tags: HashMap<String, Value>,
    completion: Option<Tracer>,
}

impl Span {
    pub(crate) fn new(
        operation_name: String,
        context: SpanContext,
        start_time: SystemTime,
        tags: HashMap<String, Value>,
        completion: Option<Tracer>,
    ) -> Self {
        context.materialize_ids();
        Span {
            operation_name,
            context,
            start_time,
            end_time: None,
            tags,
            completion,
        }
    }

    /// The context identifying this span.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Mutable access to the context, for the brief window after creation in
    /// which the request layer stamps sampling and service details onto it.
    pub fn context_mut(&mut self) -> &mut SpanContext {
        &mut self.context
    }

    /// The name this span is reported under.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Overwrite the operation name passed in during construction.
    pub fn set_operation_name(&mut self, new_name: impl Into<String>) {
        self.operation_name = new_name.into();
    }

    /// Shorthand for setting the sampling decision on the span's context.
    pub fn set_sampled(&mut self, sampled: bool) {
        self.context.set_sampled(sampled);
    }

    /// Set the value associated with `tag` on this span, keeping the value
    /// from the last call when the same tag is set multiple times.
    pub fn set_tag(&mut self, tag: impl Into<String>, value: impl Into<Value>) {
        self.tags.insert(tag.into(), value.into());
    }

    /// Read back a tag in its native typed form.
    pub fn tag(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag)
    }

    /// All tags currently set on the span.
    pub fn tags(&self) -> &HashMap<String, Value> {
        &self.tags
    }

    /// When this span started.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// When this span finished, if it has.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// How long the unit of work took. Undefined until the span is finished.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .map(|end| end.duration_since(self.start_time).unwrap_or_default())
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Mark this span as finished now.
    ///
    /// Calls after the first are ignored.
    pub fn finish(&mut self) {
        self.finish_at(SystemTime::now());
    }

    /// Mark this span as finished at an explicit end time.
    ///
    /// Calls after the first are ignored.
    pub fn finish_at(&mut self, end_time: SystemTime) {
        if self.end_time.is_some() {
            return;
        }
        self.end_time = Some(end_time);
        if let Some(tracer) = self.completion.take() {
            tracer.complete_span(CompletedSpan {
                operation_name: self.operation_name.clone(),
                context: self.context.clone(),
                start_time: Some(self.start_time),
                end_time: Some(end_time),
                tags: self.tags.clone(),
            });
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.end_time.is_none() {
            if std::thread::panicking() {
                warn!(
                    operation_name = %self.operation_name,
                    trace_id = %self.context.trace_id(),
                    span_id = %self.context.span_id(),
                    "span dropped during unwind; finishing it before reporting"
                );
            }
            self.finish();
        }
    }
}

/// Deferred [`Span`] construction with non-default settings.
#[derive(Debug)]
pub struct SpanBuilder {
    pub(crate) operation_name: String,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) child_of: Option<Parent>,
    pub(crate) tags: Vec<(String, Value)>,
}

impl SpanBuilder {
    /// Create a builder for a span reported under `operation_name`.
    pub fn new(operation_name: impl Into<String>) -> Self {
        SpanBuilder {
            operation_name: operation_name.into(),
            start_time: None,
            child_of: None,
            tags: Vec::new(),
        }
    }

    /// Use an explicit start time instead of the creation time.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Name the parent of the new span.
    pub fn with_child_of(mut self, parent: impl Into<Parent>) -> Self {
        self.child_of = Some(parent.into());
        self
    }

    /// Set an initial tag.
    pub fn with_tag(mut self, tag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.push((tag.into(), value.into()));
        self
    }

    /// Create the started span through `tracer`.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build_span(self)
    }
}

/// An immutable snapshot of a finished span, handed to the reporting
/// pipeline.
///
/// Ownership of the reporting side of a span transfers here when `finish`
/// runs; [`Reporter`](crate::reporting::Reporter) implementations consume
/// these.
#[derive(Clone, Debug)]
pub struct CompletedSpan {
    pub(crate) operation_name: String,
    pub(crate) context: SpanContext,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) end_time: Option<SystemTime>,
    pub(crate) tags: HashMap<String, Value>,
}

impl CompletedSpan {
    /// The name the span is reported under.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// The context the span ran in.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// When the span started, if a start time was recorded.
    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    /// When the span finished.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// How long the unit of work took, when both timestamps are present.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start).unwrap_or_default()),
            _ => None,
        }
    }

    /// The span's tags in native typed form.
    pub fn tags(&self) -> &HashMap<String, Value> {
        &self.tags
    }

    /// Read a single tag.
    pub fn tag(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::SyntaxRegistry;
    use tokio::sync::{mpsc, oneshot};

    fn test_tracer() -> (Tracer, mpsc::UnboundedReceiver<CompletedSpan>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_done_tx, done_rx) = oneshot::channel();
        let tracer = Tracer::new("b3".into(), SyntaxRegistry::with_defaults(), tx, done_rx);
        (tracer, rx)
    }

    #[test]
    fn finish_notifies_the_tracer_exactly_once() {
        let (tracer, mut rx) = test_tracer();
        let mut span = tracer.start_span("op");
        span.finish();
        span.finish();

        let completed = rx.try_recv().expect("one completed span");
        assert_eq!(completed.operation_name(), "op");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropping_an_unfinished_span_finishes_it() {
        let (tracer, mut rx) = test_tracer();
        {
            let mut span = tracer.start_span("scoped");
            span.set_tag("step", 1_i64);
        }

        let completed = rx.try_recv().expect("span completed by drop");
        assert_eq!(completed.operation_name(), "scoped");
        assert!(completed.end_time().is_some());
    }

    #[test]
    fn dropping_a_finished_span_does_not_report_twice() {
        let (tracer, mut rx) = test_tracer();
        {
            let mut span = tracer.start_span("once");
            span.finish();
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn duration_is_undefined_until_finished() {
        let (tracer, _rx) = test_tracer();
        let mut span = tracer.start_span("op");
        assert!(span.duration().is_none());
        span.finish();
        assert!(span.duration().is_some());
    }

    #[test]
    fn explicit_timestamps_drive_duration() {
        let (tracer, mut rx) = test_tracer();
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut span = SpanBuilder::new("timed")
            .with_start_time(start)
            .start(&tracer);
        span.finish_at(start + Duration::from_millis(150));

        assert_eq!(span.duration(), Some(Duration::from_millis(150)));
        let completed = rx.try_recv().unwrap();
        assert_eq!(completed.duration(), Some(Duration::from_millis(150)));
    }

    #[test]
    fn tags_keep_the_last_written_value() {
        let (tracer, _rx) = test_tracer();
        let mut span = tracer.start_span("op");
        span.set_tag("status", 200_i64);
        span.set_tag("status", 500_i64);
        assert_eq!(span.tag("status"), Some(&Value::I64(500)));
    }

    #[test]
    fn tags_round_trip_native_types() {
        let (tracer, _rx) = test_tracer();
        let mut span = tracer.start_span("op");
        span.set_tag("flag", true);
        span.set_tag("count", 3_i64);
        span.set_tag("ratio", 0.5);
        span.set_tag("label", "blue");

        assert_eq!(span.tag("flag"), Some(&Value::Bool(true)));
        assert_eq!(span.tag("count"), Some(&Value::I64(3)));
        assert_eq!(span.tag("ratio"), Some(&Value::F64(0.5)));
        assert_eq!(span.tag("label"), Some(&Value::String("blue".into())));
    }

    #[test]
    fn operation_name_can_be_replaced() {
        let (tracer, mut rx) = test_tracer();
        let mut span = tracer.start_span("draft");
        span.set_operation_name("final");
        span.finish();
        assert_eq!(rx.try_recv().unwrap().operation_name(), "final");
    }

    #[test]
    fn completed_span_carries_the_context_identity() {
        let (tracer, mut rx) = test_tracer();
        let mut span = tracer.start_span("op");
        let trace_id = span.context().trace_id().to_owned();
        span.finish();

        let completed = rx.try_recv().unwrap();
        assert_eq!(completed.context().trace_id(), trace_id);
    }
}
