use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::propagation::{Extractor, Format, Injector, SyntaxRegistry};
use crate::TraceResult;

use super::span::{CompletedSpan, Span, SpanBuilder};
use super::span_context::SpanContext;

/// Entry point for creating spans and moving contexts across process
/// boundaries.
///
/// One tracer is installed per application instance. It is a cheap handle and
/// can be cloned freely; all clones share the completed-span queue. Finishing
/// a span enqueues it for the background reporter without blocking the
/// caller. Once [`Tracer::stop`] has been called the queue is gone and span
/// completion becomes a no-op.
#[derive(Clone, Debug)]
pub struct Tracer {
    propagation_syntax: String,
    syntaxes: SyntaxRegistry,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    sender: Mutex<Option<mpsc::UnboundedSender<CompletedSpan>>>,
    drained: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Tracer {
    pub(crate) fn new(
        propagation_syntax: String,
        syntaxes: SyntaxRegistry,
        sender: mpsc::UnboundedSender<CompletedSpan>,
        drained: oneshot::Receiver<()>,
    ) -> Self {
        Tracer {
            propagation_syntax,
            syntaxes,
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(sender)),
                drained: Mutex::new(Some(drained)),
            }),
        }
    }

    /// A tracer with no reporting queue and the `"none"` propagation syntax.
    ///
    /// Spans can still be created and finished against it; completions are
    /// discarded and `inject`/`extract` fail with an unsupported-format
    /// error. Hosts swap this in when tracing is disabled or already shut
    /// down.
    pub fn noop() -> Self {
        Tracer {
            propagation_syntax: "none".to_owned(),
            syntaxes: SyntaxRegistry::with_defaults(),
            shared: Arc::new(Shared {
                sender: Mutex::new(None),
                drained: Mutex::new(None),
            }),
        }
    }

    /// The name of the propagation syntax this tracer encodes and decodes
    /// contexts with.
    pub fn propagation_syntax(&self) -> &str {
        &self.propagation_syntax
    }

    /// Create a new started root span for an operation.
    ///
    /// Use [`Tracer::span_builder`] to supply a parent, an explicit start
    /// time, or initial tags.
    pub fn start_span(&self, operation_name: impl Into<String>) -> Span {
        self.build_span(SpanBuilder::new(operation_name))
    }

    /// Start building a span with non-default settings.
    pub fn span_builder(&self, operation_name: impl Into<String>) -> SpanBuilder {
        SpanBuilder::new(operation_name)
    }

    pub(crate) fn build_span(&self, builder: SpanBuilder) -> Span {
        let mut context = SpanContext::builder();
        if let Some(parent) = builder.child_of {
            context = context.with_parent(parent);
        }

        Span::new(
            builder.operation_name,
            context.build(),
            builder.start_time.unwrap_or_else(SystemTime::now),
            builder.tags.into_iter().collect(),
            Some(self.clone()),
        )
    }

    /// Encode `context` into `carrier` using this tracer's propagation
    /// syntax.
    ///
    /// Fails with [`TraceError::UnsupportedFormat`](crate::TraceError) when
    /// the configured syntax does not understand `format`, or when no syntax
    /// is registered under the configured name.
    pub fn inject(
        &self,
        context: &SpanContext,
        format: Format,
        carrier: &mut dyn Injector,
    ) -> TraceResult<()> {
        self.syntaxes
            .get_syntax(&self.propagation_syntax)
            .inject(context, format, carrier)
    }

    /// Decode a context from `carrier` using this tracer's propagation
    /// syntax.
    ///
    /// When the carrier holds no propagated identity, the returned context is
    /// empty and reports `is_valid() == false`. Unsupported formats fail like
    /// [`Tracer::inject`].
    pub fn extract(&self, format: Format, carrier: &dyn Extractor) -> TraceResult<SpanContext> {
        let fields = self
            .syntaxes
            .get_syntax(&self.propagation_syntax)
            .extract(format, carrier)?;

        let mut builder = SpanContext::builder();
        if let Some(trace_id) = fields.trace_id {
            builder = builder.with_trace_id(trace_id);
        }
        if let Some(span_id) = fields.span_id {
            builder = builder.with_span_id(span_id);
        }
        if let Some(sampled) = fields.sampled {
            builder = builder.with_sampled(sampled);
        }
        builder = builder.with_parents(fields.parents);
        for (key, value) in fields.baggage {
            builder = builder.with_baggage_item(key, value);
        }
        Ok(builder.build())
    }

    /// Enqueue a finished span for the background reporter.
    ///
    /// Never blocks; does nothing once the tracer has been stopped. Called by
    /// [`Span::finish`], but available directly for callers that assemble
    /// completed spans themselves.
    pub fn complete_span(&self, span: CompletedSpan) {
        if let Ok(sender) = self.shared.sender.lock() {
            if let Some(sender) = sender.as_ref() {
                // Receiver-gone errors mean the reporter already terminated;
                // the span is an accepted loss either way.
                let _ = sender.send(span);
            }
        }
    }

    /// Stop accepting span completions and begin the drain.
    ///
    /// The first call tears down the producer side of the queue and returns a
    /// [`Drained`] future that resolves once the reporter has processed every
    /// previously queued span and flushed. Later calls return `None`: there
    /// is nothing left to wait for.
    pub fn stop(&self) -> Option<Drained> {
        if let Ok(mut sender) = self.shared.sender.lock() {
            sender.take();
        }
        if let Ok(mut drained) = self.shared.drained.lock() {
            drained.take().map(Drained)
        } else {
            None
        }
    }
}

/// Signal that the reporter has drained and flushed every span that was
/// queued before [`Tracer::stop`].
///
/// Resolves even if the reporter task died early; that case is logged rather
/// than surfaced, since shutdown must always complete.
#[derive(Debug)]
pub struct Drained(oneshot::Receiver<()>);

impl Future for Drained {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.0).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(_)) => {
                warn!("reporter task terminated before signalling drain completion");
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
