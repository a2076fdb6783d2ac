//! Reporting pipeline: consumes finished spans and delivers them to a
//! backend.
//!
//! Exactly one reporting task runs per installed tracer. It drains the
//! completed-span queue sequentially, hands each span to the configured
//! [`Reporter`], and never lets a reporter failure take the loop down — spans
//! are a best-effort telemetry stream, not a transactional log. When the
//! queue's producer side is torn down by [`Tracer::stop`](crate::Tracer) the
//! loop flushes the reporter once and terminates for good.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TraceResult;
use crate::trace::CompletedSpan;

mod model;
mod uploader;
mod zipkin;

pub use zipkin::ZipkinReporter;

/// Delivers finished spans to a tracing backend.
///
/// `process_span` is called once per dequeued span; `flush` is called exactly
/// once, when the pipeline shuts down. Errors from either are logged by the
/// pipeline and never re-raised.
#[async_trait]
pub trait Reporter: fmt::Debug + Send {
    /// Deliver one finished span.
    async fn process_span(&mut self, span: &CompletedSpan) -> TraceResult<()>;

    /// Push out any buffered state before shutdown.
    async fn flush(&mut self) -> TraceResult<()>;
}

/// The reporter used when reporting is disabled: both operations succeed
/// without doing anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn process_span(&mut self, _span: &CompletedSpan) -> TraceResult<()> {
        Ok(())
    }

    async fn flush(&mut self) -> TraceResult<()> {
        Ok(())
    }
}

type ReporterFactory = Arc<dyn Fn(&Config) -> TraceResult<Box<dyn Reporter>> + Send + Sync>;

/// Table of named reporter factories, owned by the process that installs the
/// tracer.
#[derive(Clone, Default)]
pub struct ReporterRegistry {
    factories: HashMap<String, ReporterFactory>,
}

impl ReporterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ReporterRegistry::default()
    }

    /// A registry with the built-in reporters: `"null"` and `"zipkin"`.
    pub fn with_defaults() -> Self {
        let mut registry = ReporterRegistry::new();
        registry.add_reporter("null", |_config| Ok(Box::new(NullReporter)));
        registry.add_reporter("zipkin", |config| {
            Ok(Box::new(ZipkinReporter::new(config)?))
        });
        registry
    }

    /// Register (or overwrite) a reporter factory under `name`.
    pub fn add_reporter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Config) -> TraceResult<Box<dyn Reporter>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build the reporter selected by `config.report_format`.
    ///
    /// An unregistered format name degrades to the [`NullReporter`] with a
    /// warning: a misconfigured reporter must never take the host application
    /// down with it.
    pub fn get_reporter(&self, config: &Config) -> TraceResult<Box<dyn Reporter>> {
        match self.factories.get(config.report_format()) {
            Some(factory) => factory(config),
            None => {
                warn!(
                    report_format = %config.report_format(),
                    "no reporter registered under this name, reporting disabled"
                );
                Ok(Box::new(NullReporter))
            }
        }
    }
}

impl fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Consume spans from `queue` and report them until the queue is torn down.
///
/// Runs as the single background task of an installed tracer. Returns only
/// after the producer side has been dropped, the remaining spans have been
/// processed, and the reporter has been flushed.
pub(crate) async fn report_spans(
    mut reporter: Box<dyn Reporter>,
    mut queue: mpsc::UnboundedReceiver<CompletedSpan>,
) {
    while let Some(span) = queue.recv().await {
        if span.start_time().is_none() {
            warn!(
                operation_name = %span.operation_name(),
                "dropping span without a recorded start time"
            );
            continue;
        }
        if let Err(error) = reporter.process_span(&span).await {
            warn!(
                operation_name = %span.operation_name(),
                %error,
                "failed to report span"
            );
        }
    }

    debug!("span queue torn down, flushing reporter");
    if let Err(error) = reporter.flush().await {
        warn!(%error, "failed to flush reporter during shutdown");
    }
}
