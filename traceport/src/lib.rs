//! # traceport
//!
//! A distributed-tracing client: create spans for units of work, carry trace
//! identity across process boundaries over B3 HTTP headers, and report
//! finished spans asynchronously to a Zipkin-compatible collector.
//!
//! ## Quickstart
//!
//! Install a pipeline once per application instance, trace work through its
//! [`Tracer`], and shut the pipeline down before the process exits so queued
//! spans get delivered:
//!
//! ```no_run
//! use traceport::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), traceport::TraceError> {
//!     let pipeline = traceport::new_pipeline()
//!         .with_config(
//!             Config::default()
//!                 .with_service_name("father-time")
//!                 .with_report_format("zipkin")
//!                 .with_propagation_syntax("b3"),
//!         )
//!         .install(&tokio::runtime::Handle::current())?;
//!
//!     let mut span = pipeline.tracer().start_span("fetch-time");
//!     span.set_tag("method", "GET");
//!     // ... traced work ...
//!     span.finish();
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Moving contexts across processes
//!
//! The tracer encodes and decodes contexts with the propagation syntax named
//! in its configuration. On the server side, extract a parent context from
//! the inbound headers and use it as `child_of`; on the client side, inject
//! the active span's context into the outgoing request:
//!
//! ```
//! use std::collections::HashMap;
//! use traceport::propagation::Format;
//!
//! # fn demo(tracer: &traceport::Tracer) -> Result<(), traceport::TraceError> {
//! let span = tracer.start_span("call-upstream");
//! let mut headers: HashMap<String, String> = HashMap::new();
//! tracer.inject(span.context(), Format::HttpHeaders, &mut headers)?;
//! # Ok(())
//! # }
//! ```
//!
//! Reporting is best-effort by design: a failure to deliver a span is logged
//! and never affects the traced operation itself.

#![warn(missing_docs, unreachable_pub, missing_debug_implementations)]

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

mod common;
mod config;
mod error;
pub mod middleware;
pub mod propagation;
pub mod reporting;
pub mod testing;
pub mod trace;

pub use common::Value;
pub use config::{
    ClientOptions, Config, DEFAULT_PROPAGATION_SYNTAX, DEFAULT_REPORT_FORMAT,
    DEFAULT_REPORT_TARGET,
};
pub use error::{TraceError, TraceResult};
pub use trace::{
    CompletedSpan, Drained, Parent, ServiceEndpoint, Span, SpanBuilder, SpanContext, Tracer,
};

use middleware::RequestTracer;
use propagation::SyntaxRegistry;
use reporting::ReporterRegistry;

/// Create a new pipeline builder with default configuration and registries.
pub fn new_pipeline() -> PipelineBuilder {
    PipelineBuilder::default()
}

/// Assembles a [`Tracer`] with its background reporting task.
#[derive(Debug)]
pub struct PipelineBuilder {
    config: Config,
    syntaxes: SyntaxRegistry,
    reporters: ReporterRegistry,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        PipelineBuilder {
            config: Config::default(),
            syntaxes: SyntaxRegistry::with_defaults(),
            reporters: ReporterRegistry::with_defaults(),
        }
    }
}

impl PipelineBuilder {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Assign the service name under which to group traces.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_service_name(name);
        self
    }

    /// Select the reporting backend by registry key.
    pub fn with_report_format(mut self, format: impl Into<String>) -> Self {
        self.config = self.config.with_report_format(format);
        self
    }

    /// Assign the collector base URL.
    pub fn with_report_target(mut self, target: impl Into<String>) -> Self {
        self.config = self.config.with_report_target(target);
        self
    }

    /// Select the propagation syntax by registry key.
    pub fn with_propagation_syntax(mut self, syntax: impl Into<String>) -> Self {
        self.config = self.config.with_propagation_syntax(syntax);
        self
    }

    /// Replace the propagation syntax registry, e.g. to add a custom syntax.
    pub fn with_syntaxes(mut self, syntaxes: SyntaxRegistry) -> Self {
        self.syntaxes = syntaxes;
        self
    }

    /// Replace the reporter registry, e.g. to add a custom reporter.
    pub fn with_reporters(mut self, reporters: ReporterRegistry) -> Self {
        self.reporters = reporters;
        self
    }

    /// Wire everything up: build the configured reporter, spawn the
    /// reporting task on `handle`, and return the installed pipeline.
    pub fn install(self, handle: &tokio::runtime::Handle) -> TraceResult<Installation> {
        let reporter = self.reporters.get_reporter(&self.config)?;
        let (span_tx, span_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        handle.spawn(async move {
            reporting::report_spans(reporter, span_rx).await;
            let _ = done_tx.send(());
        });

        let tracer = Tracer::new(
            self.config.propagation_syntax().to_owned(),
            self.syntaxes,
            span_tx,
            done_rx,
        );
        info!(
            report_format = %self.config.report_format(),
            propagation_syntax = %self.config.propagation_syntax(),
            "tracing pipeline installed"
        );

        Ok(Installation {
            tracer,
            config: self.config,
        })
    }
}

/// An installed tracing pipeline: the tracer plus the handle needed to shut
/// its background reporting task down.
#[derive(Debug)]
pub struct Installation {
    tracer: Tracer,
    config: Config,
}

impl Installation {
    /// The tracer to create spans through. Clone it freely; clones share the
    /// reporting queue.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The configuration the pipeline was installed with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A request interceptor bound to this pipeline's tracer and
    /// configuration.
    pub fn request_tracer(&self) -> RequestTracer {
        RequestTracer::new(self.tracer.clone(), &self.config)
    }

    /// Initiate an orderly shutdown and wait for it to complete.
    ///
    /// The first call stops the tracer, waits for the reporter to drain the
    /// remaining queued spans, and for its final flush. Later calls (or a
    /// call racing another shutdown) find nothing to do and return
    /// immediately. Always completes, even if the reporting task died.
    pub async fn shutdown(&self) {
        match self.tracer.stop() {
            Some(drained) => {
                info!("stopping tracer, reporter will be flushed once the queue drains");
                drained.await;
                info!("shutdown of tracing layer is complete");
            }
            None => {
                debug!("tracing layer already shut down, nothing to do");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingReporter;

    #[tokio::test]
    async fn install_trace_and_shutdown() {
        let recorder = RecordingReporter::new();
        let mut reporters = ReporterRegistry::with_defaults();
        let handle = recorder.clone();
        reporters.add_reporter("recorder", move |_config| Ok(Box::new(handle.clone())));

        let pipeline = new_pipeline()
            .with_report_format("recorder")
            .with_propagation_syntax("b3")
            .with_reporters(reporters)
            .install(&tokio::runtime::Handle::current())
            .unwrap();

        let mut span = pipeline.tracer().start_span("op");
        span.finish();
        pipeline.shutdown().await;

        assert_eq!(recorder.span_count(), 1);
        assert_eq!(recorder.flush_count(), 1);
    }

    #[tokio::test]
    async fn second_shutdown_is_a_noop() {
        let recorder = RecordingReporter::new();
        let mut reporters = ReporterRegistry::with_defaults();
        let handle = recorder.clone();
        reporters.add_reporter("recorder", move |_config| Ok(Box::new(handle.clone())));

        let pipeline = new_pipeline()
            .with_report_format("recorder")
            .with_reporters(reporters)
            .install(&tokio::runtime::Handle::current())
            .unwrap();

        pipeline.shutdown().await;
        pipeline.shutdown().await;
        assert_eq!(recorder.flush_count(), 1);
    }

    #[tokio::test]
    async fn spans_finished_after_shutdown_are_discarded() {
        let recorder = RecordingReporter::new();
        let mut reporters = ReporterRegistry::with_defaults();
        let handle = recorder.clone();
        reporters.add_reporter("recorder", move |_config| Ok(Box::new(handle.clone())));

        let pipeline = new_pipeline()
            .with_report_format("recorder")
            .with_reporters(reporters)
            .install(&tokio::runtime::Handle::current())
            .unwrap();

        let mut late = pipeline.tracer().start_span("late");
        pipeline.shutdown().await;
        late.finish();

        assert_eq!(recorder.span_count(), 0);
    }

    #[tokio::test]
    async fn install_with_null_reporter_accepts_spans() {
        let pipeline = new_pipeline()
            .install(&tokio::runtime::Handle::current())
            .unwrap();
        let mut span = pipeline.tracer().start_span("op");
        span.finish();
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn install_rejects_bad_zipkin_configuration() {
        let result = new_pipeline()
            .with_report_format("zipkin")
            .install(&tokio::runtime::Handle::current());
        assert!(matches!(
            result.unwrap_err(),
            TraceError::MissingConfig("service_name")
        ));
    }
}
