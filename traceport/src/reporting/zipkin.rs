//! Reporter that delivers spans to a Zipkin-compatible collector.

use async_trait::async_trait;
use tracing::warn;
use traceport_http::HttpClient;

use crate::config::Config;
use crate::error::{TraceError, TraceResult};
use crate::trace::CompletedSpan;

use super::model;
use super::uploader::Uploader;
use super::Reporter;

/// Translates finished spans into the Zipkin annotation model and POSTs them
/// to a collector, one single-span batch per processed span.
///
/// Delivery is best-effort: transport failures and error statuses are logged
/// and the span is lost. Spans whose `span.kind` tag has no Zipkin
/// representation are skipped silently.
#[derive(Debug)]
pub struct ZipkinReporter {
    service_name: String,
    uploader: Uploader,
}

impl ZipkinReporter {
    /// Build a reporter from the installed configuration, using the bundled
    /// `reqwest` client configured by `client_options`.
    ///
    /// Fails when `service_name` is not configured or `report_target` is not
    /// a valid URI.
    pub fn new(config: &Config) -> TraceResult<Self> {
        let service_name = config
            .service_name()
            .ok_or(TraceError::MissingConfig("service_name"))?
            .to_owned();
        let client = config.client_options().build_client()?;
        ZipkinReporter::with_client(Box::new(client), service_name, config.report_target())
    }

    /// Build a reporter around a caller-supplied transport.
    pub fn with_client(
        client: Box<dyn HttpClient>,
        service_name: impl Into<String>,
        report_target: &str,
    ) -> TraceResult<Self> {
        Ok(ZipkinReporter {
            service_name: service_name.into(),
            uploader: Uploader::new(client, report_target)?,
        })
    }
}

#[async_trait]
impl Reporter for ZipkinReporter {
    async fn process_span(&mut self, span: &CompletedSpan) -> TraceResult<()> {
        let payload = match model::into_zipkin_span(&self.service_name, span).await? {
            Some(payload) => payload,
            None => return Ok(()),
        };
        if let Err(error) = self.uploader.upload(vec![payload]).await {
            warn!(
                operation_name = %span.operation_name(),
                %error,
                "failed to deliver span to collector"
            );
        }
        Ok(())
    }

    async fn flush(&mut self) -> TraceResult<()> {
        // Nothing is buffered locally; the queue upstream is the only buffer.
        Ok(())
    }
}
