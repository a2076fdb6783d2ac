//! Helpers for asserting on traced behavior in tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::TraceResult;
use crate::reporting::Reporter;
use crate::trace::CompletedSpan;

/// A reporter that simply records what it processes.
///
/// Register it under a name of your choosing and select that name as the
/// `report_format` to capture every span the pipeline would have reported.
/// Clones share the captured list, so keep one handle in the test and give a
/// clone to the registry:
///
/// ```
/// use traceport::reporting::ReporterRegistry;
/// use traceport::testing::RecordingReporter;
///
/// let recorder = RecordingReporter::new();
/// let mut reporters = ReporterRegistry::with_defaults();
/// let handle = recorder.clone();
/// reporters.add_reporter("recorder", move |_config| Ok(Box::new(handle.clone())));
/// # drop(recorder);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    captured: Arc<Mutex<Vec<CompletedSpan>>>,
    flush_count: Arc<Mutex<usize>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        RecordingReporter::default()
    }

    /// The spans processed so far, in processing order.
    pub fn captured_spans(&self) -> Vec<CompletedSpan> {
        self.captured.lock().map(|spans| spans.clone()).unwrap_or_default()
    }

    /// How many spans have been processed so far.
    pub fn span_count(&self) -> usize {
        self.captured.lock().map(|spans| spans.len()).unwrap_or(0)
    }

    /// How many times `flush` has run.
    pub fn flush_count(&self) -> usize {
        self.flush_count.lock().map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn process_span(&mut self, span: &CompletedSpan) -> TraceResult<()> {
        if let Ok(mut captured) = self.captured.lock() {
            captured.push(span.clone());
        }
        Ok(())
    }

    async fn flush(&mut self) -> TraceResult<()> {
        if let Ok(mut count) = self.flush_count.lock() {
            *count += 1;
        }
        Ok(())
    }
}
