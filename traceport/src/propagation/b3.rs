//! # B3 propagation syntax
//!
//! Carries span contexts over the `X-B3-*` HTTP headers used by Zipkin.
//! Only the multiple-header encoding over [`Format::HttpHeaders`] is
//! supported; every other format is rejected.
//!
//! The sampling headers interact with two baggage entries:
//!
//! * `sample-requested` mirrors the `X-B3-Sampled` value seen on extraction
//!   and, when present, decides what `X-B3-Sampled` is written on injection.
//! * `flags` mirrors `X-B3-Flags`. Bit 0 (debug) and bit 1 both force the
//!   sampling decision on; bit 3 marks the span as a root, discarding any
//!   propagated parent id.
//!
//! Keeping these in baggage means the exact upstream header combination is
//! reproduced when the context (or one of its descendants) is injected into
//! an outgoing request.

use crate::common::Value;
use crate::error::TraceResult;
use crate::trace::SpanContext;

use super::{ContextFields, Extractor, Format, Injector, PropagationSyntax};

const TRACE_ID_HEADER: &str = "X-B3-TraceId";
const SPAN_ID_HEADER: &str = "X-B3-SpanId";
const PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";
const SAMPLED_HEADER: &str = "X-B3-Sampled";
const FLAGS_HEADER: &str = "X-B3-Flags";

const FLAG_DEBUG: i64 = 1 << 0;
const FLAG_SAMPLED: i64 = 1 << 1;
const FLAG_ROOT: i64 = 1 << 3;

const SAMPLE_REQUESTED_BAGGAGE: &str = "sample-requested";
const FLAGS_BAGGAGE: &str = "flags";

/// Span propagation over Zipkin's `X-B3-*` headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct B3PropagationSyntax;

impl PropagationSyntax for B3PropagationSyntax {
    fn name(&self) -> &'static str {
        "b3"
    }

    fn inject(
        &self,
        context: &SpanContext,
        format: Format,
        carrier: &mut dyn Injector,
    ) -> TraceResult<()> {
        if format != Format::HttpHeaders {
            return Err(crate::TraceError::UnsupportedFormat {
                syntax: self.name(),
                format,
            });
        }

        carrier.set(TRACE_ID_HEADER, context.trace_id().to_owned());
        carrier.set(SPAN_ID_HEADER, context.span_id().to_owned());
        if let Some(parent) = context.parents().first() {
            carrier.set(PARENT_SPAN_ID_HEADER, parent.span_id().to_owned());
        }

        match context.baggage_item(SAMPLE_REQUESTED_BAGGAGE) {
            None => {
                if context.baggage_item(FLAGS_BAGGAGE).is_none() {
                    let sampled = if context.sampled() { "1" } else { "0" };
                    carrier.set(SAMPLED_HEADER, sampled.to_owned());
                }
            }
            Some(requested) => {
                let sampled = if requested.is_truthy() { "1" } else { "0" };
                carrier.set(SAMPLED_HEADER, sampled.to_owned());
            }
        }

        if let Some(flags) = context.baggage_item(FLAGS_BAGGAGE) {
            carrier.set(FLAGS_HEADER, flags.to_string());
        }

        Ok(())
    }

    fn extract(&self, format: Format, carrier: &dyn Extractor) -> TraceResult<ContextFields> {
        if format != Format::HttpHeaders {
            return Err(crate::TraceError::UnsupportedFormat {
                syntax: self.name(),
                format,
            });
        }

        let mut fields = ContextFields::default();
        let (trace_id, span_id) = match (carrier.get(TRACE_ID_HEADER), carrier.get(SPAN_ID_HEADER))
        {
            (Some(trace_id), Some(span_id)) => (trace_id, span_id),
            _ => return Ok(fields),
        };
        fields.trace_id = Some(trace_id.to_owned());
        fields.span_id = Some(span_id.to_owned());

        if let Some(parent_id) = carrier.get(PARENT_SPAN_ID_HEADER) {
            fields.parents.push(parent_id.to_owned());
        }

        if let Some(raw) = carrier.get(SAMPLED_HEADER) {
            let sampled = raw.trim().parse::<u64>().map(|v| v != 0).unwrap_or(false);
            fields.sampled = Some(sampled);
            fields
                .baggage
                .push((SAMPLE_REQUESTED_BAGGAGE.to_owned(), Value::Bool(sampled)));
        }

        if let Some(raw) = carrier.get(FLAGS_HEADER) {
            if let Ok(flags) = raw.trim().parse::<i64>() {
                fields
                    .baggage
                    .push((FLAGS_BAGGAGE.to_owned(), Value::I64(flags)));
                if flags & FLAG_DEBUG != 0 {
                    fields.sampled = Some(true);
                }
                if flags & FLAG_SAMPLED != 0 {
                    fields.sampled = Some(true);
                }
                if flags & FLAG_ROOT != 0 {
                    fields.parents.clear();
                }
            }
        }

        Ok(fields)
    }
}
