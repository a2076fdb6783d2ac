//! Carrying span contexts across process boundaries.
//!
//! A propagation syntax knows how to encode a [`SpanContext`] into a carrier
//! (for example the headers of an outgoing HTTP request) and how to decode
//! one back out on the receiving side. Syntaxes are looked up by name in a
//! [`SyntaxRegistry`]; the [`Tracer`](crate::Tracer) performs the lookup with
//! its configured syntax name on every `inject`/`extract` call.
//!
//! Carriers are abstracted behind the [`Injector`] and [`Extractor`] traits,
//! with implementations for plain `HashMap<String, String>` maps and for
//! [`http::HeaderMap`] via [`HeaderInjector`]/[`HeaderExtractor`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::Value;
use crate::error::{TraceError, TraceResult};
use crate::trace::SpanContext;

pub mod b3;

pub use b3::B3PropagationSyntax;

/// Injector provides an interface for adding fields to an underlying carrier
/// such as a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier such as a header map.
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap, normalizing the key to lower case
    /// the way HTTP header names are matched.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap, case-insensitively.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Helper for injecting context headers into an [`http::HeaderMap`].
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap. Does nothing if the key or
    /// value are not valid inputs.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Helper for extracting context headers from an [`http::HeaderMap`].
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap. If the value is not valid
    /// ASCII, returns None.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// The carrier encodings a syntax can be asked to speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// String key/value pairs subject to HTTP header naming rules.
    HttpHeaders,
    /// Arbitrary string key/value pairs.
    TextMap,
    /// An opaque byte stream.
    Binary,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::HttpHeaders => f.write_str("http-headers"),
            Format::TextMap => f.write_str("text-map"),
            Format::Binary => f.write_str("binary"),
        }
    }
}

/// The raw fields a syntax decodes from a carrier, before they are assembled
/// into a [`SpanContext`] by the tracer.
///
/// An empty value (no trace or span id) means "nothing found" and becomes an
/// invalid context rather than an error.
#[derive(Clone, Debug, Default)]
pub struct ContextFields {
    /// Decoded trace id, when present.
    pub trace_id: Option<String>,
    /// Decoded span id, when present.
    pub span_id: Option<String>,
    /// Decoded sampling decision, when the carrier stated one.
    pub sampled: Option<bool>,
    /// Parent span ids, primary parent first.
    pub parents: Vec<String>,
    /// Baggage entries carried alongside the identity.
    pub baggage: Vec<(String, Value)>,
}

impl ContextFields {
    /// Whether the carrier held no propagated identity at all.
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none() && self.span_id.is_none()
    }
}

/// Logic to get span contexts into and out of a carrier.
///
/// Implement this to support a new wire encoding, then register it with
/// [`SyntaxRegistry::add_syntax`] so that it can be selected by name through
/// configuration. The default method bodies reject every format, which is
/// the expected behavior for formats a syntax does not understand.
pub trait PropagationSyntax: fmt::Debug + Send + Sync {
    /// The name this syntax reports in unsupported-format errors.
    fn name(&self) -> &'static str;

    /// Encode identifying characteristics of `context` into `carrier`.
    fn inject(
        &self,
        context: &SpanContext,
        format: Format,
        carrier: &mut dyn Injector,
    ) -> TraceResult<()> {
        let _ = (context, carrier);
        Err(TraceError::UnsupportedFormat {
            syntax: self.name(),
            format,
        })
    }

    /// Decode a context's fields from `carrier`.
    fn extract(&self, format: Format, carrier: &dyn Extractor) -> TraceResult<ContextFields> {
        let _ = carrier;
        Err(TraceError::UnsupportedFormat {
            syntax: self.name(),
            format,
        })
    }
}

/// The syntax every registry lookup falls back to: it supports no formats,
/// so a misconfigured syntax name degrades to explicit unsupported-format
/// errors instead of silently dropping propagation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSyntax;

impl PropagationSyntax for NoopSyntax {
    fn name(&self) -> &'static str {
        "none"
    }
}

type SyntaxFactory = Arc<dyn Fn() -> Box<dyn PropagationSyntax> + Send + Sync>;

/// Table of named propagation syntaxes, owned by the process that installed
/// the tracer.
#[derive(Clone, Default)]
pub struct SyntaxRegistry {
    factories: HashMap<String, SyntaxFactory>,
}

impl SyntaxRegistry {
    /// An empty registry. Every lookup falls back to [`NoopSyntax`].
    pub fn new() -> Self {
        SyntaxRegistry::default()
    }

    /// A registry with the built-in syntaxes: `"b3"` and `"zipkin"` both map
    /// to [`B3PropagationSyntax`].
    pub fn with_defaults() -> Self {
        let mut registry = SyntaxRegistry::new();
        registry.add_syntax("b3", || Box::new(B3PropagationSyntax));
        registry.add_syntax("zipkin", || Box::new(B3PropagationSyntax));
        registry
    }

    /// Register (or overwrite) a syntax factory under `name`.
    pub fn add_syntax<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn PropagationSyntax> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Retrieve a fresh syntax instance by name, or the noop fallback when
    /// nothing is registered under `name`.
    pub fn get_syntax(&self, name: &str) -> Box<dyn PropagationSyntax> {
        match self.factories.get(name) {
            Some(factory) => factory(),
            None => Box::new(NoopSyntax),
        }
    }
}

impl fmt::Debug for SyntaxRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_carrier_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "HeaderName", "value".to_string());
        assert_eq!(Extractor::get(&carrier, "HEADERNAME"), Some("value"));
        assert_eq!(Extractor::get(&carrier, "headername"), Some("value"));
    }

    #[test]
    fn header_map_carrier_round_trips() {
        let mut headers = http::HeaderMap::new();
        HeaderInjector(&mut headers).set("X-B3-TraceId", "abc123".to_string());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("x-b3-traceid"), Some("abc123"));
        assert!(extractor.keys().contains(&"x-b3-traceid"));
    }

    #[test]
    fn header_injector_ignores_invalid_values() {
        let mut headers = http::HeaderMap::new();
        HeaderInjector(&mut headers).set("X-Key", "bad\nvalue".to_string());
        assert!(headers.is_empty());
    }

    #[test]
    fn unregistered_names_fall_back_to_the_noop_syntax() {
        let registry = SyntaxRegistry::with_defaults();
        let syntax = registry.get_syntax("morse-code");
        let carrier: HashMap<String, String> = HashMap::new();

        let err = syntax.extract(Format::HttpHeaders, &carrier).unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnsupportedFormat {
                syntax: "none",
                format: Format::HttpHeaders
            }
        ));
    }

    #[test]
    fn registered_syntaxes_can_be_overwritten() {
        #[derive(Debug)]
        struct Marker;
        impl PropagationSyntax for Marker {
            fn name(&self) -> &'static str {
                "marker"
            }
        }

        let mut registry = SyntaxRegistry::with_defaults();
        registry.add_syntax("b3", || Box::new(Marker));
        assert_eq!(registry.get_syntax("b3").name(), "marker");
    }

    #[test]
    fn default_registry_serves_b3_under_both_names() {
        let registry = SyntaxRegistry::with_defaults();
        assert_eq!(registry.get_syntax("b3").name(), "b3");
        assert_eq!(registry.get_syntax("zipkin").name(), "b3");
    }
}
