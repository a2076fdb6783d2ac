use crate::common::Value;
use once_cell::sync::OnceCell;
use rand::{thread_rng, Rng};
use std::collections::HashMap;

use super::span::Span;

/// A network location a service answers on, used to build reporting
/// endpoints. The host may be a literal IP address or a resolvable name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Host part, literal IP or hostname.
    pub host: String,
    /// TCP port the service is bound to.
    pub port: u16,
}

impl ServiceEndpoint {
    /// Create a new endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServiceEndpoint {
            host: host.into(),
            port,
        }
    }
}

/// A reference to a parent span, accepted anywhere a parent can be supplied.
///
/// Parents can be given as a full [`SpanContext`], as a [`Span`] (its context
/// is used), or as a bare span-id string which is wrapped into a minimal
/// context carrying only that id.
#[derive(Clone, Debug)]
pub enum Parent {
    /// A parent identified by its full context.
    Context(SpanContext),
    /// A parent identified only by its span id.
    Id(String),
}

impl Parent {
    fn into_context(self) -> SpanContext {
        match self {
            Parent::Context(context) => context,
            Parent::Id(id) => SpanContext::builder().with_span_id(id).build(),
        }
    }
}

impl From<SpanContext> for Parent {
    fn from(context: SpanContext) -> Self {
        Parent::Context(context)
    }
}

impl From<&SpanContext> for Parent {
    fn from(context: &SpanContext) -> Self {
        Parent::Context(context.clone())
    }
}

impl From<&Span> for Parent {
    fn from(span: &Span) -> Self {
        Parent::Context(span.context().clone())
    }
}

impl From<String> for Parent {
    fn from(id: String) -> Self {
        Parent::Id(id)
    }
}

impl From<&str> for Parent {
    fn from(id: &str) -> Self {
        Parent::Id(id.to_owned())
    }
}

/// Identifies a span and carries the state inherited by its descendants.
///
/// A context can exist without a [`Span`]: it is what gets extracted from the
/// headers of an incoming request before any local span has been started, and
/// what gets injected into outgoing requests. Identity fields are immutable;
/// the sampling decision and the service name/endpoint are the only fields
/// set after construction, by the request layer immediately after a span is
/// created.
#[derive(Clone, Debug)]
pub struct SpanContext {
    trace_id: OnceCell<String>,
    span_id: OnceCell<String>,
    explicit_ids: bool,
    sampled: Option<bool>,
    parents: Vec<SpanContext>,
    baggage: HashMap<String, Value>,
    service_name: Option<String>,
    service_endpoint: Option<ServiceEndpoint>,
}

impl SpanContext {
    /// Start building a context.
    pub fn builder() -> SpanContextBuilder {
        SpanContextBuilder::default()
    }

    /// Create a fresh root context with no identity supplied; ids are
    /// generated on first read.
    pub fn new() -> Self {
        SpanContext::builder().build()
    }

    /// The trace identifier shared by every span in this trace.
    ///
    /// Generated as a random 128-bit value in lowercase hex when neither
    /// supplied at construction nor inherited from the first parent.
    pub fn trace_id(&self) -> &str {
        self.trace_id.get_or_init(|| {
            if let Some(parent) = self.parents.first() {
                parent.trace_id().to_owned()
            } else {
                format!("{:032x}", thread_rng().gen::<u128>())
            }
        })
    }

    /// The identifier of this span, generated as a random 64-bit value in
    /// lowercase hex when not supplied at construction.
    pub fn span_id(&self) -> &str {
        self.span_id
            .get_or_init(|| format!("{:016x}", thread_rng().gen::<u64>()))
    }

    /// Whether spans in this trace should be retained and reported.
    ///
    /// An explicit setting wins; otherwise the decision is inherited from the
    /// parent chain: sampled if any ancestor is sampled, not sampled if there
    /// are no sampled ancestors.
    pub fn sampled(&self) -> bool {
        match self.sampled {
            Some(explicit) => explicit,
            None => self.parents.iter().any(|parent| parent.sampled()),
        }
    }

    /// Explicitly set the sampling decision for this context.
    pub fn set_sampled(&mut self, sampled: bool) {
        self.sampled = Some(sampled);
    }

    /// Parent contexts, primary parent first. Never modified after
    /// construction.
    pub fn parents(&self) -> &[SpanContext] {
        &self.parents
    }

    /// Baggage entries set directly on this context.
    pub fn baggage(&self) -> &HashMap<String, Value> {
        &self.baggage
    }

    /// Look up a baggage entry, searching this context first and then the
    /// parent chain. Baggage propagates to all descendants.
    pub fn baggage_item(&self, key: &str) -> Option<&Value> {
        self.baggage
            .get(key)
            .or_else(|| self.parents.iter().find_map(|p| p.baggage_item(key)))
    }

    /// Set a baggage entry on this context.
    pub fn set_baggage_item(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.baggage.insert(key.into(), value.into());
    }

    /// The name this service reports spans under, from this context or the
    /// nearest ancestor that has one.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name
            .as_deref()
            .or_else(|| self.parents.iter().find_map(|p| p.service_name()))
    }

    /// Set the service name on this context.
    pub fn set_service_name(&mut self, name: impl Into<String>) {
        self.service_name = Some(name.into());
    }

    /// The host/port this service answers on, from this context or the
    /// nearest ancestor that has one.
    pub fn service_endpoint(&self) -> Option<&ServiceEndpoint> {
        self.service_endpoint
            .as_ref()
            .or_else(|| self.parents.iter().find_map(|p| p.service_endpoint()))
    }

    /// Set the service endpoint on this context.
    pub fn set_service_endpoint(&mut self, endpoint: ServiceEndpoint) {
        self.service_endpoint = Some(endpoint);
    }

    /// Whether this context identifies a usable trace position.
    ///
    /// A context is usable if it is sampled, or linked to at least one
    /// parent, or was constructed with both identifiers supplied explicitly.
    /// Freshly created root contexts are not valid until sampling is enabled
    /// on them.
    pub fn is_valid(&self) -> bool {
        self.sampled() || !self.parents.is_empty() || self.explicit_ids
    }

    /// Force id generation so that clones made from this point on share the
    /// same identity.
    pub(crate) fn materialize_ids(&self) {
        let _ = self.trace_id();
        let _ = self.span_id();
    }
}

impl Default for SpanContext {
    fn default() -> Self {
        SpanContext::new()
    }
}

/// Builder for [`SpanContext`].
#[derive(Debug, Default)]
pub struct SpanContextBuilder {
    trace_id: Option<String>,
    span_id: Option<String>,
    sampled: Option<bool>,
    parents: Vec<Parent>,
    baggage: HashMap<String, Value>,
    service_name: Option<String>,
    service_endpoint: Option<ServiceEndpoint>,
}

impl SpanContextBuilder {
    /// Supply an explicit trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Supply an explicit span id.
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Explicitly set the sampling decision.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }

    /// Append a parent reference. The first parent added is the primary one.
    pub fn with_parent(mut self, parent: impl Into<Parent>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Append a sequence of parent references.
    pub fn with_parents<I, P>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parent>,
    {
        self.parents.extend(parents.into_iter().map(Into::into));
        self
    }

    /// Add a baggage entry.
    pub fn with_baggage_item(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Set the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the service endpoint.
    pub fn with_service_endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.service_endpoint = Some(endpoint);
        self
    }

    /// Build the context.
    pub fn build(self) -> SpanContext {
        let explicit_ids = self.trace_id.is_some() && self.span_id.is_some();
        let trace_id = OnceCell::new();
        if let Some(id) = self.trace_id {
            let _ = trace_id.set(id);
        }
        let span_id = OnceCell::new();
        if let Some(id) = self.span_id {
            let _ = span_id.set(id);
        }

        SpanContext {
            trace_id,
            span_id,
            explicit_ids,
            sampled: self.sampled,
            parents: self.parents.into_iter().map(Parent::into_context).collect(),
            baggage: self.baggage,
            service_name: self.service_name,
            service_endpoint: self.service_endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_not_valid() {
        assert!(!SpanContext::new().is_valid());
    }

    #[test]
    fn generated_trace_id_is_128_bit_lowercase_hex() {
        let context = SpanContext::new();
        assert_eq!(context.trace_id().len(), 128 / 8 * 2);
        assert!(context
            .trace_id()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_span_id_is_64_bit_lowercase_hex() {
        let context = SpanContext::new();
        assert_eq!(context.span_id().len(), 64 / 8 * 2);
        assert!(context
            .span_id()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_are_stable() {
        let context = SpanContext::new();
        let first = context.trace_id().to_owned();
        assert_eq!(context.trace_id(), first);
    }

    #[test]
    fn independent_roots_do_not_collide() {
        let a = SpanContext::new();
        let b = SpanContext::new();
        assert_ne!(a.trace_id(), b.trace_id());
        assert_ne!(a.span_id(), b.span_id());
    }

    #[test]
    fn ids_can_be_specified() {
        let context = SpanContext::builder()
            .with_trace_id("some-random-value")
            .build();
        assert_eq!(context.trace_id(), "some-random-value");

        let context = SpanContext::builder()
            .with_span_id("some-random-value")
            .build();
        assert_eq!(context.span_id(), "some-random-value");
    }

    #[test]
    fn context_is_valid_when_both_ids_are_set() {
        assert!(!SpanContext::builder().with_trace_id("t").build().is_valid());
        assert!(!SpanContext::builder().with_span_id("s").build().is_valid());
        assert!(SpanContext::builder()
            .with_trace_id("t")
            .with_span_id("s")
            .build()
            .is_valid());
    }

    #[test]
    fn context_is_valid_when_it_has_parents() {
        let parent = SpanContext::new();
        assert!(SpanContext::builder()
            .with_parent(parent)
            .build()
            .is_valid());
    }

    #[test]
    fn context_defaults_to_not_sampled() {
        assert!(!SpanContext::new().sampled());
    }

    #[test]
    fn sampled_can_be_toggled() {
        let mut context = SpanContext::new();
        context.set_sampled(true);
        assert!(context.sampled());
    }

    #[test]
    fn context_is_valid_when_sampling_is_enabled() {
        assert!(SpanContext::builder().with_sampled(true).build().is_valid());
    }

    #[test]
    fn sampled_propagates_to_children() {
        let parent = SpanContext::builder().with_sampled(true).build();
        let child = SpanContext::builder().with_parent(parent).build();
        assert!(child.sampled());

        let grand_parent = SpanContext::builder().with_sampled(true).build();
        let parent = SpanContext::builder().with_parent(grand_parent).build();
        let child = SpanContext::builder().with_parent(parent).build();
        assert!(child.sampled());
    }

    #[test]
    fn explicit_not_sampled_beats_inheritance() {
        let parent = SpanContext::builder().with_sampled(true).build();
        let child = SpanContext::builder()
            .with_parent(parent)
            .with_sampled(false)
            .build();
        assert!(!child.sampled());
    }

    #[test]
    fn trace_id_is_fetched_from_first_parent() {
        let first_parent = SpanContext::new();
        let other_parent = SpanContext::new();
        let expected = first_parent.trace_id().to_owned();
        let child = SpanContext::builder()
            .with_parents([first_parent, other_parent])
            .build();
        assert_eq!(child.trace_id(), expected);
    }

    #[test]
    fn explicit_trace_id_overrides_parent() {
        let parent = SpanContext::new();
        let child = SpanContext::builder()
            .with_parent(parent)
            .with_trace_id("my-own-trace")
            .build();
        assert_eq!(child.trace_id(), "my-own-trace");
    }

    #[test]
    fn parents_are_converted_to_span_contexts() {
        let context_parent = SpanContext::new();
        let str_parent = "df4d1639094d4d1bbfc14b319f455e94";
        let child = SpanContext::builder()
            .with_parent(context_parent)
            .with_parent(str_parent)
            .build();
        assert_eq!(child.parents().len(), 2);
        assert_eq!(child.parents()[1].span_id(), str_parent);
    }

    #[test]
    fn service_fields_are_inherited_from_parents() {
        let mut parent = SpanContext::new();
        parent.set_service_name("svc");
        parent.set_service_endpoint(ServiceEndpoint::new("127.0.0.1", 8080));
        let child = SpanContext::builder().with_parent(parent).build();

        assert_eq!(child.service_name(), Some("svc"));
        assert_eq!(
            child.service_endpoint(),
            Some(&ServiceEndpoint::new("127.0.0.1", 8080))
        );
    }

    #[test]
    fn local_service_fields_win_over_parents() {
        let mut parent = SpanContext::new();
        parent.set_service_name("upstream");
        let mut child = SpanContext::builder().with_parent(parent).build();
        child.set_service_name("local");
        assert_eq!(child.service_name(), Some("local"));
    }

    #[test]
    fn baggage_items_are_visible_to_descendants() {
        let mut parent = SpanContext::new();
        parent.set_baggage_item("flags", 1_i64);
        let child = SpanContext::builder().with_parent(parent).build();

        assert_eq!(child.baggage_item("flags"), Some(&Value::I64(1)));
        assert!(child.baggage().is_empty());
    }
}
