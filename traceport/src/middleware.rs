//! Request-lifecycle interceptor for host web frameworks.
//!
//! Hosts call into the tracing layer at exactly two points: when a request
//! starts (extract the upstream context, start a server span) and when it
//! finishes (record the status, finish the span). [`RequestTracer`] packages
//! those two calls so framework glue only has to adapt its request type into
//! a [`RequestMeta`].

use tracing::debug;

use crate::config::Config;
use crate::propagation::{Extractor, Format};
use crate::trace::{ServiceEndpoint, Span, Tracer};

/// What the host request layer knows about an inbound request.
pub struct RequestMeta<'a> {
    /// Request method, e.g. `GET`.
    pub method: &'a str,
    /// The full request URL.
    pub url: &'a str,
    /// The server protocol, e.g. `http`.
    pub protocol: &'a str,
    /// The Host header value, `host` or `host:port`.
    pub host: &'a str,
    /// The remote peer address, when known.
    pub remote_address: Option<&'a str>,
    /// Carrier holding the request headers for context extraction.
    pub headers: &'a dyn Extractor,
}

impl std::fmt::Debug for RequestMeta<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMeta")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("remote_address", &self.remote_address)
            .finish_non_exhaustive()
    }
}

/// Starts and finishes one server span per handled request.
#[derive(Clone, Debug)]
pub struct RequestTracer {
    tracer: Tracer,
    service_name: Option<String>,
}

impl RequestTracer {
    /// Build an interceptor around the installed tracer, stamping the
    /// configured service name onto every request span.
    pub fn new(tracer: Tracer, config: &Config) -> Self {
        RequestTracer {
            tracer,
            service_name: config.service_name().map(str::to_owned),
        }
    }

    /// Handle the "request started" point: extract the upstream context from
    /// the request headers and start a server-kind span for the request.
    ///
    /// The returned span carries the standard request tags (`method`, `url`,
    /// `server-type`, and `peer.address` when the remote address is known)
    /// and its context is stamped with the service name and the endpoint
    /// derived from the Host header.
    pub fn on_request_start(&self, operation_name: &str, meta: RequestMeta<'_>) -> Span {
        let mut builder = self
            .tracer
            .span_builder(operation_name)
            .with_tag("span.kind", "server")
            .with_tag("method", meta.method)
            .with_tag("url", meta.url)
            .with_tag("server-type", meta.protocol);
        if let Some(address) = meta.remote_address {
            builder = builder.with_tag("peer.address", address);
        }

        match self.tracer.extract(Format::HttpHeaders, meta.headers) {
            Ok(parent) if parent.is_valid() => {
                builder = builder.with_child_of(parent);
            }
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "could not extract an upstream context, starting a new trace");
            }
        }

        let mut span = builder.start(&self.tracer);
        if let Some(name) = &self.service_name {
            span.context_mut().set_service_name(name.clone());
        }
        if let Some(endpoint) = endpoint_from_host(meta.host, meta.protocol) {
            span.context_mut().set_service_endpoint(endpoint);
        }
        span
    }

    /// Handle the "request finished" point: record the response status and
    /// finish the span.
    pub fn on_request_end(&self, span: &mut Span, status: u16) {
        span.set_tag("status", i64::from(status));
        span.finish();
    }
}

/// Split a Host header into a service endpoint, defaulting the port from the
/// protocol when the header does not carry one.
fn endpoint_from_host(host: &str, protocol: &str) -> Option<ServiceEndpoint> {
    if host.is_empty() {
        return None;
    }
    let default_port = if protocol.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    };
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse::<u16>() {
            Ok(port) if !name.is_empty() => Some(ServiceEndpoint::new(name, port)),
            // IPv6 literals without a port land here; keep the whole value.
            _ => Some(ServiceEndpoint::new(host, default_port)),
        },
        None => Some(ServiceEndpoint::new(host, default_port)),
    }
}
