use std::net::IpAddr;
use std::time::SystemTime;
use tokio::net::lookup_host;

pub(crate) mod annotation;
pub(crate) mod endpoint;
pub(crate) mod span;

use crate::error::{TraceError, TraceResult};
use crate::trace::CompletedSpan;
use annotation::{Annotation, AnnotationValue, BinaryAnnotation};
use endpoint::Endpoint;

const SPAN_KIND_TAG: &str = "span.kind";
const PEER_ADDRESS_TAG: &str = "peer.address";
const PEER_SERVICE_TAG: &str = "peer.service";
const PEER_IPV4_TAG: &str = "peer.ipv4";
const PEER_IPV6_TAG: &str = "peer.ipv6";
const PEER_PORT_TAG: &str = "peer.port";
const PEER_HOSTNAME_TAG: &str = "peer.hostname";

const SERVER_RECV: &str = "sr";
const SERVER_SEND: &str = "ss";
const CLIENT_SEND: &str = "cs";
const CLIENT_RECV: &str = "cr";
const CLIENT_ADDR: &str = "ca";
const SERVER_ADDR: &str = "sa";

/// Translate a finished span into the collector's annotation model.
///
/// Returns `Ok(None)` when the span cannot be represented (an unrecognized
/// `span.kind` value), which the caller treats as "nothing to transmit".
/// Unresolvable endpoint hosts fail the translation for this span only.
pub(crate) async fn into_zipkin_span(
    default_service_name: &str,
    completed: &CompletedSpan,
) -> TraceResult<Option<span::Span>> {
    let kind = completed
        .tag(SPAN_KIND_TAG)
        .map(|v| v.as_str().into_owned())
        .unwrap_or_else(|| "client".to_owned());
    let (open_marker, close_marker, server_side) = match kind.as_str() {
        "server" | "periodic" => (SERVER_RECV, SERVER_SEND, true),
        "client" | "producer" => (CLIENT_SEND, CLIENT_RECV, false),
        _ => return Ok(None),
    };

    let start = match completed.start_time() {
        Some(start) => start,
        None => return Ok(None),
    };

    let context = completed.context();
    let service_name = context
        .service_name()
        .unwrap_or(default_service_name)
        .to_owned();
    let local_endpoint = match context.service_endpoint() {
        Some(endpoint) => {
            let address = resolve_host(&endpoint.host, endpoint.port).await?;
            Endpoint::with_address(Some(service_name), address, endpoint.port)
        }
        None => Endpoint::builder().service_name(service_name).build(),
    };

    let started = micros_since_epoch(start);
    let finished = started
        + completed
            .duration()
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
    let annotations = vec![
        Annotation {
            endpoint: local_endpoint.clone(),
            value: open_marker.to_owned(),
            timestamp: started,
        },
        Annotation {
            endpoint: local_endpoint.clone(),
            value: close_marker.to_owned(),
            timestamp: finished,
        },
    ];

    let mut consumed: Vec<&str> = vec![SPAN_KIND_TAG];
    let mut binary_annotations = Vec::new();

    if server_side {
        consumed.push(PEER_ADDRESS_TAG);
        if let Some(address) = completed.tag(PEER_ADDRESS_TAG) {
            binary_annotations.push(BinaryAnnotation {
                key: CLIENT_ADDR.to_owned(),
                value: AnnotationValue::String(address.as_str().into_owned()),
                endpoint: Some(local_endpoint),
            });
        }
    } else {
        consumed.extend([
            PEER_SERVICE_TAG,
            PEER_IPV4_TAG,
            PEER_IPV6_TAG,
            PEER_PORT_TAG,
            PEER_HOSTNAME_TAG,
        ]);
        if let Some(remote) = remote_endpoint(completed).await? {
            binary_annotations.push(BinaryAnnotation {
                key: SERVER_ADDR.to_owned(),
                value: AnnotationValue::Bool(true),
                endpoint: Some(remote),
            });
        }
    }

    let mut remaining: Vec<_> = completed
        .tags()
        .iter()
        .filter(|(key, _)| !consumed.contains(&key.as_str()))
        .collect();
    remaining.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in remaining {
        binary_annotations.push(BinaryAnnotation {
            key: key.clone(),
            value: AnnotationValue::String(value.as_str().into_owned()),
            endpoint: None,
        });
    }

    Ok(Some(span::Span {
        name: completed.operation_name().to_lowercase(),
        id: context.span_id().to_owned(),
        trace_id: context.trace_id().to_owned(),
        parent_id: context.parents().first().map(|p| p.span_id().to_owned()),
        annotations,
        binary_annotations,
    }))
}

/// Build the remote side of a client/producer span from its `peer.*` tags.
async fn remote_endpoint(completed: &CompletedSpan) -> TraceResult<Option<Endpoint>> {
    let service = completed
        .tag(PEER_SERVICE_TAG)
        .map(|v| v.as_str().into_owned());
    let port = completed
        .tag(PEER_PORT_TAG)
        .and_then(|v| v.as_str().parse::<u16>().ok())
        .unwrap_or(0);

    let literal = completed
        .tag(PEER_IPV4_TAG)
        .and_then(|v| v.as_str().parse::<IpAddr>().ok())
        .or_else(|| {
            completed
                .tag(PEER_IPV6_TAG)
                .and_then(|v| v.as_str().parse::<IpAddr>().ok())
        });
    let address = match (literal, completed.tag(PEER_HOSTNAME_TAG)) {
        (Some(address), _) => Some(address),
        (None, Some(hostname)) => Some(resolve_host(&hostname.as_str(), port).await?),
        (None, None) => None,
    };

    match (service, address) {
        (None, None) => Ok(None),
        (service, Some(address)) => Ok(Some(Endpoint::with_address(service, address, port))),
        (Some(service), None) => Ok(Some(
            Endpoint::builder().service_name(service).port(port).build(),
        )),
    }
}

/// Turn a literal IP or resolvable hostname into an address, preferring
/// whatever family the resolver answers with first.
async fn resolve_host(host: &str, port: u16) -> TraceResult<IpAddr> {
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(address);
    }
    let mut addresses = lookup_host((host, port))
        .await
        .map_err(|_| TraceError::UnresolvableEndpoint(host.to_owned()))?;
    addresses
        .next()
        .map(|socket_address| socket_address.ip())
        .ok_or_else(|| TraceError::UnresolvableEndpoint(host.to_owned()))
}

fn micros_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
