use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use typed_builder::TypedBuilder;

#[derive(TypedBuilder, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Endpoint {
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) service_name: Option<String>,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ipv4: Option<Ipv4Addr>,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ipv6: Option<Ipv6Addr>,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) port: Option<u16>,
}

impl Endpoint {
    pub(crate) fn with_address(service_name: Option<String>, addr: IpAddr, port: u16) -> Self {
        match addr {
            IpAddr::V4(v4) => Endpoint {
                service_name,
                ipv4: Some(v4),
                ipv6: None,
                port: Some(port),
            },
            IpAddr::V6(v6) => Endpoint {
                service_name,
                ipv4: None,
                ipv6: Some(v6),
                port: Some(port),
            },
        }
    }
}
