use serde::Serialize;
use typed_builder::TypedBuilder;

use super::endpoint::Endpoint;

/// A timestamped event attached to a span, e.g. the `sr`/`ss` and `cs`/`cr`
/// timing markers.
#[derive(TypedBuilder, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Annotation {
    pub(crate) endpoint: Endpoint,
    pub(crate) value: String,
    pub(crate) timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum AnnotationValue {
    Bool(bool),
    String(String),
}

/// A key-tagged attribute attached to a span. The value is a string for
/// ordinary tags and a boolean for the `sa`/`ca` address markers.
#[derive(TypedBuilder, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BinaryAnnotation {
    pub(crate) key: String,
    pub(crate) value: AnnotationValue,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) endpoint: Option<Endpoint>,
}
