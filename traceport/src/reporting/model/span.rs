use serde::Serialize;
use typed_builder::TypedBuilder;

use super::annotation::{Annotation, BinaryAnnotation};

/// One span in the collector's ingestion model: identity plus timing and
/// attribute annotations.
#[derive(TypedBuilder, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Span {
    pub(crate) name: String,
    pub(crate) id: String,
    pub(crate) trace_id: String,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) parent_id: Option<String>,
    #[builder(default)]
    pub(crate) annotations: Vec<Annotation>,
    #[builder(default)]
    pub(crate) binary_annotations: Vec<BinaryAnnotation>,
}
