use crate::propagation::Format;
use thiserror::Error;

/// A specialized `Result` type for tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing layer.
///
/// Apart from [`TraceError::UnsupportedFormat`], which is raised synchronously
/// to `inject`/`extract` callers, these surface only in reporter logs: tracing
/// failures are isolated from the traced operation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The propagation syntax cannot encode or decode the requested carrier
    /// format.
    #[error("propagation syntax {syntax:?} does not support {format}")]
    UnsupportedFormat {
        /// Name of the syntax that rejected the request.
        syntax: &'static str,
        /// The carrier format that was requested.
        format: Format,
    },

    /// A required configuration entry is missing.
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// The collector target could not be parsed into a URI.
    #[error("invalid collector uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// Building the outbound HTTP request failed.
    #[error("http request failed with {0}")]
    RequestFailed(#[from] http::Error),

    /// An endpoint host was neither a literal IP nor a resolvable name.
    #[error("unable to resolve endpoint address {0:?}")]
    UnresolvableEndpoint(String),

    /// Other errors propagated from the transport or reporters.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(err_msg.into())
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);
