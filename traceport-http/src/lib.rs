//! Minimal HTTP client interface for the `traceport` reporting pipeline.
//!
//! The span reporter only needs one primitive from its transport: "send this
//! request, give me back the status and body". Applications that already run
//! an HTTP client can implement [`HttpClient`] for it instead of pulling in
//! the bundled [`reqwest`] implementation.

use async_trait::async_trait;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

/// Errors produced by an [`HttpClient`] implementation.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface necessary for sending requests over HTTP.
///
/// Used by the span reporter to deliver payloads to a collector. Clients are
/// expected to be cheap to share between tasks; implementations should hold
/// their connection pool internally.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with a [`Bytes`] payload.
    ///
    /// Returns the HTTP response including the status code and body.
    ///
    /// Returns an error if it can't connect to the server or the request
    /// could not be completed, e.g. because of a timeout or a loss of
    /// connection.
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

/// Extension trait for mapping error responses to errors.
pub trait ResponseExt: Sized {
    /// Turn a response with an HTTP error status (4xx, 5xx) into an error.
    fn error_for_status(self) -> Result<Self, HttpError>;
}

impl<T> ResponseExt for Response<T> {
    fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(format!("request failed with status {}", self.status()).into())
        }
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_client {
    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}
