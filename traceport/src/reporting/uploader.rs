//! Delivery of span batches to the collector endpoint.

use bytes::Bytes;
use http::{header::CONTENT_TYPE, Method, Request, Uri};
use traceport_http::{HttpClient, ResponseExt};

use crate::error::TraceResult;

use super::model::span::Span;

const SPANS_PATH: &str = "spans";
const PAYLOAD_CONTENT_TYPE: &str = "application/json; charset=UTF8";

#[derive(Debug)]
pub(crate) struct Uploader {
    client: Box<dyn HttpClient>,
    collector_endpoint: Uri,
}

impl Uploader {
    /// Create an uploader posting to `<report_target>/spans`, normalizing a
    /// missing trailing slash on the target.
    pub(crate) fn new(client: Box<dyn HttpClient>, report_target: &str) -> TraceResult<Self> {
        let mut endpoint = report_target.to_owned();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        endpoint.push_str(SPANS_PATH);

        Ok(Uploader {
            client,
            collector_endpoint: endpoint.parse::<Uri>()?,
        })
    }

    /// POST a batch of spans as a JSON array, failing on transport errors and
    /// non-success statuses.
    pub(crate) async fn upload(&self, spans: Vec<Span>) -> TraceResult<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.collector_endpoint.clone())
            .header(CONTENT_TYPE, PAYLOAD_CONTENT_TYPE)
            .body(Bytes::from(serde_json::to_vec(&spans).unwrap_or_default()))?;
        let _ = self.client.send(request).await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::{Response, StatusCode};
    use std::sync::{Arc, Mutex};
    use traceport_http::HttpError;

    #[derive(Clone, Debug, Default)]
    struct CapturingClient {
        requests: Arc<Mutex<Vec<Request<Bytes>>>>,
        status: u16,
    }

    impl CapturingClient {
        fn with_status(status: u16) -> Self {
            CapturingClient {
                requests: Arc::default(),
                status,
            }
        }
    }

    #[async_trait]
    impl HttpClient for CapturingClient {
        async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            self.requests.lock().unwrap().push(request);
            Ok(Response::builder()
                .status(StatusCode::from_u16(self.status).unwrap())
                .body(Bytes::new())?)
        }
    }

    fn sample_span() -> Span {
        Span {
            name: "op".to_owned(),
            id: "b".repeat(16),
            trace_id: "a".repeat(32),
            parent_id: None,
            annotations: vec![],
            binary_annotations: vec![],
        }
    }

    #[test]
    fn target_without_trailing_slash_is_normalized() {
        let client = CapturingClient::with_status(202);
        let uploader = Uploader::new(Box::new(client), "http://127.0.0.1:9411/api/v1").unwrap();
        assert_eq!(
            uploader.collector_endpoint.to_string(),
            "http://127.0.0.1:9411/api/v1/spans"
        );
    }

    #[test]
    fn target_with_trailing_slash_is_kept() {
        let client = CapturingClient::with_status(202);
        let uploader = Uploader::new(Box::new(client), "http://zipkin:9411/api/v1/").unwrap();
        assert_eq!(
            uploader.collector_endpoint.to_string(),
            "http://zipkin:9411/api/v1/spans"
        );
    }

    #[test]
    fn unparseable_targets_are_rejected() {
        let client = CapturingClient::with_status(202);
        assert!(Uploader::new(Box::new(client), "not a uri at all").is_err());
    }

    #[tokio::test]
    async fn upload_posts_a_json_batch() {
        let client = CapturingClient::with_status(202);
        let requests = client.requests.clone();
        let uploader = Uploader::new(Box::new(client), "http://127.0.0.1:9411/api/v1").unwrap();

        uploader.upload(vec![sample_span()]).await.unwrap();

        let captured = requests.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let request = &captured[0];
        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.uri().to_string(),
            "http://127.0.0.1:9411/api/v1/spans"
        );
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            PAYLOAD_CONTENT_TYPE
        );

        let body: serde_json::Value = serde_json::from_slice(request.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["traceId"], "a".repeat(32));
    }

    #[tokio::test]
    async fn error_statuses_fail_the_upload() {
        let client = CapturingClient::with_status(500);
        let uploader = Uploader::new(Box::new(client), "http://127.0.0.1:9411/api/v1").unwrap();
        assert!(uploader.upload(vec![sample_span()]).await.is_err());
    }
}
