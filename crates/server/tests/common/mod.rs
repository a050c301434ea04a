//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with a mock codec and metadata policy injected, so the full upload to
//! download flow runs without real image data.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use jpegstamp_core::testing::{MockCodec, MockMetadataPolicy};
use jpegstamp_core::{Config, ExecutionPreference, QueueConfig, ServerConfig};
use jpegstamp_server::api::{create_router, WsBroadcaster};
use jpegstamp_server::state::AppState;

const BOUNDARY: &str = "jpegstamp-test-boundary";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.upload(&[("a.png", "image/png", vec![0; 10])]).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Mock codec - control decode and encode
    pub codec: Arc<MockCodec>,
    /// Mock metadata policy - control timestamp outcomes
    pub metadata: Arc<MockMetadataPolicy>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with a single inline slot.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let codec = Arc::new(MockCodec::new());
        let metadata = Arc::new(MockMetadataPolicy::new());
        let state = Arc::new(
            AppState::with_capabilities(
                config,
                codec.clone(),
                metadata.clone(),
                WsBroadcaster::default(),
            )
            .await,
        );
        let router = create_router(Arc::clone(&state));
        Self {
            router,
            state,
            codec,
            metadata,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str) -> TestResponse {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::put(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Upload files as `(name, content type, bytes)` parts.
    pub async fn upload(&self, files: &[(&str, &str, Vec<u8>)]) -> TestResponse {
        self.upload_with_fields(files, &[]).await
    }

    /// Upload files plus extra text fields.
    pub async fn upload_with_fields(
        &self,
        files: &[(&str, &str, Vec<u8>)],
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let body = multipart_body(files, fields);
        self.send(
            Request::post("/api/v1/jobs")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Poll a job until it reaches one of `statuses`.
    pub async fn wait_for_status(&self, id: &str, statuses: &[&str]) -> Value {
        let uri = format!("/api/v1/jobs/{}", id);
        for _ in 0..200 {
            let response = self.get(&uri).await;
            if let Some(status) = response.body["status"].as_str() {
                if statuses.contains(&status) {
                    return response.body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {:?}", id, statuses);
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

/// Config with one inline execution slot.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 0, // Not used for in-process testing
        },
        queue: QueueConfig {
            execution: ExecutionPreference::Inline,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn multipart_body(files: &[(&str, &str, Vec<u8>)], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, mime, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
