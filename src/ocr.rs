//! Text recognition through a hosted vision API.
//!
//! The HTTP side sits behind [`VisionTransport`] so the retry policy can be
//! exercised without a network.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, MAX_RETRIES, MAX_RETRY_DELAY, REQUEST_TIMEOUT, RETRY_DELAY};
use crate::imaging::{self, PrepOptions};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateRequest {
    pub requests: Vec<ImageRequest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub image: ImageContent,
    pub features: Vec<Feature>,
    pub image_context: ImageContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageContent {
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    pub language_hints: Vec<String>,
}

impl AnnotateRequest {
    pub fn text_detection(image: &[u8], language_hint: &str) -> Self {
        Self {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(image),
                },
                features: vec![Feature {
                    kind: "TEXT_DETECTION".to_string(),
                    max_results: 1,
                }],
                image_context: ImageContext {
                    language_hints: vec![language_hint.to_string()],
                },
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotateResponse {
    #[serde(default)]
    pub responses: Vec<ImageResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    #[serde(default)]
    pub text_annotations: Vec<TextAnnotation>,
    pub error: Option<ApiStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextAnnotation {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// First annotation of the first response, whitespace collapsed.
pub fn extract_text(response: &AnnotateResponse) -> Option<String> {
    let first = response.responses.first()?;
    if let Some(status) = &first.error {
        log::warn!("Vision API reported error {}: {}", status.code, status.message);
    }
    let description = &first.text_annotations.first()?.description;
    let text = collapse_whitespace(description);
    if text.is_empty() {
        log::info!("No text found in the image");
        None
    } else {
        Some(text)
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Network-level failures, rate limiting and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait VisionTransport: Send + Sync {
    async fn annotate(&self, request: &AnnotateRequest) -> Result<AnnotateResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl VisionTransport for HttpTransport {
    async fn annotate(&self, request: &AnnotateRequest) -> Result<AnnotateResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        log::debug!("API Response Status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("API Error Response: {}", body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Pause after the failed `attempt` (1-based): `attempt x base_delay`, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("API request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
    #[error("image preparation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct OcrClient {
    transport: Arc<dyn VisionTransport>,
    retry: RetryPolicy,
    prep: PrepOptions,
    language_hint: String,
}

impl OcrClient {
    pub fn new(transport: Arc<dyn VisionTransport>, language_hint: impl Into<String>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            prep: PrepOptions::default(),
            language_hint: language_hint.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.vision_endpoint, &config.api_key, REQUEST_TIMEOUT)?;
        Ok(Self::new(Arc::new(transport), &config.language_hint))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Recognized text, `None` when the image holds none or the API answer is
    /// unusable. Errors only when the file is unreadable or retries run out.
    pub async fn recognize(&self, path: &Path) -> Result<Option<String>, OcrError> {
        let owned = path.to_path_buf();
        let prep = self.prep;
        let image = tokio::task::spawn_blocking(move || imaging::prepare_for_ocr(&owned, prep))
            .await?
            .map_err(|source| OcrError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let request = AnnotateRequest::text_detection(&image, &self.language_hint);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.transport.annotate(&request).await {
                Ok(response) => return Ok(extract_text(&response)),
                Err(e) if e.is_retryable() => {
                    log::warn!(
                        "API request failed (attempt {}/{}): {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    if attempt >= max_attempts {
                        return Err(OcrError::RetriesExhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("OCR processing failed: {}", e);
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each call happened.
    pub(crate) struct ScriptedTransport {
        script: Mutex<Vec<Result<AnnotateResponse, TransportError>>>,
        pub calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(mut script: Vec<Result<AnnotateResponse, TransportError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VisionTransport for ScriptedTransport {
        async fn annotate(&self, _request: &AnnotateRequest) -> Result<AnnotateResponse, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
        }
    }

    pub(crate) fn text_response(text: &str) -> AnnotateResponse {
        serde_json::from_value(serde_json::json!({
            "responses": [{ "textAnnotations": [{ "description": text }, { "description": "ignored" }] }]
        }))
        .unwrap()
    }

    fn image_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let img = image::RgbImage::from_pixel(32, 16, image::Rgb([255, 255, 255]));
        img.save(&path).unwrap();
        (dir, path)
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(collapse_whitespace("Hello   \n World"), "Hello World");
        assert_eq!(collapse_whitespace("  \t\n "), "");
    }

    #[test]
    fn extracts_first_annotation_only() {
        assert_eq!(
            extract_text(&text_response("Line one\nLine  two")),
            Some("Line one Line two".to_string())
        );
    }

    #[test]
    fn missing_or_empty_annotations_are_absent() {
        let empty: AnnotateResponse = serde_json::from_str(r#"{"responses":[{}]}"#).unwrap();
        assert_eq!(extract_text(&empty), None);
        let none: AnnotateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(extract_text(&none), None);
        assert_eq!(extract_text(&text_response("   ")), None);
    }

    #[test]
    fn request_matches_the_api_shape() {
        let body = serde_json::to_value(AnnotateRequest::text_detection(b"abc", "en")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "requests": [{
                    "image": { "content": "YWJj" },
                    "features": [{ "type": "TEXT_DETECTION", "maxResults": 1 }],
                    "imageContext": { "languageHints": ["en"] }
                }]
            })
        );
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(50), MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_retry_with_linear_delay_then_give_up() {
        let (_dir, path) = image_file();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Network("connection refused".into())),
            Err(TransportError::Network("connection refused".into())),
            Err(TransportError::Network("connection refused".into())),
            Ok(text_response("never reached")),
        ]));
        let client = OcrClient::new(transport.clone(), "en");

        let result = client.recognize(&path).await;
        assert!(matches!(
            result,
            Err(OcrError::RetriesExhausted { attempts: 3, .. })
        ));

        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), MAX_RETRIES as usize);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_transient_failure() {
        let (_dir, path) = image_file();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Status {
                status: 503,
                body: "busy".into(),
            }),
            Ok(text_response("Hello   \n World")),
        ]));
        let client = OcrClient::new(transport.clone(), "en");

        assert_eq!(
            client.recognize(&path).await.unwrap(),
            Some("Hello World".to_string())
        );
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_response_is_absent_without_retry() {
        let (_dir, path) = image_file();
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Malformed(
            "expected value".into(),
        ))]));
        let client = OcrClient::new(transport.clone(), "en");

        assert_eq!(client.recognize(&path).await.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (_dir, path) = image_file();
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 403,
            body: "API key not valid".into(),
        })]));
        let client = OcrClient::new(transport.clone(), "en");

        assert_eq!(client.recognize(&path).await.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_retryable_statuses() {
        let status = |status| TransportError::Status {
            status,
            body: String::new(),
        };
        for code in [429, 500, 502, 503] {
            assert!(status(code).is_retryable(), "{code}");
        }
        for code in [400, 401, 403, 404] {
            assert!(!status(code).is_retryable(), "{code}");
        }
        assert!(TransportError::Network("reset".into()).is_retryable());
    }

    #[tokio::test]
    async fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = OcrClient::new(transport.clone(), "en");

        let result = client.recognize(&dir.path().join("missing.png")).await;
        assert!(matches!(result, Err(OcrError::Read { .. })));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn http_transport_posts_key_and_parses_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/images:annotate")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "secret".into()))
            .match_body(mockito::Matcher::Regex(
                r#""features":\[\{"type":"TEXT_DETECTION","maxResults":1\}\]"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"responses":[{"textAnnotations":[{"description":"Hello   \n World"}]}]}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(
            format!("{}/v1/images:annotate", server.url()),
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        let response = transport
            .annotate(&AnnotateRequest::text_detection(b"img", "en"))
            .await
            .unwrap();

        assert_eq!(extract_text(&response), Some("Hello World".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_transport_classifies_failures() {
        let mut server = mockito::Server::new_async().await;
        let _unavailable = server
            .mock("POST", "/unavailable")
            .with_status(503)
            .with_body("try later")
            .create_async()
            .await;
        let _garbage = server
            .mock("POST", "/garbage")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let request = AnnotateRequest::text_detection(b"img", "en");
        let unavailable =
            HttpTransport::new(format!("{}/unavailable", server.url()), "k", Duration::from_secs(5)).unwrap();
        let err = unavailable.annotate(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
        assert!(err.is_retryable());

        let garbage =
            HttpTransport::new(format!("{}/garbage", server.url()), "k", Duration::from_secs(5)).unwrap();
        let err = garbage.annotate(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            HttpTransport::new(format!("http://{}/annotate", addr), "k", Duration::from_secs(5)).unwrap();
        let err = transport
            .annotate(&AnnotateRequest::text_detection(b"img", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(err.is_retryable());
    }
}
