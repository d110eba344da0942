// Client for the local Ollama-compatible inference service
//
// Two operations: list installed models (/api/tags) and generate a single
// non-streaming image description (/api/generate).

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::core::config::OllamaConfig;
use crate::core::errors::{CatalogError, CatalogResult, GenerateError, GenerateResult};
use crate::core::types::{DescribeOutput, ModelInfo, MAX_DESCRIPTION_LEN};

/// HTTP client for the inference service.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        // No overall request deadline: the generate call is bounded only by
        // whatever the service itself enforces
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            prompt: config.prompt.clone(),
        })
    }

    /// List the models installed on the inference service.
    ///
    /// An empty list is a successful result; only an unreachable service is
    /// an error.
    #[instrument(skip(self))]
    pub async fn list_models(&self) -> CatalogResult<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| CatalogError::ServiceUnavailable {
                url: self.base_url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::InvalidResponse(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        Ok(tags.models)
    }

    /// Pick a default model from a catalog listing: prefer a llava variant,
    /// fall back to the first installed model.
    pub fn default_model(models: &[ModelInfo]) -> Option<&str> {
        models
            .iter()
            .find(|m| m.name.contains("llava"))
            .or_else(|| models.first())
            .map(|m| m.name.as_str())
    }

    /// Generate a description for the image at `path` using `model`.
    ///
    /// The file must exist and be both readable and writable — write access
    /// is required later by the metadata writer, so a missing permission is
    /// reported here instead of after an expensive inference call. The
    /// in-flight request is aborted when `cancel` fires.
    #[instrument(skip(self, cancel), fields(path = %path.display()))]
    pub async fn generate_description(
        &self,
        path: &Path,
        model: &str,
        cancel: &CancellationToken,
    ) -> GenerateResult<DescribeOutput> {
        check_read_write_access(path).await?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GenerateError::InferenceFailed(format!("failed to read image: {e}")))?;
        let encoded = general_purpose::STANDARD.encode(&bytes);

        info!("sending {} KiB to inference service", bytes.len() / 1024);

        let request = GenerateRequest {
            model,
            prompt: &self.prompt,
            images: vec![encoded],
            stream: false,
        };
        let url = format!("{}/api/generate", self.base_url);

        let call = async {
            let response = self
                .http
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| GenerateError::InferenceFailed(format!("request error: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_generate_failure(model, status, &body));
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| GenerateError::InferenceFailed(format!("malformed response: {e}")))?;
            Ok(parsed.response)
        };

        let raw = tokio::select! {
            _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
            result = call => result?,
        };

        let output = DescribeOutput::from_raw(raw);
        if output.description.truncated {
            warn!(
                "description truncated from {} to {} chars",
                output.raw.chars().count(),
                MAX_DESCRIPTION_LEN
            );
        }
        Ok(output)
    }
}

/// Validate existence plus read and write permission on `path`.
async fn check_read_write_access(path: &Path) -> GenerateResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(GenerateError::FileNotFound(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(GenerateError::FileNotFound(path.to_path_buf()))
        }
        Err(_) => return Err(GenerateError::FileAccessDenied(path.to_path_buf())),
    }

    match tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(GenerateError::FileNotFound(path.to_path_buf()))
        }
        Err(_) => Err(GenerateError::FileAccessDenied(path.to_path_buf())),
    }
}

/// Map a non-success generate response onto a pipeline error.
///
/// The service reports unknown or unloadable models in the error body
/// ("model 'x' not found"); anything else is a generic inference failure.
fn classify_generate_failure(
    model: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> GenerateError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.to_string()
            }
        });

    if detail.to_lowercase().contains("model") {
        GenerateError::ModelError {
            model: model.to_string(),
            detail,
        }
    } else {
        GenerateError::InferenceFailed(format!("HTTP {}: {}", status.as_u16(), detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json, Router};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config(base_url: &str) -> OllamaConfig {
        OllamaConfig {
            base_url: base_url.to_string(),
            prompt: "Describe this image in detail.".to_string(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_default_model_prefers_llava() {
        let models = vec![
            ModelInfo {
                name: "qwen2.5vl:7b".into(),
                size: None,
                modified_at: None,
            },
            ModelInfo {
                name: "llava:13b".into(),
                size: None,
                modified_at: None,
            },
        ];
        assert_eq!(OllamaClient::default_model(&models), Some("llava:13b"));
    }

    #[test]
    fn test_default_model_falls_back_to_first() {
        let models = vec![ModelInfo {
            name: "qwen2.5vl:7b".into(),
            size: None,
            modified_at: None,
        }];
        assert_eq!(OllamaClient::default_model(&models), Some("qwen2.5vl:7b"));
        assert_eq!(OllamaClient::default_model(&[]), None);
    }

    #[test]
    fn test_classify_unknown_model() {
        let err = classify_generate_failure(
            "llava:99b",
            reqwest::StatusCode::NOT_FOUND,
            r#"{"error":"model 'llava:99b' not found"}"#,
        );
        assert!(matches!(err, GenerateError::ModelError { .. }));
        assert_eq!(err.kind(), "MODEL_ERROR");
    }

    #[test]
    fn test_classify_generic_failure() {
        let err = classify_generate_failure(
            "llava",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"out of memory"}"#,
        );
        assert!(matches!(err, GenerateError::InferenceFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_file_short_circuits_before_any_request() {
        // Port 1 refuses connections; reaching the network would surface
        // InferenceFailed, so FileNotFound proves the early return
        let client = OllamaClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        let cancel = CancellationToken::new();
        let err = client
            .generate_description(Path::new("/no/such/image.jpg"), "llava", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_file_is_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locked.jpg");
        std::fs::write(&file, b"stub").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o444)).unwrap();

        let client = OllamaClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        let cancel = CancellationToken::new();
        let err = client
            .generate_description(&file, "llava", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::FileAccessDenied(_)));
    }

    #[tokio::test]
    async fn test_list_models_unreachable_service() {
        let client = OllamaClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, CatalogError::ServiceUnavailable { .. }));
        assert_eq!(err.kind(), "INFERENCE_SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_list_models_empty_catalog_is_ok() {
        let router = Router::new().route(
            "/api/tags",
            get(|| async { Json(serde_json::json!({ "models": [] })) }),
        );
        let base = spawn_mock(router).await;

        let client = OllamaClient::new(&test_config(&base)).unwrap();
        let models = client.list_models().await.unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn test_generate_sends_non_streaming_request() {
        let seen: Arc<parking_lot::Mutex<Option<serde_json::Value>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let seen_handler = Arc::clone(&seen);

        let router = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<serde_json::Value>| {
                *seen_handler.lock() = Some(body);
                async { Json(serde_json::json!({ "response": "a red bicycle" })) }
            }),
        );
        let base = spawn_mock(router).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bike.jpg");
        std::fs::write(&file, b"not really a jpeg").unwrap();

        let client = OllamaClient::new(&test_config(&base)).unwrap();
        let cancel = CancellationToken::new();
        let out = client
            .generate_description(&file, "llava:13b", &cancel)
            .await
            .unwrap();

        assert_eq!(out.description.text, "a red bicycle");
        assert!(!out.description.truncated);

        let body = seen.lock().take().unwrap();
        assert_eq!(body["model"], "llava:13b");
        assert_eq!(body["prompt"], "Describe this image in detail.");
        assert_eq!(body["stream"], false);
        assert_eq!(body["images"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_truncates_oversized_response() {
        let long = "d".repeat(MAX_DESCRIPTION_LEN + 100);
        let router = Router::new().route(
            "/api/generate",
            post(move || {
                let long = long.clone();
                async move { Json(serde_json::json!({ "response": long })) }
            }),
        );
        let base = spawn_mock(router).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("verbose.png");
        std::fs::write(&file, b"stub").unwrap();

        let client = OllamaClient::new(&test_config(&base)).unwrap();
        let cancel = CancellationToken::new();
        let out = client
            .generate_description(&file, "llava", &cancel)
            .await
            .unwrap();

        assert!(out.description.truncated);
        assert_eq!(out.description.text.chars().count(), MAX_DESCRIPTION_LEN);
        assert_eq!(out.raw.chars().count(), MAX_DESCRIPTION_LEN + 100);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_request() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Json(serde_json::json!({ "response": "too late" }))
            }),
        );
        let base = spawn_mock(router).await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("slow.webp");
        std::fs::write(&file, b"stub").unwrap();

        let client = OllamaClient::new(&test_config(&base)).unwrap();
        let cancel = CancellationToken::new();
        let cancel_trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_trigger.cancel();
        });

        let err = client
            .generate_description(&file, "llava", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled));
    }
}
