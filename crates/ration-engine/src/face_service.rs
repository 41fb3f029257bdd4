//! # HTTP Face Service Client
//!
//! [`FaceComparator`] backed by an external embedding service. The service
//! extracts embeddings; scoring is done locally with
//! [`cosine_confidence`] so every deployment scores identically.
//!
//! ## Wire contract
//!
//! `POST {base_url}/v1/embeddings` with `{"image_base64": "..."}` answers
//! `{"face_detected": bool, "embedding": [f32, ...] | null}`.
//!
//! ## Error mapping
//!
//! | Outcome | Error |
//! |---------|-------|
//! | request timed out | [`ComparatorError::Timeout`] |
//! | connect failure, 5xx | [`ComparatorError::Unavailable`] |
//! | other 4xx, unparseable body, bad embedding | [`ComparatorError::InvalidResponse`] |
//! | `face_detected: false` | [`ComparatorError::NoFaceDetected`] |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use ration_core::{ConfigError, Confidence, FaceEmbedding, FaceSample};

use crate::comparator::{cosine_confidence, ComparatorError, FaceComparator};
use crate::BoxFuture;

/// Connection settings for the face service.
#[derive(Clone)]
pub struct FaceServiceConfig {
    /// Service root, e.g. `http://face-service:8000`.
    pub base_url: Url,
    /// Bearer token, if the service requires one.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for FaceServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceServiceConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl FaceServiceConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Settings pointing at `base_url` with the default timeout and no token.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `FACE_SERVICE_URL`, `FACE_SERVICE_TOKEN` and
    /// `FACE_SERVICE_TIMEOUT_SECS`. Returns `None` when no URL is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(raw) = lookup("FACE_SERVICE_URL").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let base_url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
            key: "FACE_SERVICE_URL",
            value: raw.clone(),
            reason: e.to_string(),
        })?;
        let timeout_secs = match lookup("FACE_SERVICE_TIMEOUT_SECS") {
            None => Self::DEFAULT_TIMEOUT_SECS,
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "FACE_SERVICE_TIMEOUT_SECS",
                        value: v,
                        reason: "expected a positive number of seconds".into(),
                    })
                }
            },
        };
        Ok(Some(Self {
            base_url,
            token: lookup("FACE_SERVICE_TOKEN").filter(|t| !t.is_empty()),
            timeout_secs,
        }))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    face_detected: bool,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Face comparator that calls an external embedding service over HTTP.
#[derive(Debug)]
pub struct HttpFaceService {
    client: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpFaceService {
    /// Build the client.
    pub fn new(config: FaceServiceConfig) -> Result<Self, ComparatorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(
                    |_| ComparatorError::Unavailable {
                        reason: "invalid token characters".into(),
                    },
                )?,
            );
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ComparatorError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let endpoint = format!(
            "{}/v1/embeddings",
            config.base_url.as_str().trim_end_matches('/')
        );
        Ok(Self {
            client,
            endpoint,
            timeout_ms: config.timeout_secs.saturating_mul(1000),
        })
    }

    async fn request_embedding(
        &self,
        sample: &FaceSample,
    ) -> Result<FaceEmbedding, ComparatorError> {
        let encoded = sample.to_base64();
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                image_base64: &encoded,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ComparatorError::Timeout {
                        elapsed_ms: self.timeout_ms,
                    }
                } else {
                    ComparatorError::Unavailable {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ComparatorError::Unavailable {
                reason: format!("HTTP {status}: {body}"),
            });
        }
        if !status.is_success() {
            return Err(ComparatorError::InvalidResponse {
                reason: format!("HTTP {status}"),
            });
        }

        let body: EmbeddingResponse =
            resp.json()
                .await
                .map_err(|e| ComparatorError::InvalidResponse {
                    reason: format!("response deserialization failed: {e}"),
                })?;
        if !body.face_detected {
            return Err(ComparatorError::NoFaceDetected);
        }
        let components = body.embedding.ok_or_else(|| ComparatorError::InvalidResponse {
            reason: "face_detected without embedding".into(),
        })?;
        FaceEmbedding::new(components).map_err(|e| ComparatorError::InvalidResponse {
            reason: e.to_string(),
        })
    }
}

impl FaceComparator for HttpFaceService {
    fn embed<'a>(
        &'a self,
        sample: &'a FaceSample,
    ) -> BoxFuture<'a, Result<FaceEmbedding, ComparatorError>> {
        Box::pin(self.request_embedding(sample))
    }

    fn compare<'a>(
        &'a self,
        reference: &'a FaceEmbedding,
        candidate: &'a FaceEmbedding,
    ) -> BoxFuture<'a, Result<Confidence, ComparatorError>> {
        Box::pin(std::future::ready(cosine_confidence(reference, candidate)))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn absent_url_means_no_service() {
        assert!(FaceServiceConfig::from_lookup(lookup(&[])).unwrap().is_none());
    }

    #[test]
    fn parses_url_token_and_timeout() {
        let cfg = FaceServiceConfig::from_lookup(lookup(&[
            ("FACE_SERVICE_URL", "http://face:8000/"),
            ("FACE_SERVICE_TOKEN", "s3cret"),
            ("FACE_SERVICE_TIMEOUT_SECS", "3"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(cfg.timeout_secs, 3);
        assert_eq!(cfg.token.as_deref(), Some("s3cret"));
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }

    #[test]
    fn rejects_bad_url_and_zero_timeout() {
        assert!(
            FaceServiceConfig::from_lookup(lookup(&[("FACE_SERVICE_URL", "not a url")])).is_err()
        );
        assert!(FaceServiceConfig::from_lookup(lookup(&[
            ("FACE_SERVICE_URL", "http://face:8000"),
            ("FACE_SERVICE_TIMEOUT_SECS", "0"),
        ]))
        .is_err());
    }
}
