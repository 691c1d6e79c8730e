//! Durable object storage: the capability contract plus an S3-compatible
//! HTTP implementation.
//!
//! The pipeline never reaches into ambient global state for a storage
//! client — the trait is passed explicitly (constructor injection), which
//! also makes every storage-touching path trivially testable with an
//! in-memory fake.
//!
//! Error classification matters more than the transport here: connect
//! failures, timeouts, and 5xx responses are *transient* (the ingestion
//! task retries them with backoff), while 4xx responses are permanent.

use crate::error::QuizError;
use async_trait::async_trait;
use tracing::{debug, info};

/// Abstract object-storage capability consumed by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`; returns the publicly resolvable location
    /// URI on success.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, QuizError>;

    /// Size in bytes of the object at `key`, without downloading it.
    async fn head_object(&self, key: &str) -> Result<u64, QuizError>;

    /// Download the object at `key`.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, QuizError>;

    /// Pre-authorised URL a client can PUT the object to directly,
    /// upstream of this pipeline.
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String, QuizError>;
}

/// Object store over an S3-compatible HTTP endpoint.
///
/// Talks plain `PUT/HEAD/GET {endpoint}/{bucket}/{key}` with bearer
/// authentication, which covers S3 gateways and most self-hosted
/// compatibles. Public reads resolve against `public_base_url` so the
/// returned location URI works without credentials.
pub struct S3CompatibleStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_base_url: String,
    api_token: String,
}

impl S3CompatibleStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, QuizError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| QuizError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: trim_slash(endpoint.into()),
            bucket: bucket.into(),
            public_base_url: trim_slash(public_base_url.into()),
            api_token: api_token.into(),
        })
    }

    /// Construct from `STORAGE_ENDPOINT`, `STORAGE_BUCKET`,
    /// `STORAGE_PUBLIC_URL`, and `STORAGE_API_TOKEN`.
    pub fn from_env() -> Result<Self, QuizError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| QuizError::InvalidConfig(format!("{name} is not set")))
        };
        Self::new(
            var("STORAGE_ENDPOINT")?,
            var("STORAGE_BUCKET")?,
            var("STORAGE_PUBLIC_URL")?,
            var("STORAGE_API_TOKEN")?,
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Map a reqwest failure to transient vs permanent.
    fn classify(&self, key: &str, e: reqwest::Error) -> QuizError {
        if e.is_timeout() || e.is_connect() {
            QuizError::TransientStorage {
                key: key.to_string(),
                detail: e.to_string(),
            }
        } else {
            QuizError::Internal(format!("storage request for '{key}': {e}"))
        }
    }

    fn classify_status(&self, key: &str, status: reqwest::StatusCode) -> QuizError {
        if status.is_server_error() {
            QuizError::TransientStorage {
                key: key.to_string(),
                detail: format!("HTTP {status}"),
            }
        } else {
            QuizError::Internal(format!("storage request for '{key}': HTTP {status}"))
        }
    }
}

#[async_trait]
impl ObjectStore for S3CompatibleStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, QuizError> {
        info!("Uploading {} bytes to '{}'", bytes.len(), key);

        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| QuizError::Upload {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(QuizError::Upload {
                detail: format!("HTTP {}", response.status()),
            });
        }

        let location = self.public_url(key);
        info!("Uploaded to {}", location);
        Ok(location)
    }

    async fn head_object(&self, key: &str) -> Result<u64, QuizError> {
        let response = self
            .client
            .head(self.object_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| self.classify(key, e))?;

        if !response.status().is_success() {
            return Err(self.classify_status(key, response.status()));
        }

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| QuizError::TransientStorage {
                key: key.to_string(),
                detail: "missing Content-Length on HEAD response".into(),
            })?;

        debug!("HEAD '{}': {} bytes", key, size);
        Ok(size)
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, QuizError> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| self.classify(key, e))?;

        if !response.status().is_success() {
            return Err(self.classify_status(key, response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(key, e))?;
        debug!("GET '{}': {} bytes", key, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String, QuizError> {
        // The gateway issues short-lived upload URLs on request.
        #[derive(serde::Deserialize)]
        struct Presigned {
            url: String,
        }

        let response = self
            .client
            .post(format!("{}/{}/presign", self.endpoint, self.bucket))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "key": key, "content_type": content_type }))
            .send()
            .await
            .map_err(|e| self.classify(key, e))?;

        if !response.status().is_success() {
            return Err(self.classify_status(key, response.status()));
        }

        let presigned: Presigned = response
            .json()
            .await
            .map_err(|e| QuizError::Internal(format!("presign response: {e}")))?;
        Ok(presigned.url)
    }
}

fn trim_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}
