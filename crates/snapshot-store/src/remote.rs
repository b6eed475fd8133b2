//! Remote object-storage backend
//!
//! Talks plain HTTP to an object store that maps `<endpoint>/<bucket>/<key>`
//! onto objects: `HEAD` probes, `GET` downloads, `PUT` uploads. S3-compatible
//! gateways, MinIO with anonymous/bearer access and simple artifact servers
//! all fit this shape.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage_traits::{sha256_file, CommitId, SnapshotStore, StorageResult};

/// Remote backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Object storage base URL
    pub endpoint: String,
    /// Bucket holding one object per commit
    pub bucket: String,
    /// Bearer token (optional for public buckets)
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl RemoteConfig {
    /// Create config for a specific endpoint and bucket
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        RemoteConfig {
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            token: None,
        }
    }

    /// Read `DELTABUILD_REMOTE_URL`, `DELTABUILD_BUCKET` and `DELTABUILD_TOKEN`.
    pub fn from_env() -> Self {
        RemoteConfig {
            endpoint: std::env::var("DELTABUILD_REMOTE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            bucket: std::env::var("DELTABUILD_BUCKET")
                .unwrap_or_else(|_| "deltabuild-snapshots".to_string()),
            token: std::env::var("DELTABUILD_TOKEN").ok(),
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// URL of the object stored under `key`.
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket.trim_matches('/'),
            key
        )
    }
}

/// Snapshot store backed by remote object storage.
pub struct RemoteSnapshotStore {
    config: RemoteConfig,
    http_client: reqwest::Client,
}

impl RemoteSnapshotStore {
    pub fn new(config: RemoteConfig) -> StorageResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("deltabuild-snapshot-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(RemoteSnapshotStore {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn checksum_key(key: &str) -> String {
        format!("{key}.sha256")
    }

    /// GET `url`; `None` on 404.
    async fn get(&self, url: &str, commit: &CommitId) -> StorageResult<Option<Response>> {
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| StorageError::remote("fetch", commit.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StorageError::remote(
                "fetch",
                commit.as_str(),
                format!("GET {url} returned HTTP {status}"),
            ));
        }
        Ok(Some(response))
    }

    async fn put(&self, url: &str, commit: &CommitId, request: RequestBuilder) -> StorageResult<()> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::remote("store", commit.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::remote(
                "store",
                commit.as_str(),
                format!("PUT {url} returned HTTP {status}"),
            ));
        }
        Ok(())
    }

    /// DELETE `url`; an absent object counts as deleted.
    async fn delete(&self, url: &str, commit: &CommitId) -> StorageResult<()> {
        let response = self
            .request(Method::DELETE, url)
            .send()
            .await
            .map_err(|e| StorageError::remote("store", commit.as_str(), e))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(StorageError::remote(
                "store",
                commit.as_str(),
                format!("DELETE {url} returned HTTP {status}"),
            ));
        }
        Ok(())
    }

    /// Stream `response` into `dest`, returning the byte count and checksum.
    async fn download(
        response: &mut Response,
        dest: &Path,
        commit: &CommitId,
    ) -> StorageResult<(u64, String)> {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::io("fetch", commit.as_str(), e))?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::remote("fetch", commit.as_str(), e))?
        {
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io("fetch", commit.as_str(), e))?;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::io("fetch", commit.as_str(), e))?;

        Ok((bytes, hex::encode(hasher.finalize())))
    }
}

/// Interpret the status of an existence probe.
pub(crate) fn classify_probe(status: StatusCode) -> Result<bool, String> {
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else {
        Err(format!("unexpected HTTP {status}"))
    }
}

#[async_trait]
impl SnapshotStore for RemoteSnapshotStore {
    fn describe(&self) -> String {
        format!("remote:{}/{}", self.config.endpoint, self.config.bucket)
    }

    async fn contains(&self, id: &CommitId) -> StorageResult<bool> {
        let url = self.config.object_url(id.storage_key()?);
        let response = self
            .request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|e| StorageError::remote("probe", id.as_str(), e))?;

        classify_probe(response.status()).map_err(|detail| {
            StorageError::remote("probe", id.as_str(), format!("HEAD {url}: {detail}"))
        })
    }

    async fn fetch(&self, id: &CommitId, dest: &Path) -> StorageResult<()> {
        let key = id.storage_key()?;
        let url = self.config.object_url(key);

        let mut response = self
            .get(&url, id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                commit: id.to_string(),
            })?;

        let checksum_url = self.config.object_url(&Self::checksum_key(key));
        let expected = match self.get(&checksum_url, id).await? {
            Some(sidecar) => {
                let text = sidecar
                    .text()
                    .await
                    .map_err(|e| StorageError::remote("fetch", id.as_str(), e))?;
                Some(text.trim().to_string())
            }
            None => None,
        };

        let (bytes, actual) = Self::download(&mut response, dest, id).await?;
        match expected {
            Some(expected) if expected != actual => {
                tokio::fs::remove_file(dest).await.ok();
                return Err(StorageError::Corrupt {
                    commit: id.to_string(),
                    expected,
                    actual,
                });
            }
            Some(_) => {}
            None => {
                warn!(commit = %id, "remote snapshot has no checksum object, skipping verification");
            }
        }

        debug!(commit = %id, bytes, url = %url, "fetched remote snapshot");
        Ok(())
    }

    async fn store(&self, id: &CommitId, blob: &Path) -> StorageResult<()> {
        let key = id.storage_key()?;
        let source = blob.to_path_buf();
        let checksum = tokio::task::spawn_blocking(move || sha256_file(&source))
            .await
            .map_err(|e| StorageError::io("store", id.as_str(), std::io::Error::other(e)))?
            .map_err(|e| StorageError::io("store", id.as_str(), e))?;

        let file = tokio::fs::File::open(blob)
            .await
            .map_err(|e| StorageError::io("store", id.as_str(), e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| StorageError::io("store", id.as_str(), e))?
            .len();

        let url = self.config.object_url(key);
        let checksum_url = self.config.object_url(&Self::checksum_key(key));

        // Drop the old checksum first so a failed upload never leaves the new
        // blob paired with the previous blob's checksum.
        self.delete(&checksum_url, id).await?;

        let upload = self
            .request(Method::PUT, &url)
            .header(CONTENT_LENGTH, len)
            .body(Body::from(file));
        self.put(&url, id, upload).await?;

        let sidecar = self
            .request(Method::PUT, &checksum_url)
            .body(checksum.into_bytes());
        self.put(&checksum_url, id, sidecar).await?;

        debug!(commit = %id, bytes = len, url = %url, "stored remote snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_is_bucket_slash_commit() {
        let config = RemoteConfig::new("https://store.example.com/", "builds");
        assert_eq!(
            config.object_url("abc123"),
            "https://store.example.com/builds/abc123"
        );
    }

    #[test]
    fn test_remote_config_with_token() {
        let config = RemoteConfig::new("http://localhost:9000", "b").with_token("secret");
        assert_eq!(config.token, Some("secret".to_string()));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = RemoteConfig::new("http://localhost:9000", "b").with_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_classify_probe() {
        assert_eq!(classify_probe(StatusCode::OK), Ok(true));
        assert_eq!(classify_probe(StatusCode::NOT_FOUND), Ok(false));
        assert!(classify_probe(StatusCode::FORBIDDEN).is_err());
        assert!(classify_probe(StatusCode::SERVICE_UNAVAILABLE).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_remote_error() {
        // Port 9 (discard) on localhost is not an HTTP server.
        let store =
            RemoteSnapshotStore::new(RemoteConfig::new("http://127.0.0.1:9", "b")).unwrap();
        let err = store.contains(&CommitId::new("c1")).await.unwrap_err();
        assert!(matches!(err, StorageError::Remote { operation: "probe", .. }));
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_without_request() {
        let store =
            RemoteSnapshotStore::new(RemoteConfig::new("http://127.0.0.1:9", "b")).unwrap();
        let err = store.contains(&CommitId::new("a/b")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId { .. }));
    }
}
