//! [`BlobStorage`] over plain HTTP: one streaming `PUT` per file.
//!
//! The body is fed to `reqwest` chunk by chunk and progress is reported as
//! each chunk is handed to the connection. The public URL comes from the
//! response when the server returns JSON with a `url` field, otherwise it is
//! built from the configured public base, otherwise it is the PUT URL.

use crate::ports::{BlobStorage, PortError, PortResult, TransferProgress};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub struct HttpBlobStorage {
    client: reqwest::Client,
    endpoint: Url,
    public_base: Option<Url>,
}

impl HttpBlobStorage {
    /// `endpoint` is the base URL objects are PUT under.
    pub fn new(endpoint: &str, public_base: Option<&str>, timeout: Duration) -> PortResult<Self> {
        let parse = |s: &str| {
            Url::parse(s).map_err(|e| PortError::Unexpected(format!("invalid URL '{s}': {e}")))
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: parse(endpoint)?,
            public_base: public_base.map(parse).transpose()?,
        })
    }

    /// Target URL of the PUT for `path`.
    pub fn object_url(&self, path: &str) -> PortResult<Url> {
        join_path(&self.endpoint, path)
    }

    fn public_url(&self, path: &str, put_url: &Url, body: &str) -> PortResult<String> {
        if let Ok(resp) = serde_json::from_str::<UploadResponse>(body) {
            return Ok(resp.url);
        }
        match &self.public_base {
            Some(base) => Ok(join_path(base, path)?.to_string()),
            None => Ok(put_url.to_string()),
        }
    }
}

/// Append the `/`-separated segments of `path` to `base`, percent-encoding each.
fn join_path(base: &Url, path: &str) -> PortResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PortError::Unexpected(format!("'{base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    async fn upload(
        &self,
        bytes: Bytes,
        path: &str,
        on_progress: TransferProgress,
    ) -> PortResult<String> {
        let url = self.object_url(path)?;
        let total = bytes.len() as u64;

        let chunks: Vec<Bytes> = (0..bytes.len())
            .step_by(CHUNK_SIZE)
            .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
            .collect();
        let sent = Arc::new(AtomicU64::new(0));
        let progress = Arc::clone(&on_progress);
        let body = stream::iter(chunks).map(move |chunk| {
            let done = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
            if total > 0 {
                progress((done * 100 / total) as u8);
            }
            Ok::<_, std::io::Error>(chunk)
        });

        debug!("PUT {} ({} bytes)", url, total);
        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PortError::Unavailable(format!("upload of {path} timed out"))
                } else {
                    PortError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Unavailable(format!("HTTP {status} for {url}")));
        }
        let text = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        on_progress(100);
        let public = self.public_url(path, &url, &text)?;
        info!("Stored {} at {}", path, public);
        Ok(public)
    }
}
