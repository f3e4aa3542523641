//! HTTP implementation of [`RemoteClient`] for a Drive-v3 style REST API.
//!
//! Requests go through a blocking `ureq` agent on the blocking thread pool.
//! Metadata lookups for many ids are sent as `multipart/mixed` batches of at
//! most `batch_limit` items each.
//!
//! ```ignore
//! use std::sync::Arc;
//! use canvas_transport::{HttpRemoteClient, RemoteClient, StaticToken, DEFAULT_FILE_FIELDS};
//!
//! let client = HttpRemoteClient::new("https://www.googleapis.com", Arc::new(StaticToken::new(token)));
//! let files = client.batch_get(&ids, DEFAULT_FILE_FIELDS).await?;
//! ```

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use canvas_types::{env_var_or, MetadataPatch, NewFile};
use serde::Deserialize;
use tracing::debug;

use crate::auth::{AuthorizedAgent, TokenProvider};
use crate::client::{BatchResults, DownloadedMedia, RemoteClient, RemoteFile};
use crate::error::RemoteError;
use crate::multipart::{
    content_type, decode_batch_response, encode_batch_get, encode_related_upload, new_boundary,
};

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com";
/// Default maximum number of items per batch request.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

const FILES_PATH: &str = "/drive/v3/files";
const UPLOAD_PATH: &str = "/upload/drive/v3/files";
const BATCH_PATH: &str = "/batch/drive/v3";
const LIST_PAGE_SIZE: &str = "1000";

/// HTTP client for the remote file API.
#[derive(Clone)]
pub struct HttpRemoteClient {
    endpoint: String,
    agent: ureq::Agent,
    tokens: Arc<dyn TokenProvider>,
    batch_limit: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

impl HttpRemoteClient {
    /// Default request timeout in seconds (overridable by env).
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default connect timeout in seconds (overridable by env).
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn default_timeouts() -> (Duration, Duration) {
        let timeout_secs = env_var_or("CANVAS_HTTP_TIMEOUT_SECS", Self::DEFAULT_TIMEOUT_SECS);
        let connect_secs = env_var_or(
            "CANVAS_HTTP_CONNECT_TIMEOUT_SECS",
            Self::DEFAULT_CONNECT_TIMEOUT_SECS,
        );
        (
            Duration::from_secs(timeout_secs),
            Duration::from_secs(connect_secs),
        )
    }

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// Create a client with default timeouts.
    pub fn new(endpoint: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        let (timeout, connect_timeout) = Self::default_timeouts();
        Self::with_timeouts(endpoint, tokens, timeout, connect_timeout)
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(
        endpoint: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent: Self::build_agent(timeout, connect_timeout),
            tokens,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Cap the number of items per batch request (minimum 1).
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Bind the agent to fresh credentials for one operation.
    pub fn with_auth(&self) -> Result<AuthorizedAgent<'_>, RemoteError> {
        AuthorizedAgent::new(&self.agent, &self.tokens)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}{}/{}", self.endpoint, FILES_PATH, urlencoding::encode(id))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(HttpRemoteClient) -> Result<T, RemoteError> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || f(client))
            .await
            .map_err(|e| RemoteError::Transport(format!("blocking request task failed: {}", e)))?
    }

    fn get_blocking(&self, id: &str, fields: &str) -> Result<RemoteFile, RemoteError> {
        let authed = self.with_auth()?;
        let response = classify(
            id,
            authed
                .request("GET", &self.file_url(id))
                .query("fields", fields)
                .query("supportsAllDrives", "true")
                .call(),
        )?;
        decode_json(response)
    }

    fn batch_get_blocking(&self, ids: &[String], fields: &str) -> Result<BatchResults, RemoteError> {
        let authed = self.with_auth()?;
        let url = format!("{}{}", self.endpoint, BATCH_PATH);
        let mut results = BatchResults::new();
        for chunk in ids.chunks(self.batch_limit) {
            let boundary = new_boundary("batch");
            let body = encode_batch_get(FILES_PATH, chunk, fields, &boundary);
            debug!(items = chunk.len(), "sending metadata batch");
            let response = classify(
                "batch",
                authed
                    .request("POST", &url)
                    .set("Content-Type", &content_type("mixed", &boundary))
                    .send_string(&body),
            )?;
            let response_type = response.header("Content-Type").unwrap_or_default().to_string();
            let text = response
                .into_string()
                .map_err(|e| RemoteError::Decode(format!("batch body: {}", e)))?;
            results.extend(decode_batch_response(&response_type, &text, chunk)?);
        }
        Ok(results)
    }

    fn list_blocking(
        &self,
        query: &str,
        fields: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        let authed = self.with_auth()?;
        let url = format!("{}{}", self.endpoint, FILES_PATH);
        let list_fields = format!("nextPageToken,files({})", fields);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = authed
                .request("GET", &url)
                .query("q", query)
                .query("fields", &list_fields)
                .query("pageSize", LIST_PAGE_SIZE)
                .query("supportsAllDrives", "true");
            if let Some(order) = order_by {
                request = request.query("orderBy", order);
            }
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }
            let page: FileList = decode_json(classify("list", request.call())?)?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    fn upload_blocking(
        &self,
        method: &str,
        id: Option<&str>,
        metadata: serde_json::Value,
        content: &[u8],
    ) -> Result<RemoteFile, RemoteError> {
        let authed = self.with_auth()?;
        let url = match id {
            Some(id) => format!("{}{}/{}", self.endpoint, UPLOAD_PATH, urlencoding::encode(id)),
            None => format!("{}{}", self.endpoint, UPLOAD_PATH),
        };
        let boundary = new_boundary("upload");
        let body = encode_related_upload(&metadata, content, &boundary);
        let response = classify(
            id.unwrap_or("upload"),
            authed
                .request(method, &url)
                .query("uploadType", "multipart")
                .query("fields", crate::client::DEFAULT_FILE_FIELDS)
                .query("supportsAllDrives", "true")
                .set("Content-Type", &content_type("related", &boundary))
                .send_bytes(&body),
        )?;
        decode_json(response)
    }

    fn create_blocking(&self, new: &NewFile, content: Option<&[u8]>) -> Result<RemoteFile, RemoteError> {
        let metadata =
            serde_json::to_value(new).map_err(|e| RemoteError::Decode(e.to_string()))?;
        if let Some(content) = content {
            return self.upload_blocking("POST", None, metadata, content);
        }
        let authed = self.with_auth()?;
        let response = classify(
            "create",
            authed
                .request("POST", &format!("{}{}", self.endpoint, FILES_PATH))
                .query("fields", crate::client::DEFAULT_FILE_FIELDS)
                .query("supportsAllDrives", "true")
                .send_json(metadata),
        )?;
        decode_json(response)
    }

    fn update_metadata_blocking(&self, id: &str, patch: &MetadataPatch) -> Result<RemoteFile, RemoteError> {
        let authed = self.with_auth()?;
        let response = classify(
            id,
            authed
                .request("PATCH", &self.file_url(id))
                .query("fields", crate::client::DEFAULT_FILE_FIELDS)
                .query("supportsAllDrives", "true")
                .send_json(patch),
        )?;
        decode_json(response)
    }

    fn download_blocking(&self, id: &str) -> Result<DownloadedMedia, RemoteError> {
        let authed = self.with_auth()?;
        let response = classify(
            id,
            authed
                .request("GET", &self.file_url(id))
                .query("alt", "media")
                .query("supportsAllDrives", "true")
                .call(),
        )?;
        let checksum = response.header("X-Goog-Hash").and_then(md5_from_hash_header);
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| RemoteError::Transport(format!("failed to read media body: {}", e)))?;
        Ok(DownloadedMedia { bytes, checksum })
    }

    fn delete_blocking(&self, id: &str, restore: bool) -> Result<(), RemoteError> {
        let authed = self.with_auth()?;
        classify(
            id,
            authed
                .request("PATCH", &self.file_url(id))
                .query("fields", "id,trashed")
                .query("supportsAllDrives", "true")
                .send_json(serde_json::json!({ "trashed": !restore })),
        )?;
        Ok(())
    }
}

/// Map a `ureq` outcome onto [`RemoteError`] for resource `id`.
fn classify(id: &str, result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, RemoteError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(RemoteError::from_status(id, status, &body))
        }
        Err(ureq::Error::Transport(transport)) => Err(RemoteError::Transport(transport.to_string())),
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, RemoteError> {
    response
        .into_json::<T>()
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Extract the MD5 digest from an `X-Goog-Hash` header as lowercase hex.
///
/// `crc32c=n03x6A==,md5=1B2M2Y8AsgTpgAmY7PhCfg==` -> `d41d8cd98f00b204e9800998ecf8427e`
pub fn md5_from_hash_header(value: &str) -> Option<String> {
    value
        .split(',')
        .map(str::trim)
        .find_map(|entry| entry.strip_prefix("md5="))
        .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
        .map(hex::encode)
}

#[async_trait::async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get(&self, id: &str, fields: &str) -> Result<RemoteFile, RemoteError> {
        let (id, fields) = (id.to_string(), fields.to_string());
        self.blocking(move |c| c.get_blocking(&id, &fields)).await
    }

    async fn batch_get(&self, ids: &[String], fields: &str) -> Result<BatchResults, RemoteError> {
        if ids.is_empty() {
            return Ok(BatchResults::new());
        }
        let (ids, fields) = (ids.to_vec(), fields.to_string());
        self.blocking(move |c| c.batch_get_blocking(&ids, &fields)).await
    }

    async fn list(
        &self,
        query: &str,
        fields: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        let (query, fields) = (query.to_string(), fields.to_string());
        let order_by = order_by.map(str::to_string);
        self.blocking(move |c| c.list_blocking(&query, &fields, order_by.as_deref()))
            .await
    }

    async fn create(
        &self,
        metadata: &NewFile,
        content: Option<&[u8]>,
    ) -> Result<RemoteFile, RemoteError> {
        let metadata = metadata.clone();
        let content = content.map(<[u8]>::to_vec);
        self.blocking(move |c| c.create_blocking(&metadata, content.as_deref()))
            .await
    }

    async fn update_metadata(
        &self,
        id: &str,
        patch: &MetadataPatch,
    ) -> Result<RemoteFile, RemoteError> {
        let (id, patch) = (id.to_string(), patch.clone());
        self.blocking(move |c| c.update_metadata_blocking(&id, &patch))
            .await
    }

    async fn update_media(
        &self,
        id: &str,
        bytes: &[u8],
        metadata: Option<&MetadataPatch>,
    ) -> Result<RemoteFile, RemoteError> {
        let id = id.to_string();
        let bytes = bytes.to_vec();
        let metadata = serde_json::to_value(metadata.cloned().unwrap_or_default())
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.blocking(move |c| c.upload_blocking("PATCH", Some(&id), metadata, &bytes))
            .await
    }

    async fn download_media(&self, id: &str) -> Result<DownloadedMedia, RemoteError> {
        let id = id.to_string();
        self.blocking(move |c| c.download_blocking(&id)).await
    }

    async fn delete(&self, id: &str, restore: bool) -> Result<(), RemoteError> {
        let id = id.to_string();
        self.blocking(move |c| c.delete_blocking(&id, restore)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn test_md5_from_hash_header() {
        let md5 = md5_from_hash_header("crc32c=n03x6A==, md5=1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(md5.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(md5_from_hash_header("crc32c=n03x6A=="), None);
        assert_eq!(md5_from_hash_header("md5=***"), None);
    }

    #[test]
    fn test_client_configuration() {
        let client = HttpRemoteClient::new(
            "https://example.test/",
            Arc::new(StaticToken::new("t")),
        )
        .with_batch_limit(0);
        assert_eq!(client.endpoint(), "https://example.test");
        assert_eq!(client.batch_limit(), 1);
        assert_eq!(
            client.file_url("a/b"),
            "https://example.test/drive/v3/files/a%2Fb"
        );
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let client = HttpRemoteClient::new("http://127.0.0.1:9", Arc::new(StaticToken::new("t")));
        let results = client.batch_get(&[], "id").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_network() {
        let client = HttpRemoteClient::new("http://127.0.0.1:9", Arc::new(StaticToken::new("")));
        let err = client.get("x", "id").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
    }
}
