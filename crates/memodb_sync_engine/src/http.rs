//! HTTP transport implementation.
//!
//! [`HttpTransport`] maps every [`SyncApi`] call onto the sync server's
//! HTTP routes. The HTTP client itself is abstracted via [`HttpClient`] so
//! any library (or an in-process server, see [`LoopbackClient`]) can carry
//! the requests.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncApi;
use async_trait::async_trait;
use memodb_core::Context;
use memodb_sync_protocol::{
    AccountKey, ApiError, AttachmentUpload, ChangelogEntryList, EncryptedChangelogEntry,
    ListChangesQuery, RegisterClientRequest, WireMessage, API_PREFIX, BLOB_PREFIX,
    FILEPATH_HEADER, USERNAME_HEADER,
};
use parking_lot::RwLock;
use std::fmt;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request. `url` is absolute, including any query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Returns the first header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the path and query part of the URL.
    pub fn path_and_query(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(i) => &self.url[i + 3..],
            None => return &self.url,
        };
        match rest.find('/') {
            Some(i) => &rest[i..],
            None => "/",
        }
    }
}

/// A response from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. A returned
/// `Err` means no response arrived at all; non-2xx statuses are `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based [`SyncApi`].
///
/// Bodies are JSON except for blobs, which travel as raw bytes.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g. `"https://sync.example.com"`).
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Account name sent with every request.
    username: String,
    /// Bearer token, when the server requires one.
    token: Option<String>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            username: username.into(),
            token: None,
            last_error: RwLock::new(None),
        }
    }

    /// Sends `token` as a bearer token with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn request(&self, method: Method, path: &str, body: Vec<u8>) -> HttpRequest {
        let mut headers = vec![(USERNAME_HEADER.to_string(), self.username.clone())];
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if !body.is_empty() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        }
    }

    async fn send(&self, ctx: &Context, request: HttpRequest) -> SyncResult<Vec<u8>> {
        if !self.client.is_healthy() {
            return Err(SyncError::transport_retryable("http client is not healthy"));
        }

        let method = request.method;
        let url = request.url.clone();
        tracing::debug!(%method, %url, "sync request");

        let response = ctx
            .run(async {
                self.client.send(request).await.map_err(|e| {
                    self.set_error(&e);
                    SyncError::transport_retryable(e)
                })
            })
            .await?;

        if response.is_success() {
            self.clear_error();
            return Ok(response.body);
        }

        let message = ApiError::decode(&response.body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
        self.set_error(&message);
        tracing::debug!(%method, %url, status = response.status, %message, "sync request failed");
        Err(SyncError::Server {
            status: response.status,
            message,
        })
    }

    async fn post_json<T: WireMessage + Sync>(
        &self,
        ctx: &Context,
        path: &str,
        body: &T,
    ) -> SyncResult<Vec<u8>> {
        let body = body
            .encode()
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        self.send(ctx, self.request(Method::Post, path, body)).await
    }
}

#[async_trait]
impl<C: HttpClient> SyncApi for HttpTransport<C> {
    async fn register_client(
        &self,
        ctx: &Context,
        request: &RegisterClientRequest,
    ) -> SyncResult<()> {
        self.post_json(ctx, &format!("{API_PREFIX}/clients"), request)
            .await
            .map(drop)
    }

    async fn upload_account_key(&self, ctx: &Context, key: &AccountKey) -> SyncResult<()> {
        self.post_json(ctx, &format!("{API_PREFIX}/keys"), key)
            .await
            .map(drop)
    }

    async fn get_full_sync(&self, ctx: &Context) -> SyncResult<Vec<u8>> {
        let request = self.request(Method::Get, &format!("{API_PREFIX}/full"), Vec::new());
        self.send(ctx, request).await
    }

    async fn upload_full_sync_data(&self, ctx: &Context, data: Vec<u8>) -> SyncResult<()> {
        let mut request = self.request(Method::Post, &format!("{API_PREFIX}/full"), Vec::new());
        request.body = data;
        request
            .headers
            .push(("Content-Type".to_string(), "application/octet-stream".to_string()));
        self.send(ctx, request).await.map(drop)
    }

    async fn list_changelog_entries(
        &self,
        ctx: &Context,
        query: &ListChangesQuery,
    ) -> SyncResult<Vec<EncryptedChangelogEntry>> {
        let path = format!("{API_PREFIX}/changes{}", query.to_query_string());
        let body = self
            .send(ctx, self.request(Method::Get, &path, Vec::new()))
            .await?;
        let list = ChangelogEntryList::decode(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))?;
        Ok(list.items)
    }

    async fn upload_changelog_entries(
        &self,
        ctx: &Context,
        entries: Vec<EncryptedChangelogEntry>,
    ) -> SyncResult<()> {
        self.post_json(
            ctx,
            &format!("{API_PREFIX}/changes"),
            &ChangelogEntryList::new(entries),
        )
        .await
        .map(drop)
    }

    async fn upload_attachment(&self, ctx: &Context, upload: AttachmentUpload) -> SyncResult<()> {
        let mut request =
            self.request(Method::Post, &format!("{API_PREFIX}/attachments"), Vec::new());
        request.body = upload.data;
        request
            .headers
            .push((FILEPATH_HEADER.to_string(), upload.filepath));
        self.send(ctx, request).await.map(drop)
    }

    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> SyncResult<Vec<u8>> {
        let path = format!("{BLOB_PREFIX}/{}", filepath.trim_start_matches('/'));
        self.send(ctx, self.request(Method::Get, &path, Vec::new()))
            .await
    }
}

/// Trait for servers that can answer requests in-process.
pub trait LoopbackServer {
    /// Handles a request and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle(&request))
    }
}
