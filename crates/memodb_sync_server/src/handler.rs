//! Request handlers for sync endpoints.

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::ServerStore;
use memodb_sync_protocol::{
    AccountKey, ApiError, ChangelogEntryList, ListChangesQuery, RegisterClientRequest,
    WireMessage, API_PREFIX, BLOB_PREFIX, FILEPATH_HEADER, USERNAME_HEADER,
};
use std::sync::Arc;

/// An HTTP request as seen by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Method, e.g. `GET`.
    pub method: String,
    /// Path plus optional query string.
    pub target: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Creates a request without headers or body.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the first header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The path without the query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// The query string without the leading `?`.
    pub fn query(&self) -> &str {
        self.target.split_once('?').map_or("", |(_, query)| query)
    }
}

/// A response produced by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type of `body`.
    pub content_type: &'static str,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }

    fn json<T: WireMessage>(status: u16, message: &T) -> ServerResult<Self> {
        let body = message
            .encode()
            .map_err(|e| ServerError::Internal(format!("failed to encode response: {e}")))?;
        Ok(Self {
            status,
            content_type: "application/json",
            body,
        })
    }

    fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/octet-stream",
            body,
        }
    }

    /// Builds the JSON error body for `err`.
    pub fn error(err: &ServerError) -> Self {
        let status = err.status_code();
        let api_error = ApiError {
            code: status,
            error: err.to_string(),
        };
        let body = api_error
            .encode()
            .unwrap_or_else(|_| err.to_string().into_bytes());
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Context shared by all handlers.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server storage (shared across all handlers).
    pub store: Arc<ServerStore>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        store: Arc<ServerStore>,
        validator: Option<TokenValidator>,
    ) -> Self {
        Self {
            config,
            store,
            validator,
        }
    }

    /// The token validator, when authentication is enabled.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Caller {
    account: String,
    /// Set when the request carried a token.
    client_id: Option<String>,
}

impl Caller {
    fn ensure_client(&self, client_id: &str) -> ServerResult<()> {
        match &self.client_id {
            Some(own) if own != client_id => Err(ServerError::NotAuthorized(format!(
                "token was issued to client {own}, not {client_id}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Routes and handles one request.
    pub fn handle(&self, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let caller = self.authenticate(request)?;
        let path = request.path();

        if let Some(route) = path.strip_prefix(API_PREFIX) {
            return match (request.method.as_str(), route) {
                ("POST", "/clients") => self.register_client(&caller, request),
                ("POST", "/keys") => self.upload_account_key(&caller, request),
                ("GET", "/full") => self.get_full_sync(&caller),
                ("POST", "/full") => self.upload_full_sync(&caller, request),
                ("GET", "/changes") => self.list_changes(&caller, request),
                ("POST", "/changes") => self.upload_changes(&caller, request),
                ("POST", "/attachments") => self.upload_attachment(&caller, request),
                _ => Err(not_found(request)),
            };
        }

        match (request.method.as_str(), path.strip_prefix(BLOB_PREFIX)) {
            ("GET", Some(rest)) if rest.starts_with('/') => self.get_blob(&caller, rest),
            _ => Err(not_found(request)),
        }
    }

    fn authenticate(&self, request: &ApiRequest) -> ServerResult<Caller> {
        let Some(validator) = self.context.validator() else {
            let account = request
                .header(USERNAME_HEADER)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| {
                    ServerError::InvalidRequest(format!("missing {USERNAME_HEADER} header"))
                })?;
            return Ok(Caller {
                account: account.to_string(),
                client_id: None,
            });
        };

        let token = request
            .header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ServerError::AuthenticationFailed("missing bearer token".into()))?;
        let claims = validator.validate_token(token)?;
        if let Some(name) = request.header(USERNAME_HEADER) {
            if name != claims.username {
                return Err(ServerError::NotAuthorized(format!(
                    "token does not grant access to account {name}"
                )));
            }
        }
        Ok(Caller {
            account: claims.username,
            client_id: Some(claims.client_id),
        })
    }

    fn register_client(&self, caller: &Caller, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let body = RegisterClientRequest::decode(&request.body)?;
        if body.client_id.trim().is_empty() {
            return Err(ServerError::InvalidRequest("client id must not be empty".into()));
        }
        caller.ensure_client(&body.client_id)?;

        let created = self
            .context
            .store
            .register_client(&caller.account, &body.client_id);
        if created {
            tracing::info!(account = %caller.account, client_id = %body.client_id, "client registered");
        }
        Ok(ApiResponse::empty(if created { 201 } else { 200 }))
    }

    fn upload_account_key(
        &self,
        caller: &Caller,
        request: &ApiRequest,
    ) -> ServerResult<ApiResponse> {
        let key = AccountKey::decode(&request.body)?;
        if key.name.is_empty() || key.key_type.is_empty() || key.data.is_empty() {
            return Err(ServerError::InvalidRequest(
                "account key needs a name, a type and data".into(),
            ));
        }

        let name = key.name.clone();
        let fingerprint = key.data.clone();
        if let Some(previous) = self.context.store.put_key(&caller.account, key) {
            if previous.data != fingerprint {
                tracing::warn!(account = %caller.account, %name, "account key replaced with a different key");
            }
        }
        Ok(ApiResponse::empty(200))
    }

    fn get_full_sync(&self, caller: &Caller) -> ServerResult<ApiResponse> {
        self.context
            .store
            .full_sync(&caller.account)
            .map(ApiResponse::bytes)
            .ok_or_else(|| ServerError::NotFound("no full sync data".into()))
    }

    fn upload_full_sync(&self, caller: &Caller, request: &ApiRequest) -> ServerResult<ApiResponse> {
        self.check_blob_size(request.body.len())?;
        if request.body.is_empty() {
            return Err(ServerError::InvalidRequest("empty full sync data".into()));
        }
        self.context
            .store
            .set_full_sync(&caller.account, request.body.clone());
        tracing::info!(account = %caller.account, bytes = request.body.len(), "full sync data stored");
        Ok(ApiResponse::empty(200))
    }

    fn list_changes(&self, caller: &Caller, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let query = ListChangesQuery::parse(request.query())?;
        let items = self.context.store.entries_since(&caller.account, query.since);
        tracing::debug!(account = %caller.account, count = items.len(), "listing changes");
        ApiResponse::json(200, &ChangelogEntryList::new(items))
    }

    fn upload_changes(&self, caller: &Caller, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let list = ChangelogEntryList::decode(&request.body)?;
        let limit = self.context.config.max_upload_entries;
        if list.items.len() > limit {
            return Err(ServerError::PayloadTooLarge {
                size: list.items.len(),
                limit,
            });
        }

        for entry in &list.items {
            caller.ensure_client(&entry.sync_client_id)?;
            if !self
                .context
                .store
                .is_registered(&caller.account, &entry.sync_client_id)
            {
                return Err(ServerError::NotAuthorized(format!(
                    "client {} is not registered",
                    entry.sync_client_id
                )));
            }
        }

        let count = self.context.store.append_entries(&caller.account, list.items);
        tracing::debug!(account = %caller.account, count, "changes stored");
        Ok(ApiResponse::empty(200))
    }

    fn upload_attachment(
        &self,
        caller: &Caller,
        request: &ApiRequest,
    ) -> ServerResult<ApiResponse> {
        let filepath = request.header(FILEPATH_HEADER).ok_or_else(|| {
            ServerError::InvalidRequest(format!("missing {FILEPATH_HEADER} header"))
        })?;
        validate_filepath(filepath)?;
        self.check_blob_size(request.body.len())?;

        let stored = self
            .context
            .store
            .put_blob(&caller.account, filepath, request.body.clone());
        tracing::debug!(account = %caller.account, %filepath, stored, "attachment upload");
        Ok(ApiResponse::empty(if stored { 201 } else { 200 }))
    }

    fn get_blob(&self, caller: &Caller, filepath: &str) -> ServerResult<ApiResponse> {
        validate_filepath(filepath)?;
        self.context
            .store
            .blob(&caller.account, filepath)
            .map(ApiResponse::bytes)
            .ok_or_else(|| ServerError::NotFound(format!("blob {filepath}")))
    }

    fn check_blob_size(&self, size: usize) -> ServerResult<()> {
        let limit = self.context.config.max_blob_size;
        if size > limit {
            return Err(ServerError::PayloadTooLarge { size, limit });
        }
        Ok(())
    }
}

fn not_found(request: &ApiRequest) -> ServerError {
    ServerError::NotFound(format!("{} {}", request.method, request.path()))
}

/// Content-addressed paths are absolute and never climb out of the blob root.
fn validate_filepath(filepath: &str) -> ServerResult<()> {
    let valid = filepath.starts_with('/')
        && filepath.len() > 1
        && filepath
            .split('/')
            .skip(1)
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(ServerError::InvalidRequest(format!("invalid filepath {filepath:?}")))
    }
}
