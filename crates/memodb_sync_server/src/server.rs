//! Main sync server.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{ApiRequest, ApiResponse, HandlerContext, RequestHandler};
use crate::store::ServerStore;
use std::sync::Arc;

/// The sync server.
///
/// Holds every account's registered clients, account keys, encrypted
/// changelog and blobs, and answers the sync API routes. It is transport
/// agnostic: an HTTP front end (or an in-process test client) turns its
/// requests into [`ApiRequest`]s and writes back the [`ApiResponse`].
///
/// # Example
///
/// ```
/// use memodb_sync_server::{ApiRequest, ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle(
///     &ApiRequest::new("GET", "/api/sync/v1/changes").with_header("X-Username", "ada"),
/// );
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let validator = match (&config.auth_secret, config.require_auth) {
            (Some(secret), true) => Some(TokenValidator::new(AuthConfig::new(secret.clone()))),
            _ => None,
        };
        let context = Arc::new(HandlerContext::new(config, store, validator));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles one request. Failures become JSON error responses.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.handler.handle(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(method = %request.method, path = %request.path(), error = %err, "request failed");
                } else {
                    tracing::debug!(method = %request.method, path = %request.path(), error = %err, "request rejected");
                }
                ApiResponse::error(&err)
            }
        }
    }

    /// Issues a bearer token for `client_id` in `username`'s account.
    ///
    /// Returns `None` when authentication is disabled.
    pub fn create_token(&self, username: &str, client_id: &str) -> ServerResult<Option<String>> {
        self.context
            .validator()
            .map(|v| v.create_token(username, client_id))
            .transpose()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<ServerStore> {
        &self.context.store
    }
}
