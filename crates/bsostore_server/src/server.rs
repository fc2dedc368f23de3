//! Storage server facade.

use crate::auth::CredentialResolver;
use crate::config::ServerConfig;
use crate::handler::{HandlerContext, RequestHandler};
use crate::request::{RequestContext, StorageRequest, StorageResponse};
use bsostore_core::{AccountStores, Clock, SystemClock};
use std::sync::Arc;

/// The storage server.
///
/// Owns the account stores and dispatches transport-independent requests
/// to them. An HTTP layer maps routes onto [`StorageRequest`] values and
/// writes the returned [`StorageResponse`].
///
/// # Example
///
/// ```
/// use bsostore_server::{AllowAll, RequestContext, ServerConfig, StorageRequest, StorageServer};
/// use std::sync::Arc;
///
/// let server = StorageServer::new(ServerConfig::default(), Arc::new(AllowAll));
/// let response = server.handle(&RequestContext::new("alice", ""), StorageRequest::InfoCollections);
/// assert_eq!(response.status, 200);
/// ```
pub struct StorageServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl StorageServer {
    /// Creates a server using the wall clock.
    pub fn new(config: ServerConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self::with_clock(config, resolver, Arc::new(SystemClock))
    }

    /// Creates a server with an explicit time source.
    pub fn with_clock(
        config: ServerConfig,
        resolver: Arc<dyn CredentialResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stores = match &config.data_dir {
            Some(dir) => AccountStores::on_disk(dir.clone(), config.store.clone(), clock),
            None => AccountStores::in_memory(config.store.clone(), clock),
        }
        .with_max_open(config.max_open_accounts);
        tracing::info!(
            data_dir = ?config.data_dir,
            require_auth = config.require_auth,
            max_open_accounts = config.max_open_accounts,
            "storage server created"
        );

        let context = Arc::new(HandlerContext::new(config, stores, resolver));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Handles one request.
    pub fn handle(&self, ctx: &RequestContext, request: StorageRequest) -> StorageResponse {
        self.handler.handle(ctx, request)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the number of account stores currently open.
    pub fn open_accounts(&self) -> usize {
        self.context.stores.open_accounts()
    }
}
