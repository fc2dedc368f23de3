//! Request handling.
//!
//! Every request runs the same pipeline: resolve the credential, parse and
//! validate the request into an [`Operation`], open the account's store by
//! id, then execute the operation against the store. Nothing touches the
//! store until the request is known to be well formed. Failures at any
//! step become an error response.

use crate::auth::CredentialResolver;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::request::{
    RequestContext, StorageRequest, StorageResponse, LAST_MODIFIED_HEADER, RECORDS_HEADER,
    TIMESTAMP_HEADER,
};
use bsostore_core::types::is_valid_bso_id;
use bsostore_core::{
    AccountId, AccountStores, BsoQuery, CollectionName, CoreError, OutputFormat, Precondition,
    RecordStore,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Open account stores.
    pub stores: AccountStores,
    resolver: Arc<dyn CredentialResolver>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        stores: AccountStores,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            config,
            stores,
            resolver,
        }
    }
}

/// A validated request, ready to run against a store.
#[derive(Debug)]
enum Operation {
    InfoCollections,
    InfoCollectionCounts,
    InfoCollectionUsage,
    InfoQuota,
    GetCollection {
        collection: CollectionName,
        query: BsoQuery,
        format: OutputFormat,
    },
    GetItem {
        collection: CollectionName,
        id: String,
    },
    PutItem {
        collection: CollectionName,
        id: String,
        value: Value,
        precondition: Precondition,
    },
    PostCollection {
        collection: CollectionName,
        items: Vec<Value>,
        precondition: Precondition,
    },
    DeleteItem {
        collection: CollectionName,
        id: String,
        precondition: Precondition,
    },
    DeleteCollection {
        collection: CollectionName,
        query: BsoQuery,
        precondition: Precondition,
    },
    DeleteStorage,
}

fn record_id(id: String) -> ServerResult<String> {
    if is_valid_bso_id(&id) {
        Ok(id)
    } else {
        Err(CoreError::malformed(format!("invalid record id {id:?}")).into())
    }
}

/// Handler for storage requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one request and renders the outcome.
    pub fn handle(&self, ctx: &RequestContext, request: StorageRequest) -> StorageResponse {
        let name = request.name();
        match self.try_handle(ctx, request) {
            Ok(response) => {
                tracing::debug!(request = name, account = %ctx.account, status = response.status, "request handled");
                response
            }
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(request = name, account = %ctx.account, error = %err, "request failed");
                } else {
                    tracing::debug!(request = name, account = %ctx.account, error = %err, "request rejected");
                }
                self.error_response(&err)
            }
        }
    }

    /// Handles one request, returning failures as errors.
    pub fn try_handle(
        &self,
        ctx: &RequestContext,
        request: StorageRequest,
    ) -> ServerResult<StorageResponse> {
        let account = self.authorize(ctx)?;
        let operation = self.validate(ctx, request)?;
        let store = self.context.stores.store(&account)?;
        self.execute(&store, operation)
    }

    fn authorize(&self, ctx: &RequestContext) -> ServerResult<AccountId> {
        let account = AccountId::parse(&ctx.account)
            .map_err(|_| ServerError::NotAuthorized("invalid account id".into()))?;
        if self.context.config.require_auth
            && !self.context.resolver.verify(&account, &ctx.credential)
        {
            tracing::warn!(account = %account, "credential rejected");
            return Err(ServerError::NotAuthorized(format!(
                "invalid credentials for {account}"
            )));
        }
        Ok(account)
    }

    fn check_size(&self, body: &[u8]) -> ServerResult<()> {
        let limit = self.context.config.max_request_bytes;
        if body.len() > limit {
            return Err(ServerError::PayloadTooLarge {
                size: body.len(),
                limit,
            });
        }
        Ok(())
    }

    fn precondition(ctx: &RequestContext) -> ServerResult<Precondition> {
        Ok(Precondition::from_header(ctx.if_unmodified_since.as_deref())?)
    }

    /// Parses every part of the request that can be checked without a
    /// store.
    fn validate(&self, ctx: &RequestContext, request: StorageRequest) -> ServerResult<Operation> {
        let operation = match request {
            StorageRequest::InfoCollections => Operation::InfoCollections,
            StorageRequest::InfoCollectionCounts => Operation::InfoCollectionCounts,
            StorageRequest::InfoCollectionUsage => Operation::InfoCollectionUsage,
            StorageRequest::InfoQuota => Operation::InfoQuota,
            StorageRequest::GetCollection { collection, params } => Operation::GetCollection {
                collection: CollectionName::parse(&collection)?,
                query: BsoQuery::from_params(&params)?,
                format: OutputFormat::from_accept(ctx.accept.as_deref()),
            },
            StorageRequest::GetItem { collection, id } => Operation::GetItem {
                collection: CollectionName::parse(&collection)?,
                id: record_id(id)?,
            },
            StorageRequest::PutItem {
                collection,
                id,
                body,
            } => {
                self.check_size(&body)?;
                let collection = CollectionName::parse(&collection)?;
                let id = record_id(id)?;
                let precondition = Self::precondition(ctx)?;
                let value: Value = serde_json::from_slice(&body).map_err(|e| {
                    ServerError::InvalidRequest(format!("invalid JSON body: {e}"))
                })?;
                Operation::PutItem {
                    collection,
                    id,
                    value,
                    precondition,
                }
            }
            StorageRequest::PostCollection { collection, body } => {
                self.check_size(&body)?;
                let collection = CollectionName::parse(&collection)?;
                let precondition = Self::precondition(ctx)?;
                let items =
                    OutputFormat::from_content_type(ctx.content_type.as_deref()).decode(&body)?;
                let max = self.context.config.max_batch_records;
                if items.len() > max {
                    return Err(ServerError::InvalidRequest(format!(
                        "too many records: {} > {max}",
                        items.len()
                    )));
                }
                Operation::PostCollection {
                    collection,
                    items,
                    precondition,
                }
            }
            StorageRequest::DeleteItem { collection, id } => Operation::DeleteItem {
                collection: CollectionName::parse(&collection)?,
                id: record_id(id)?,
                precondition: Self::precondition(ctx)?,
            },
            StorageRequest::DeleteCollection { collection, params } => {
                Operation::DeleteCollection {
                    collection: CollectionName::parse(&collection)?,
                    query: BsoQuery::from_params(&params)?,
                    precondition: Self::precondition(ctx)?,
                }
            }
            StorageRequest::DeleteStorage { confirm } => {
                if !confirm {
                    return Err(ServerError::InvalidRequest(
                        "deleting all storage requires confirmation".into(),
                    ));
                }
                Operation::DeleteStorage
            }
        };
        Ok(operation)
    }

    fn execute(&self, store: &RecordStore, operation: Operation) -> ServerResult<StorageResponse> {
        let now = store.now();
        let response = match operation {
            Operation::InfoCollections => {
                StorageResponse::json(200, &store.collections_info()?)?
                    .with_header(TIMESTAMP_HEADER, now)
            }
            Operation::InfoCollectionCounts => {
                StorageResponse::json(200, &store.collection_counts()?)?
                    .with_header(TIMESTAMP_HEADER, now)
            }
            Operation::InfoCollectionUsage => {
                StorageResponse::json(200, &store.collection_usage()?)?
                    .with_header(TIMESTAMP_HEADER, now)
            }
            Operation::InfoQuota => {
                let quota = store.quota()?;
                StorageResponse::json(200, &(quota.usage_kb, quota.limit_kb))?
                    .with_header(TIMESTAMP_HEADER, now)
            }
            Operation::GetCollection {
                collection,
                query,
                format,
            } => {
                let result = store.find(&collection, &query)?;
                let body = format.encode(&result.to_values()?)?;
                StorageResponse::new(200, format.content_type(), body)
                    .with_header(RECORDS_HEADER, result.count)
                    .with_header(TIMESTAMP_HEADER, now)
            }
            Operation::GetItem { collection, id } => {
                let bso = store.get(&collection, &id)?;
                StorageResponse::json(200, &bso)?.with_header(TIMESTAMP_HEADER, now)
            }
            Operation::PutItem {
                collection,
                id,
                value,
                precondition,
            } => {
                let modified = store.put(&collection, &id, &value, precondition)?;
                StorageResponse::json(200, &modified)?.with_header(TIMESTAMP_HEADER, modified)
            }
            Operation::PostCollection {
                collection,
                items,
                precondition,
            } => {
                let report = store.post(&collection, &items, precondition)?;
                StorageResponse::json(200, &report)?.with_header(TIMESTAMP_HEADER, report.modified)
            }
            Operation::DeleteItem {
                collection,
                id,
                precondition,
            } => {
                let modified = store.delete(&collection, &id, precondition)?;
                StorageResponse::json(200, &modified)?.with_header(TIMESTAMP_HEADER, modified)
            }
            Operation::DeleteCollection {
                collection,
                query,
                precondition,
            } => {
                let modified = store.delete_where(&collection, &query, precondition)?;
                StorageResponse::json(200, &modified)?.with_header(TIMESTAMP_HEADER, modified)
            }
            Operation::DeleteStorage => {
                let modified = store.wipe()?;
                StorageResponse::json(200, &modified)?.with_header(TIMESTAMP_HEADER, modified)
            }
        };
        Ok(response)
    }

    fn error_response(&self, err: &ServerError) -> StorageResponse {
        let body = json!({
            "error": err.kind().as_str(),
            "message": err.to_string(),
        });
        let mut response = StorageResponse::new(err.status(), "application/json", body.to_string().into_bytes())
            .with_header(TIMESTAMP_HEADER, self.context.stores.now());
        if let ServerError::Core(CoreError::PreconditionFailed { last_modified, .. }) = err {
            response = response.with_header(LAST_MODIFIED_HEADER, last_modified);
        }
        response
    }
}
