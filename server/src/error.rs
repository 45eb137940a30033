//! Error types for the codenotes server.

use crate::rpc::JsonRpcError;
use codenotes_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while handling a request.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ServerError> for JsonRpcError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidParams(msg) => JsonRpcError::invalid_params(msg),
            ServerError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            ServerError::Serialization(e) => JsonRpcError::internal_error(e.to_string()),
            ServerError::Store(e) => {
                let mut data = json!({ "kind": e.kind() });
                match &e {
                    StoreError::RepositoryInit { path, .. } | StoreError::StorageWrite { path, .. } => {
                        data["path"] = json!(path.display().to_string());
                    }
                    StoreError::Vcs { operation, .. } => {
                        data["operation"] = json!(operation);
                    }
                    StoreError::Sync {
                        operation, remote, ..
                    } => {
                        data["operation"] = json!(operation.to_string());
                        data["remote"] = json!(remote);
                    }
                    StoreError::DuplicateAnnotation { id } => {
                        data["id"] = json!(id);
                    }
                    StoreError::RepositoryNotInitialized => {}
                }
                JsonRpcError::internal_error(e.to_string()).with_data(data)
            }
        }
    }
}

/// Result type alias for request handlers.
pub type ServerResult<T> = Result<T, ServerError>;
