//! Codenotes Server Library
//!
//! Serves the annotation store over JSON-RPC so that editors can attach,
//! edit and share line-anchored notes kept in a git repository.

pub mod config;
pub mod error;
pub mod handlers;
pub mod rpc;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use rpc::{AnnotationServer, LineTransport};
