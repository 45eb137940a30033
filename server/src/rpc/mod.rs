//! JSON-RPC front end
//!
//! Newline-delimited JSON-RPC 2.0 over stdio, so an editor extension can
//! drive the annotation store from a child process.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ServerInfo};
pub use server::AnnotationServer;
pub use transport::{Incoming, LineTransport};
