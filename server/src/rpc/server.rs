//! Annotation server
//!
//! Owns the store and routes JSON-RPC requests to the handlers. Requests are
//! handled strictly one at a time, in arrival order.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::transport::{Incoming, LineTransport};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use codenotes_store::{AnnotationStore, GitAdapter, VersionControl};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// JSON-RPC front end over an [`AnnotationStore`].
pub struct AnnotationServer<V: VersionControl> {
    store: AnnotationStore<V>,
    config: ServerConfig,
    running: bool,
}

impl AnnotationServer<GitAdapter> {
    /// Server backed by git, configured from `config`
    pub fn from_config(config: ServerConfig) -> Self {
        let adapter = config.adapter();
        Self::new(AnnotationStore::new(adapter), config)
    }
}

impl<V: VersionControl> AnnotationServer<V> {
    pub fn new(store: AnnotationStore<V>, config: ServerConfig) -> Self {
        Self {
            store,
            config,
            running: true,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore<V> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut AnnotationStore<V> {
        &mut self.store
    }

    /// False once `shutdown` has been handled
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Serve requests until the peer closes the stream or asks to shut down
    pub async fn run<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("Annotation server starting...");

        while self.running {
            match transport.read().await? {
                Some(Incoming::Request(request)) => {
                    if let Some(response) = self.handle_request(request).await {
                        transport.write_response(&response).await?;
                    }
                }
                Some(Incoming::Invalid(reason)) => {
                    let response = JsonRpcResponse::error(
                        None,
                        JsonRpcError::parse_error(format!("Parse error: {}", reason)),
                    );
                    transport.write_response(&response).await?;
                }
                Some(Incoming::Empty) => continue,
                None => {
                    tracing::info!("Client disconnected");
                    break;
                }
            }
        }

        tracing::info!("Annotation server stopped");
        Ok(())
    }

    /// Handle one request. Notifications are executed but get no response.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        let notification = request.is_notification();
        let response = if request.jsonrpc != "2.0" {
            JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            )
        } else {
            match self.dispatch(&request.method, request.params).await {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(e) => {
                    tracing::warn!("Request {} failed: {}", request.method, e);
                    JsonRpcResponse::error(request.id, e.into())
                }
            }
        };

        if notification {
            None
        } else {
            Some(response)
        }
    }

    async fn dispatch(&mut self, method: &str, params: Option<Value>) -> ServerResult<Value> {
        match method {
            "initialize" => to_value(self.handle_initialize(parse(params)?).await?),
            "identity" => to_value(self.handle_identity().await?),
            "annotations/load" => to_value(self.handle_load(parse(params)?).await?),
            "annotations/add" => to_value(self.handle_add(parse(params)?).await?),
            "annotations/update" => to_value(self.handle_update(parse(params)?).await?),
            "annotations/remove" => to_value(self.handle_remove(parse(params)?).await?),
            "annotations/forFile" => to_value(self.handle_for_file(parse(params)?)?),
            "annotations/all" => to_value(self.handle_all(parse(params)?)?),
            "annotations/sync" => to_value(self.handle_sync(parse(params)?).await?),
            "annotations/commit" => to_value(self.handle_commit(parse(params)?).await?),
            "shutdown" => {
                tracing::info!("Shutdown requested");
                self.running = false;
                Ok(Value::Null)
            }
            _ => Err(ServerError::MethodNotFound(method.to_string())),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> ServerResult<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| ServerError::InvalidParams(format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(result: T) -> ServerResult<Value> {
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn server_in(temp: &TempDir) -> AnnotationServer<GitAdapter> {
        let config = ServerConfig::new(
            Some(temp.path().join("repo")),
            "origin".to_string(),
            "git".into(),
        );
        AnnotationServer::from_config(config)
    }

    fn request(id: u64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn call(server: &mut AnnotationServer<GitAdapter>, method: &str, params: Value) -> Value {
        let response = server
            .handle_request(request(1, method, params))
            .await
            .unwrap();
        assert!(
            response.error.is_none(),
            "{method} failed: {:?}",
            response.error
        );
        response.result.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let response = server
            .handle_request(request(3, "annotations/frobnicate", json!({})))
            .await
            .unwrap();
        assert_eq!(response.id, Some(json!(3)));
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_params_are_invalid() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let response = server
            .handle_request(request(4, "annotations/add", json!({"projectPath": "/p"})))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert!(error.message.starts_with("Invalid params"));
    }

    #[tokio::test]
    async fn test_load_before_initialize_reports_kind() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let response = server
            .handle_request(request(5, "annotations/load", json!({"projectPath": "/p"})))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INTERNAL_ERROR);
        assert_eq!(error.data.unwrap()["kind"], "repositoryNotInitialized");
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "1.0",
            "id": 9,
            "method": "identity"
        }))
        .unwrap();
        let response = server.handle_request(req).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "annotations/frobnicate"}))
                .unwrap();
        assert!(server.handle_request(req).await.is_none());
    }

    #[tokio::test]
    async fn test_session_over_line_transport() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"annotations/all\",\"params\":{\"projectPath\":\"/p\"}}\n",
            "\n",
            "garbage\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"shutdown\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"identity\"}\n",
        );
        let mut transport = LineTransport::new(input.as_bytes(), Vec::new());

        server.run(&mut transport).await.unwrap();
        assert!(!server.is_running());

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let responses: Vec<Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        // The request after shutdown is never read.
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["result"]["annotations"], json!([]));
        assert_eq!(responses[1]["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert_eq!(responses[2]["id"], 2);
        assert_eq!(responses[2]["result"], Value::Null);
    }

    #[tokio::test]
    async fn test_null_id_gets_a_response() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": null,
            "method": "annotations/all",
            "params": {"projectPath": "/p"}
        }))
        .unwrap();
        let response = server.handle_request(req).await.unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["result"]["annotations"], json!([]));
    }

    #[tokio::test]
    async fn test_session_survives_non_utf8_line() {
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let mut input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"\xff\xfe\"}\n".to_vec();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"identity\"}\n");
        let mut transport = LineTransport::new(input.as_slice(), Vec::new());

        server.run(&mut transport).await.unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let responses: Vec<Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert_eq!(responses[1]["id"], 2);
        assert!(responses[1]["result"]["name"].is_string());
    }

    #[tokio::test]
    async fn test_annotation_lifecycle_with_git() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let mut server = server_in(&temp);
        let project = temp.path().join("project").display().to_string();

        let init = call(&mut server, "initialize", json!({})).await;
        assert_eq!(init["serverInfo"]["name"], "codenotes");

        let load = call(&mut server, "annotations/load", json!({"projectPath": project})).await;
        assert_eq!(load["count"], 0);
        assert_eq!(load["state"], "missing");

        let added = call(
            &mut server,
            "annotations/add",
            json!({
                "projectPath": project,
                "filePath": format!("{project}/src/a.ts"),
                "line": 10,
                "text": "check bounds"
            }),
        )
        .await;
        assert_eq!(added["annotation"]["filePath"], "src/a.ts");
        assert_eq!(added["commit"]["committed"], true);
        let id = added["annotation"]["id"].as_str().unwrap().to_string();

        let for_file = call(
            &mut server,
            "annotations/forFile",
            json!({"projectPath": project, "filePath": "src/a.ts"}),
        )
        .await;
        assert_eq!(for_file["annotations"].as_array().unwrap().len(), 1);

        let updated = call(
            &mut server,
            "annotations/update",
            json!({"projectPath": project, "id": id, "text": "check bounds twice"}),
        )
        .await;
        assert_eq!(updated["found"], true);
        assert_eq!(updated["annotation"]["text"], "check bounds twice");

        let removed = call(
            &mut server,
            "annotations/remove",
            json!({"projectPath": project, "id": id}),
        )
        .await;
        assert_eq!(removed["found"], true);

        let missing = call(
            &mut server,
            "annotations/remove",
            json!({"projectPath": project, "id": id}),
        )
        .await;
        assert_eq!(missing["found"], false);

        let all = call(&mut server, "annotations/all", json!({"projectPath": project})).await;
        assert_eq!(all["annotations"], json!([]));

        let log = StdCommand::new("git")
            .args(["log", "--format=%s"])
            .current_dir(temp.path().join("repo"))
            .output()
            .unwrap();
        let subjects = String::from_utf8_lossy(&log.stdout);
        assert!(subjects.contains("to src/a.ts"));
        assert!(subjects.contains("Remove annotation from src/a.ts"));
    }
}
