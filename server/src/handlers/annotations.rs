//! Annotation request handlers.
//!
//! Each mutation is persisted by the store and then committed with a
//! message saying who changed which file, so the repository history reads
//! as an audit log.

use crate::error::{ServerError, ServerResult};
use crate::rpc::{AnnotationServer, ServerInfo};
use codenotes_store::{
    normalize_project_path, relative_file_path, Annotation, AnnotationId, CommitOutcome,
    DocumentState, PullOutcome, VersionControl,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SERVER_NAME: &str = "codenotes";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ==========================================
// Initialize / Identity
// ==========================================

/// Parameters for `initialize`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Overrides the configured repository root
    #[serde(default)]
    pub repo_root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    pub repo_root: String,
    pub server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ==========================================
// Load
// ==========================================

/// Parameters naming a project.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    /// Absolute path of the project root
    pub project_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub count: usize,
    /// "missing", "loaded" or "degraded"
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ==========================================
// Mutations
// ==========================================

/// Parameters for `annotations/add`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParams {
    pub project_path: String,
    /// Relative to the project, or absolute inside it
    pub file_path: String,
    /// 1-indexed line
    pub line: u32,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub annotation: Annotation,
    pub commit: CommitResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_warning: Option<String>,
}

/// Parameters for `annotations/update`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub project_path: String,
    pub id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResponse>,
}

/// Parameters for `annotations/remove`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParams {
    pub project_path: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResponse>,
}

// ==========================================
// Queries
// ==========================================

/// Parameters for `annotations/forFile`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForFileParams {
    pub project_path: String,
    pub file_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsResponse {
    pub annotations: Vec<Annotation>,
}

// ==========================================
// Sync / Commit
// ==========================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub pulled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Parameters for `annotations/commit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitParams {
    pub project_path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_to: Option<String>,
}

impl From<CommitOutcome> for CommitResponse {
    fn from(outcome: CommitOutcome) -> Self {
        match outcome {
            CommitOutcome::NothingToCommit => Self {
                committed: false,
                pushed_to: None,
            },
            CommitOutcome::Committed { pushed_to } => Self {
                committed: true,
                pushed_to,
            },
        }
    }
}

fn state_name(state: DocumentState) -> &'static str {
    match state {
        DocumentState::Missing => "missing",
        DocumentState::Loaded => "loaded",
        DocumentState::Degraded => "degraded",
    }
}

impl<V: VersionControl> AnnotationServer<V> {
    pub(crate) async fn handle_initialize(
        &mut self,
        params: InitializeParams,
    ) -> ServerResult<InitializeResponse> {
        let repo_root = params
            .repo_root
            .unwrap_or_else(|| self.config().repo_root.clone());

        tracing::info!("Initializing annotation repository at {:?}", repo_root);
        self.store_mut().initialize(&repo_root).await?;

        Ok(InitializeResponse {
            repo_root: repo_root.display().to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        })
    }

    pub(crate) async fn handle_identity(&self) -> ServerResult<IdentityResponse> {
        let resolved = self.store().vcs().identity().await;
        Ok(IdentityResponse {
            name: resolved.identity.name,
            email: resolved.identity.email,
            warning: resolved.warning.map(|w| w.to_string()),
        })
    }

    pub(crate) async fn handle_load(&mut self, params: ProjectParams) -> ServerResult<LoadResponse> {
        let report = self.store_mut().load(&params.project_path).await?;
        if let Some(warning) = &report.warning {
            tracing::warn!("{}", warning);
        }
        Ok(LoadResponse {
            count: report.count,
            state: state_name(report.state),
            warning: report.warning.map(|w| w.to_string()),
        })
    }

    pub(crate) async fn handle_add(&mut self, params: AddParams) -> ServerResult<AddResponse> {
        if params.line == 0 {
            return Err(ServerError::InvalidParams(
                "line is 1-indexed and must be at least 1".to_string(),
            ));
        }
        let file_path = relative_file_path(&params.project_path, &params.file_path);
        if file_path.is_empty() || file_path == "." {
            return Err(ServerError::InvalidParams("filePath is empty".to_string()));
        }

        let resolved = self.store().vcs().identity().await;
        let author = resolved.identity.name;

        let annotation = Annotation::new(
            &params.project_path,
            file_path.clone(),
            params.line,
            params.text,
            author.clone(),
        );
        let mut stored = annotation.clone();
        stored.project_path = normalize_project_path(&params.project_path);
        self.store_mut().add(annotation).await?;

        let message = format!("Add annotation by {author} to {file_path}");
        let commit = self
            .store_mut()
            .commit_changes(&params.project_path, &message)
            .await?;

        Ok(AddResponse {
            annotation: stored,
            commit: commit.into(),
            identity_warning: resolved.warning.map(|w| w.to_string()),
        })
    }

    pub(crate) async fn handle_update(&mut self, params: UpdateParams) -> ServerResult<UpdateResponse> {
        let id = AnnotationId::from(params.id);
        let found = self
            .store_mut()
            .update(&id, &params.project_path, &params.text)
            .await?;

        if !found.is_found() {
            tracing::debug!("Update for unknown annotation {}", id);
            return Ok(UpdateResponse {
                found: false,
                annotation: None,
                commit: None,
            });
        }

        let annotation = self.store().get(&id, &params.project_path).cloned();
        let file_path = annotation
            .as_ref()
            .map(|a| a.file_path.clone())
            .unwrap_or_default();
        let author = self.store().vcs().identity().await.identity.name;

        let message = format!("Update annotation by {author} in {file_path}");
        let commit = self
            .store_mut()
            .commit_changes(&params.project_path, &message)
            .await?;

        Ok(UpdateResponse {
            found: true,
            annotation,
            commit: Some(commit.into()),
        })
    }

    pub(crate) async fn handle_remove(&mut self, params: RemoveParams) -> ServerResult<RemoveResponse> {
        let id = AnnotationId::from(params.id);
        if !self.store().is_loaded(&params.project_path) {
            self.store_mut().load(&params.project_path).await?;
        }
        let file_path = self
            .store()
            .get(&id, &params.project_path)
            .map(|a| a.file_path.clone());

        let found = self.store_mut().remove(&id, &params.project_path).await?;
        if !found.is_found() {
            tracing::debug!("Removal of unknown annotation {}", id);
            return Ok(RemoveResponse {
                found: false,
                commit: None,
            });
        }

        let message = format!(
            "Remove annotation from {}",
            file_path.unwrap_or_else(|| "unknown file".to_string())
        );
        let commit = self
            .store_mut()
            .commit_changes(&params.project_path, &message)
            .await?;

        Ok(RemoveResponse {
            found: true,
            commit: Some(commit.into()),
        })
    }

    pub(crate) fn handle_for_file(&self, params: ForFileParams) -> ServerResult<AnnotationsResponse> {
        let file_path = relative_file_path(&params.project_path, &params.file_path);
        let annotations = self
            .store()
            .annotations_for_file(&file_path, &params.project_path)
            .into_iter()
            .cloned()
            .collect();
        Ok(AnnotationsResponse { annotations })
    }

    pub(crate) fn handle_all(&self, params: ProjectParams) -> ServerResult<AnnotationsResponse> {
        Ok(AnnotationsResponse {
            annotations: self.store().all_annotations(&params.project_path).to_vec(),
        })
    }

    pub(crate) async fn handle_sync(&mut self, params: ProjectParams) -> ServerResult<SyncResponse> {
        let report = self.store_mut().sync(&params.project_path).await?;
        let remote = match report.pull {
            PullOutcome::NoRemote => None,
            PullOutcome::Pulled { remote } => Some(remote),
        };
        Ok(SyncResponse {
            pulled: remote.is_some(),
            remote,
            count: report.load.count,
            warning: report.load.warning.map(|w| w.to_string()),
        })
    }

    pub(crate) async fn handle_commit(&mut self, params: CommitParams) -> ServerResult<CommitResponse> {
        if params.message.trim().is_empty() {
            return Err(ServerError::InvalidParams("message is empty".to_string()));
        }
        let outcome = self
            .store_mut()
            .commit_changes(&params.project_path, &params.message)
            .await?;
        Ok(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_params_camel_case() {
        let params: AddParams = serde_json::from_value(json!({
            "projectPath": "/tmp/proj",
            "filePath": "a.ts",
            "line": 10,
            "text": "fix this"
        }))
        .unwrap();
        assert_eq!(params.file_path, "a.ts");
        assert_eq!(params.line, 10);
    }

    #[test]
    fn test_initialize_params_optional() {
        let params: InitializeParams = serde_json::from_value(json!({})).unwrap();
        assert!(params.repo_root.is_none());
    }

    #[test]
    fn test_commit_response_from_outcome() {
        let nothing: CommitResponse = CommitOutcome::NothingToCommit.into();
        assert!(!nothing.committed);
        let pushed: CommitResponse = CommitOutcome::Committed {
            pushed_to: Some("origin".into()),
        }
        .into();
        let value = serde_json::to_value(&pushed).unwrap();
        assert_eq!(value, json!({"committed": true, "pushedTo": "origin"}));
    }

    #[test]
    fn test_load_response_omits_empty_warning() {
        let value = serde_json::to_value(LoadResponse {
            count: 0,
            state: state_name(DocumentState::Missing),
            warning: None,
        })
        .unwrap();
        assert_eq!(value, json!({"count": 0, "state": "missing"}));
    }
}
