//! Annotation store
//!
//! Keeps each loaded project's annotations in memory and mirrors them to a
//! per-project JSON document inside the annotation repository. Every
//! mutation rewrites the whole document before returning, so a crash never
//! leaves a half-written file and a later reload never loses an
//! acknowledged change.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::annotation::{Annotation, AnnotationId, DOCUMENT_VERSION};
use crate::error::{Result, StorageReadWarning, StoreError};
use crate::migration::{parse_document, DocumentError};
use crate::path_hash::{location_for, normalize_project_path};
use crate::vcs::{CommitOutcome, PullOutcome, VersionControl};

/// Suffix of the copy kept when a document cannot be parsed
const QUARANTINE_SUFFIX: &str = "corrupt";

/// State of a project's document at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// No document yet; the project simply has no annotations
    Missing,
    /// Document read and parsed
    Loaded,
    /// Document present but unusable; the project starts empty
    Degraded,
}

/// Outcome of loading one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Normalized project path used as partition key
    pub project_path: String,
    pub count: usize,
    pub state: DocumentState,
    pub warning: Option<StorageReadWarning>,
}

/// Whether an update or removal found its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found,
    NotFound,
}

impl Lookup {
    pub fn is_found(self) -> bool {
        self == Lookup::Found
    }
}

/// Outcome of a pull followed by a reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub pull: PullOutcome,
    pub load: LoadReport,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: &'a str,
    annotations: &'a [Annotation],
}

/// In-memory annotation index mirrored to disk and version control.
///
/// Owned by a single caller; every mutation takes `&mut self`, so two
/// mutations can never interleave within one process.
pub struct AnnotationStore<V> {
    vcs: V,
    projects: HashMap<String, Vec<Annotation>>,
}

impl<V: VersionControl> AnnotationStore<V> {
    /// Create a store driving the given version-control adapter
    pub fn new(vcs: V) -> Self {
        Self {
            vcs,
            projects: HashMap::new(),
        }
    }

    /// Create or open the annotation repository
    pub async fn initialize(&mut self, repo_root: &Path) -> Result<()> {
        self.vcs.initialize(repo_root).await
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Tear the store down, handing the adapter back
    pub fn dispose(self) -> V {
        self.vcs
    }

    pub fn is_loaded(&self, project_path: &str) -> bool {
        self.projects
            .contains_key(&normalize_project_path(project_path))
    }

    /// Normalized paths of every loaded project
    pub fn loaded_projects(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    /// Drop a project from memory; its document is left alone
    pub fn unload(&mut self, project_path: &str) -> bool {
        self.projects
            .remove(&normalize_project_path(project_path))
            .is_some()
    }

    /// (Re)load a project's annotations from its document.
    ///
    /// A missing document is an empty project. An unreadable or malformed
    /// one is also treated as empty, with a warning in the report; the raw
    /// bytes are copied aside first so the next save does not destroy them.
    /// Fails only when the repository was never initialized.
    pub async fn load(&mut self, project_path: &str) -> Result<LoadReport> {
        let root = self
            .vcs
            .repo_root()
            .ok_or(StoreError::RepositoryNotInitialized)?;
        let key = normalize_project_path(project_path);
        let path = location_for(&key, root);

        let (annotations, state, warning) = match tokio::fs::read(&path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Vec::new(), DocumentState::Missing, None)
            }
            Err(e) => (
                Vec::new(),
                DocumentState::Degraded,
                Some(StorageReadWarning::Unreadable {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            ),
            Ok(bytes) => match parse_document(&bytes) {
                Ok(data) => (
                    adopt(data.annotations, &key),
                    DocumentState::Loaded,
                    None,
                ),
                Err(err) => {
                    quarantine(&path, &bytes).await;
                    let warning = match err {
                        DocumentError::Malformed(reason) => StorageReadWarning::Malformed {
                            path: path.clone(),
                            reason,
                        },
                        DocumentError::UnsupportedVersion(version) => {
                            StorageReadWarning::UnsupportedVersion {
                                path: path.clone(),
                                version,
                            }
                        }
                    };
                    (Vec::new(), DocumentState::Degraded, Some(warning))
                }
            },
        };

        match &warning {
            Some(w) => log::warn!("{w}; starting {key} with no annotations"),
            None => log::info!("Loaded {} annotations for {}", annotations.len(), key),
        }

        let count = annotations.len();
        self.projects.insert(key.clone(), annotations);

        Ok(LoadReport {
            project_path: key,
            count,
            state,
            warning,
        })
    }

    /// Append an annotation to its project and persist.
    ///
    /// Loads the project first if it is not in memory yet, so the rewrite
    /// cannot clobber annotations that were only on disk.
    pub async fn add(&mut self, mut annotation: Annotation) -> Result<()> {
        let key = normalize_project_path(&annotation.project_path);
        self.ensure_loaded(&key).await?;
        annotation.project_path = key.clone();

        let collection = self.projects.entry(key.clone()).or_default();
        if collection.iter().any(|a| a.id == annotation.id) {
            return Err(StoreError::DuplicateAnnotation {
                id: annotation.id.to_string(),
            });
        }
        collection.push(annotation);

        if let Err(e) = self.persist(&key).await {
            if let Some(collection) = self.projects.get_mut(&key) {
                collection.pop();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Replace an annotation's text and refresh its timestamp.
    ///
    /// Unknown ids are a no-op reported as [`Lookup::NotFound`].
    pub async fn update(
        &mut self,
        id: &AnnotationId,
        project_path: &str,
        new_text: &str,
    ) -> Result<Lookup> {
        let key = normalize_project_path(project_path);
        self.ensure_loaded(&key).await?;

        let Some(annotation) = self.find_mut(&key, id) else {
            log::debug!("Update of unknown annotation {id} in {key} ignored");
            return Ok(Lookup::NotFound);
        };

        let previous = (annotation.text.clone(), annotation.timestamp);
        annotation.edit_text(new_text);

        if let Err(e) = self.persist(&key).await {
            if let Some(annotation) = self.find_mut(&key, id) {
                (annotation.text, annotation.timestamp) = previous;
            }
            return Err(e);
        }
        Ok(Lookup::Found)
    }

    /// Remove an annotation from memory and disk.
    ///
    /// Unknown ids are a no-op reported as [`Lookup::NotFound`].
    pub async fn remove(&mut self, id: &AnnotationId, project_path: &str) -> Result<Lookup> {
        let key = normalize_project_path(project_path);
        self.ensure_loaded(&key).await?;

        let Some(collection) = self.projects.get_mut(&key) else {
            return Ok(Lookup::NotFound);
        };
        let Some(index) = collection.iter().position(|a| &a.id == id) else {
            log::debug!("Removal of unknown annotation {id} in {key} ignored");
            return Ok(Lookup::NotFound);
        };
        let removed = collection.remove(index);

        if let Err(e) = self.persist(&key).await {
            if let Some(collection) = self.projects.get_mut(&key) {
                collection.insert(index, removed);
            }
            return Err(e);
        }
        Ok(Lookup::Found)
    }

    /// Annotations on `file_path`, in insertion order
    pub fn annotations_for_file(&self, file_path: &str, project_path: &str) -> Vec<&Annotation> {
        self.all_annotations(project_path)
            .iter()
            .filter(|a| a.file_path == file_path)
            .collect()
    }

    /// Annotations on one line of `file_path`, in insertion order
    pub fn annotations_for_line(
        &self,
        file_path: &str,
        line: u32,
        project_path: &str,
    ) -> Vec<&Annotation> {
        self.all_annotations(project_path)
            .iter()
            .filter(|a| a.file_path == file_path && a.line == line)
            .collect()
    }

    /// Every annotation of a project; empty when it is not loaded
    pub fn all_annotations(&self, project_path: &str) -> &[Annotation] {
        self.projects
            .get(&normalize_project_path(project_path))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, id: &AnnotationId, project_path: &str) -> Option<&Annotation> {
        self.all_annotations(project_path)
            .iter()
            .find(|a| &a.id == id)
    }

    /// Pull from the remote, then replace the project's collection with
    /// what is on disk. A failed pull leaves memory untouched.
    pub async fn sync(&mut self, project_path: &str) -> Result<SyncReport> {
        let pull = self.vcs.pull().await?;
        let load = self.load(project_path).await?;
        Ok(SyncReport { pull, load })
    }

    /// Re-save the project, then commit (and push) whatever changed
    pub async fn commit_changes(
        &mut self,
        project_path: &str,
        message: &str,
    ) -> Result<CommitOutcome> {
        let key = normalize_project_path(project_path);
        if self.projects.contains_key(&key) {
            self.persist(&key).await?;
        }
        self.vcs.commit_and_maybe_push(message).await
    }

    async fn ensure_loaded(&mut self, key: &str) -> Result<()> {
        if !self.projects.contains_key(key) {
            self.load(key).await?;
        }
        Ok(())
    }

    fn find_mut(&mut self, key: &str, id: &AnnotationId) -> Option<&mut Annotation> {
        self.projects
            .get_mut(key)
            .and_then(|c| c.iter_mut().find(|a| &a.id == id))
    }

    /// Rewrite the project's whole document
    async fn persist(&self, key: &str) -> Result<()> {
        let root = self
            .vcs
            .repo_root()
            .ok_or(StoreError::RepositoryNotInitialized)?;
        let path = location_for(key, root);

        let document = DocumentRef {
            version: DOCUMENT_VERSION,
            annotations: self.all_annotations(key),
        };
        let mut bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| StoreError::storage_write(&path, e))?;
        bytes.push(b'\n');

        write_document(&path, &bytes).await?;
        log::debug!(
            "Saved {} annotations to {}",
            document.annotations.len(),
            path.display()
        );
        Ok(())
    }
}

/// Bind loaded annotations to the local project and drop repeated ids
fn adopt(annotations: Vec<Annotation>, key: &str) -> Vec<Annotation> {
    let mut seen = std::collections::HashSet::new();
    annotations
        .into_iter()
        .filter_map(|mut a| {
            if !seen.insert(a.id.clone()) {
                log::warn!("Duplicate annotation id {} in {}, keeping the first", a.id, key);
                return None;
            }
            a.project_path = key.to_string();
            Some(a)
        })
        .collect()
}

/// Write to a sibling temp file, then rename over the document
async fn write_document(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::storage_write(path, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::storage_write(path, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // A stray temp file would be swept into the next commit.
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            log::warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(StoreError::storage_write(path, e));
    }
    Ok(())
}

/// Keep a copy of an unusable document next to it
async fn quarantine(path: &Path, bytes: &[u8]) {
    let copy = path.with_extension(format!("json.{QUARANTINE_SUFFIX}"));
    match tokio::fs::write(&copy, bytes).await {
        Ok(()) => log::warn!("Kept unreadable annotation document as {}", copy.display()),
        Err(e) => log::warn!("Could not keep a copy of {}: {}", path.display(), e),
    }
}
