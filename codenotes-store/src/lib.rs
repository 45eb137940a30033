//! Codenotes Annotation Store
//!
//! Git-backed storage for line annotations: notes attached to a line of a
//! source file, kept outside the source tree and shared through an ordinary
//! git repository.
//!
//! ## Layout
//!
//! - [`path_hash`] maps a project path to `<basename>_<digest>/annotations.json`
//! - [`vcs`] drives git (init, commit, push, pull, identity)
//! - [`storage`] holds the in-memory index and persists every mutation
//!
//! ## Example
//!
//! ```ignore
//! use codenotes_store::{Annotation, AnnotationStore, GitAdapter, VersionControl};
//!
//! let mut store = AnnotationStore::new(GitAdapter::new());
//! store.initialize(&repo_root).await?;
//! store.load("/home/dev/app").await?;
//!
//! let author = store.vcs().identity().await.identity.name;
//! store.add(Annotation::new("/home/dev/app", "src/main.rs", 42, "why?", author)).await?;
//! store.commit_changes("/home/dev/app", "Add annotation to src/main.rs").await?;
//! ```

pub mod annotation;
pub mod error;
pub mod migration;
pub mod path_hash;
pub mod storage;
pub mod vcs;

// Re-exports for convenience
pub use annotation::{Annotation, AnnotationData, AnnotationId, DOCUMENT_VERSION};
pub use error::{Result, StorageReadWarning, StoreError, SyncOperation};
pub use path_hash::{location_for, normalize_project_path, project_dir_name, relative_file_path};
pub use storage::{AnnotationStore, DocumentState, LoadReport, Lookup, SyncReport};
pub use vcs::{
    CommitOutcome, GitAdapter, Identity, IdentityWarning, PullOutcome, ResolvedIdentity,
    VersionControl,
};
