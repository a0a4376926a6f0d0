//! Git object and ref operations, the two smart-HTTP pack services, and
//! repository lifecycle management — the GitEngine and RepoService
//! components of the hosting service.
//!
//! Everything that walks commits, trees, or refs goes through `gix`,
//! wrapped in `spawn_blocking` since gix's repository handle is not
//! `Send`-friendly across awaits. Everything `gix` cannot do server-side —
//! blame, diff, the pack services, maintenance — shells out to the local
//! `git` binary via `process::run_git`.

pub mod blame;
pub mod commits;
pub mod diff;
pub mod engine;
pub mod error;
pub mod language_stats;
pub mod maintenance;
pub mod pack;
pub mod packetline;
pub mod process;
pub mod refs;
pub mod repo_service;
pub mod resolve;
pub mod storage;
pub mod tree;
pub mod types;

pub use engine::{verify_repository_invariant, GitEngine};
pub use error::{Result, ScmError};
pub use maintenance::MaintenanceTask;
pub use repo_service::{validate_repo_name, RepoService};
pub use storage::{FilesystemStorage, StorageBackend};
pub use types::{
	Branch, BlameLine, Commit, DiffResult, Encoding, EntryKind, FileChangeStatus, FileContent,
	FileDiff, LanguageStats, Tag, TagSignature, TreeEntry,
};
