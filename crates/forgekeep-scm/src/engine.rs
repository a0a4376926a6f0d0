//! `GitEngine`: the façade the rest of the workspace calls into. Every
//! method here is a thin dispatch to the corresponding module
//! (`refs`, `commits`, `tree`, `blame`, `diff`, `pack`, `language_stats`,
//! `maintenance`); the engine's job is to own the `StorageBackend` handle
//! and translate storage keys into filesystem paths before delegating.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, ScmError};
use crate::maintenance::MaintenanceTask;
use crate::storage::StorageBackend;
use crate::types::{
	Branch, Commit, DiffResult, FileContent, LanguageStats, Tag, TagSignature, TreeEntry,
};

#[derive(Clone)]
pub struct GitEngine {
	storage: Arc<dyn StorageBackend>,
}

impl GitEngine {
	pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
		Self { storage }
	}

	fn resolve(&self, git_path: &str) -> Result<PathBuf> {
		self.storage.absolute_path(git_path)
	}

	#[tracing::instrument(skip(self))]
	pub async fn init_repository(&self, git_path: &str, bare: bool) -> Result<()> {
		let path = self.resolve(git_path)?;
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| ScmError::Storage(e.to_string()))?;
		}
		tokio::task::spawn_blocking({
			let path = path.clone();
			move || {
				let mut opts = gix::create::Options::default();
				opts.destination_must_be_empty = true;
				let kind = if bare {
					gix::create::Kind::Bare
				} else {
					gix::create::Kind::WithWorktree
				};
				gix::create::into(&path, kind, opts)
					.map_err(|e| ScmError::Storage(e.to_string()))?;
				Ok::<(), ScmError>(())
			}
		})
		.await
		.map_err(|e| ScmError::Internal(e.to_string()))??;

		if bare {
			self.run_update_server_info(git_path).await.ok();
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn clone_repository(&self, source: &str, dest: &str, bare: bool) -> Result<()> {
		let source_path = self.resolve(source)?;
		let dest_path = self.resolve(dest)?;
		if let Some(parent) = dest_path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| ScmError::Storage(e.to_string()))?;
		}
		tokio::task::spawn_blocking(move || {
			let url = gix::url::parse(
				source_path
					.to_string_lossy()
					.as_bytes()
					.into(),
			)
			.map_err(|e| ScmError::InvalidName(e.to_string()))?;
			let interrupt = std::sync::atomic::AtomicBool::new(false);
			if bare {
				let mut prepare = gix::prepare_clone_bare(url, &dest_path)
					.map_err(|e| ScmError::Network(e.to_string()))?;
				prepare
					.fetch_only(gix::progress::Discard, &interrupt)
					.map_err(|e| ScmError::Network(e.to_string()))?;
			} else {
				let mut prepare = gix::prepare_clone(url, &dest_path)
					.map_err(|e| ScmError::Network(e.to_string()))?;
				prepare
					.fetch_then_checkout(gix::progress::Discard, &interrupt)
					.map_err(|e| ScmError::Network(e.to_string()))?;
			}
			Ok::<(), ScmError>(())
		})
		.await
		.map_err(|e| ScmError::Internal(e.to_string()))??;
		Ok(())
	}

	pub async fn list_branches(&self, git_path: &str) -> Result<Vec<Branch>> {
		crate::refs::list_branches(&self.resolve(git_path)?).await
	}

	pub async fn list_tags(&self, git_path: &str) -> Result<Vec<Tag>> {
		crate::refs::list_tags(&self.resolve(git_path)?).await
	}

	pub async fn get_branch(&self, git_path: &str, name: &str) -> Result<Branch> {
		crate::refs::get_branch(&self.resolve(git_path)?, name).await
	}

	pub async fn get_tag(&self, git_path: &str, name: &str) -> Result<Tag> {
		crate::refs::get_tag(&self.resolve(git_path)?, name).await
	}

	pub async fn branch_exists(&self, git_path: &str, name: &str) -> Result<bool> {
		crate::refs::branch_exists(&self.resolve(git_path)?, name).await
	}

	pub async fn create_branch(&self, git_path: &str, name: &str, start_point: &str) -> Result<()> {
		crate::refs::create_branch(&self.resolve(git_path)?, name, start_point).await
	}

	pub async fn delete_branch(&self, git_path: &str, name: &str) -> Result<()> {
		crate::refs::delete_branch(&self.resolve(git_path)?, name).await
	}

	pub async fn create_tag(
		&self,
		git_path: &str,
		name: &str,
		target_ref: &str,
		annotation: Option<(&str, &TagSignature)>,
	) -> Result<()> {
		crate::refs::create_tag(&self.resolve(git_path)?, name, target_ref, annotation).await
	}

	pub async fn delete_tag(&self, git_path: &str, name: &str) -> Result<()> {
		crate::refs::delete_tag(&self.resolve(git_path)?, name).await
	}

	pub async fn get_head_branch(&self, git_path: &str) -> Result<Option<String>> {
		crate::refs::get_head_branch(&self.resolve(git_path)?).await
	}

	pub async fn set_head_branch(&self, git_path: &str, name: &str) -> Result<()> {
		crate::refs::set_head_branch(&self.resolve(git_path)?, name).await
	}

	pub async fn get_commits(
		&self,
		git_path: &str,
		ref_spec: &str,
		limit: Option<u32>,
		offset: u64,
	) -> Result<Vec<Commit>> {
		crate::commits::get_commits(&self.resolve(git_path)?, ref_spec, limit, offset).await
	}

	pub async fn get_commit(&self, git_path: &str, hash: &str) -> Result<Commit> {
		crate::commits::get_commit(&self.resolve(git_path)?, hash).await
	}

	pub async fn get_tree(&self, git_path: &str, ref_spec: &str, tree_path: &str) -> Result<Vec<TreeEntry>> {
		crate::tree::get_tree(&self.resolve(git_path)?, ref_spec, tree_path).await
	}

	pub async fn get_file_content(&self, git_path: &str, ref_spec: &str, file_path: &str) -> Result<FileContent> {
		crate::tree::get_file_content(&self.resolve(git_path)?, ref_spec, file_path).await
	}

	pub async fn get_blame(&self, git_path: &str, ref_spec: &str, file_path: &str) -> Result<Vec<crate::types::BlameLine>> {
		crate::blame::get_blame(&self.resolve(git_path)?, ref_spec, file_path).await
	}

	pub async fn get_diff(&self, git_path: &str, commit: &str) -> Result<DiffResult> {
		crate::diff::get_diff(&self.resolve(git_path)?, commit).await
	}

	pub async fn get_compare_diff(&self, git_path: &str, from: &str, to: &str) -> Result<DiffResult> {
		crate::diff::get_compare_diff(&self.resolve(git_path)?, from, to).await
	}

	pub async fn language_stats(&self, git_path: &str) -> Result<LanguageStats> {
		crate::language_stats::compute_language_stats(&self.resolve(git_path)?).await
	}

	pub async fn get_info_refs(&self, git_path: &str, service: &str) -> Result<Vec<u8>> {
		crate::pack::get_info_refs(&self.resolve(git_path)?, service).await
	}

	pub async fn upload_pack(&self, git_path: &str, input: &[u8], cancel: CancellationToken) -> Result<Vec<u8>> {
		crate::pack::upload_pack(&self.resolve(git_path)?, input, cancel).await
	}

	/// Runs `receive-pack`, then unconditionally attempts
	/// `update-server-info` per spec §4.1 (failure there is logged, never
	/// propagated).
	pub async fn receive_pack(&self, git_path: &str, input: &[u8], cancel: CancellationToken) -> Result<Vec<u8>> {
		let result = crate::pack::receive_pack(&self.resolve(git_path)?, input, cancel).await?;
		if let Err(e) = self.run_update_server_info(git_path).await {
			tracing::warn!(error = %e, git_path, "update-server-info failed after receive-pack");
		}
		Ok(result)
	}

	pub fn spawn_stateful_pack(&self, git_path: &str, service: &str) -> Result<tokio::process::Child> {
		crate::pack::spawn_stateful(&self.resolve(git_path)?, service)
	}

	pub async fn run_update_server_info(&self, git_path: &str) -> Result<()> {
		let path = self.resolve(git_path)?;
		let out = crate::process::run_git(&path, &["update-server-info"], None).await?;
		crate::process::require_success(&out, "update-server-info failed")
	}

	pub async fn run_maintenance(&self, git_path: &str, task: MaintenanceTask) -> Result<String> {
		crate::maintenance::run_maintenance(&self.resolve(git_path)?, task).await
	}

	pub async fn delete_repository_directory(&self, git_path: &str) -> Result<()> {
		self.storage.delete(git_path).await
	}

	pub async fn repository_exists(&self, git_path: &str) -> Result<bool> {
		self.storage.exists(git_path).await
	}

	pub fn absolute_path(&self, git_path: &str) -> Result<PathBuf> {
		self.resolve(git_path)
	}

	pub async fn move_repository_directory(&self, from: &str, to: &str) -> Result<()> {
		self.storage.move_key(from, to).await
	}
}

/// Verifies invariant U1: `git_path` names a valid bare directory whose
/// branch listing succeeds.
pub async fn verify_repository_invariant(engine: &GitEngine, git_path: &str) -> Result<()> {
	if !engine.repository_exists(git_path).await? {
		return Err(ScmError::NotFound);
	}
	engine.list_branches(git_path).await?;
	Ok(())
}
