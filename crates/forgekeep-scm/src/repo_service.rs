//! `RepoService`: repository CRUD coordinated across `GitEngine` +
//! `StorageBackend` + `MetadataStore`, with rollback on partial failure
//! (§4.3). Every mutating method here keeps on-disk Git state and the
//! metadata row mutually consistent, in the specific order the spec
//! prescribes for each operation.

use std::sync::Arc;

use chrono::Utc;
use forgekeep_db::{RepositoryRecord, RepositoryStore, UserStore};
use uuid::Uuid;

use crate::engine::GitEngine;
use crate::error::{Result, ScmError};

/// Repository-name validation shared with the `(owner_id, name)` identity:
/// non-empty, <=100 chars, charset `[A-Za-z0-9_.-]`, not `.`/`..`, must not
/// contain `..`, must not start with `.` or `-`. Enforced before any I/O so
/// a hostile name can never reach a filesystem path or subprocess argument.
pub fn validate_repo_name(name: &str) -> Result<()> {
	if name.is_empty() || name.len() > 100 {
		return Err(ScmError::InvalidName("name must be 1-100 characters".into()));
	}
	if name == "." || name == ".." {
		return Err(ScmError::InvalidName("invalid name".into()));
	}
	if name.contains("..") {
		return Err(ScmError::InvalidName("name cannot contain '..'".into()));
	}
	if name.starts_with('.') || name.starts_with('-') {
		return Err(ScmError::InvalidName("name cannot start with '.' or '-'".into()));
	}
	if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') {
		return Err(ScmError::InvalidName(
			"name may only contain letters, digits, '-', '_', '.'".into(),
		));
	}
	Ok(())
}

pub struct RepoService<R: RepositoryStore, U: UserStore> {
	engine: GitEngine,
	repos: Arc<R>,
	users: Arc<U>,
}

impl<R: RepositoryStore, U: UserStore> RepoService<R, U> {
	pub fn new(engine: GitEngine, repos: Arc<R>, users: Arc<U>) -> Self {
		Self { engine, repos, users }
	}

	fn git_path_for(&self, owner_username: &str, name: &str) -> String {
		format!("{owner_username}/{name}.git")
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id, name = %name))]
	pub async fn create_repository(
		&self,
		owner_id: Uuid,
		name: &str,
		description: Option<String>,
		is_private: bool,
	) -> Result<RepositoryRecord> {
		validate_repo_name(name)?;

		let owner = self
			.users
			.get_user_by_id(owner_id)
			.await?
			.ok_or(ScmError::NotFound)?;

		if self
			.repos
			.get_repository_by_owner_and_name(owner_id, name)
			.await?
			.is_some()
		{
			return Err(ScmError::AlreadyExists);
		}

		let git_path = self.git_path_for(&owner.username, name);
		self.engine.init_repository(&git_path, true).await?;

		let now = Utc::now();
		let record = RepositoryRecord {
			id: Uuid::new_v4(),
			owner_id,
			name: name.to_string(),
			is_private,
			description,
			default_branch: "main".to_string(),
			git_path: git_path.clone(),
			created_at: now,
			updated_at: now,
		};

		if let Err(e) = self.repos.create_repository(&record).await {
			if let Err(cleanup_err) = self.engine.delete_repository_directory(&git_path).await {
				tracing::warn!(error = %cleanup_err, git_path, "failed to roll back git directory after metadata insert failure");
			}
			return Err(e.into());
		}
		Ok(record)
	}

	#[tracing::instrument(skip(self), fields(repository_id = %id))]
	pub async fn delete_repository(&self, id: Uuid) -> Result<()> {
		let repo = self.repos.get_repository_by_id(id).await?.ok_or(ScmError::NotFound)?;
		self.repos.delete_repository(id).await?;
		if let Err(e) = self.engine.delete_repository_directory(&repo.git_path).await {
			tracing::error!(
				error = %e,
				git_path = %repo.git_path,
				"failed to remove git directory after metadata delete; leaking for manual cleanup"
			);
		}
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(repository_id = %id, new_owner_id = %new_owner_id))]
	pub async fn transfer_repository(&self, id: Uuid, new_owner_id: Uuid) -> Result<RepositoryRecord> {
		let mut repo = self.repos.get_repository_by_id(id).await?.ok_or(ScmError::NotFound)?;
		let new_owner = self
			.users
			.get_user_by_id(new_owner_id)
			.await?
			.ok_or(ScmError::NotFound)?;

		if self
			.repos
			.get_repository_by_owner_and_name(new_owner_id, &repo.name)
			.await?
			.is_some()
		{
			return Err(ScmError::AlreadyExists);
		}

		let new_git_path = self.git_path_for(&new_owner.username, &repo.name);
		self.engine
			.move_repository_directory(&repo.git_path, &new_git_path)
			.await?;

		let old_git_path = repo.git_path.clone();
		repo.owner_id = new_owner_id;
		repo.git_path = new_git_path.clone();
		repo.updated_at = Utc::now();

		if let Err(e) = self.repos.update_repository(&repo).await {
			if let Err(move_back_err) = self
				.engine
				.move_repository_directory(&new_git_path, &old_git_path)
				.await
			{
				tracing::error!(error = %move_back_err, "failed to move repository directory back after failed transfer");
			}
			return Err(e.into());
		}
		Ok(repo)
	}

	#[tracing::instrument(skip(self, new_name), fields(source_id = %source_id, new_owner_id = %new_owner_id))]
	pub async fn fork_repository(
		&self,
		source_id: Uuid,
		new_owner_id: Uuid,
		new_name: Option<String>,
	) -> Result<RepositoryRecord> {
		let source = self.repos.get_repository_by_id(source_id).await?.ok_or(ScmError::NotFound)?;
		let source_owner = self
			.users
			.get_user_by_id(source.owner_id)
			.await?
			.ok_or(ScmError::NotFound)?;
		let new_owner = self
			.users
			.get_user_by_id(new_owner_id)
			.await?
			.ok_or(ScmError::NotFound)?;

		let name = new_name.unwrap_or_else(|| source.name.clone());
		validate_repo_name(&name)?;

		if self
			.repos
			.get_repository_by_owner_and_name(new_owner_id, &name)
			.await?
			.is_some()
		{
			return Err(ScmError::AlreadyExists);
		}

		let new_git_path = self.git_path_for(&new_owner.username, &name);
		self.engine
			.clone_repository(&source.git_path, &new_git_path, true)
			.await?;

		let now = Utc::now();
		let record = RepositoryRecord {
			id: Uuid::new_v4(),
			owner_id: new_owner_id,
			name,
			is_private: source.is_private,
			description: Some(format!("Fork of {}/{}", source_owner.username, source.name)),
			default_branch: source.default_branch.clone(),
			git_path: new_git_path.clone(),
			created_at: now,
			updated_at: now,
		};

		if let Err(e) = self.repos.create_repository(&record).await {
			if let Err(cleanup_err) = self.engine.delete_repository_directory(&new_git_path).await {
				tracing::warn!(error = %cleanup_err, git_path = %new_git_path, "failed to remove cloned directory after failed fork");
			}
			return Err(e.into());
		}
		Ok(record)
	}

	/// Invoked after every successful receive-pack. Never fails push
	/// processing: logs and returns `Ok(())` even when the cascade itself
	/// cannot find a branch to fall back to.
	#[tracing::instrument(skip(self), fields(repository_id = %repo.id))]
	pub async fn set_default_branch_on_push(&self, repo: &RepositoryRecord) -> Result<()> {
		if !repo.default_branch.is_empty()
			&& self.engine.branch_exists(&repo.git_path, &repo.default_branch).await.unwrap_or(false)
		{
			return Ok(());
		}

		let head = self.engine.get_head_branch(&repo.git_path).await.unwrap_or(None);
		let chosen = match head {
			Some(branch) => branch,
			None => {
				let branches = match self.engine.list_branches(&repo.git_path).await {
					Ok(b) => b,
					Err(e) => {
						tracing::warn!(error = %e, "could not list branches for default-branch cascade");
						return Ok(());
					}
				};
				match branches.into_iter().next() {
					Some(b) => {
						if let Err(e) = self.engine.set_head_branch(&repo.git_path, &b.name).await {
							tracing::warn!(error = %e, "failed to rewrite HEAD during default-branch cascade");
						}
						b.name
					}
					None => return Ok(()),
				}
			}
		};

		let mut updated = repo.clone();
		updated.default_branch = chosen;
		updated.updated_at = Utc::now();
		if let Err(e) = self.repos.update_repository(&updated).await {
			tracing::warn!(error = %e, "failed to persist default-branch cascade result");
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, description), fields(repository_id = %id))]
	pub async fn update_repository(
		&self,
		id: Uuid,
		description: Option<Option<String>>,
		is_private: Option<bool>,
		default_branch: Option<String>,
	) -> Result<RepositoryRecord> {
		let mut repo = self.repos.get_repository_by_id(id).await?.ok_or(ScmError::NotFound)?;

		if let Some(ref new_default) = default_branch {
			if !self.engine.branch_exists(&repo.git_path, new_default).await? {
				return Err(ScmError::NotFound);
			}
			self.engine.set_head_branch(&repo.git_path, new_default).await?;
			repo.default_branch = new_default.clone();
		}
		if let Some(description) = description {
			repo.description = description;
		}
		if let Some(is_private) = is_private {
			repo.is_private = is_private;
		}
		repo.updated_at = Utc::now();
		self.repos.update_repository(&repo).await?;
		Ok(repo)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn rejects_traversal_and_dotfiles() {
		assert!(validate_repo_name("..").is_err());
		assert!(validate_repo_name(".").is_err());
		assert!(validate_repo_name("../escape").is_err());
		assert!(validate_repo_name(".hidden").is_err());
		assert!(validate_repo_name("-flag").is_err());
		assert!(validate_repo_name("has space").is_err());
		assert!(validate_repo_name("semi;colon").is_err());
	}

	#[test]
	fn accepts_ordinary_names() {
		assert!(validate_repo_name("my-repo").is_ok());
		assert!(validate_repo_name("my_repo.rs").is_ok());
	}

	#[test]
	fn rejects_too_long() {
		let long = "a".repeat(101);
		assert!(validate_repo_name(&long).is_err());
	}

	proptest! {
		#[test]
		fn prop_valid_names_never_contain_traversal(name in "[A-Za-z][A-Za-z0-9_.-]{0,80}") {
			if validate_repo_name(&name).is_ok() {
				prop_assert!(!name.contains(".."));
			}
		}
	}
}
