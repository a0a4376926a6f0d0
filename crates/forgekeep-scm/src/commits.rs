//! `GetCommits` / `GetCommit`: commit history and single-commit metadata,
//! walking from a resolved ref in committer-time order.

use std::path::Path;

use gix::bstr::ByteSlice;

use crate::error::{Result, ScmError};
use crate::types::Commit;

fn gix_err(e: impl std::fmt::Display) -> ScmError {
	ScmError::Git(e.to_string())
}

pub const DEFAULT_LIMIT: u32 = 30;
pub const MAX_LIMIT: u32 = 100;

/// Clamps a caller-supplied limit into `[1, 100]`, defaulting to 30 when unset.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
	limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn commit_from(commit: &gix::Commit<'_>) -> Result<Commit> {
	let hash = commit.id().to_string();
	let parents = commit.parent_ids().map(|id| id.to_string()).collect();
	let author = commit.author().map_err(gix_err)?;
	let committer = commit.committer().map_err(gix_err)?;
	let message = commit.message_raw().map_err(gix_err)?.to_str_lossy().to_string();

	let author_time = author
		.time()
		.map_err(gix_err)?;
	let committer_time = committer
		.time()
		.map_err(gix_err)?;

	Ok(Commit {
		hash,
		parents,
		author_name: author.name.to_string(),
		author_email: author.email.to_string(),
		author_time: chrono::DateTime::from_timestamp(author_time.seconds, 0)
			.unwrap_or_else(chrono::Utc::now),
		committer_name: committer.name.to_string(),
		committer_email: committer.email.to_string(),
		committer_time: chrono::DateTime::from_timestamp(committer_time.seconds, 0)
			.unwrap_or_else(chrono::Utc::now),
		message,
	})
}

pub async fn get_commits(
	path: &Path,
	ref_spec: &str,
	limit: Option<u32>,
	offset: u64,
) -> Result<Vec<Commit>> {
	let path = path.to_path_buf();
	let ref_spec = ref_spec.to_string();
	let limit = clamp_limit(limit) as usize;
	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path).map_err(gix_err)?;
		let start = crate::resolve::resolve_to_commit_id_sync(&repo, &ref_spec)?;

		let walk = repo
			.rev_walk([start])
			.sorting(gix::revision::walk::Sorting::ByCommitTimeNewestFirst)
			.all()
			.map_err(gix_err)?;

		let mut out = Vec::with_capacity(limit);
		for info in walk.skip(offset as usize).take(limit) {
			let info = info.map_err(gix_err)?;
			let commit = info.object().map_err(gix_err)?;
			out.push(commit_from(&commit)?);
		}
		Ok(out)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn get_commit(path: &Path, hash: &str) -> Result<Commit> {
	let path = path.to_path_buf();
	let hash = hash.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path).map_err(gix_err)?;
		let id = crate::resolve::resolve_to_commit_id_sync(&repo, &hash)?;
		let object = repo.find_object(id).map_err(gix_err)?;
		let commit = object.try_into_commit().map_err(|_| ScmError::NotFound)?;
		commit_from(&commit)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clamp_limit_enforces_bounds() {
		assert_eq!(clamp_limit(None), 30);
		assert_eq!(clamp_limit(Some(0)), 1);
		assert_eq!(clamp_limit(Some(500)), 100);
		assert_eq!(clamp_limit(Some(42)), 42);
	}

	#[tokio::test]
	async fn get_commits_on_empty_repo_is_not_found() {
		let tmp = tempfile::tempdir().unwrap();
		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(tmp.path())
			.output()
			.unwrap();
		let err = get_commits(tmp.path(), "", None, 0).await.unwrap_err();
		assert!(matches!(err, ScmError::NotFound | ScmError::Git(_)));
	}
}
