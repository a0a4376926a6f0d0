//! Upstream fetch: clones the upstream remote into the bare repository the
//! first time, then fetches into it on every later sync.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use gix::progress::Discard;
use tracing::{debug, info, instrument};

use crate::error::{MirrorError, Result};

#[instrument(skip(authenticated_url))]
pub async fn fetch_upstream(target_path: &Path, authenticated_url: &str) -> Result<()> {
	if target_path.exists() {
		fetch_into_existing(target_path, authenticated_url).await
	} else {
		clone_bare(target_path, authenticated_url).await
	}
}

async fn clone_bare(target_path: &Path, url: &str) -> Result<()> {
	info!(path = ?target_path, "cloning upstream into bare repository");
	if let Some(parent) = target_path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	let url = url.to_string();
	let path = target_path.to_path_buf();

	tokio::task::spawn_blocking(move || {
		let interrupt = AtomicBool::new(false);
		let parsed = gix::url::parse(url.as_str().into())
			.map_err(|e| MirrorError::InvalidUrl(e.to_string()))?;
		let mut prepare =
			gix::prepare_clone_bare(parsed, &path).map_err(|e| MirrorError::GitError(e.to_string()))?;
		prepare
			.fetch_only(Discard, &interrupt)
			.map_err(|e| MirrorError::GitError(e.to_string()))?;
		Ok::<(), MirrorError>(())
	})
	.await
	.map_err(|e| MirrorError::GitError(e.to_string()))?
}

async fn fetch_into_existing(target_path: &Path, url: &str) -> Result<()> {
	debug!(path = ?target_path, "fetching upstream updates");
	let url = url.to_string();
	let path = target_path.to_path_buf();

	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path).map_err(|e| MirrorError::GitError(e.to_string()))?;
		let remote_url =
			gix::url::parse(url.as_str().into()).map_err(|e| MirrorError::InvalidUrl(e.to_string()))?;
		let remote = repo
			.remote_at(remote_url)
			.map_err(|e| MirrorError::GitError(e.to_string()))?;
		let interrupt = AtomicBool::new(false);
		remote
			.connect(gix::remote::Direction::Fetch)
			.map_err(|e| MirrorError::GitError(e.to_string()))?
			.prepare_fetch(Discard, Default::default())
			.map_err(|e| MirrorError::GitError(e.to_string()))?
			.receive(Discard, &interrupt)
			.map_err(|e| MirrorError::GitError(e.to_string()))?;
		Ok::<(), MirrorError>(())
	})
	.await
	.map_err(|e| MirrorError::GitError(e.to_string()))?
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn clones_a_local_bare_source() {
		let temp = tempfile::tempdir().unwrap();
		let source_path = temp.path().join("source.git");
		let target_path = temp.path().join("target.git");

		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(&source_path)
			.output()
			.unwrap();

		let source_url = format!("file://{}", source_path.display());
		fetch_upstream(&target_path, &source_url).await.unwrap();

		assert!(target_path.exists());
		let repo = gix::open(&target_path).unwrap();
		assert!(repo.is_bare());
	}
}
