//! Downstream push: `git push --mirror` against the downstream remote, run
//! as a subprocess since gix does not implement the push side of the smart
//! protocol (the same limitation `GitEngine`'s pack services work around).

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::error::{MirrorError, Result};

#[instrument(skip(authenticated_url))]
pub async fn push_downstream(repo_path: &Path, authenticated_url: &str) -> Result<()> {
	debug!(path = ?repo_path, "pushing mirror to downstream remote");
	let output = Command::new("git")
		.args(["push", "--mirror", authenticated_url])
		.current_dir(repo_path)
		.output()
		.await?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
		error!(error = %stderr, "downstream push failed");
		return Err(MirrorError::GitError(stderr));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn pushes_all_refs_to_a_local_bare_remote() {
		let temp = tempfile::tempdir().unwrap();
		let source_path = temp.path().join("source.git");
		let downstream_path = temp.path().join("downstream.git");

		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(&source_path)
			.output()
			.unwrap();
		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(&downstream_path)
			.output()
			.unwrap();

		let downstream_url = format!("file://{}", downstream_path.display());
		push_downstream(&source_path, &downstream_url).await.unwrap();
	}
}
