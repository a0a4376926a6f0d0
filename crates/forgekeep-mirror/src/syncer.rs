//! `MirrorSyncer`: the detached per-repository sync task `MirrorScheduler`
//! spawns once a repository is due (§4.4). One call to [`sync_repository`]
//! performs both legs and returns the outcome; the scheduler owns
//! persisting it via `RepositoryStore::finish_sync`.

use std::path::Path;

use forgekeep_credentials::CredentialStore;
use forgekeep_db::MirrorConfigRecord;
use tracing::{info, instrument, warn};

use crate::direction::Direction;
use crate::fetch::fetch_upstream;
use crate::push::push_downstream;
use crate::url::build_authenticated_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
	pub status: &'static str,
	pub last_error: Option<String>,
}

async fn resolve_remote_url(
	remote_url: &str,
	creds_ref: Option<&str>,
	credentials: &dyn CredentialStore,
) -> Result<String, String> {
	let Some(creds_ref) = creds_ref else {
		return Ok(remote_url.to_string());
	};
	let creds = credentials
		.load(creds_ref)
		.await
		.map_err(|e| e.to_string())?
		.ok_or_else(|| format!("no credential stored for reference {creds_ref}"))?;
	build_authenticated_url(remote_url, &creds).map_err(|e| e.to_string())
}

/// Performs the sync the scheduler decided is due. Never panics or
/// propagates an `Err` — every failure mode is folded into
/// [`SyncOutcome::last_error`] so the scheduler's persistence step always
/// has something to write.
#[instrument(skip(git_path, config, credentials), fields(repository_id = %config.repository_id))]
pub async fn sync_repository(
	git_path: &Path,
	config: &MirrorConfigRecord,
	credentials: &dyn CredentialStore,
) -> SyncOutcome {
	let direction = match Direction::parse(&config.direction) {
		Ok(d) => d,
		Err(e) => {
			return SyncOutcome {
				status: "failed",
				last_error: Some(e.to_string()),
			}
		}
	};

	let mut errors: Vec<String> = Vec::new();
	let mut upstream_failed = false;

	if direction.fetches_upstream() {
		match &config.upstream_url {
			Some(url) => {
				match resolve_remote_url(url, config.upstream_creds_ref.as_deref(), credentials).await {
					Ok(authenticated) => {
						if let Err(e) = fetch_upstream(git_path, &authenticated).await {
							warn!(error = %e, "upstream fetch failed");
							errors.push(format!("upstream: {e}"));
							upstream_failed = true;
						}
					}
					Err(e) => {
						errors.push(format!("upstream: {e}"));
						upstream_failed = true;
					}
				}
			}
			None => {
				errors.push("upstream: no upstream_url configured".to_string());
				upstream_failed = true;
			}
		}
	}

	if direction.pushes_downstream() && !upstream_failed {
		match &config.downstream_url {
			Some(url) => {
				match resolve_remote_url(url, config.downstream_creds_ref.as_deref(), credentials).await {
					Ok(authenticated) => {
						if let Err(e) = push_downstream(git_path, &authenticated).await {
							warn!(error = %e, "downstream push failed");
							errors.push(format!("downstream: {e}"));
						}
					}
					Err(e) => errors.push(format!("downstream: {e}")),
				}
			}
			None => errors.push("downstream: no downstream_url configured".to_string()),
		}
	}

	if errors.is_empty() {
		info!("mirror sync completed");
		SyncOutcome {
			status: "success",
			last_error: None,
		}
	} else {
		SyncOutcome {
			status: "failed",
			last_error: Some(errors.join("; ")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use forgekeep_credentials::MemoryCredentialStore;
	use uuid::Uuid;

	fn base_config(repository_id: Uuid) -> MirrorConfigRecord {
		MirrorConfigRecord {
			repository_id,
			enabled: true,
			direction: "upstream".to_string(),
			upstream_url: None,
			upstream_creds_ref: None,
			downstream_url: None,
			downstream_creds_ref: None,
			sync_interval_seconds: None,
			sync_schedule: None,
			last_synced_at: None,
			status: "idle".to_string(),
			last_error: None,
		}
	}

	#[tokio::test]
	async fn missing_upstream_url_is_a_failure() {
		let credentials = MemoryCredentialStore::new();
		let config = base_config(Uuid::new_v4());
		let temp = tempfile::tempdir().unwrap();
		let outcome = sync_repository(temp.path(), &config, &credentials).await;
		assert_eq!(outcome.status, "failed");
		assert!(outcome.last_error.unwrap().contains("upstream"));
	}

	#[tokio::test]
	async fn unknown_direction_is_a_failure() {
		let credentials = MemoryCredentialStore::new();
		let mut config = base_config(Uuid::new_v4());
		config.direction = "sideways".to_string();
		let temp = tempfile::tempdir().unwrap();
		let outcome = sync_repository(temp.path(), &config, &credentials).await;
		assert_eq!(outcome.status, "failed");
	}

	#[tokio::test]
	async fn fetches_from_local_bare_upstream() {
		let credentials = MemoryCredentialStore::new();
		let temp = tempfile::tempdir().unwrap();
		let source_path = temp.path().join("source.git");
		let target_path = temp.path().join("target.git");
		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(&source_path)
			.output()
			.unwrap();

		let mut config = base_config(Uuid::new_v4());
		config.upstream_url = Some(format!("file://{}", source_path.display()));

		let outcome = sync_repository(&target_path, &config, &credentials).await;
		assert_eq!(outcome.status, "success");
		assert!(target_path.exists());
	}
}
