//! `MirrorScheduler`: the tick loop described in §4.4. One long-lived task
//! wakes up every `interval`, decides which mirror-enabled repositories are
//! due, claims each with the `status` CAS, and spawns a detached sync task
//! per claimed repository. The CAS in `RepositoryStore::try_claim_sync` is
//! the only single-flight guard; there is no in-memory lock map.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgekeep_credentials::CredentialStore;
use forgekeep_db::RepositoryStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::due::is_due;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(3600);

pub struct MirrorScheduler {
	repository_store: Arc<dyn RepositoryStore>,
	credentials: Arc<dyn CredentialStore>,
	git_root: PathBuf,
	interval: Duration,
	cancellation: CancellationToken,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl MirrorScheduler {
	pub fn new(
		repository_store: Arc<dyn RepositoryStore>,
		credentials: Arc<dyn CredentialStore>,
		git_root: PathBuf,
	) -> Self {
		Self::with_interval(repository_store, credentials, git_root, DEFAULT_TICK_INTERVAL)
	}

	pub fn with_interval(
		repository_store: Arc<dyn RepositoryStore>,
		credentials: Arc<dyn CredentialStore>,
		git_root: PathBuf,
		interval: Duration,
	) -> Self {
		Self {
			repository_store,
			credentials,
			git_root,
			interval,
			cancellation: CancellationToken::new(),
			handle: Mutex::new(None),
		}
	}

	/// Spawns the tick loop. Idempotent-unsafe: calling twice without an
	/// intervening `shutdown` leaks the first loop's handle.
	#[instrument(skip(self))]
	pub async fn start(self: &Arc<Self>) {
		let scheduler = Arc::clone(self);
		let cancellation = self.cancellation.clone();

		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(scheduler.interval) => {
						scheduler.tick().await;
					}
					_ = cancellation.cancelled() => {
						info!("mirror scheduler shutting down");
						break;
					}
				}
			}
		});

		*self.handle.lock().await = Some(task);
		info!(interval_secs = self.interval.as_secs(), "mirror scheduler started");
	}

	/// Signals the ticker and waits for the run loop to exit. Per §4.4,
	/// in-flight per-repository sync tasks are not awaited here; they
	/// complete in the background and still persist their own outcome.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		self.cancellation.cancel();
		if let Some(handle) = self.handle.lock().await.take() {
			let _ = handle.await;
		}
	}

	/// Runs one scan: load enabled mirrors, skip ones already syncing or not
	/// yet due, claim the rest, and spawn a detached sync task per claim.
	#[instrument(skip(self))]
	pub async fn tick(self: &Arc<Self>) {
		let configs = match self.repository_store.list_enabled_mirror_configs().await {
			Ok(configs) => configs,
			Err(e) => {
				warn!(error = %e, "failed to list mirror-enabled repositories");
				return;
			}
		};

		let now = Utc::now();
		let mut claimed = 0usize;

		for config in configs {
			if config.status == "syncing" {
				continue;
			}
			match is_due(&config, now) {
				Ok(false) => continue,
				Ok(true) => {}
				Err(e) => {
					warn!(repository_id = %config.repository_id, error = %e, "skipping mirror with unparseable schedule");
					continue;
				}
			}

			match self.repository_store.try_claim_sync(config.repository_id).await {
				Ok(true) => {}
				Ok(false) => {
					debug!(repository_id = %config.repository_id, "lost the claim race, another task owns this sync");
					continue;
				}
				Err(e) => {
					warn!(repository_id = %config.repository_id, error = %e, "failed to claim mirror sync");
					continue;
				}
			}

			claimed += 1;
			let scheduler = Arc::clone(self);
			tokio::spawn(async move {
				scheduler.run_claimed_sync(config).await;
			});
		}

		debug!(claimed, "mirror scheduler tick complete");
	}

	/// Forces an immediate sync of one repository outside the tick schedule
	/// (`POST /repos/{owner}/{repo}/sync`). Uses the same claim as `tick`,
	/// so a manual trigger and a due scheduled sync can never race each
	/// other. Returns `false` if the repository has no mirror configured or
	/// a sync is already in flight.
	#[instrument(skip(self))]
	pub async fn sync_now(self: &Arc<Self>, repository_id: uuid::Uuid) -> Result<bool, forgekeep_db::DbError> {
		let Some(config) = self.repository_store.get_mirror_config(repository_id).await? else {
			return Ok(false);
		};
		if !config.enabled {
			return Ok(false);
		}
		if !self.repository_store.try_claim_sync(repository_id).await? {
			return Ok(false);
		}

		let scheduler = Arc::clone(self);
		tokio::spawn(async move {
			scheduler.run_claimed_sync(config).await;
		});
		Ok(true)
	}

	async fn run_claimed_sync(&self, config: forgekeep_db::MirrorConfigRecord) {
		let repository_id = config.repository_id;

		let git_path = match self.repository_store.get_repository_by_id(repository_id).await {
			Ok(Some(repo)) => self.git_root.join(&repo.git_path),
			Ok(None) => {
				warn!(%repository_id, "mirror config references a repository that no longer exists");
				let _ = self
					.repository_store
					.finish_sync(repository_id, "failed", Some("repository not found"), Utc::now())
					.await;
				return;
			}
			Err(e) => {
				warn!(%repository_id, error = %e, "failed to load repository for mirror sync");
				let _ = self
					.repository_store
					.finish_sync(repository_id, "failed", Some(&e.to_string()), Utc::now())
					.await;
				return;
			}
		};

		let outcome = forgekeep_mirror::sync_repository(&git_path, &config, self.credentials.as_ref()).await;
		info!(%repository_id, status = outcome.status, "mirror sync finished");

		if let Err(e) = self
			.repository_store
			.finish_sync(repository_id, outcome.status, outcome.last_error.as_deref(), Utc::now())
			.await
		{
			warn!(%repository_id, error = %e, "failed to persist mirror sync outcome");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use forgekeep_credentials::MemoryCredentialStore;
	use forgekeep_db::{MirrorConfigRecord, RepositoryRecord};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct StubRepositoryStore {
		configs: Vec<MirrorConfigRecord>,
		repo: RepositoryRecord,
		claim_calls: AtomicUsize,
		finish_calls: AtomicUsize,
	}

	#[async_trait::async_trait]
	impl RepositoryStore for StubRepositoryStore {
		async fn create_repository(&self, _repo: &RepositoryRecord) -> forgekeep_db::Result<()> {
			unimplemented!()
		}
		async fn get_repository_by_id(&self, _id: uuid::Uuid) -> forgekeep_db::Result<Option<RepositoryRecord>> {
			Ok(Some(self.repo.clone()))
		}
		async fn get_repository_by_owner_and_name(
			&self,
			_owner_id: uuid::Uuid,
			_name: &str,
		) -> forgekeep_db::Result<Option<RepositoryRecord>> {
			unimplemented!()
		}
		async fn list_repositories_by_owner(&self, _owner_id: uuid::Uuid) -> forgekeep_db::Result<Vec<RepositoryRecord>> {
			unimplemented!()
		}
		async fn list_public_repositories(&self, _limit: i64, _offset: i64) -> forgekeep_db::Result<Vec<RepositoryRecord>> {
			unimplemented!()
		}
		async fn update_repository(&self, _repo: &RepositoryRecord) -> forgekeep_db::Result<()> {
			unimplemented!()
		}
		async fn delete_repository(&self, _id: uuid::Uuid) -> forgekeep_db::Result<()> {
			unimplemented!()
		}
		async fn upsert_mirror_config(&self, _config: &MirrorConfigRecord) -> forgekeep_db::Result<()> {
			unimplemented!()
		}
		async fn get_mirror_config(&self, repository_id: uuid::Uuid) -> forgekeep_db::Result<Option<MirrorConfigRecord>> {
			Ok(self.configs.iter().find(|c| c.repository_id == repository_id).cloned())
		}
		async fn list_enabled_mirror_configs(&self) -> forgekeep_db::Result<Vec<MirrorConfigRecord>> {
			Ok(self.configs.clone())
		}
		async fn try_claim_sync(&self, _repository_id: uuid::Uuid) -> forgekeep_db::Result<bool> {
			self.claim_calls.fetch_add(1, Ordering::SeqCst);
			Ok(true)
		}
		async fn finish_sync(
			&self,
			_repository_id: uuid::Uuid,
			_status: &str,
			_last_error: Option<&str>,
			_synced_at: chrono::DateTime<Utc>,
		) -> forgekeep_db::Result<()> {
			self.finish_calls.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn test_repo() -> RepositoryRecord {
		RepositoryRecord {
			id: uuid::Uuid::new_v4(),
			owner_id: uuid::Uuid::new_v4(),
			name: "widget".to_string(),
			is_private: false,
			description: None,
			default_branch: "main".to_string(),
			git_path: "owner/widget.git".to_string(),
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	fn due_config(repository_id: uuid::Uuid) -> MirrorConfigRecord {
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
	async fn tick_claims_due_repositories_and_records_an_outcome() {
		let repo = test_repo();
		let store = Arc::new(StubRepositoryStore {
			configs: vec![due_config(repo.id)],
			repo,
			claim_calls: AtomicUsize::new(0),
			finish_calls: AtomicUsize::new(0),
		});
		let credentials = Arc::new(MemoryCredentialStore::new());
		let temp = tempfile::tempdir().unwrap();

		let scheduler = Arc::new(MirrorScheduler::new(
			store.clone(),
			credentials,
			temp.path().to_path_buf(),
		));
		scheduler.tick().await;

		// give the detached per-repo task a chance to run
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert_eq!(store.claim_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.finish_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn tick_skips_repositories_already_syncing() {
		let repo = test_repo();
		let mut config = due_config(repo.id);
		config.status = "syncing".to_string();
		let store = Arc::new(StubRepositoryStore {
			configs: vec![config],
			repo,
			claim_calls: AtomicUsize::new(0),
			finish_calls: AtomicUsize::new(0),
		});
		let credentials = Arc::new(MemoryCredentialStore::new());
		let temp = tempfile::tempdir().unwrap();

		let scheduler = Arc::new(MirrorScheduler::new(store.clone(), credentials, temp.path().to_path_buf()));
		scheduler.tick().await;

		assert_eq!(store.claim_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn sync_now_claims_and_spawns_outside_the_tick_schedule() {
		let repo = test_repo();
		let store = Arc::new(StubRepositoryStore {
			configs: vec![due_config(repo.id)],
			repo: repo.clone(),
			claim_calls: AtomicUsize::new(0),
			finish_calls: AtomicUsize::new(0),
		});
		let credentials = Arc::new(MemoryCredentialStore::new());
		let temp = tempfile::tempdir().unwrap();

		let scheduler = Arc::new(MirrorScheduler::new(store.clone(), credentials, temp.path().to_path_buf()));
		assert!(scheduler.sync_now(repo.id).await.unwrap());

		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(store.claim_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.finish_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn sync_now_returns_false_without_a_mirror_config() {
		let repo = test_repo();
		let store = Arc::new(StubRepositoryStore {
			configs: vec![],
			repo,
			claim_calls: AtomicUsize::new(0),
			finish_calls: AtomicUsize::new(0),
		});
		let credentials = Arc::new(MemoryCredentialStore::new());
		let temp = tempfile::tempdir().unwrap();

		let scheduler = Arc::new(MirrorScheduler::new(store.clone(), credentials, temp.path().to_path_buf()));
		assert!(!scheduler.sync_now(uuid::Uuid::new_v4()).await.unwrap());
		assert_eq!(store.claim_calls.load(Ordering::SeqCst), 0);
	}
}
