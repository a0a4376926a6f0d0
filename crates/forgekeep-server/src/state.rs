//! Wires every sub-crate into the handles the route handlers share. One
//! `AppState` per process, cloned (cheaply, via the `Arc`s inside) into
//! every axum handler and into the SSH server.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use forgekeep_auth::AuthResolver;
use forgekeep_ci::{CiDispatcher, RunnerClient};
use forgekeep_credentials::{CredentialStore, FileCredentialStore};
use forgekeep_db::{
	create_pool, SqliteCiStore, SqliteRepositoryStore, SqliteSshKeyStore, SqliteTokenStore,
	SqliteUserStore,
};
use forgekeep_scheduler::MirrorScheduler;
use forgekeep_scm::{FilesystemStorage, GitEngine, RepoService};
use forgekeep_transport::{GitHttpState, HealthState, SshState};
use prometheus::Registry;
use sqlx::SqlitePool;

use crate::config::ForgekeepConfig;
use crate::oauth_state::OAuthStateStore;
use crate::oidc::OidcClient;

pub const JWT_ISSUER: &str = "forgekeep";

/// Everything a route handler or background task might need, built once in
/// `main` and shared through `Arc`s the sub-states already hold.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<ForgekeepConfig>,
	pub db_pool: SqlitePool,
	pub users: Arc<SqliteUserStore>,
	pub repos: Arc<SqliteRepositoryStore>,
	pub tokens: Arc<SqliteTokenStore>,
	pub ssh_keys: Arc<SqliteSshKeyStore>,
	pub repo_service: Arc<RepoService<SqliteRepositoryStore, SqliteUserStore>>,
	pub auth: Arc<AuthResolver>,
	pub ci: Option<Arc<CiDispatcher>>,
	pub mirror_scheduler: Arc<MirrorScheduler>,
	pub oidc: Option<Arc<OidcClient>>,
	pub oauth_state: Arc<OAuthStateStore>,
	pub git_http: Arc<GitHttpState>,
	pub ssh: Arc<SshState>,
	pub health: Arc<HealthState>,
}

impl AppState {
	#[tracing::instrument(skip(config))]
	pub async fn build(config: ForgekeepConfig) -> anyhow::Result<Self> {
		let db_pool = create_pool(&config.db_dsn).await?;

		let users = Arc::new(SqliteUserStore::new(db_pool.clone()));
		let repos = Arc::new(SqliteRepositoryStore::new(db_pool.clone()));
		let tokens = Arc::new(SqliteTokenStore::new(db_pool.clone()));
		let ssh_keys = Arc::new(SqliteSshKeyStore::new(db_pool.clone()));

		let storage: Arc<dyn forgekeep_scm::StorageBackend> =
			Arc::new(FilesystemStorage::new(config.storage.base_path.clone()));
		let engine = GitEngine::new(storage);
		let repo_service = Arc::new(RepoService::new(engine.clone(), Arc::clone(&repos), Arc::clone(&users)));

		let auth = Arc::new(AuthResolver::new(
			config.oidc.jwt_secret.clone(),
			JWT_ISSUER,
			Arc::clone(&users) as Arc<dyn forgekeep_db::UserStore>,
			Arc::clone(&tokens) as Arc<dyn forgekeep_db::TokenStore>,
			Arc::clone(&ssh_keys) as Arc<dyn forgekeep_db::SshKeyStore>,
		));

		let ci = if config.ci.enabled {
			let server_url = config
				.ci
				.server_url
				.clone()
				.ok_or_else(|| anyhow::anyhow!("ci.enabled is true but ci.server_url is not set"))?;
			let api_key = config
				.ci
				.api_key
				.clone()
				.ok_or_else(|| anyhow::anyhow!("ci.enabled is true but ci.api_key is not set"))?;
			let runner = RunnerClient::new(server_url, api_key, Duration::from_secs(config.ci.timeout_secs));
			let store: Arc<dyn forgekeep_db::CiStore> = Arc::new(SqliteCiStore::new(db_pool.clone()));
			Some(Arc::new(CiDispatcher::new(store, runner)))
		} else {
			None
		};

		let credentials: Arc<dyn CredentialStore> =
			Arc::new(FileCredentialStore::new(credentials_path(&config.storage.base_path)));
		let mirror_scheduler = Arc::new(MirrorScheduler::with_interval(
			Arc::clone(&repos) as Arc<dyn forgekeep_db::RepositoryStore>,
			credentials,
			config.storage.base_path.clone(),
			Duration::from_secs(config.mirror_interval_secs),
		));

		let oidc = if config.oidc.enabled {
			Some(Arc::new(OidcClient::discover(&config.oidc).await?))
		} else {
			None
		};

		let public_clone_base = config
			.ci
			.git_server_url
			.clone()
			.unwrap_or_else(|| format!("http://{}", config.http_listen));

		let git_http = Arc::new(GitHttpState {
			engine: engine.clone(),
			repos: Arc::clone(&repos),
			users: Arc::clone(&users),
			repo_service: Arc::clone(&repo_service),
			auth: Arc::clone(&auth),
			ci: ci.clone(),
			public_clone_base,
		});

		let ssh = Arc::new(SshState {
			engine,
			repos: Arc::clone(&repos),
			users: Arc::clone(&users),
			auth: Arc::clone(&auth),
		});

		let health = Arc::new(HealthState {
			db_pool: db_pool.clone(),
			storage_base_path: config.storage.base_path.clone(),
			ssh_listening: AtomicBool::new(false),
			registry: Registry::new(),
		});

		Ok(Self {
			config: Arc::new(config),
			db_pool,
			users,
			repos,
			tokens,
			ssh_keys,
			repo_service,
			auth,
			ci,
			mirror_scheduler,
			oidc,
			oauth_state: Arc::new(OAuthStateStore::new()),
			git_http,
			ssh,
			health,
		})
	}
}

fn credentials_path(storage_base_path: &std::path::Path) -> PathBuf {
	storage_base_path
		.parent()
		.unwrap_or(storage_base_path)
		.join("mirror-credentials.json")
}
