use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{MirrorConfigRecord, RepositoryRecord};

#[async_trait]
pub trait RepositoryStore: Send + Sync {
	async fn create_repository(&self, repo: &RepositoryRecord) -> Result<()>;
	async fn get_repository_by_id(&self, id: Uuid) -> Result<Option<RepositoryRecord>>;
	async fn get_repository_by_owner_and_name(
		&self,
		owner_id: Uuid,
		name: &str,
	) -> Result<Option<RepositoryRecord>>;
	async fn list_repositories_by_owner(&self, owner_id: Uuid) -> Result<Vec<RepositoryRecord>>;
	async fn list_public_repositories(&self, limit: i64, offset: i64) -> Result<Vec<RepositoryRecord>>;
	async fn update_repository(&self, repo: &RepositoryRecord) -> Result<()>;
	async fn delete_repository(&self, id: Uuid) -> Result<()>;

	async fn upsert_mirror_config(&self, config: &MirrorConfigRecord) -> Result<()>;
	async fn get_mirror_config(&self, repository_id: Uuid) -> Result<Option<MirrorConfigRecord>>;
	async fn list_enabled_mirror_configs(&self) -> Result<Vec<MirrorConfigRecord>>;
	/// Atomically transitions `status: idle -> syncing`. Returns `false`
	/// (no rows affected) if another task already owns the sync, which the
	/// scheduler treats as "skip, already in flight" rather than an error.
	async fn try_claim_sync(&self, repository_id: Uuid) -> Result<bool>;
	async fn finish_sync(
		&self,
		repository_id: Uuid,
		status: &str,
		last_error: Option<&str>,
		synced_at: DateTime<Utc>,
	) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteRepositoryStore {
	pool: SqlitePool,
}

impl SqliteRepositoryStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

fn row_to_repo(row: &sqlx::sqlite::SqliteRow) -> Result<RepositoryRecord> {
	Ok(RepositoryRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		owner_id: parse_uuid(row.try_get::<String, _>("owner_id")?)?,
		name: row.try_get("name")?,
		is_private: row.try_get::<i64, _>("is_private")? != 0,
		description: row.try_get("description")?,
		default_branch: row.try_get("default_branch")?,
		git_path: row.try_get("git_path")?,
		created_at: parse_time(row.try_get::<String, _>("created_at")?)?,
		updated_at: parse_time(row.try_get::<String, _>("updated_at")?)?,
	})
}

fn row_to_mirror_config(row: &sqlx::sqlite::SqliteRow) -> Result<MirrorConfigRecord> {
	Ok(MirrorConfigRecord {
		repository_id: parse_uuid(row.try_get::<String, _>("repository_id")?)?,
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		direction: row.try_get("direction")?,
		upstream_url: row.try_get("upstream_url")?,
		upstream_creds_ref: row.try_get("upstream_creds_ref")?,
		downstream_url: row.try_get("downstream_url")?,
		downstream_creds_ref: row.try_get("downstream_creds_ref")?,
		sync_interval_seconds: row.try_get("sync_interval_seconds")?,
		sync_schedule: row.try_get("sync_schedule")?,
		last_synced_at: row
			.try_get::<Option<String>, _>("last_synced_at")?
			.map(parse_time)
			.transpose()?,
		status: row.try_get("status")?,
		last_error: row.try_get("last_error")?,
	})
}

fn parse_uuid(s: String) -> Result<Uuid> {
	Uuid::parse_str(&s).map_err(|e| DbError::Internal(format!("corrupt uuid in row: {e}")))
}

fn parse_time(s: String) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(&s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("corrupt timestamp in row: {e}")))
}

#[async_trait]
impl RepositoryStore for SqliteRepositoryStore {
	#[tracing::instrument(skip(self, repo), fields(repo_id = %repo.id, name = %repo.name))]
	async fn create_repository(&self, repo: &RepositoryRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO repositories
				(id, owner_id, name, is_private, description, default_branch, git_path, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(repo.id.to_string())
		.bind(repo.owner_id.to_string())
		.bind(&repo.name)
		.bind(repo.is_private as i64)
		.bind(&repo.description)
		.bind(&repo.default_branch)
		.bind(&repo.git_path)
		.bind(repo.created_at.to_rfc3339())
		.bind(repo.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| match &e {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
				DbError::Conflict(format!("repository {}/{} already exists", repo.owner_id, repo.name))
			}
			_ => DbError::Sqlx(e),
		})?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn get_repository_by_id(&self, id: Uuid) -> Result<Option<RepositoryRecord>> {
		let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_repo).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn get_repository_by_owner_and_name(
		&self,
		owner_id: Uuid,
		name: &str,
	) -> Result<Option<RepositoryRecord>> {
		let row = sqlx::query("SELECT * FROM repositories WHERE owner_id = ? AND name = ?")
			.bind(owner_id.to_string())
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_repo).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_repositories_by_owner(&self, owner_id: Uuid) -> Result<Vec<RepositoryRecord>> {
		let rows = sqlx::query("SELECT * FROM repositories WHERE owner_id = ? ORDER BY name")
			.bind(owner_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_repo).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn list_public_repositories(&self, limit: i64, offset: i64) -> Result<Vec<RepositoryRecord>> {
		let rows = sqlx::query(
			"SELECT * FROM repositories WHERE is_private = 0 ORDER BY created_at DESC LIMIT ? OFFSET ?",
		)
		.bind(limit)
		.bind(offset)
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_repo).collect()
	}

	#[tracing::instrument(skip(self, repo), fields(repo_id = %repo.id))]
	async fn update_repository(&self, repo: &RepositoryRecord) -> Result<()> {
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET name = ?, is_private = ?, description = ?, default_branch = ?, git_path = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&repo.name)
		.bind(repo.is_private as i64)
		.bind(&repo.description)
		.bind(&repo.default_branch)
		.bind(&repo.git_path)
		.bind(Utc::now().to_rfc3339())
		.bind(repo.id.to_string())
		.execute(&self.pool)
		.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("repository {}", repo.id)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn delete_repository(&self, id: Uuid) -> Result<()> {
		let result = sqlx::query("DELETE FROM repositories WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("repository {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, config), fields(repo_id = %config.repository_id))]
	async fn upsert_mirror_config(&self, config: &MirrorConfigRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO mirror_configs
				(repository_id, enabled, direction, upstream_url, upstream_creds_ref,
				 downstream_url, downstream_creds_ref, sync_interval_seconds, sync_schedule,
				 last_synced_at, status, last_error)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(repository_id) DO UPDATE SET
				enabled = excluded.enabled,
				direction = excluded.direction,
				upstream_url = excluded.upstream_url,
				upstream_creds_ref = excluded.upstream_creds_ref,
				downstream_url = excluded.downstream_url,
				downstream_creds_ref = excluded.downstream_creds_ref,
				sync_interval_seconds = excluded.sync_interval_seconds,
				sync_schedule = excluded.sync_schedule,
				last_synced_at = excluded.last_synced_at,
				status = excluded.status,
				last_error = excluded.last_error
			"#,
		)
		.bind(config.repository_id.to_string())
		.bind(config.enabled as i64)
		.bind(&config.direction)
		.bind(&config.upstream_url)
		.bind(&config.upstream_creds_ref)
		.bind(&config.downstream_url)
		.bind(&config.downstream_creds_ref)
		.bind(config.sync_interval_seconds)
		.bind(&config.sync_schedule)
		.bind(config.last_synced_at.map(|t| t.to_rfc3339()))
		.bind(&config.status)
		.bind(&config.last_error)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn get_mirror_config(&self, repository_id: Uuid) -> Result<Option<MirrorConfigRecord>> {
		let row = sqlx::query("SELECT * FROM mirror_configs WHERE repository_id = ?")
			.bind(repository_id.to_string())
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_mirror_config).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_enabled_mirror_configs(&self) -> Result<Vec<MirrorConfigRecord>> {
		let rows = sqlx::query("SELECT * FROM mirror_configs WHERE enabled = 1")
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_mirror_config).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn try_claim_sync(&self, repository_id: Uuid) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE mirror_configs SET status = 'syncing', last_error = NULL WHERE repository_id = ? AND status != 'syncing'",
		)
		.bind(repository_id.to_string())
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self, last_error))]
	async fn finish_sync(
		&self,
		repository_id: Uuid,
		status: &str,
		last_error: Option<&str>,
		synced_at: DateTime<Utc>,
	) -> Result<()> {
		sqlx::query(
			"UPDATE mirror_configs SET status = ?, last_error = ?, last_synced_at = ? WHERE repository_id = ?",
		)
		.bind(status)
		.bind(last_error)
		.bind(synced_at.to_rfc3339())
		.bind(repository_id.to_string())
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::user::{SqliteUserStore, UserStore};
	use crate::types::UserRecord;

	async fn test_pool() -> SqlitePool {
		crate::pool::create_pool("sqlite::memory:").await.unwrap()
	}

	async fn seed_owner(pool: &SqlitePool) -> Uuid {
		let store = SqliteUserStore::new(pool.clone());
		let now = Utc::now();
		let id = Uuid::new_v4();
		store
			.create_user(&UserRecord {
				id,
				username: "alice".into(),
				email: "alice@example.com".into(),
				oidc_subject: None,
				oidc_issuer: None,
				is_admin: false,
				created_at: now,
				updated_at: now,
			})
			.await
			.unwrap();
		id
	}

	fn sample_repo(owner_id: Uuid, name: &str) -> RepositoryRecord {
		let now = Utc::now();
		RepositoryRecord {
			id: Uuid::new_v4(),
			owner_id,
			name: name.to_string(),
			is_private: false,
			description: None,
			default_branch: "main".into(),
			git_path: format!("alice/{name}.git"),
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn create_and_fetch_by_owner_and_name() {
		let pool = test_pool().await;
		let owner = seed_owner(&pool).await;
		let store = SqliteRepositoryStore::new(pool);
		let repo = sample_repo(owner, "proj");
		store.create_repository(&repo).await.unwrap();

		let fetched = store
			.get_repository_by_owner_and_name(owner, "proj")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(fetched.id, repo.id);
	}

	#[tokio::test]
	async fn duplicate_owner_name_conflicts() {
		let pool = test_pool().await;
		let owner = seed_owner(&pool).await;
		let store = SqliteRepositoryStore::new(pool);
		store
			.create_repository(&sample_repo(owner, "proj"))
			.await
			.unwrap();
		let err = store
			.create_repository(&sample_repo(owner, "proj"))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn single_flight_claim() {
		let pool = test_pool().await;
		let owner = seed_owner(&pool).await;
		let store = SqliteRepositoryStore::new(pool);
		let repo = sample_repo(owner, "mirrored");
		store.create_repository(&repo).await.unwrap();
		store
			.upsert_mirror_config(&MirrorConfigRecord {
				repository_id: repo.id,
				enabled: true,
				direction: "both".into(),
				upstream_url: Some("https://example.com/up.git".into()),
				upstream_creds_ref: None,
				downstream_url: None,
				downstream_creds_ref: None,
				sync_interval_seconds: Some(3600),
				sync_schedule: None,
				last_synced_at: None,
				status: "idle".into(),
				last_error: None,
			})
			.await
			.unwrap();

		assert!(store.try_claim_sync(repo.id).await.unwrap());
		// already syncing: second claim fails
		assert!(!store.try_claim_sync(repo.id).await.unwrap());

		store
			.finish_sync(repo.id, "success", None, Utc::now())
			.await
			.unwrap();
		assert!(store.try_claim_sync(repo.id).await.unwrap());
	}
}
