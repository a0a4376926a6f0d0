use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::SshKeyRecord;

#[async_trait]
pub trait SshKeyStore: Send + Sync {
	async fn create_ssh_key(&self, key: &SshKeyRecord) -> Result<()>;
	async fn get_ssh_key_by_fingerprint(&self, fingerprint: &str) -> Result<Option<SshKeyRecord>>;
	async fn list_ssh_keys_by_user(&self, user_id: Uuid) -> Result<Vec<SshKeyRecord>>;
	async fn delete_ssh_key(&self, id: Uuid, user_id: Uuid) -> Result<()>;
	/// Fire-and-forget per §5: callers MUST NOT let failures here fail a read path.
	async fn touch_last_used(&self, fingerprint: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteSshKeyStore {
	pool: SqlitePool,
}

impl SqliteSshKeyStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

fn row_to_key(row: &sqlx::sqlite::SqliteRow) -> Result<SshKeyRecord> {
	Ok(SshKeyRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		user_id: parse_uuid(row.try_get::<String, _>("user_id")?)?,
		title: row.try_get("title")?,
		raw_public_key: row.try_get("raw_public_key")?,
		fingerprint: row.try_get("fingerprint")?,
		key_type: row.try_get("key_type")?,
		last_used_at: row
			.try_get::<Option<String>, _>("last_used_at")?
			.map(parse_time)
			.transpose()?,
		created_at: parse_time(row.try_get::<String, _>("created_at")?)?,
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
impl SshKeyStore for SqliteSshKeyStore {
	#[tracing::instrument(skip(self, key), fields(user_id = %key.user_id))]
	async fn create_ssh_key(&self, key: &SshKeyRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO ssh_keys (id, user_id, title, raw_public_key, fingerprint, key_type, last_used_at, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(key.id.to_string())
		.bind(key.user_id.to_string())
		.bind(&key.title)
		.bind(&key.raw_public_key)
		.bind(&key.fingerprint)
		.bind(&key.key_type)
		.bind(key.last_used_at.map(|t| t.to_rfc3339()))
		.bind(key.created_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| match &e {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
				DbError::Conflict("ssh key fingerprint already registered".to_string())
			}
			_ => DbError::Sqlx(e),
		})?;
		Ok(())
	}

	#[tracing::instrument(skip(self, fingerprint))]
	async fn get_ssh_key_by_fingerprint(&self, fingerprint: &str) -> Result<Option<SshKeyRecord>> {
		let row = sqlx::query("SELECT * FROM ssh_keys WHERE fingerprint = ?")
			.bind(fingerprint)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_key).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_ssh_keys_by_user(&self, user_id: Uuid) -> Result<Vec<SshKeyRecord>> {
		let rows = sqlx::query("SELECT * FROM ssh_keys WHERE user_id = ? ORDER BY created_at")
			.bind(user_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_key).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn delete_ssh_key(&self, id: Uuid, user_id: Uuid) -> Result<()> {
		let result = sqlx::query("DELETE FROM ssh_keys WHERE id = ? AND user_id = ?")
			.bind(id.to_string())
			.bind(user_id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("ssh key {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, fingerprint))]
	async fn touch_last_used(&self, fingerprint: &str) -> Result<()> {
		sqlx::query("UPDATE ssh_keys SET last_used_at = ? WHERE fingerprint = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(fingerprint)
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn test_pool() -> SqlitePool {
		crate::pool::create_pool("sqlite::memory:").await.unwrap()
	}

	#[tokio::test]
	async fn fingerprint_round_trips() {
		let store = SqliteSshKeyStore::new(test_pool().await);
		let now = Utc::now();
		let key = SshKeyRecord {
			id: Uuid::new_v4(),
			user_id: Uuid::new_v4(),
			title: "laptop".into(),
			raw_public_key: "ssh-ed25519 AAAA... bob@laptop".into(),
			fingerprint: "SHA256:abc123".into(),
			key_type: "ssh-ed25519".into(),
			last_used_at: None,
			created_at: now,
		};
		store.create_ssh_key(&key).await.unwrap();

		let found = store
			.get_ssh_key_by_fingerprint("SHA256:abc123")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(found.user_id, key.user_id);
	}

	#[tokio::test]
	async fn duplicate_fingerprint_conflicts() {
		let store = SqliteSshKeyStore::new(test_pool().await);
		let now = Utc::now();
		let mk = |user: Uuid| SshKeyRecord {
			id: Uuid::new_v4(),
			user_id: user,
			title: "k".into(),
			raw_public_key: "ssh-ed25519 AAAA".into(),
			fingerprint: "SHA256:dup".into(),
			key_type: "ssh-ed25519".into(),
			last_used_at: None,
			created_at: now,
		};
		store.create_ssh_key(&mk(Uuid::new_v4())).await.unwrap();
		let err = store.create_ssh_key(&mk(Uuid::new_v4())).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}
}
