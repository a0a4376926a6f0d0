use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::UserRecord;

#[async_trait]
pub trait UserStore: Send + Sync {
	async fn create_user(&self, user: &UserRecord) -> Result<()>;
	async fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
	async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;
	async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
	async fn get_user_by_oidc_identity(
		&self,
		subject: &str,
		issuer: &str,
	) -> Result<Option<UserRecord>>;
	async fn update_user_email(&self, id: Uuid, email: &str) -> Result<()>;
	async fn update_user_admin(&self, id: Uuid, is_admin: bool) -> Result<()>;
	async fn attach_oidc_identity(&self, id: Uuid, subject: &str, issuer: &str) -> Result<()>;
	async fn delete_user(&self, id: Uuid) -> Result<()>;
	async fn username_exists(&self, username: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteUserStore {
	pool: SqlitePool,
}

impl SqliteUserStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord> {
	Ok(UserRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		username: row.try_get("username")?,
		email: row.try_get("email")?,
		oidc_subject: row.try_get("oidc_subject")?,
		oidc_issuer: row.try_get("oidc_issuer")?,
		is_admin: row.try_get::<i64, _>("is_admin")? != 0,
		created_at: parse_time(row.try_get::<String, _>("created_at")?)?,
		updated_at: parse_time(row.try_get::<String, _>("updated_at")?)?,
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
impl UserStore for SqliteUserStore {
	#[tracing::instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
	async fn create_user(&self, user: &UserRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO users (id, username, email, oidc_subject, oidc_issuer, is_admin, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(user.id.to_string())
		.bind(&user.username)
		.bind(&user.email)
		.bind(&user.oidc_subject)
		.bind(&user.oidc_issuer)
		.bind(user.is_admin as i64)
		.bind(user.created_at.to_rfc3339())
		.bind(user.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(conflict_on_unique("user already exists"))?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
		let row = sqlx::query("SELECT * FROM users WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_user).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
		let row = sqlx::query("SELECT * FROM users WHERE username = ?")
			.bind(username)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_user).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
		let row = sqlx::query("SELECT * FROM users WHERE email = ?")
			.bind(email)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_user).transpose()
	}

	#[tracing::instrument(skip(self, subject))]
	async fn get_user_by_oidc_identity(
		&self,
		subject: &str,
		issuer: &str,
	) -> Result<Option<UserRecord>> {
		let row = sqlx::query("SELECT * FROM users WHERE oidc_subject = ? AND oidc_issuer = ?")
			.bind(subject)
			.bind(issuer)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_user).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn update_user_email(&self, id: Uuid, email: &str) -> Result<()> {
		let result = sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
			.bind(email)
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await
			.map_err(conflict_on_unique("email already in use"))?;
		require_affected(result.rows_affected(), id)
	}

	#[tracing::instrument(skip(self))]
	async fn update_user_admin(&self, id: Uuid, is_admin: bool) -> Result<()> {
		let result = sqlx::query("UPDATE users SET is_admin = ?, updated_at = ? WHERE id = ?")
			.bind(is_admin as i64)
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		require_affected(result.rows_affected(), id)
	}

	#[tracing::instrument(skip(self, subject))]
	async fn attach_oidc_identity(&self, id: Uuid, subject: &str, issuer: &str) -> Result<()> {
		let result = sqlx::query(
			"UPDATE users SET oidc_subject = ?, oidc_issuer = ?, updated_at = ? WHERE id = ?",
		)
		.bind(subject)
		.bind(issuer)
		.bind(Utc::now().to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;
		require_affected(result.rows_affected(), id)
	}

	#[tracing::instrument(skip(self))]
	async fn delete_user(&self, id: Uuid) -> Result<()> {
		let result = sqlx::query("DELETE FROM users WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		require_affected(result.rows_affected(), id)
	}

	#[tracing::instrument(skip(self))]
	async fn username_exists(&self, username: &str) -> Result<bool> {
		let row = sqlx::query("SELECT 1 FROM users WHERE username = ?")
			.bind(username)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.is_some())
	}
}

fn require_affected(rows: u64, id: Uuid) -> Result<()> {
	if rows == 0 {
		Err(DbError::NotFound(format!("user {id}")))
	} else {
		Ok(())
	}
}

fn conflict_on_unique(message: &'static str) -> impl Fn(sqlx::Error) -> DbError {
	move |e| match &e {
		sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
			DbError::Conflict(message.to_string())
		}
		_ => DbError::Sqlx(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn test_pool() -> SqlitePool {
		let pool = crate::pool::create_pool("sqlite::memory:").await.unwrap();
		pool
	}

	fn sample_user(username: &str, email: &str) -> UserRecord {
		let now = Utc::now();
		UserRecord {
			id: Uuid::new_v4(),
			username: username.to_string(),
			email: email.to_string(),
			oidc_subject: None,
			oidc_issuer: None,
			is_admin: false,
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn create_and_fetch_round_trips() {
		let store = SqliteUserStore::new(test_pool().await);
		let user = sample_user("alice", "alice@example.com");
		store.create_user(&user).await.unwrap();

		let fetched = store.get_user_by_id(user.id).await.unwrap().unwrap();
		assert_eq!(fetched.username, "alice");
		assert_eq!(fetched.email, "alice@example.com");
		assert!(!fetched.is_admin);
	}

	#[tokio::test]
	async fn duplicate_username_conflicts() {
		let store = SqliteUserStore::new(test_pool().await);
		store
			.create_user(&sample_user("bob", "bob@example.com"))
			.await
			.unwrap();

		let dup = sample_user("bob", "other@example.com");
		let err = store.create_user(&dup).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn update_missing_user_is_not_found() {
		let store = SqliteUserStore::new(test_pool().await);
		let err = store
			.update_user_admin(Uuid::new_v4(), true)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn oidc_identity_lookup() {
		let store = SqliteUserStore::new(test_pool().await);
		let mut user = sample_user("carol", "carol@example.com");
		user.oidc_subject = Some("sub-123".to_string());
		user.oidc_issuer = Some("https://idp.example.com".to_string());
		store.create_user(&user).await.unwrap();

		let found = store
			.get_user_by_oidc_identity("sub-123", "https://idp.example.com")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(found.id, user.id);
	}
}
