use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::TokenRecord;

#[async_trait]
pub trait TokenStore: Send + Sync {
	async fn create_token(&self, token: &TokenRecord) -> Result<()>;
	async fn get_token_by_hash(&self, hashed_token: &str) -> Result<Option<TokenRecord>>;
	async fn list_tokens_by_user(&self, user_id: Uuid) -> Result<Vec<TokenRecord>>;
	async fn delete_token(&self, id: Uuid, user_id: Uuid) -> Result<()>;
	async fn touch_last_used(&self, hashed_token: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteTokenStore {
	pool: SqlitePool,
}

impl SqliteTokenStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<TokenRecord> {
	Ok(TokenRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		user_id: parse_uuid(row.try_get::<String, _>("user_id")?)?,
		name: row.try_get("name")?,
		hashed_token: row.try_get("hashed_token")?,
		scope: row.try_get("scope")?,
		expires_at: row
			.try_get::<Option<String>, _>("expires_at")?
			.map(parse_time)
			.transpose()?,
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
impl TokenStore for SqliteTokenStore {
	#[tracing::instrument(skip(self, token), fields(user_id = %token.user_id))]
	async fn create_token(&self, token: &TokenRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO tokens (id, user_id, name, hashed_token, scope, expires_at, last_used_at, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(token.id.to_string())
		.bind(token.user_id.to_string())
		.bind(&token.name)
		.bind(&token.hashed_token)
		.bind(&token.scope)
		.bind(token.expires_at.map(|t| t.to_rfc3339()))
		.bind(token.last_used_at.map(|t| t.to_rfc3339()))
		.bind(token.created_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| match &e {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
				DbError::Conflict("token hash collision".to_string())
			}
			_ => DbError::Sqlx(e),
		})?;
		Ok(())
	}

	#[tracing::instrument(skip(self, hashed_token))]
	async fn get_token_by_hash(&self, hashed_token: &str) -> Result<Option<TokenRecord>> {
		let row = sqlx::query("SELECT * FROM tokens WHERE hashed_token = ?")
			.bind(hashed_token)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_token).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_tokens_by_user(&self, user_id: Uuid) -> Result<Vec<TokenRecord>> {
		let rows = sqlx::query("SELECT * FROM tokens WHERE user_id = ? ORDER BY created_at")
			.bind(user_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_token).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn delete_token(&self, id: Uuid, user_id: Uuid) -> Result<()> {
		let result = sqlx::query("DELETE FROM tokens WHERE id = ? AND user_id = ?")
			.bind(id.to_string())
			.bind(user_id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("token {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, hashed_token))]
	async fn touch_last_used(&self, hashed_token: &str) -> Result<()> {
		sqlx::query("UPDATE tokens SET last_used_at = ? WHERE hashed_token = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(hashed_token)
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

	fn sample_token(user_id: Uuid, hash: &str) -> TokenRecord {
		let now = Utc::now();
		TokenRecord {
			id: Uuid::new_v4(),
			user_id,
			name: "ci".into(),
			hashed_token: hash.into(),
			scope: "[]".into(),
			expires_at: None,
			last_used_at: None,
			created_at: now,
		}
	}

	#[tokio::test]
	async fn lookup_by_hash() {
		let store = SqliteTokenStore::new(test_pool().await);
		let user_id = Uuid::new_v4();
		let token = sample_token(user_id, "hash-1");
		store.create_token(&token).await.unwrap();

		let found = store.get_token_by_hash("hash-1").await.unwrap().unwrap();
		assert_eq!(found.user_id, user_id);
	}

	#[tokio::test]
	async fn delete_requires_owner_match() {
		let store = SqliteTokenStore::new(test_pool().await);
		let user_id = Uuid::new_v4();
		let token = sample_token(user_id, "hash-2");
		store.create_token(&token).await.unwrap();

		let err = store
			.delete_token(token.id, Uuid::new_v4())
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));

		store.delete_token(token.id, user_id).await.unwrap();
	}
}
