use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};

use crate::error::DbError;

/// Opens a `SqlitePool` with WAL mode, runs embedded migrations, and returns
/// it ready for use. `database_url` is the `db.dsn` configuration value
/// (e.g. `sqlite:./forgekeep.db` or `sqlite::memory:`).
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	sqlx::migrate!("./migrations")
		.run(&pool)
		.await
		.map_err(|e| DbError::Internal(format!("migration failed: {e}")))?;

	tracing::debug!("database pool created and migrated");
	Ok(pool)
}
