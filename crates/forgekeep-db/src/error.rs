//! Error taxonomy for the metadata store.
//!
//! Convention followed by every repository method in this crate: `NotFound`
//! is reserved for the case where an id that is expected to exist cannot be
//! found (a dangling foreign key, a caller-supplied primary key); ordinary
//! "does this exist" lookups return `Option<T>` instead of `NotFound` so the
//! service layer can treat absence as data, not failure. Everything else
//! that sqlx can raise collapses into `Sqlx` or `Internal`.

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("internal: {0}")]
	Internal(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
