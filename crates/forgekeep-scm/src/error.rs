//! Error taxonomy for `GitEngine`/`RepoService`, mirroring the wire-visible
//! kinds in the spec's error handling design: `NOT_FOUND`, `CONFLICT`,
//! `BAD_REQUEST` (here split into `InvalidName`/`DefaultBranch` so callers
//! don't have to string-match), `INTERNAL`, and the `NETWORK`/`AUTH` split
//! that `CloneRepository` needs to tell an unreachable remote apart from a
//! rejected credential.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScmError>;

#[derive(Error, Debug)]
pub enum ScmError {
	#[error("not found")]
	NotFound,

	#[error("already exists")]
	AlreadyExists,

	#[error("invalid name: {0}")]
	InvalidName(String),

	#[error("refusing to delete the default branch")]
	DefaultBranch,

	#[error("storage error: {0}")]
	Storage(String),

	#[error("network error: {0}")]
	Network(String),

	#[error("authentication error: {0}")]
	Auth(String),

	#[error("git operation failed: {0}")]
	Git(String),

	#[error("operation cancelled")]
	Cancelled,

	#[error("database error: {0}")]
	Db(#[from] forgekeep_db::DbError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("internal error: {0}")]
	Internal(String),
}
