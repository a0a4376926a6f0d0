//! Error taxonomy for fetching an upstream remote and pushing to a
//! downstream remote.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
	#[error("credential not found: {0}")]
	CredentialNotFound(String),

	#[error("git operation failed: {0}")]
	GitError(String),

	#[error("invalid url: {0}")]
	InvalidUrl(String),

	#[error("invalid mirror direction: {0}")]
	InvalidDirection(String),

	#[error("db error: {0}")]
	Db(#[from] forgekeep_db::DbError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("credential store error: {0}")]
	Credential(#[from] forgekeep_credentials::CredentialError),

	#[error("scm error: {0}")]
	Scm(#[from] forgekeep_scm::ScmError),
}
