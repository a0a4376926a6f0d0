//! Error taxonomy for the three `AuthResolver` entry points and the
//! repository ACL check.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
	#[error("invalid credential: {0}")]
	InvalidCredential(String),

	#[error("credential expired")]
	Expired,

	#[error("no principal found for credential")]
	NotFound,

	#[error("access denied")]
	Denied,

	#[error("database error: {0}")]
	Db(#[from] forgekeep_db::DbError),

	#[error("internal error: {0}")]
	Internal(String),
}
