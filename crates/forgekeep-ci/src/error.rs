//! Error taxonomy for the CI dispatcher, mirroring the wire-visible kinds
//! in §7: `NotFound` for an unknown job, `Upstream` for an unreachable or
//! misbehaving runner, `Internal` for everything else.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CiError>;

#[derive(Error, Debug)]
pub enum CiError {
	#[error("not found")]
	NotFound,

	#[error("ci runner unreachable: {0}")]
	Upstream(String),

	#[error("database error: {0}")]
	Db(#[from] forgekeep_db::DbError),

	#[error("internal error: {0}")]
	Internal(String),
}
