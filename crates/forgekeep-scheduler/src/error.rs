//! Error taxonomy for computing mirror due-ness and running the scheduler loop.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
	#[error("invalid cron expression {expression:?}: {reason}")]
	InvalidCronExpression { expression: String, reason: String },

	#[error("db error: {0}")]
	Db(#[from] forgekeep_db::DbError),
}
