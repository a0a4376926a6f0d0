use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{CiArtifactRecord, CiJobLogRecord, CiJobRecord, CiJobStepRecord};

#[async_trait]
pub trait CiStore: Send + Sync {
	async fn create_job(&self, job: &CiJobRecord) -> Result<()>;
	async fn get_job(&self, id: Uuid) -> Result<Option<CiJobRecord>>;
	async fn list_jobs_by_repository(&self, repository_id: Uuid, limit: i64) -> Result<Vec<CiJobRecord>>;
	async fn list_jobs_by_ref(&self, repository_id: Uuid, ref_name: &str) -> Result<Vec<CiJobRecord>>;
	async fn update_job_status(
		&self,
		id: Uuid,
		status: &str,
		error: Option<&str>,
		started_at: Option<DateTime<Utc>>,
		finished_at: Option<DateTime<Utc>>,
	) -> Result<()>;

	async fn append_step(&self, step: &CiJobStepRecord) -> Result<()>;
	async fn list_steps(&self, job_id: Uuid) -> Result<Vec<CiJobStepRecord>>;

	async fn append_log(&self, log: &CiJobLogRecord) -> Result<()>;
	async fn list_logs(&self, job_id: Uuid, limit: i64, offset: i64) -> Result<Vec<CiJobLogRecord>>;
	async fn list_logs_after_sequence(&self, job_id: Uuid, after: i64) -> Result<Vec<CiJobLogRecord>>;
	async fn next_log_sequence(&self, job_id: Uuid) -> Result<i64>;

	async fn create_artifact(&self, artifact: &CiArtifactRecord) -> Result<()>;
	async fn list_artifacts(&self, job_id: Uuid) -> Result<Vec<CiArtifactRecord>>;
}

#[derive(Clone)]
pub struct SqliteCiStore {
	pool: SqlitePool,
}

impl SqliteCiStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

fn parse_uuid(s: String) -> Result<Uuid> {
	Uuid::parse_str(&s).map_err(|e| DbError::Internal(format!("corrupt uuid in row: {e}")))
}

fn parse_time(s: String) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(&s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("corrupt timestamp in row: {e}")))
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<CiJobRecord> {
	Ok(CiJobRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		run_id: parse_uuid(row.try_get::<String, _>("run_id")?)?,
		repository_id: parse_uuid(row.try_get::<String, _>("repository_id")?)?,
		commit_sha: row.try_get("commit_sha")?,
		ref_name: row.try_get("ref_name")?,
		ref_type: row.try_get("ref_type")?,
		trigger_type: row.try_get("trigger_type")?,
		trigger_actor: row.try_get("trigger_actor")?,
		status: row.try_get("status")?,
		config_path: row.try_get("config_path")?,
		created_at: parse_time(row.try_get::<String, _>("created_at")?)?,
		started_at: row
			.try_get::<Option<String>, _>("started_at")?
			.map(parse_time)
			.transpose()?,
		finished_at: row
			.try_get::<Option<String>, _>("finished_at")?
			.map(parse_time)
			.transpose()?,
		error: row.try_get("error")?,
	})
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<CiJobStepRecord> {
	Ok(CiJobStepRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		job_id: parse_uuid(row.try_get::<String, _>("job_id")?)?,
		position: row.try_get("position")?,
		step_type: row.try_get("step_type")?,
		name: row.try_get("name")?,
		exit_code: row.try_get("exit_code")?,
		started_at: row
			.try_get::<Option<String>, _>("started_at")?
			.map(parse_time)
			.transpose()?,
		finished_at: row
			.try_get::<Option<String>, _>("finished_at")?
			.map(parse_time)
			.transpose()?,
	})
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<CiJobLogRecord> {
	Ok(CiJobLogRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		job_id: parse_uuid(row.try_get::<String, _>("job_id")?)?,
		sequence: row.try_get("sequence")?,
		level: row.try_get("level")?,
		step_name: row.try_get("step_name")?,
		message: row.try_get("message")?,
		timestamp: parse_time(row.try_get::<String, _>("timestamp")?)?,
	})
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<CiArtifactRecord> {
	Ok(CiArtifactRecord {
		id: parse_uuid(row.try_get::<String, _>("id")?)?,
		job_id: parse_uuid(row.try_get::<String, _>("job_id")?)?,
		name: row.try_get("name")?,
		size: row.try_get("size")?,
		checksum_sha256: row.try_get("checksum_sha256")?,
		url: row.try_get("url")?,
		created_at: parse_time(row.try_get::<String, _>("created_at")?)?,
	})
}

#[async_trait]
impl CiStore for SqliteCiStore {
	#[tracing::instrument(skip(self, job), fields(job_id = %job.id, repo_id = %job.repository_id))]
	async fn create_job(&self, job: &CiJobRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO ci_jobs
				(id, run_id, repository_id, commit_sha, ref_name, ref_type, trigger_type,
				 trigger_actor, status, config_path, created_at, started_at, finished_at, error)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(job.id.to_string())
		.bind(job.run_id.to_string())
		.bind(job.repository_id.to_string())
		.bind(&job.commit_sha)
		.bind(&job.ref_name)
		.bind(&job.ref_type)
		.bind(&job.trigger_type)
		.bind(&job.trigger_actor)
		.bind(&job.status)
		.bind(&job.config_path)
		.bind(job.created_at.to_rfc3339())
		.bind(job.started_at.map(|t| t.to_rfc3339()))
		.bind(job.finished_at.map(|t| t.to_rfc3339()))
		.bind(&job.error)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn get_job(&self, id: Uuid) -> Result<Option<CiJobRecord>> {
		let row = sqlx::query("SELECT * FROM ci_jobs WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(row_to_job).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_jobs_by_repository(&self, repository_id: Uuid, limit: i64) -> Result<Vec<CiJobRecord>> {
		let rows = sqlx::query(
			"SELECT * FROM ci_jobs WHERE repository_id = ? ORDER BY created_at DESC LIMIT ?",
		)
		.bind(repository_id.to_string())
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_job).collect()
	}

	#[tracing::instrument(skip(self, ref_name))]
	async fn list_jobs_by_ref(&self, repository_id: Uuid, ref_name: &str) -> Result<Vec<CiJobRecord>> {
		let rows = sqlx::query(
			"SELECT * FROM ci_jobs WHERE repository_id = ? AND ref_name = ? ORDER BY created_at DESC",
		)
		.bind(repository_id.to_string())
		.bind(ref_name)
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_job).collect()
	}

	#[tracing::instrument(skip(self, error))]
	async fn update_job_status(
		&self,
		id: Uuid,
		status: &str,
		error: Option<&str>,
		started_at: Option<DateTime<Utc>>,
		finished_at: Option<DateTime<Utc>>,
	) -> Result<()> {
		let result = sqlx::query(
			"UPDATE ci_jobs SET status = ?, error = ?, started_at = COALESCE(?, started_at), finished_at = COALESCE(?, finished_at) WHERE id = ?",
		)
		.bind(status)
		.bind(error)
		.bind(started_at.map(|t| t.to_rfc3339()))
		.bind(finished_at.map(|t| t.to_rfc3339()))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("ci job {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, step), fields(job_id = %step.job_id))]
	async fn append_step(&self, step: &CiJobStepRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO ci_job_steps (id, job_id, position, step_type, name, exit_code, started_at, finished_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(step.id.to_string())
		.bind(step.job_id.to_string())
		.bind(step.position)
		.bind(&step.step_type)
		.bind(&step.name)
		.bind(step.exit_code)
		.bind(step.started_at.map(|t| t.to_rfc3339()))
		.bind(step.finished_at.map(|t| t.to_rfc3339()))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn list_steps(&self, job_id: Uuid) -> Result<Vec<CiJobStepRecord>> {
		let rows = sqlx::query("SELECT * FROM ci_job_steps WHERE job_id = ? ORDER BY position")
			.bind(job_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_step).collect()
	}

	#[tracing::instrument(skip(self, log), fields(job_id = %log.job_id, sequence = log.sequence))]
	async fn append_log(&self, log: &CiJobLogRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO ci_job_logs (id, job_id, sequence, level, step_name, message, timestamp)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(log.id.to_string())
		.bind(log.job_id.to_string())
		.bind(log.sequence)
		.bind(&log.level)
		.bind(&log.step_name)
		.bind(&log.message)
		.bind(log.timestamp.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| match &e {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
				DbError::Conflict(format!("duplicate log sequence for job {}", log.job_id))
			}
			_ => DbError::Sqlx(e),
		})?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn list_logs(&self, job_id: Uuid, limit: i64, offset: i64) -> Result<Vec<CiJobLogRecord>> {
		let rows = sqlx::query(
			"SELECT * FROM ci_job_logs WHERE job_id = ? ORDER BY sequence LIMIT ? OFFSET ?",
		)
		.bind(job_id.to_string())
		.bind(limit)
		.bind(offset)
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_log).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn list_logs_after_sequence(&self, job_id: Uuid, after: i64) -> Result<Vec<CiJobLogRecord>> {
		let rows = sqlx::query(
			"SELECT * FROM ci_job_logs WHERE job_id = ? AND sequence > ? ORDER BY sequence",
		)
		.bind(job_id.to_string())
		.bind(after)
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_log).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn next_log_sequence(&self, job_id: Uuid) -> Result<i64> {
		let row = sqlx::query("SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM ci_job_logs WHERE job_id = ?")
			.bind(job_id.to_string())
			.fetch_one(&self.pool)
			.await?;
		Ok(row.try_get("next")?)
	}

	#[tracing::instrument(skip(self, artifact), fields(job_id = %artifact.job_id))]
	async fn create_artifact(&self, artifact: &CiArtifactRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO ci_artifacts (id, job_id, name, size, checksum_sha256, url, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(artifact.id.to_string())
		.bind(artifact.job_id.to_string())
		.bind(&artifact.name)
		.bind(artifact.size)
		.bind(&artifact.checksum_sha256)
		.bind(&artifact.url)
		.bind(artifact.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn list_artifacts(&self, job_id: Uuid) -> Result<Vec<CiArtifactRecord>> {
		let rows = sqlx::query("SELECT * FROM ci_artifacts WHERE job_id = ? ORDER BY created_at")
			.bind(job_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_artifact).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn test_pool() -> SqlitePool {
		crate::pool::create_pool("sqlite::memory:").await.unwrap()
	}

	fn sample_job(repo_id: Uuid) -> CiJobRecord {
		let now = Utc::now();
		CiJobRecord {
			id: Uuid::new_v4(),
			run_id: Uuid::new_v4(),
			repository_id: repo_id,
			commit_sha: "deadbeef".into(),
			ref_name: "main".into(),
			ref_type: "branch".into(),
			trigger_type: "push".into(),
			trigger_actor: "alice".into(),
			status: "queued".into(),
			config_path: None,
			created_at: now,
			started_at: None,
			finished_at: None,
			error: None,
		}
	}

	#[tokio::test]
	async fn logs_preserve_sequence_order() {
		let pool = test_pool().await;
		let store = SqliteCiStore::new(pool);
		let repo_id = Uuid::new_v4();
		let job = sample_job(repo_id);
		store.create_job(&job).await.unwrap();

		for seq in 1..=3 {
			let next = store.next_log_sequence(job.id).await.unwrap();
			assert_eq!(next, seq);
			store
				.append_log(&CiJobLogRecord {
					id: Uuid::new_v4(),
					job_id: job.id,
					sequence: seq,
					level: "info".into(),
					step_name: None,
					message: format!("line {seq}"),
					timestamp: Utc::now(),
				})
				.await
				.unwrap();
		}

		let logs = store.list_logs(job.id, 10, 0).await.unwrap();
		let seqs: Vec<i64> = logs.iter().map(|l| l.sequence).collect();
		assert_eq!(seqs, vec![1, 2, 3]);

		let after = store.list_logs_after_sequence(job.id, 1).await.unwrap();
		assert_eq!(after.len(), 2);
	}

	#[tokio::test]
	async fn duplicate_sequence_conflicts() {
		let store = SqliteCiStore::new(test_pool().await);
		let job = sample_job(Uuid::new_v4());
		store.create_job(&job).await.unwrap();
		let log = CiJobLogRecord {
			id: Uuid::new_v4(),
			job_id: job.id,
			sequence: 1,
			level: "info".into(),
			step_name: None,
			message: "a".into(),
			timestamp: Utc::now(),
		};
		store.append_log(&log).await.unwrap();
		let mut dup = log.clone();
		dup.id = Uuid::new_v4();
		let err = store.append_log(&dup).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}
}
