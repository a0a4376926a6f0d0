//! `CIDispatcher`: fingerprints push/tag events into runner job submissions,
//! ingests the runner's status/log/artifact callbacks, and fans them out to
//! live subscribers (§4.5, §1 item 5).

use std::sync::Arc;

use chrono::Utc;
use forgekeep_db::{CiArtifactRecord, CiJobLogRecord, CiJobRecord, CiJobStepRecord, CiStore};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{CiError, Result};
use crate::runner_client::RunnerClient;
use crate::subscribers::{SharedSubscriberRegistry, SubscriberId, SubscriberRegistry};
use crate::types::{
	CiArtifact, CiJob, CiJobLog, JobEvent, JobStatus, RefType, SubmitJobRequest, TriggerRequest,
	TriggerType, WireEventType, WireRefType, WireRepository, WireTrigger,
};

pub struct CiDispatcher {
	store: Arc<dyn CiStore>,
	runner: RunnerClient,
	subscribers: SharedSubscriberRegistry,
}

impl CiDispatcher {
	pub fn new(store: Arc<dyn CiStore>, runner: RunnerClient) -> Self {
		Self {
			store,
			runner,
			subscribers: Arc::new(SubscriberRegistry::new()),
		}
	}

	/// Builds the submission, persists the job as `queued` before the
	/// runner acknowledges anything, then submits. A submission failure
	/// transitions the job to `error` with the cause recorded (§4.5).
	#[tracing::instrument(skip(self, request), fields(repository_id = %request.repository_id, commit_sha = %request.commit_sha))]
	pub async fn trigger(&self, request: TriggerRequest) -> Result<CiJob> {
		let job_id = Uuid::new_v4();
		let run_id = Uuid::new_v4();
		let now = Utc::now();

		let record = CiJobRecord {
			id: job_id,
			run_id,
			repository_id: request.repository_id,
			commit_sha: request.commit_sha.clone(),
			ref_name: request.ref_name.clone(),
			ref_type: request.ref_type.as_str().to_string(),
			trigger_type: request.trigger_type.as_str().to_string(),
			trigger_actor: request.trigger_actor.clone(),
			status: JobStatus::Queued.as_str().to_string(),
			config_path: request.config_path.clone(),
			created_at: now,
			started_at: None,
			finished_at: None,
			error: None,
		};
		self.store.create_job(&record).await?;

		let submission = SubmitJobRequest {
			job_id,
			run_id,
			repository: WireRepository {
				owner: request.owner.clone(),
				name: request.name.clone(),
				clone_url: request.clone_url.clone(),
				commit_sha: request.commit_sha.clone(),
				ref_name: request.ref_name.clone(),
				ref_type: match request.ref_type {
					RefType::Branch => WireRefType::Branch,
					RefType::Tag => WireRefType::Tag,
				},
			},
			trigger: WireTrigger {
				event_type: match request.trigger_type {
					TriggerType::Push => WireEventType::Push,
					TriggerType::Tag => WireEventType::Tag,
					TriggerType::PullRequest => WireEventType::PullRequest,
					TriggerType::Manual => WireEventType::Manual,
				},
				actor: request.trigger_actor.clone(),
				metadata: request.metadata.clone(),
			},
			config_path: request.config_path.clone(),
			timestamp: now,
			priority: "Normal",
			timeout: request.timeout_seconds,
		};

		if let Err(e) = self.runner.submit_job(&submission).await {
			tracing::warn!(%job_id, error = %e, "ci job submission failed, marking errored");
			let _ = self
				.store
				.update_job_status(job_id, JobStatus::Error.as_str(), Some(&e.to_string()), None, None)
				.await;
			let mut errored = record;
			errored.status = JobStatus::Error.as_str().to_string();
			errored.error = Some(e.to_string());
			return Ok(errored.into());
		}

		Ok(record.into())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_job(&self, job_id: Uuid) -> Result<CiJob> {
		self.store.get_job(job_id).await?.map(Into::into).ok_or(CiError::NotFound)
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_jobs_by_repository(&self, repository_id: Uuid, limit: i64) -> Result<Vec<CiJob>> {
		Ok(self
			.store
			.list_jobs_by_repository(repository_id, limit)
			.await?
			.into_iter()
			.map(Into::into)
			.collect())
	}

	#[tracing::instrument(skip(self, ref_name))]
	pub async fn list_jobs_by_ref(&self, repository_id: Uuid, ref_name: &str) -> Result<Vec<CiJob>> {
		Ok(self
			.store
			.list_jobs_by_ref(repository_id, ref_name)
			.await?
			.into_iter()
			.map(Into::into)
			.collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_job_logs(&self, job_id: Uuid, limit: i64, offset: i64) -> Result<Vec<CiJobLog>> {
		Ok(self.store.list_logs(job_id, limit, offset).await?.into_iter().map(Into::into).collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_job_logs_after_sequence(&self, job_id: Uuid, after: i64) -> Result<Vec<CiJobLog>> {
		Ok(self
			.store
			.list_logs_after_sequence(job_id, after)
			.await?
			.into_iter()
			.map(Into::into)
			.collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_artifacts(&self, job_id: Uuid) -> Result<Vec<CiArtifact>> {
		Ok(self.store.list_artifacts(job_id).await?.into_iter().map(Into::into).collect())
	}

	/// Downloads an artifact's bytes: if the runner recorded an external
	/// URL the caller should redirect there instead of calling this; this
	/// path is for runner-hosted artifacts with no external URL.
	#[tracing::instrument(skip(self))]
	pub async fn download_artifact(&self, job_id: Uuid, artifact_name: &str) -> Result<Vec<u8>> {
		let artifacts = self.store.list_artifacts(job_id).await?;
		if !artifacts.iter().any(|a| a.name == artifact_name) {
			return Err(CiError::NotFound);
		}
		self.runner.download_artifact(job_id, artifact_name).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: Uuid) -> Result<CiJob> {
		let job = self.store.get_job(job_id).await?.ok_or(CiError::NotFound)?;
		self.runner.post_empty(&format!("/api/v1/jobs/{job_id}/cancel")).await?;
		self.store
			.update_job_status(job_id, JobStatus::Cancelled.as_str(), None, None, Some(Utc::now()))
			.await?;
		let mut job = job;
		job.status = JobStatus::Cancelled.as_str().to_string();
		Ok(job.into())
	}

	/// Reconstructs the trigger context from the original job and submits
	/// a brand-new job (fresh `job_id`/`run_id`) carrying `{retry_of:
	/// <original_id>}` in its metadata — the original row is never mutated
	/// or duplicated (§9 open-question decision).
	#[tracing::instrument(skip(self))]
	pub async fn retry_job(&self, job_id: Uuid, owner: &str, name: &str, clone_url: &str, actor: &str) -> Result<CiJob> {
		let original = self.store.get_job(job_id).await?.ok_or(CiError::NotFound)?;
		let ref_type = if original.ref_type == "tag" { RefType::Tag } else { RefType::Branch };

		self.trigger(TriggerRequest {
			repository_id: original.repository_id,
			owner: owner.to_string(),
			name: name.to_string(),
			clone_url: clone_url.to_string(),
			commit_sha: original.commit_sha,
			ref_name: original.ref_name,
			ref_type,
			trigger_type: TriggerType::Manual,
			trigger_actor: actor.to_string(),
			config_path: original.config_path,
			metadata: serde_json::json!({ "retry_of": job_id }),
			timeout_seconds: None,
		})
		.await
	}

	#[tracing::instrument(skip(self))]
	pub async fn subscribe(&self, job_id: Uuid) -> (SubscriberId, mpsc::Receiver<JobEvent>) {
		let (id, rx) = self.subscribers.subscribe(job_id).await;
		self.subscribers
			.broadcast(JobEvent::Connected { job_id, timestamp: Utc::now() })
			.await;
		(id, rx)
	}

	pub async fn unsubscribe(&self, job_id: Uuid, subscriber: SubscriberId) {
		self.subscribers.unsubscribe(job_id, subscriber).await;
	}

	/// Ingests a status callback from the runner: persists the mapped
	/// status and broadcasts it. `raw_status` is translated through the
	/// closed table in [`JobStatus::from_runner_status`].
	#[tracing::instrument(skip(self))]
	pub async fn ingest_status_event(&self, job_id: Uuid, raw_status: &str, error: Option<&str>) -> Result<()> {
		let status = JobStatus::from_runner_status(raw_status);
		let now = Utc::now();
		let (started_at, finished_at) = match status {
			JobStatus::Running => (Some(now), None),
			JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut | JobStatus::Error => {
				(None, Some(now))
			}
			_ => (None, None),
		};
		self.store
			.update_job_status(job_id, status.as_str(), error, started_at, finished_at)
			.await?;

		self.subscribers
			.broadcast(JobEvent::Status {
				job_id,
				timestamp: now,
				data: serde_json::json!({ "status": status.as_str(), "error": error }),
			})
			.await;
		Ok(())
	}

	#[tracing::instrument(skip(self, message))]
	pub async fn ingest_log_event(&self, job_id: Uuid, level: &str, step_name: Option<&str>, message: &str) -> Result<()> {
		let sequence = self.store.next_log_sequence(job_id).await?;
		let now = Utc::now();
		let record = CiJobLogRecord {
			id: Uuid::new_v4(),
			job_id,
			sequence,
			level: level.to_string(),
			step_name: step_name.map(str::to_string),
			message: message.to_string(),
			timestamp: now,
		};
		self.store.append_log(&record).await?;

		self.subscribers
			.broadcast(JobEvent::Log {
				job_id,
				timestamp: now,
				data: serde_json::json!({
					"sequence": sequence,
					"level": level,
					"step_name": step_name,
					"message": message,
				}),
			})
			.await;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn ingest_step_event(&self, step: CiJobStepRecord) -> Result<()> {
		let job_id = step.job_id;
		let data = serde_json::json!({
			"step_type": step.step_type,
			"name": step.name,
			"exit_code": step.exit_code,
		});
		self.store.append_step(&step).await?;
		self.subscribers
			.broadcast(JobEvent::Step { job_id, timestamp: Utc::now(), data })
			.await;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn ingest_artifact_event(&self, artifact: CiArtifactRecord) -> Result<()> {
		let job_id = artifact.job_id;
		let data = serde_json::json!({
			"name": artifact.name,
			"size": artifact.size,
			"checksum_sha256": artifact.checksum_sha256,
			"url": artifact.url,
		});
		self.store.create_artifact(&artifact).await?;
		self.subscribers
			.broadcast(JobEvent::Artifact { job_id, timestamp: Utc::now(), data })
			.await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use chrono::DateTime;
	use std::sync::Mutex;

	#[derive(Default)]
	struct StubCiStore {
		jobs: Mutex<Vec<CiJobRecord>>,
		logs: Mutex<Vec<CiJobLogRecord>>,
	}

	#[async_trait]
	impl CiStore for StubCiStore {
		async fn create_job(&self, job: &CiJobRecord) -> forgekeep_db::Result<()> {
			self.jobs.lock().unwrap().push(job.clone());
			Ok(())
		}
		async fn get_job(&self, id: Uuid) -> forgekeep_db::Result<Option<CiJobRecord>> {
			Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
		}
		async fn list_jobs_by_repository(&self, repository_id: Uuid, _limit: i64) -> forgekeep_db::Result<Vec<CiJobRecord>> {
			Ok(self.jobs.lock().unwrap().iter().filter(|j| j.repository_id == repository_id).cloned().collect())
		}
		async fn list_jobs_by_ref(&self, repository_id: Uuid, ref_name: &str) -> forgekeep_db::Result<Vec<CiJobRecord>> {
			Ok(self
				.jobs
				.lock()
				.unwrap()
				.iter()
				.filter(|j| j.repository_id == repository_id && j.ref_name == ref_name)
				.cloned()
				.collect())
		}
		async fn update_job_status(
			&self,
			id: Uuid,
			status: &str,
			error: Option<&str>,
			started_at: Option<DateTime<Utc>>,
			finished_at: Option<DateTime<Utc>>,
		) -> forgekeep_db::Result<()> {
			let mut jobs = self.jobs.lock().unwrap();
			let job = jobs.iter_mut().find(|j| j.id == id).ok_or(forgekeep_db::DbError::NotFound("job".into()))?;
			job.status = status.to_string();
			job.error = error.map(str::to_string);
			if started_at.is_some() {
				job.started_at = started_at;
			}
			if finished_at.is_some() {
				job.finished_at = finished_at;
			}
			Ok(())
		}
		async fn append_step(&self, _step: &CiJobStepRecord) -> forgekeep_db::Result<()> {
			Ok(())
		}
		async fn list_steps(&self, _job_id: Uuid) -> forgekeep_db::Result<Vec<CiJobStepRecord>> {
			Ok(vec![])
		}
		async fn append_log(&self, log: &CiJobLogRecord) -> forgekeep_db::Result<()> {
			self.logs.lock().unwrap().push(log.clone());
			Ok(())
		}
		async fn list_logs(&self, job_id: Uuid, _limit: i64, _offset: i64) -> forgekeep_db::Result<Vec<CiJobLogRecord>> {
			Ok(self.logs.lock().unwrap().iter().filter(|l| l.job_id == job_id).cloned().collect())
		}
		async fn list_logs_after_sequence(&self, job_id: Uuid, after: i64) -> forgekeep_db::Result<Vec<CiJobLogRecord>> {
			Ok(self
				.logs
				.lock()
				.unwrap()
				.iter()
				.filter(|l| l.job_id == job_id && l.sequence > after)
				.cloned()
				.collect())
		}
		async fn next_log_sequence(&self, job_id: Uuid) -> forgekeep_db::Result<i64> {
			Ok(self.logs.lock().unwrap().iter().filter(|l| l.job_id == job_id).count() as i64 + 1)
		}
		async fn create_artifact(&self, _artifact: &CiArtifactRecord) -> forgekeep_db::Result<()> {
			Ok(())
		}
		async fn list_artifacts(&self, _job_id: Uuid) -> forgekeep_db::Result<Vec<CiArtifactRecord>> {
			Ok(vec![])
		}
	}

	fn sample_trigger(repository_id: Uuid) -> TriggerRequest {
		TriggerRequest {
			repository_id,
			owner: "alice".into(),
			name: "proj".into(),
			clone_url: "https://example.invalid/alice/proj.git".into(),
			commit_sha: "deadbeef".into(),
			ref_name: "main".into(),
			ref_type: RefType::Branch,
			trigger_type: TriggerType::Push,
			trigger_actor: "alice".into(),
			config_path: None,
			metadata: serde_json::json!({}),
			timeout_seconds: None,
		}
	}

	#[tokio::test]
	async fn trigger_marks_job_errored_when_runner_unreachable() {
		let store: Arc<dyn CiStore> = Arc::new(StubCiStore::default());
		let runner = RunnerClient::new(
			"http://127.0.0.1:1",
			forgekeep_common_secret::SecretString::new("key".into()),
			std::time::Duration::from_millis(50),
		);
		let dispatcher = CiDispatcher::new(store, runner);
		let job = dispatcher.trigger(sample_trigger(Uuid::new_v4())).await.unwrap();
		assert_eq!(job.status, JobStatus::Error);
	}

	#[tokio::test]
	async fn ingest_log_event_assigns_increasing_sequence() {
		let store: Arc<dyn CiStore> = Arc::new(StubCiStore::default());
		let runner = RunnerClient::new(
			"http://127.0.0.1:1",
			forgekeep_common_secret::SecretString::new("key".into()),
			std::time::Duration::from_millis(50),
		);
		let dispatcher = CiDispatcher::new(store, runner);
		let job_id = Uuid::new_v4();
		dispatcher.ingest_log_event(job_id, "info", None, "first").await.unwrap();
		dispatcher.ingest_log_event(job_id, "info", None, "second").await.unwrap();
		let logs = dispatcher.get_job_logs(job_id, 10, 0).await.unwrap();
		assert_eq!(logs.len(), 2);
		assert_eq!(logs[0].sequence, 1);
		assert_eq!(logs[1].sequence, 2);
	}
}
