//! Wire DTOs exchanged with the external CI runner (§4.5) and the local
//! domain types the dispatcher hands back to callers. The local `CiJob`
//! mirrors `forgekeep_db::CiJobRecord` but with parsed enums instead of
//! strings, the same split `forgekeep-scm` draws between `types.rs` and the
//! raw `*Record` the metadata store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
	Branch,
	Tag,
}

impl RefType {
	pub fn as_str(&self) -> &'static str {
		match self {
			RefType::Branch => "branch",
			RefType::Tag => "tag",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
	Push,
	Tag,
	PullRequest,
	Manual,
}

impl TriggerType {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerType::Push => "push",
			TriggerType::Tag => "tag",
			TriggerType::PullRequest => "pull_request",
			TriggerType::Manual => "manual",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Pending,
	Queued,
	Running,
	Success,
	Failed,
	Cancelled,
	TimedOut,
	Error,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Queued => "queued",
			JobStatus::Running => "running",
			JobStatus::Success => "success",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
			JobStatus::TimedOut => "timed_out",
			JobStatus::Error => "error",
		}
	}

	/// The closed mapping table from a runner-reported status string to the
	/// local taxonomy (§4.5): anything the table doesn't name collapses to
	/// `Error` rather than being passed through unrecognised.
	pub fn from_runner_status(raw: &str) -> JobStatus {
		match raw {
			"pending" => JobStatus::Pending,
			"queued" => JobStatus::Queued,
			"running" => JobStatus::Running,
			"completed" | "success" => JobStatus::Success,
			"failed" => JobStatus::Failed,
			"cancelled" => JobStatus::Cancelled,
			"timed_out" | "timedout" | "timeout" => JobStatus::TimedOut,
			_ => JobStatus::Error,
		}
	}
}

/// Request to trigger a CI run, assembled by the transport layer from a
/// parsed ref update (push/tag) or an explicit manual/retry request.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
	pub repository_id: Uuid,
	pub owner: String,
	pub name: String,
	pub clone_url: String,
	pub commit_sha: String,
	pub ref_name: String,
	pub ref_type: RefType,
	pub trigger_type: TriggerType,
	pub trigger_actor: String,
	pub config_path: Option<String>,
	pub metadata: serde_json::Value,
	pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRefType {
	Branch,
	Tag,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEventType {
	Push,
	Tag,
	PullRequest,
	Manual,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireRepository {
	pub owner: String,
	pub name: String,
	pub clone_url: String,
	pub commit_sha: String,
	pub ref_name: String,
	pub ref_type: WireRefType,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireTrigger {
	pub event_type: WireEventType,
	pub actor: String,
	pub metadata: serde_json::Value,
}

/// The exact body POSTed to `<runner>/api/v1/jobs` (§4.5).
#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobRequest {
	pub job_id: Uuid,
	pub run_id: Uuid,
	pub repository: WireRepository,
	pub trigger: WireTrigger,
	pub config_path: Option<String>,
	pub timestamp: DateTime<Utc>,
	pub priority: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u64>,
}

/// A fully resolved CI job as handed back to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct CiJob {
	pub id: Uuid,
	pub run_id: Uuid,
	pub repository_id: Uuid,
	pub commit_sha: String,
	pub ref_name: String,
	pub ref_type: RefType,
	pub trigger_type: TriggerType,
	pub trigger_actor: String,
	pub status: JobStatus,
	pub config_path: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
}

impl From<forgekeep_db::CiJobRecord> for CiJob {
	fn from(r: forgekeep_db::CiJobRecord) -> Self {
		CiJob {
			id: r.id,
			run_id: r.run_id,
			repository_id: r.repository_id,
			commit_sha: r.commit_sha,
			ref_name: r.ref_name,
			ref_type: if r.ref_type == "tag" { RefType::Tag } else { RefType::Branch },
			trigger_type: match r.trigger_type.as_str() {
				"tag" => TriggerType::Tag,
				"pull_request" => TriggerType::PullRequest,
				"manual" => TriggerType::Manual,
				_ => TriggerType::Push,
			},
			trigger_actor: r.trigger_actor,
			status: JobStatus::from_runner_status(&r.status),
			config_path: r.config_path,
			created_at: r.created_at,
			started_at: r.started_at,
			finished_at: r.finished_at,
			error: r.error,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct CiJobLog {
	pub sequence: i64,
	pub level: String,
	pub step_name: Option<String>,
	pub message: String,
	pub timestamp: DateTime<Utc>,
}

impl From<forgekeep_db::CiJobLogRecord> for CiJobLog {
	fn from(r: forgekeep_db::CiJobLogRecord) -> Self {
		CiJobLog {
			sequence: r.sequence,
			level: r.level,
			step_name: r.step_name,
			message: r.message,
			timestamp: r.timestamp,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct CiArtifact {
	pub name: String,
	pub size: i64,
	pub checksum_sha256: String,
	pub url: Option<String>,
}

impl From<forgekeep_db::CiArtifactRecord> for CiArtifact {
	fn from(r: forgekeep_db::CiArtifactRecord) -> Self {
		CiArtifact {
			name: r.name,
			size: r.size,
			checksum_sha256: r.checksum_sha256,
			url: r.url,
		}
	}
}

/// An event fanned out to live subscribers of a job (§4.5).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum JobEvent {
	Connected {
		job_id: Uuid,
		timestamp: DateTime<Utc>,
	},
	Status {
		job_id: Uuid,
		timestamp: DateTime<Utc>,
		data: serde_json::Value,
	},
	Log {
		job_id: Uuid,
		timestamp: DateTime<Utc>,
		data: serde_json::Value,
	},
	Step {
		job_id: Uuid,
		timestamp: DateTime<Utc>,
		data: serde_json::Value,
	},
	Artifact {
		job_id: Uuid,
		timestamp: DateTime<Utc>,
		data: serde_json::Value,
	},
}

impl JobEvent {
	pub fn job_id(&self) -> Uuid {
		match self {
			JobEvent::Connected { job_id, .. }
			| JobEvent::Status { job_id, .. }
			| JobEvent::Log { job_id, .. }
			| JobEvent::Step { job_id, .. }
			| JobEvent::Artifact { job_id, .. } => *job_id,
		}
	}

	pub fn event_name(&self) -> &'static str {
		match self {
			JobEvent::Connected { .. } => "connected",
			JobEvent::Status { .. } => "status",
			JobEvent::Log { .. } => "log",
			JobEvent::Step { .. } => "step",
			JobEvent::Artifact { .. } => "artifact",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn runner_status_table_is_closed() {
		assert_eq!(JobStatus::from_runner_status("completed"), JobStatus::Success);
		assert_eq!(JobStatus::from_runner_status("success"), JobStatus::Success);
		assert_eq!(JobStatus::from_runner_status("timeout"), JobStatus::TimedOut);
		assert_eq!(JobStatus::from_runner_status("bogus"), JobStatus::Error);
	}
}
