//! Plain-old-data records mirroring the `CREATE TABLE` shapes in
//! `migrations/0001_init.sql`. These are intentionally string/primitive
//! typed (not domain-enum typed) at this layer; higher crates (`forgekeep-scm`,
//! `forgekeep-auth`, `forgekeep-ci`) parse these into their own domain types
//! and own the validation of what a legal value looks like.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRecord {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub oidc_subject: Option<String>,
	pub oidc_issuer: Option<String>,
	pub is_admin: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RepositoryRecord {
	pub id: Uuid,
	pub owner_id: Uuid,
	pub name: String,
	pub is_private: bool,
	pub description: Option<String>,
	pub default_branch: String,
	pub git_path: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MirrorConfigRecord {
	pub repository_id: Uuid,
	pub enabled: bool,
	pub direction: String,
	pub upstream_url: Option<String>,
	pub upstream_creds_ref: Option<String>,
	pub downstream_url: Option<String>,
	pub downstream_creds_ref: Option<String>,
	pub sync_interval_seconds: Option<i64>,
	pub sync_schedule: Option<String>,
	pub last_synced_at: Option<DateTime<Utc>>,
	pub status: String,
	pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SshKeyRecord {
	pub id: Uuid,
	pub user_id: Uuid,
	pub title: String,
	pub raw_public_key: String,
	pub fingerprint: String,
	pub key_type: String,
	pub last_used_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenRecord {
	pub id: Uuid,
	pub user_id: Uuid,
	pub name: String,
	pub hashed_token: String,
	/// JSON-encoded array of `"owner/repo"` scope strings; empty array means
	/// "all repositories the user can access".
	pub scope: String,
	pub expires_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CiJobRecord {
	pub id: Uuid,
	pub run_id: Uuid,
	pub repository_id: Uuid,
	pub commit_sha: String,
	pub ref_name: String,
	pub ref_type: String,
	pub trigger_type: String,
	pub trigger_actor: String,
	pub status: String,
	pub config_path: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CiJobStepRecord {
	pub id: Uuid,
	pub job_id: Uuid,
	pub position: i64,
	pub step_type: String,
	pub name: String,
	pub exit_code: Option<i64>,
	pub started_at: Option<DateTime<Utc>>,
	pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CiJobLogRecord {
	pub id: Uuid,
	pub job_id: Uuid,
	pub sequence: i64,
	pub level: String,
	pub step_name: Option<String>,
	pub message: String,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CiArtifactRecord {
	pub id: Uuid,
	pub job_id: Uuid,
	pub name: String,
	pub size: i64,
	pub checksum_sha256: String,
	pub url: Option<String>,
	pub created_at: DateTime<Utc>,
}
