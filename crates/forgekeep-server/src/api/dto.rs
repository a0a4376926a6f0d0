//! Wire DTOs for the `/v1` REST surface. `forgekeep-scm`'s domain types stay
//! free of a serde dependency on their core fields (mirroring the db/ci
//! split between a `*Record` and a parsed domain type); everything that
//! crosses the wire gets a `From<domain>` impl here instead.

use chrono::{DateTime, Utc};
use forgekeep_db::{MirrorConfigRecord, RepositoryRecord, SshKeyRecord, TokenRecord, UserRecord};
use forgekeep_scm::{
	Branch, Commit, DiffResult, Encoding, EntryKind, FileChangeStatus, FileContent, FileDiff,
	LanguageStats, Tag, TagSignature, TreeEntry,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UserDto {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub is_admin: bool,
	pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserDto {
	fn from(u: &UserRecord) -> Self {
		UserDto {
			id: u.id,
			username: u.username.clone(),
			email: u.email.clone(),
			is_admin: u.is_admin,
			created_at: u.created_at,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct RepositoryDto {
	pub id: Uuid,
	pub owner: String,
	pub name: String,
	pub is_private: bool,
	pub description: Option<String>,
	pub default_branch: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl RepositoryDto {
	pub fn new(repo: &RepositoryRecord, owner_username: &str) -> Self {
		RepositoryDto {
			id: repo.id,
			owner: owner_username.to_string(),
			name: repo.name.clone(),
			is_private: repo.is_private,
			description: repo.description.clone(),
			default_branch: repo.default_branch.clone(),
			created_at: repo.created_at,
			updated_at: repo.updated_at,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct CreateRepositoryRequest {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub is_private: bool,
}

#[derive(Debug, Serialize)]
pub struct MirrorConfigDto {
	pub enabled: bool,
	pub direction: String,
	pub upstream_url: Option<String>,
	pub downstream_url: Option<String>,
	pub sync_interval_seconds: Option<i64>,
	pub sync_schedule: Option<String>,
	pub last_synced_at: Option<DateTime<Utc>>,
	pub status: String,
	pub last_error: Option<String>,
}

impl From<&MirrorConfigRecord> for MirrorConfigDto {
	fn from(c: &MirrorConfigRecord) -> Self {
		MirrorConfigDto {
			enabled: c.enabled,
			direction: c.direction.clone(),
			upstream_url: c.upstream_url.clone(),
			downstream_url: c.downstream_url.clone(),
			sync_interval_seconds: c.sync_interval_seconds,
			sync_schedule: c.sync_schedule.clone(),
			last_synced_at: c.last_synced_at,
			status: c.status.clone(),
			last_error: c.last_error.clone(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct ImportRepositoryRequest {
	pub name: String,
	pub source_url: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRepositoryRequest {
	#[serde(default, deserialize_with = "deserialize_optional_field")]
	pub description: Option<Option<String>>,
	#[serde(default)]
	pub is_private: Option<bool>,
	#[serde(default)]
	pub default_branch: Option<String>,
}

/// Distinguishes an absent field (`None`) from one explicitly set to
/// `null` (`Some(None)`) for the description patch.
fn deserialize_optional_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Ok(Some(Option::deserialize(deserializer)?))
}

#[derive(Debug, Serialize)]
pub struct BranchDto {
	pub name: String,
	pub target_commit: String,
	pub is_default: bool,
}

impl From<&Branch> for BranchDto {
	fn from(b: &Branch) -> Self {
		BranchDto { name: b.name.clone(), target_commit: b.target_commit.clone(), is_default: b.is_default }
	}
}

#[derive(Debug, Serialize)]
pub struct TagSignatureDto {
	pub name: String,
	pub email: String,
	pub timestamp: DateTime<Utc>,
}

impl From<&TagSignature> for TagSignatureDto {
	fn from(s: &TagSignature) -> Self {
		TagSignatureDto { name: s.name.clone(), email: s.email.clone(), timestamp: s.timestamp }
	}
}

#[derive(Debug, Serialize)]
pub struct TagDto {
	pub name: String,
	pub target_commit: String,
	pub annotation: Option<String>,
	pub signature: Option<TagSignatureDto>,
}

impl From<&Tag> for TagDto {
	fn from(t: &Tag) -> Self {
		TagDto {
			name: t.name.clone(),
			target_commit: t.target_commit.clone(),
			annotation: t.annotation.clone(),
			signature: t.signature.as_ref().map(TagSignatureDto::from),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
	pub name: String,
	pub target_ref: String,
	#[serde(default)]
	pub annotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
	pub name: String,
	pub start_point: String,
}

#[derive(Debug, Serialize)]
pub struct CommitDto {
	pub hash: String,
	pub parents: Vec<String>,
	pub author_name: String,
	pub author_email: String,
	pub author_time: DateTime<Utc>,
	pub committer_name: String,
	pub committer_email: String,
	pub committer_time: DateTime<Utc>,
	pub message: String,
}

impl From<&Commit> for CommitDto {
	fn from(c: &Commit) -> Self {
		CommitDto {
			hash: c.hash.clone(),
			parents: c.parents.clone(),
			author_name: c.author_name.clone(),
			author_email: c.author_email.clone(),
			author_time: c.author_time,
			committer_name: c.committer_name.clone(),
			committer_email: c.committer_email.clone(),
			committer_time: c.committer_time,
			message: c.message.clone(),
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEntryKindDto {
	Blob,
	Tree,
	Commit,
}

impl From<EntryKind> for TreeEntryKindDto {
	fn from(k: EntryKind) -> Self {
		match k {
			EntryKind::Blob => TreeEntryKindDto::Blob,
			EntryKind::Tree => TreeEntryKindDto::Tree,
			EntryKind::Commit => TreeEntryKindDto::Commit,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct TreeEntryDto {
	pub name: String,
	pub full_path: String,
	pub kind: TreeEntryKindDto,
	pub mode: u32,
	pub hash: String,
	pub size: u64,
}

impl From<&TreeEntry> for TreeEntryDto {
	fn from(e: &TreeEntry) -> Self {
		TreeEntryDto {
			name: e.name.clone(),
			full_path: e.full_path.clone(),
			kind: e.kind.into(),
			mode: e.mode,
			hash: e.hash.clone(),
			size: e.size,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct FileContentDto {
	pub content: String,
	pub is_binary: bool,
	pub encoding: &'static str,
}

impl From<&FileContent> for FileContentDto {
	fn from(f: &FileContent) -> Self {
		let (content, encoding) = match f.encoding {
			Encoding::Utf8 => (String::from_utf8_lossy(&f.data).into_owned(), "utf-8"),
			Encoding::Base64 => (
				base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &f.data),
				"base64",
			),
		};
		FileContentDto { content, is_binary: f.is_binary, encoding }
	}
}

#[derive(Debug, Serialize)]
pub struct BlameLineDto {
	pub line_no: u32,
	pub commit: String,
	pub author_name: String,
	pub author_email: String,
	pub timestamp: DateTime<Utc>,
	pub content: String,
}

impl From<&forgekeep_scm::BlameLine> for BlameLineDto {
	fn from(l: &forgekeep_scm::BlameLine) -> Self {
		BlameLineDto {
			line_no: l.line_no,
			commit: l.commit.clone(),
			author_name: l.author_name.clone(),
			author_email: l.author_email.clone(),
			timestamp: l.timestamp,
			content: l.content.clone(),
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeStatusDto {
	Added,
	Modified,
	Deleted,
	Renamed,
}

impl From<FileChangeStatus> for FileChangeStatusDto {
	fn from(s: FileChangeStatus) -> Self {
		match s {
			FileChangeStatus::Added => FileChangeStatusDto::Added,
			FileChangeStatus::Modified => FileChangeStatusDto::Modified,
			FileChangeStatus::Deleted => FileChangeStatusDto::Deleted,
			FileChangeStatus::Renamed => FileChangeStatusDto::Renamed,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct FileDiffDto {
	pub old_path: Option<String>,
	pub new_path: Option<String>,
	pub status: FileChangeStatusDto,
	pub additions: u32,
	pub deletions: u32,
	pub patch: String,
}

impl From<&FileDiff> for FileDiffDto {
	fn from(d: &FileDiff) -> Self {
		FileDiffDto {
			old_path: d.old_path.clone(),
			new_path: d.new_path.clone(),
			status: d.status.into(),
			additions: d.additions,
			deletions: d.deletions,
			patch: d.patch.clone(),
		}
	}
}

#[derive(Debug, Serialize)]
pub struct DiffResultDto {
	pub raw_patch: String,
	pub files: Vec<FileDiffDto>,
}

impl From<&DiffResult> for DiffResultDto {
	fn from(d: &DiffResult) -> Self {
		DiffResultDto { raw_patch: d.raw_patch.clone(), files: d.files.iter().map(FileDiffDto::from).collect() }
	}
}

pub fn language_stats_dto(stats: &LanguageStats) -> serde_json::Value {
	serde_json::to_value(stats).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, Serialize)]
pub struct SshKeyDto {
	pub id: Uuid,
	pub title: String,
	pub fingerprint: String,
	pub key_type: String,
	pub last_used_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl From<&SshKeyRecord> for SshKeyDto {
	fn from(k: &SshKeyRecord) -> Self {
		SshKeyDto {
			id: k.id,
			title: k.title.clone(),
			fingerprint: k.fingerprint.clone(),
			key_type: k.key_type.clone(),
			last_used_at: k.last_used_at,
			created_at: k.created_at,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct CreateSshKeyRequest {
	pub title: String,
	pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct TokenDto {
	pub id: Uuid,
	pub name: String,
	pub scope: Vec<String>,
	pub expires_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl From<&TokenRecord> for TokenDto {
	fn from(t: &TokenRecord) -> Self {
		TokenDto {
			id: t.id,
			name: t.name.clone(),
			scope: serde_json::from_str(&t.scope).unwrap_or_default(),
			expires_at: t.expires_at,
			last_used_at: t.last_used_at,
			created_at: t.created_at,
		}
	}
}

/// Returned only once, at creation time; never reconstructable afterwards.
#[derive(Debug, Serialize)]
pub struct CreatedTokenDto {
	#[serde(flatten)]
	pub token: TokenDto,
	pub raw_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
	pub name: String,
	#[serde(default)]
	pub scope: Vec<String>,
	#[serde(default)]
	pub expires_in_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerJobRequest {
	pub commit_sha: String,
	pub ref_name: String,
	#[serde(default)]
	pub is_tag: bool,
	#[serde(default)]
	pub config_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
	#[serde(default = "default_page")]
	pub page: i64,
	#[serde(default = "default_per_page")]
	pub per_page: i64,
}

fn default_page() -> i64 {
	1
}

fn default_per_page() -> i64 {
	30
}

impl PaginationQuery {
	pub fn limit_offset(&self) -> (i64, i64) {
		let per_page = self.per_page.clamp(1, 100);
		let page = self.page.max(1);
		(per_page, (page - 1) * per_page)
	}
}
