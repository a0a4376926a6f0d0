//! `/v1/repos/*` (§6): repository CRUD, mirror config, and the browsing
//! surface (branches/tags/tree/blob/commits/blame/diff/compare) that rides
//! on top of `GitEngine` the same way `forgekeep-transport`'s git_http
//! handlers ride on it for the wire protocol.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use forgekeep_auth::Action;
use forgekeep_db::{RepositoryRecord, RepositoryStore, UserRecord, UserStore};
use forgekeep_transport::{authenticate, ApiError};
use serde::Deserialize;

use crate::api::dto::{
	language_stats_dto, BlameLineDto, BranchDto, CommitDto, CreateBranchRequest, CreateRepositoryRequest,
	CreateTagRequest, DiffResultDto, FileContentDto, ImportRepositoryRequest, MirrorConfigDto, PaginationQuery,
	RepositoryDto, TagDto, TreeEntryDto, UpdateRepositoryRequest,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/", get(list_own_repos).post(create_repository))
		.route("/import", post(import_repository))
		.route("/public", get(list_public_repos))
		.route(
			"/{owner}/{repo}",
			get(get_repository).patch(update_repository).delete(delete_repository),
		)
		.route("/{owner}/{repo}/stats", get(get_stats))
		.route("/{owner}/{repo}/mirror", get(get_mirror).patch(update_mirror))
		.route("/{owner}/{repo}/sync", post(sync_now))
		.route("/{owner}/{repo}/mirror/status", get(mirror_status))
		.route("/{owner}/{repo}/branches", get(list_branches).post(create_branch))
		.route("/{owner}/{repo}/branches/{name}", axum::routing::delete(delete_branch))
		.route("/{owner}/{repo}/tags", get(list_tags).post(create_tag))
		.route("/{owner}/{repo}/tags/{name}", axum::routing::delete(delete_tag))
		.route("/{owner}/{repo}/commits", get(list_commits))
		.route("/{owner}/{repo}/commits/{hash}", get(get_commit))
		.route("/{owner}/{repo}/tree/{ref_spec}", get(get_tree_root))
		.route("/{owner}/{repo}/tree/{ref_spec}/{*path}", get(get_tree))
		.route("/{owner}/{repo}/blob/{ref_spec}/{*path}", get(get_blob))
		.route("/{owner}/{repo}/blame/{ref_spec}/{*path}", get(get_blame))
		.route("/{owner}/{repo}/diff/{commit}", get(get_diff))
		.route("/{owner}/{repo}/compare", get(get_compare))
}

async fn require_principal(headers: &HeaderMap, state: &AppState) -> Result<UserRecord, ApiError> {
	authenticate(headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)
}

async fn resolve_repository(state: &AppState, owner: &str, name: &str) -> Result<RepositoryRecord, ApiError> {
	let owner_user = state.users.get_user_by_username(owner).await?.ok_or(ApiError::NotFound)?;
	state.repos.get_repository_by_owner_and_name(owner_user.id, name).await?.ok_or(ApiError::NotFound)
}

fn enforce(principal: Option<&UserRecord>, repo: &RepositoryRecord, action: Action) -> Result<(), ApiError> {
	if forgekeep_auth::AuthResolver::check_repository_access(principal, repo, action) {
		Ok(())
	} else if principal.is_some() {
		Err(ApiError::Forbidden)
	} else {
		Err(ApiError::Unauthorized)
	}
}

async fn list_own_repos(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Vec<RepositoryDto>>, ApiError> {
	let user = require_principal(&headers, &state).await?;
	let repos = state.repos.list_repositories_by_owner(user.id).await?;
	Ok(Json(repos.iter().map(|r| RepositoryDto::new(r, &user.username)).collect()))
}

async fn list_public_repos(
	State(state): State<AppState>,
	Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<RepositoryDto>>, ApiError> {
	let (limit, offset) = page.limit_offset();
	let repos = state.repos.list_public_repositories(limit, offset).await?;
	let mut out = Vec::with_capacity(repos.len());
	for repo in &repos {
		let owner = state.users.get_user_by_id(repo.owner_id).await?.ok_or(ApiError::NotFound)?;
		out.push(RepositoryDto::new(repo, &owner.username));
	}
	Ok(Json(out))
}

async fn create_repository(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<CreateRepositoryRequest>,
) -> Result<Json<RepositoryDto>, ApiError> {
	let user = require_principal(&headers, &state).await?;
	let repo = state
		.repo_service
		.create_repository(user.id, &req.name, req.description, req.is_private)
		.await?;
	Ok(Json(RepositoryDto::new(&repo, &user.username)))
}

async fn import_repository(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<ImportRepositoryRequest>,
) -> Result<Json<RepositoryDto>, ApiError> {
	let user = require_principal(&headers, &state).await?;
	let repo = state
		.repo_service
		.create_repository(user.id, &req.name, req.description, req.is_private)
		.await?;

	let git_path = repo.git_path.clone();
	let source = req.source_url.clone();
	if let Err(e) = state.git_http.engine.clone_repository(&source, &git_path, true).await {
		tracing::warn!(error = %e, %source, "import clone failed after metadata row was created");
		return Err(e.into());
	}
	Ok(Json(RepositoryDto::new(&repo, &user.username)))
}

async fn get_repository(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<RepositoryDto>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	Ok(Json(RepositoryDto::new(&repo, &owner)))
}

async fn update_repository(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Json(req): Json<UpdateRepositoryRequest>,
) -> Result<Json<RepositoryDto>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	let updated = state
		.repo_service
		.update_repository(repo.id, req.description, req.is_private, req.default_branch)
		.await?;
	Ok(Json(RepositoryDto::new(&updated, &owner)))
}

async fn delete_repository(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<axum::http::StatusCode, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	state.repo_service.delete_repository(repo.id).await?;
	Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn get_stats(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	let stats = state.git_http.engine.language_stats(&repo.git_path).await?;
	Ok(Json(language_stats_dto(&stats)))
}

#[derive(Deserialize)]
pub struct MirrorConfigRequest {
	pub enabled: bool,
	pub direction: String,
	#[serde(default)]
	pub upstream_url: Option<String>,
	#[serde(default)]
	pub downstream_url: Option<String>,
	#[serde(default)]
	pub sync_interval_seconds: Option<i64>,
	#[serde(default)]
	pub sync_schedule: Option<String>,
}

async fn get_mirror(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Option<MirrorConfigDto>>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	Ok(Json(state.repos.get_mirror_config(repo.id).await?.as_ref().map(MirrorConfigDto::from)))
}

async fn update_mirror(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Json(req): Json<MirrorConfigRequest>,
) -> Result<Json<MirrorConfigDto>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;

	let existing = state.repos.get_mirror_config(repo.id).await?;
	let config = forgekeep_db::MirrorConfigRecord {
		repository_id: repo.id,
		enabled: req.enabled,
		direction: req.direction,
		upstream_url: req.upstream_url,
		upstream_creds_ref: existing.as_ref().and_then(|c| c.upstream_creds_ref.clone()),
		downstream_url: req.downstream_url,
		downstream_creds_ref: existing.as_ref().and_then(|c| c.downstream_creds_ref.clone()),
		sync_interval_seconds: req.sync_interval_seconds,
		sync_schedule: req.sync_schedule,
		last_synced_at: existing.as_ref().and_then(|c| c.last_synced_at),
		status: existing.map(|c| c.status).unwrap_or_else(|| "idle".to_string()),
		last_error: None,
	};
	state.repos.upsert_mirror_config(&config).await?;
	Ok(Json(MirrorConfigDto::from(&config)))
}

async fn sync_now(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<axum::http::StatusCode, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	let claimed = state.mirror_scheduler.sync_now(repo.id).await?;
	Ok(if claimed { axum::http::StatusCode::ACCEPTED } else { axum::http::StatusCode::CONFLICT })
}

async fn mirror_status(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Option<MirrorConfigDto>>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	Ok(Json(state.repos.get_mirror_config(repo.id).await?.as_ref().map(MirrorConfigDto::from)))
}

async fn read_checked(
	state: &AppState,
	headers: &HeaderMap,
	owner: &str,
	name: &str,
) -> Result<RepositoryRecord, ApiError> {
	let repo = resolve_repository(state, owner, name).await?;
	let principal = authenticate(headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	Ok(repo)
}

async fn list_branches(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Vec<BranchDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let branches = state.git_http.engine.list_branches(&repo.git_path).await?;
	Ok(Json(branches.iter().map(BranchDto::from).collect()))
}

async fn create_branch(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Json(req): Json<CreateBranchRequest>,
) -> Result<Json<BranchDto>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	state.git_http.engine.create_branch(&repo.git_path, &req.name, &req.start_point).await?;
	let branch = state.git_http.engine.get_branch(&repo.git_path, &req.name).await?;
	Ok(Json(BranchDto::from(&branch)))
}

async fn delete_branch(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, branch)): Path<(String, String, String)>,
) -> Result<axum::http::StatusCode, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	state.git_http.engine.delete_branch(&repo.git_path, &branch).await?;
	Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn list_tags(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Vec<TagDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let tags = state.git_http.engine.list_tags(&repo.git_path).await?;
	Ok(Json(tags.iter().map(TagDto::from).collect()))
}

async fn create_tag(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Json(req): Json<CreateTagRequest>,
) -> Result<Json<TagDto>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;

	let signature = forgekeep_scm::TagSignature {
		name: user.username.clone(),
		email: user.email.clone(),
		timestamp: chrono::Utc::now(),
	};
	let annotation = req.annotation.as_deref().map(|text| (text, &signature));
	state.git_http.engine.create_tag(&repo.git_path, &req.name, &req.target_ref, annotation).await?;
	let tag = state.git_http.engine.get_tag(&repo.git_path, &req.name).await?;
	Ok(Json(TagDto::from(&tag)))
}

async fn delete_tag(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, tag)): Path<(String, String, String)>,
) -> Result<axum::http::StatusCode, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = require_principal(&headers, &state).await?;
	enforce(Some(&user), &repo, Action::Write)?;
	state.git_http.engine.delete_tag(&repo.git_path, &tag).await?;
	Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CommitsQuery {
	#[serde(rename = "ref", default = "default_ref")]
	ref_spec: String,
	#[serde(default)]
	limit: Option<u32>,
	#[serde(default)]
	offset: u64,
}

fn default_ref() -> String {
	String::new()
}

async fn list_commits(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Query(query): Query<CommitsQuery>,
) -> Result<Json<Vec<CommitDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let commits =
		state.git_http.engine.get_commits(&repo.git_path, &query.ref_spec, query.limit, query.offset).await?;
	Ok(Json(commits.iter().map(CommitDto::from).collect()))
}

async fn get_commit(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, hash)): Path<(String, String, String)>,
) -> Result<Json<CommitDto>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let commit = state.git_http.engine.get_commit(&repo.git_path, &hash).await?;
	Ok(Json(CommitDto::from(&commit)))
}

async fn get_tree_root(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, ref_spec)): Path<(String, String, String)>,
) -> Result<Json<Vec<TreeEntryDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let entries = state.git_http.engine.get_tree(&repo.git_path, &ref_spec, "").await?;
	Ok(Json(entries.iter().map(TreeEntryDto::from).collect()))
}

async fn get_tree(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, ref_spec, path)): Path<(String, String, String, String)>,
) -> Result<Json<Vec<TreeEntryDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let entries = state.git_http.engine.get_tree(&repo.git_path, &ref_spec, &path).await?;
	Ok(Json(entries.iter().map(TreeEntryDto::from).collect()))
}

async fn get_blob(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, ref_spec, path)): Path<(String, String, String, String)>,
) -> Result<Json<FileContentDto>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let content = state.git_http.engine.get_file_content(&repo.git_path, &ref_spec, &path).await?;
	Ok(Json(FileContentDto::from(&content)))
}

async fn get_blame(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, ref_spec, path)): Path<(String, String, String, String)>,
) -> Result<Json<Vec<BlameLineDto>>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let lines = state.git_http.engine.get_blame(&repo.git_path, &ref_spec, &path).await?;
	Ok(Json(lines.iter().map(BlameLineDto::from).collect()))
}

async fn get_diff(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, commit)): Path<(String, String, String)>,
) -> Result<Json<DiffResultDto>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let diff = state.git_http.engine.get_diff(&repo.git_path, &commit).await?;
	Ok(Json(DiffResultDto::from(&diff)))
}

#[derive(Deserialize)]
struct CompareQuery {
	from: String,
	to: String,
}

async fn get_compare(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Query(query): Query<CompareQuery>,
) -> Result<Json<DiffResultDto>, ApiError> {
	let repo = read_checked(&state, &headers, &owner, &name).await?;
	let diff = state.git_http.engine.get_compare_diff(&repo.git_path, &query.from, &query.to).await?;
	Ok(Json(DiffResultDto::from(&diff)))
}
