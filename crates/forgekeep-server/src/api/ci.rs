//! `/v1/repos/{owner}/{repo}/ci/jobs/*` (§6, §4.5): manual job trigger,
//! lifecycle queries, log tailing, and the live SSE event stream fanned out
//! by `CiDispatcher::subscribe`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use forgekeep_auth::Action;
use forgekeep_ci::{CiJob, CiJobLog, RefType, TriggerRequest, TriggerType};
use forgekeep_db::{RepositoryRecord, RepositoryStore, UserRecord, UserStore};
use forgekeep_transport::{authenticate, ApiError};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::dto::TriggerJobRequest;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/", get(list_jobs).post(trigger_job))
		.route("/{id}", get(get_job))
		.route("/{id}/cancel", axum::routing::post(cancel_job))
		.route("/{id}/retry", axum::routing::post(retry_job))
		.route("/{id}/logs", get(get_logs))
		.route("/{id}/stream", get(stream_job))
}

fn ci(state: &AppState) -> Result<&forgekeep_ci::CiDispatcher, ApiError> {
	state.ci.as_deref().ok_or_else(|| ApiError::BadRequest("ci dispatching is not enabled".into()))
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

async fn job_in_repository(
	state: &AppState,
	repo: &RepositoryRecord,
	job_id: Uuid,
) -> Result<CiJob, ApiError> {
	let job = ci(state)?.get_job(job_id).await?;
	if job.repository_id != repo.id {
		return Err(ApiError::NotFound);
	}
	Ok(job)
}

#[derive(Deserialize)]
struct ListJobsQuery {
	#[serde(rename = "ref")]
	ref_name: Option<String>,
	#[serde(default = "default_limit")]
	limit: i64,
}

fn default_limit() -> i64 {
	30
}

async fn list_jobs(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<CiJob>>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;

	let jobs = match query.ref_name {
		Some(ref_name) => ci(&state)?.list_jobs_by_ref(repo.id, &ref_name).await?,
		None => ci(&state)?.list_jobs_by_repository(repo.id, query.limit).await?,
	};
	Ok(Json(jobs))
}

async fn trigger_job(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name)): Path<(String, String)>,
	Json(req): Json<TriggerJobRequest>,
) -> Result<Json<CiJob>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = authenticate(&headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)?;
	enforce(Some(&user), &repo, Action::Write)?;

	let clone_url = format!(
		"{}/{owner}/{}.git",
		state.git_http.public_clone_base, repo.name
	);
	let trigger = TriggerRequest {
		repository_id: repo.id,
		owner,
		name: repo.name.clone(),
		clone_url,
		commit_sha: req.commit_sha,
		ref_name: req.ref_name,
		ref_type: if req.is_tag { RefType::Tag } else { RefType::Branch },
		trigger_type: TriggerType::Manual,
		trigger_actor: user.username,
		config_path: req.config_path,
		metadata: serde_json::json!({}),
		timeout_seconds: None,
	};
	let job = ci(&state)?.trigger(trigger).await?;
	Ok(Json(job))
}

async fn get_job(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, id)): Path<(String, String, Uuid)>,
) -> Result<Json<CiJob>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	Ok(Json(job_in_repository(&state, &repo, id).await?))
}

async fn cancel_job(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, id)): Path<(String, String, Uuid)>,
) -> Result<Json<CiJob>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = authenticate(&headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)?;
	enforce(Some(&user), &repo, Action::Write)?;
	job_in_repository(&state, &repo, id).await?;
	Ok(Json(ci(&state)?.cancel_job(id).await?))
}

async fn retry_job(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, id)): Path<(String, String, Uuid)>,
) -> Result<Json<CiJob>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let user = authenticate(&headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)?;
	enforce(Some(&user), &repo, Action::Write)?;
	job_in_repository(&state, &repo, id).await?;

	let clone_url = format!("{}/{owner}/{}.git", state.git_http.public_clone_base, repo.name);
	let job = ci(&state)?.retry_job(id, &owner, &repo.name, &clone_url, &user.username).await?;
	Ok(Json(job))
}

#[derive(Deserialize)]
struct LogsQuery {
	#[serde(default = "default_limit")]
	limit: i64,
	#[serde(default)]
	offset: i64,
	#[serde(default)]
	after_sequence: Option<i64>,
}

async fn get_logs(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, id)): Path<(String, String, Uuid)>,
	Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<CiJobLog>>, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	job_in_repository(&state, &repo, id).await?;

	let logs = match query.after_sequence {
		Some(after) => ci(&state)?.get_job_logs_after_sequence(id, after).await?,
		None => ci(&state)?.get_job_logs(id, query.limit, query.offset).await?,
	};
	Ok(Json(logs))
}

async fn stream_job(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((owner, name, id)): Path<(String, String, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
	let repo = resolve_repository(&state, &owner, &name).await?;
	let principal = authenticate(&headers, &state.auth).await.map(|p| p.user);
	enforce(principal.as_ref(), &repo, Action::Read)?;
	job_in_repository(&state, &repo, id).await?;

	let dispatcher = state.ci.clone().ok_or_else(|| ApiError::BadRequest("ci dispatching is not enabled".into()))?;
	let (subscriber_id, mut rx) = dispatcher.subscribe(id).await;

	let stream = async_stream::stream! {
		loop {
			match rx.recv().await {
				Some(event) => {
					let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
					yield Ok::<Event, Infallible>(Event::default().event(event.event_name()).data(data));
				}
				None => break,
			}
		}
		dispatcher.unsubscribe(id, subscriber_id).await;
	};

	Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15))))
}
