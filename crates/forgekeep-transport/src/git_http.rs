//! Smart-HTTP front end (§4.6): the three exact endpoints under
//! `/<owner>/<repo>.git/...`. Ref advertisement and the two pack services
//! delegate straight to [`forgekeep_scm::GitEngine`]; `git-receive-pack`
//! additionally runs the post-receive cascade (`SetDefaultBranchOnPush` +
//! an optional CI trigger per updated ref).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use forgekeep_auth::{Action, AuthResolver};
use forgekeep_ci::{CiDispatcher, RefType, TriggerRequest, TriggerType};
use forgekeep_db::{RepositoryRecord, RepositoryStore, SqliteRepositoryStore, SqliteUserStore, UserStore};
use forgekeep_scm::repo_service::RepoService;
use forgekeep_scm::GitEngine;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::principal::{authenticate, Principal};

const ZERO_OID: &str = "0000000000000000000000000000000000000000";

pub struct GitHttpState {
	pub engine: GitEngine,
	pub repos: Arc<SqliteRepositoryStore>,
	pub users: Arc<SqliteUserStore>,
	pub repo_service: Arc<RepoService<SqliteRepositoryStore, SqliteUserStore>>,
	pub auth: Arc<AuthResolver>,
	pub ci: Option<Arc<CiDispatcher>>,
	pub public_clone_base: String,
}

pub fn router(state: Arc<GitHttpState>) -> Router {
	Router::new()
		.route("/{owner}/{repo}/info/refs", get(info_refs))
		.route("/{owner}/{repo}/git-upload-pack", post(upload_pack))
		.route("/{owner}/{repo}/git-receive-pack", post(receive_pack))
		.with_state(state)
}

fn strip_git_suffix(repo: &str) -> &str {
	repo.strip_suffix(".git").unwrap_or(repo)
}

async fn resolve_repository(
	state: &GitHttpState,
	owner: &str,
	repo: &str,
) -> Result<RepositoryRecord, ApiError> {
	let name = strip_git_suffix(repo);
	let owner_user = state
		.users
		.get_user_by_username(owner)
		.await?
		.ok_or(ApiError::NotFound)?;
	state
		.repos
		.get_repository_by_owner_and_name(owner_user.id, name)
		.await?
		.ok_or(ApiError::NotFound)
}

fn enforce_access(
	principal: &Option<Principal>,
	repository: &RepositoryRecord,
	action: Action,
	owner: &str,
) -> Result<(), ApiError> {
	let user = principal.as_ref().map(|p| &p.user);
	let allowed = AuthResolver::check_repository_access(user, repository, action);
	if !allowed {
		return Err(if principal.is_some() { ApiError::Forbidden } else { ApiError::Unauthorized });
	}
	if let Some(token) = principal.as_ref().and_then(|p| p.token.as_ref()) {
		let scope_key = format!("{owner}/{}", repository.name);
		if !AuthResolver::check_pat_scope(token, &scope_key) {
			return Err(ApiError::Forbidden);
		}
	}
	Ok(())
}

#[derive(Deserialize)]
struct ServiceQuery {
	service: String,
}

async fn info_refs(
	State(state): State<Arc<GitHttpState>>,
	Path((owner, repo)): Path<(String, String)>,
	Query(query): Query<ServiceQuery>,
	headers: HeaderMap,
) -> Result<Response, ApiError> {
	let repository = resolve_repository(&state, &owner, &repo).await?;
	let principal = authenticate(&headers, &state.auth).await;
	let action = if query.service == "git-receive-pack" { Action::Write } else { Action::Read };
	enforce_access(&principal, &repository, action, &owner)?;

	let advertisement = state.engine.get_info_refs(&repository.git_path, &query.service).await?;
	let content_type = format!("application/x-{}-advertisement", query.service);
	Ok(([(axum::http::header::CONTENT_TYPE, content_type)], advertisement).into_response())
}

async fn upload_pack(
	State(state): State<Arc<GitHttpState>>,
	Path((owner, repo)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ApiError> {
	let repository = resolve_repository(&state, &owner, &repo).await?;
	let principal = authenticate(&headers, &state.auth).await;
	enforce_access(&principal, &repository, Action::Read, &owner)?;

	let output = state
		.engine
		.upload_pack(&repository.git_path, &body, CancellationToken::new())
		.await?;
	Ok((
		StatusCode::OK,
		[(axum::http::header::CONTENT_TYPE, "application/x-git-upload-pack-result")],
		output,
	)
		.into_response())
}

async fn receive_pack(
	State(state): State<Arc<GitHttpState>>,
	Path((owner, repo)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ApiError> {
	let repository = resolve_repository(&state, &owner, &repo).await?;
	let principal = authenticate(&headers, &state.auth).await;
	enforce_access(&principal, &repository, Action::Write, &owner)?;

	let updates = parse_ref_updates(&body);
	let output = state
		.engine
		.receive_pack(&repository.git_path, &body, CancellationToken::new())
		.await?;

	if let Err(e) = state.repo_service.set_default_branch_on_push(&repository).await {
		tracing::warn!(error = %e, repository_id = %repository.id, "post-receive default-branch cascade failed");
	}

	if let Some(ci) = &state.ci {
		let actor = principal.as_ref().map(|p| p.user.username.clone()).unwrap_or_else(|| "unknown".into());
		for update in &updates {
			if update.new == ZERO_OID {
				continue;
			}
			let Some((ref_type, short_name)) = classify_ref(&update.name) else {
				continue;
			};
			let trigger = TriggerRequest {
				repository_id: repository.id,
				owner: owner.clone(),
				name: repository.name.clone(),
				clone_url: format!("{}/{owner}/{}.git", state.public_clone_base, repository.name),
				commit_sha: update.new.clone(),
				ref_name: short_name,
				ref_type,
				trigger_type: if matches!(ref_type, RefType::Tag) { TriggerType::Tag } else { TriggerType::Push },
				trigger_actor: actor.clone(),
				config_path: None,
				metadata: serde_json::json!({}),
				timeout_seconds: None,
			};
			if let Err(e) = ci.trigger(trigger).await {
				tracing::warn!(error = %e, repository_id = %repository.id, ref_name = %update.name, "failed to trigger ci job for pushed ref");
			}
		}
	}

	Ok((
		StatusCode::OK,
		[(axum::http::header::CONTENT_TYPE, "application/x-git-receive-pack-result")],
		output,
	)
		.into_response())
}

struct RefUpdate {
	new: String,
	name: String,
}

fn classify_ref(name: &str) -> Option<(RefType, String)> {
	if let Some(branch) = name.strip_prefix("refs/heads/") {
		Some((RefType::Branch, branch.to_string()))
	} else if let Some(tag) = name.strip_prefix("refs/tags/") {
		Some((RefType::Tag, tag.to_string()))
	} else {
		None
	}
}

/// Parses the `<old> <new> <ref>` command list that precedes the pack
/// stream in a `git-receive-pack` request body. Stops at the first flush
/// pkt-line; everything after that is the (non-pkt-line) pack itself and
/// must not be fed back through this parser.
fn parse_ref_updates(body: &[u8]) -> Vec<RefUpdate> {
	let mut updates = Vec::new();
	let mut pos = 0;
	let mut first = true;

	while pos + 4 <= body.len() {
		let Ok(len_hex) = std::str::from_utf8(&body[pos..pos + 4]) else { break };
		let Ok(len) = u32::from_str_radix(len_hex, 16) else { break };
		let len = len as usize;
		if len == 0 {
			break;
		}
		if len < 4 || pos + len > body.len() {
			break;
		}
		let mut payload = &body[pos + 4..pos + len];
		pos += len;

		if first {
			if let Some(nul) = payload.iter().position(|&b| b == 0) {
				payload = &payload[..nul];
			}
			first = false;
		}

		let line = String::from_utf8_lossy(payload);
		let line = line.trim_end();
		let mut parts = line.splitn(3, ' ');
		if let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) {
			updates.push(RefUpdate { new: new.to_string(), name: name.to_string() });
			let _ = old;
		}
	}
	updates
}

#[cfg(test)]
mod tests {
	use super::*;
	use forgekeep_scm::packetline;

	#[test]
	fn parses_single_ref_update_with_capabilities() {
		let mut body = packetline::encode_str(
			"0000000000000000000000000000000000000000 deadbeefdeadbeefdeadbeefdeadbeefdeadbeef refs/heads/main\0report-status\n",
		);
		body.extend(packetline::flush());
		body.extend_from_slice(b"PACK...");

		let updates = parse_ref_updates(&body);
		assert_eq!(updates.len(), 1);
		assert_eq!(updates[0].name, "refs/heads/main");
		assert_eq!(updates[0].new, "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
	}

	#[test]
	fn classifies_branch_and_tag_refs() {
		assert!(matches!(classify_ref("refs/heads/main"), Some((RefType::Branch, _))));
		assert!(matches!(classify_ref("refs/tags/v1.0.0"), Some((RefType::Tag, _))));
		assert!(classify_ref("refs/notes/commits").is_none());
	}
}
