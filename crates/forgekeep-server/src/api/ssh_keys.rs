//! `/v1/ssh-keys/*` (§6, §3 SSHKey): per-user public key management. The
//! fingerprint computed here is the same `SHA256:`-prefixed value
//! `forgekeep-transport::ssh` looks up against at connection time.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use forgekeep_auth::fingerprint_from_authorized_keys_line;
use forgekeep_db::{SshKeyRecord, SshKeyStore};
use forgekeep_transport::{authenticate, ApiError};
use uuid::Uuid;

use crate::api::dto::{CreateSshKeyRequest, SshKeyDto};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/", get(list_keys).post(create_key))
		.route("/{id}", get(get_key).delete(delete_key))
}

async fn require_user(headers: &HeaderMap, state: &AppState) -> Result<forgekeep_db::UserRecord, ApiError> {
	authenticate(headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)
}

async fn list_keys(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<SshKeyDto>>, ApiError> {
	let user = require_user(&headers, &state).await?;
	let keys = state.ssh_keys.list_ssh_keys_by_user(user.id).await?;
	Ok(Json(keys.iter().map(SshKeyDto::from).collect()))
}

async fn create_key(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<CreateSshKeyRequest>,
) -> Result<Json<SshKeyDto>, ApiError> {
	let user = require_user(&headers, &state).await?;
	let fingerprint = fingerprint_from_authorized_keys_line(&req.public_key)
		.map_err(|e| ApiError::BadRequest(e.to_string()))?;
	let key_type = req
		.public_key
		.split_whitespace()
		.next()
		.ok_or_else(|| ApiError::BadRequest("public_key is empty".into()))?
		.to_string();

	if state.ssh_keys.get_ssh_key_by_fingerprint(&fingerprint).await?.is_some() {
		return Err(ApiError::Conflict("an ssh key with this fingerprint is already registered".into()));
	}

	let record = SshKeyRecord {
		id: Uuid::new_v4(),
		user_id: user.id,
		title: req.title,
		raw_public_key: req.public_key,
		fingerprint,
		key_type,
		last_used_at: None,
		created_at: Utc::now(),
	};
	state.ssh_keys.create_ssh_key(&record).await?;
	Ok(Json(SshKeyDto::from(&record)))
}

async fn get_key(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<Uuid>,
) -> Result<Json<SshKeyDto>, ApiError> {
	let user = require_user(&headers, &state).await?;
	let key = state
		.ssh_keys
		.list_ssh_keys_by_user(user.id)
		.await?
		.into_iter()
		.find(|k| k.id == id)
		.ok_or(ApiError::NotFound)?;
	Ok(Json(SshKeyDto::from(&key)))
}

async fn delete_key(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
	let user = require_user(&headers, &state).await?;
	state.ssh_keys.delete_ssh_key(id, user.id).await?;
	Ok(axum::http::StatusCode::NO_CONTENT)
}
