//! `/v1/tokens/*` (§6, §3 Token): personal access token issuance and
//! management. The raw value is returned exactly once, at creation.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use forgekeep_auth::hash_token;
use forgekeep_db::{TokenRecord, TokenStore};
use forgekeep_transport::{authenticate, ApiError};
use rand::RngCore;
use uuid::Uuid;

use crate::api::dto::{CreateTokenRequest, CreatedTokenDto, TokenDto};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new().route("/", get(list_tokens).post(create_token)).route("/{id}", axum::routing::delete(delete_token))
}

async fn require_user(headers: &HeaderMap, state: &AppState) -> Result<forgekeep_db::UserRecord, ApiError> {
	authenticate(headers, &state.auth).await.map(|p| p.user).ok_or(ApiError::Unauthorized)
}

/// `"Sx"` prefix plus 16 random bytes hex-encoded, per §3.
fn generate_raw_token() -> String {
	let mut bytes = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut bytes);
	format!("Sx{}", hex::encode(bytes))
}

async fn list_tokens(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<TokenDto>>, ApiError> {
	let user = require_user(&headers, &state).await?;
	let tokens = state.tokens.list_tokens_by_user(user.id).await?;
	Ok(Json(tokens.iter().map(TokenDto::from).collect()))
}

async fn create_token(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<CreateTokenRequest>,
) -> Result<Json<CreatedTokenDto>, ApiError> {
	let user = require_user(&headers, &state).await?;
	let raw_token = generate_raw_token();
	let scope = serde_json::to_string(&req.scope).map_err(|e| ApiError::Internal(e.to_string()))?;

	let record = TokenRecord {
		id: Uuid::new_v4(),
		user_id: user.id,
		name: req.name,
		hashed_token: hash_token(&raw_token),
		scope,
		expires_at: req.expires_in_days.map(|days| Utc::now() + Duration::days(days)),
		last_used_at: None,
		created_at: Utc::now(),
	};
	state.tokens.create_token(&record).await?;
	Ok(Json(CreatedTokenDto { token: TokenDto::from(&record), raw_token }))
}

async fn delete_token(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
	let user = require_user(&headers, &state).await?;
	state.tokens.delete_token(id, user.id).await?;
	Ok(axum::http::StatusCode::NO_CONTENT)
}
