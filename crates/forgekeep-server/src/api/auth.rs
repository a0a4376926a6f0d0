//! `/v1/auth/*` (§6): OIDC login/callback/logout plus `GET /auth/me`.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use forgekeep_transport::{authenticate, ApiError};
use serde::Deserialize;

use crate::api::dto::UserDto;
use crate::oauth_state::{generate_state, sanitize_redirect};
use crate::oidc::OidcLoginConfig;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/oidc/config", get(oidc_config))
		.route("/oidc/login", get(oidc_login))
		.route("/oidc/callback", get(oidc_callback))
		.route("/oidc/logout", axum::routing::post(oidc_logout))
		.route("/me", get(me))
}

async fn oidc_config(State(state): State<AppState>) -> Json<OidcLoginConfig> {
	Json(OidcLoginConfig { enabled: state.oidc.is_some() })
}

#[derive(Deserialize)]
struct LoginQuery {
	redirect_uri: Option<String>,
}

async fn oidc_login(
	State(state): State<AppState>,
	Query(query): Query<LoginQuery>,
) -> Result<Redirect, ApiError> {
	let oidc = state.oidc.as_ref().ok_or_else(|| ApiError::BadRequest("oidc is not enabled".into()))?;
	let csrf_state = generate_state();
	state
		.oauth_state
		.store(csrf_state.clone(), query.redirect_uri.map(|r| sanitize_redirect(Some(&r))))
		.await;
	Ok(Redirect::temporary(oidc.authorization_url(&csrf_state).as_str()))
}

#[derive(Deserialize)]
struct CallbackQuery {
	code: String,
	state: String,
}

async fn oidc_callback(
	State(state): State<AppState>,
	Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
	let oidc = state.oidc.as_ref().ok_or_else(|| ApiError::BadRequest("oidc is not enabled".into()))?;

	let redirect_to = state
		.oauth_state
		.validate_and_consume(&query.state)
		.await
		.ok_or_else(|| ApiError::BadRequest("invalid or expired oidc state".into()))?
		.unwrap_or_else(|| "/".to_string());

	let claims = oidc.exchange_code(&query.code).await.map_err(|e| ApiError::Upstream(e.to_string()))?;
	let email = claims.email.ok_or_else(|| ApiError::Upstream("id_token is missing an email claim".into()))?;

	let user = state
		.auth
		.resolve_oidc_login(
			&claims.sub,
			&claims.iss,
			&email,
			claims.preferred_username.as_deref(),
			claims.name.as_deref(),
		)
		.await?;

	let jwt = state.auth.issue_session_jwt(&user)?;
	let cookie = format!("auth_token={jwt}; Path=/; HttpOnly; SameSite=Lax");
	let cookie = HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.to_string()))?;

	let mut response = Redirect::temporary(&redirect_to).into_response();
	response.headers_mut().insert(SET_COOKIE, cookie);
	Ok(response)
}

#[derive(Deserialize)]
struct LogoutQuery {
	redirect_uri: Option<String>,
}

async fn oidc_logout(Query(query): Query<LogoutQuery>) -> Response {
	let redirect_to = sanitize_redirect(query.redirect_uri.as_deref());
	let mut response = Redirect::temporary(&redirect_to).into_response();
	response.headers_mut().insert(
		SET_COOKIE,
		HeaderValue::from_static("auth_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
	);
	response
}

async fn me(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<UserDto>, ApiError> {
	let principal = authenticate(&headers, &state.auth).await.ok_or(ApiError::Unauthorized)?;
	Ok(Json(UserDto::from(&principal.user)))
}
