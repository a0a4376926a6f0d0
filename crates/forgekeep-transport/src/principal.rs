//! Bearer/cookie credential extraction shared by the Git-wire handlers and
//! the REST API (§6: `Authorization: Bearer <jwt-or-pat>`, with `auth_token`
//! accepted as a cookie fallback).

use axum::http::HeaderMap;
use forgekeep_auth::AuthResolver;
use forgekeep_db::{TokenRecord, UserRecord};

/// A resolved caller. `token` is set only when the credential was a PAT, so
/// callers can additionally enforce [`AuthResolver::check_pat_scope`].
#[derive(Clone)]
pub struct Principal {
	pub user: UserRecord,
	pub token: Option<TokenRecord>,
}

fn extract_raw_credential(headers: &HeaderMap) -> Option<String> {
	if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
		if let Ok(s) = value.to_str() {
			if let Some(rest) = s.strip_prefix("Bearer ") {
				return Some(rest.to_string());
			}
		}
	}
	let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
	for pair in cookie_header.split(';') {
		let pair = pair.trim();
		if let Some(value) = pair.strip_prefix("auth_token=") {
			return Some(value.to_string());
		}
	}
	None
}

/// Resolves the request's credential against every entry point the spec
/// names for HTTP(S): session JWT first, PAT second. Returns `Ok(None)` for
/// an anonymous request rather than an error — callers decide whether
/// anonymous access is permitted (e.g. a public repository read).
pub async fn authenticate(headers: &HeaderMap, auth: &AuthResolver) -> Option<Principal> {
	let raw = extract_raw_credential(headers)?;
	if let Ok(user) = auth.authenticate_session(&raw).await {
		return Some(Principal { user, token: None });
	}
	if let Ok((user, token)) = auth.authenticate_token(&raw).await {
		return Some(Principal { user, token: Some(token) });
	}
	None
}
