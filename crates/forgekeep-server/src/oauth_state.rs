//! OAuth state parameter store for CSRF protection on the OIDC login flow.
//!
//! `GET /auth/oidc/login` mints a state token and stores it here before
//! redirecting to the IdP; `GET /auth/oidc/callback` consumes it exactly
//! once. A single OIDC provider is configured per deployment, so unlike a
//! multi-provider store this one doesn't need to track which provider a
//! state belongs to.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::RwLock;

const STATE_EXPIRY_SECONDS: u64 = 600;

struct OAuthStateEntry {
	created_at: Instant,
	redirect_url: Option<String>,
}

/// Prevents open-redirect abuse of `redirect_uri`/`redirect_url` query
/// parameters: only same-origin relative paths are accepted.
pub fn is_safe_redirect(url: &str) -> bool {
	url.starts_with('/') && !url.starts_with("//")
}

pub fn sanitize_redirect(url: Option<&str>) -> String {
	match url {
		Some(u) if is_safe_redirect(u) => u.to_string(),
		_ => "/".to_string(),
	}
}

#[derive(Default)]
pub struct OAuthStateStore {
	states: RwLock<HashMap<String, OAuthStateEntry>>,
}

impl OAuthStateStore {
	pub fn new() -> Self {
		Self::default()
	}

	#[tracing::instrument(skip(self, state, redirect_url))]
	pub async fn store(&self, state: String, redirect_url: Option<String>) {
		let mut states = self.states.write().await;
		states.insert(state, OAuthStateEntry { created_at: Instant::now(), redirect_url });
	}

	/// Removes `state` from the store whether or not it validates, so a
	/// probing attacker learns nothing from response timing.
	#[tracing::instrument(skip(self, state))]
	pub async fn validate_and_consume(&self, state: &str) -> Option<Option<String>> {
		let mut states = self.states.write().await;
		let entry = states.remove(state)?;
		if entry.created_at.elapsed() >= Duration::from_secs(STATE_EXPIRY_SECONDS) {
			return None;
		}
		Some(entry.redirect_url)
	}

	#[tracing::instrument(skip(self))]
	pub async fn cleanup_expired(&self) -> usize {
		let mut states = self.states.write().await;
		let before = states.len();
		states.retain(|_, entry| entry.created_at.elapsed() < Duration::from_secs(STATE_EXPIRY_SECONDS));
		before - states.len()
	}
}

/// 32 bytes of randomness, URL-safe base64 encoded per §6.
pub fn generate_state() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn store_then_consume_succeeds_once() {
		let store = OAuthStateStore::new();
		let state = generate_state();
		store.store(state.clone(), Some("/dashboard".to_string())).await;

		let first = store.validate_and_consume(&state).await;
		assert_eq!(first, Some(Some("/dashboard".to_string())));

		let second = store.validate_and_consume(&state).await;
		assert_eq!(second, None);
	}

	#[tokio::test]
	async fn unknown_state_is_rejected() {
		let store = OAuthStateStore::new();
		assert_eq!(store.validate_and_consume("bogus").await, None);
	}

	#[test]
	fn generated_states_are_unique() {
		let a = generate_state();
		let b = generate_state();
		assert_ne!(a, b);
	}

	#[test]
	fn rejects_absolute_and_protocol_relative_redirects() {
		assert!(is_safe_redirect("/dashboard"));
		assert!(!is_safe_redirect("https://evil.example"));
		assert!(!is_safe_redirect("//evil.example"));
		assert_eq!(sanitize_redirect(Some("//evil.example")), "/");
		assert_eq!(sanitize_redirect(None), "/");
	}
}
