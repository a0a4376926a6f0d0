//! `AuthResolver`: the three credential-to-principal entry points, the
//! repository ACL, and OIDC first-login username allocation (§4.2).

use std::sync::Arc;

use chrono::Utc;
use forgekeep_common_secret::SecretString;
use forgekeep_db::{RepositoryRecord, SshKeyStore, TokenRecord, TokenStore, UserRecord, UserStore};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::claims::{SessionClaims, SESSION_LIFETIME_SECS};
use crate::error::{AuthError, Result};
use crate::username::{candidate_username, with_collision_suffix};

const MAX_USERNAME_COLLISION_RETRIES: u32 = 10;

pub enum Action {
	Read,
	Write,
}

pub struct AuthResolver {
	jwt_secret: SecretString,
	jwt_issuer: String,
	users: Arc<dyn UserStore>,
	tokens: Arc<dyn TokenStore>,
	ssh_keys: Arc<dyn SshKeyStore>,
}

impl AuthResolver {
	pub fn new(
		jwt_secret: SecretString,
		jwt_issuer: impl Into<String>,
		users: Arc<dyn UserStore>,
		tokens: Arc<dyn TokenStore>,
		ssh_keys: Arc<dyn SshKeyStore>,
	) -> Self {
		Self {
			jwt_secret,
			jwt_issuer: jwt_issuer.into(),
			users,
			tokens,
			ssh_keys,
		}
	}

	#[tracing::instrument(skip(self, jwt))]
	pub async fn authenticate_session(&self, jwt: &str) -> Result<UserRecord> {
		let mut validation = Validation::new(Algorithm::HS256);
		validation.set_issuer(&[&self.jwt_issuer]);
		let key = DecodingKey::from_secret(self.jwt_secret.expose().as_bytes());
		let data = decode::<SessionClaims>(jwt, &key, &validation)
			.map_err(|e| AuthError::InvalidCredential(e.to_string()))?;

		self.users
			.get_user_by_id(data.claims.user_id)
			.await?
			.ok_or(AuthError::NotFound)
	}

	pub fn issue_session_jwt(&self, user: &UserRecord) -> Result<String> {
		let now = Utc::now().timestamp();
		let claims = SessionClaims {
			iss: self.jwt_issuer.clone(),
			sub: user.id.to_string(),
			iat: now,
			exp: now + SESSION_LIFETIME_SECS,
			nbf: now,
			user_id: user.id,
			username: user.username.clone(),
			email: user.email.clone(),
			is_admin: user.is_admin,
		};
		let key = EncodingKey::from_secret(self.jwt_secret.expose().as_bytes());
		encode(&Header::new(Algorithm::HS256), &claims, &key)
			.map_err(|e| AuthError::Internal(e.to_string()))
	}

	/// Looks up by the SHA-256 hash of the raw token. `last_used_at` is
	/// bumped out-of-band; a failure there is logged and never fails
	/// authentication.
	#[tracing::instrument(skip(self, raw_pat))]
	pub async fn authenticate_token(&self, raw_pat: &str) -> Result<(UserRecord, TokenRecord)> {
		let hashed = hash_token(raw_pat);
		let token = self
			.tokens
			.get_token_by_hash(&hashed)
			.await?
			.ok_or(AuthError::NotFound)?;

		if let Some(expires_at) = token.expires_at {
			if expires_at <= Utc::now() {
				return Err(AuthError::Expired);
			}
		}

		let user = self
			.users
			.get_user_by_id(token.user_id)
			.await?
			.ok_or(AuthError::NotFound)?;

		let tokens = self.tokens.clone();
		let hashed_for_touch = hashed.clone();
		tokio::spawn(async move {
			if let Err(e) = tokens.touch_last_used(&hashed_for_touch).await {
				tracing::warn!(error = %e, "failed to update token last_used_at");
			}
		});

		Ok((user, token))
	}

	#[tracing::instrument(skip(self))]
	pub async fn authenticate_ssh(&self, fingerprint: &str) -> Result<UserRecord> {
		let key = self
			.ssh_keys
			.get_ssh_key_by_fingerprint(fingerprint)
			.await?
			.ok_or(AuthError::NotFound)?;

		let user = self
			.users
			.get_user_by_id(key.user_id)
			.await?
			.ok_or(AuthError::NotFound)?;

		let ssh_keys = self.ssh_keys.clone();
		let fingerprint = fingerprint.to_string();
		tokio::spawn(async move {
			if let Err(e) = ssh_keys.touch_last_used(&fingerprint).await {
				tracing::warn!(error = %e, "failed to update ssh key last_used_at");
			}
		});

		Ok(user)
	}

	/// Resolves an OIDC exchange to a user: matches `(subject, issuer)`,
	/// falls back to email, otherwise provisions a new user with a derived
	/// username.
	#[tracing::instrument(skip(self, preferred_username, name))]
	pub async fn resolve_oidc_login(
		&self,
		subject: &str,
		issuer: &str,
		email: &str,
		preferred_username: Option<&str>,
		name: Option<&str>,
	) -> Result<UserRecord> {
		if let Some(user) = self.users.get_user_by_oidc_identity(subject, issuer).await? {
			return Ok(user);
		}

		if let Some(user) = self.users.get_user_by_email(email).await? {
			self.users.attach_oidc_identity(user.id, subject, issuer).await?;
			return Ok(user);
		}

		let base = candidate_username(preferred_username, email, name);
		let mut candidate = base.clone();
		let mut attempt = 0;
		loop {
			if !self.users.username_exists(&candidate).await? {
				break;
			}
			attempt += 1;
			if attempt > MAX_USERNAME_COLLISION_RETRIES {
				return Err(AuthError::Internal(
					"exhausted username collision retries".into(),
				));
			}
			candidate = with_collision_suffix(&base);
		}

		let now = Utc::now();
		let user = UserRecord {
			id: Uuid::new_v4(),
			username: candidate,
			email: email.to_string(),
			oidc_subject: Some(subject.to_string()),
			oidc_issuer: Some(issuer.to_string()),
			is_admin: false,
			created_at: now,
			updated_at: now,
		};
		self.users.create_user(&user).await?;
		Ok(user)
	}

	/// Repository ACL (§4.2): public reads are always allowed; everything
	/// else requires a principal who is an admin or the owner.
	pub fn check_repository_access(
		principal: Option<&UserRecord>,
		repository: &RepositoryRecord,
		action: Action,
	) -> bool {
		if matches!(action, Action::Read) && !repository.is_private {
			return true;
		}
		match principal {
			None => false,
			Some(user) => user.is_admin || user.id == repository.owner_id,
		}
	}

	/// PAT scope gate: a non-empty scope set restricts the token to the
	/// listed `"owner/name"` repositories.
	pub fn check_pat_scope(token: &TokenRecord, owner_and_name: &str) -> bool {
		let scopes: Vec<String> = match serde_json::from_str(&token.scope) {
			Ok(scopes) => scopes,
			Err(_) => return false,
		};
		scopes.is_empty() || scopes.iter().any(|s| s == owner_and_name)
	}
}

/// Exposed so callers minting a new PAT can store it hashed the same way
/// [`AuthResolver::authenticate_token`] looks it up.
pub fn hash_token(raw: &str) -> String {
	hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_user(id: Uuid, is_admin: bool) -> UserRecord {
		let now = Utc::now();
		UserRecord {
			id,
			username: "alice".into(),
			email: "alice@example.com".into(),
			oidc_subject: None,
			oidc_issuer: None,
			is_admin,
			created_at: now,
			updated_at: now,
		}
	}

	fn sample_repo(owner_id: Uuid, is_private: bool) -> RepositoryRecord {
		let now = Utc::now();
		RepositoryRecord {
			id: Uuid::new_v4(),
			owner_id,
			name: "demo".into(),
			is_private,
			description: None,
			default_branch: "main".into(),
			git_path: "alice/demo.git".into(),
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn public_repo_read_never_needs_a_principal() {
		let repo = sample_repo(Uuid::new_v4(), false);
		assert!(AuthResolver::check_repository_access(None, &repo, Action::Read));
	}

	#[test]
	fn private_repo_read_denied_without_principal() {
		let repo = sample_repo(Uuid::new_v4(), true);
		assert!(!AuthResolver::check_repository_access(None, &repo, Action::Read));
	}

	#[test]
	fn owner_can_write_their_own_repo() {
		let owner_id = Uuid::new_v4();
		let repo = sample_repo(owner_id, true);
		let user = sample_user(owner_id, false);
		assert!(AuthResolver::check_repository_access(Some(&user), &repo, Action::Write));
	}

	#[test]
	fn admin_can_write_anyone_elses_repo() {
		let repo = sample_repo(Uuid::new_v4(), true);
		let admin = sample_user(Uuid::new_v4(), true);
		assert!(AuthResolver::check_repository_access(Some(&admin), &repo, Action::Write));
	}

	#[test]
	fn non_owner_non_admin_denied_write() {
		let repo = sample_repo(Uuid::new_v4(), false);
		let user = sample_user(Uuid::new_v4(), false);
		assert!(!AuthResolver::check_repository_access(Some(&user), &repo, Action::Write));
	}

	#[test]
	fn empty_scope_allows_any_repository() {
		let token = TokenRecord {
			id: Uuid::new_v4(),
			user_id: Uuid::new_v4(),
			name: "ci".into(),
			hashed_token: "x".into(),
			scope: "[]".into(),
			expires_at: None,
			last_used_at: None,
			created_at: Utc::now(),
		};
		assert!(AuthResolver::check_pat_scope(&token, "alice/anything"));
	}

	#[test]
	fn nonempty_scope_restricts_to_listed_repos() {
		let token = TokenRecord {
			id: Uuid::new_v4(),
			user_id: Uuid::new_v4(),
			name: "ci".into(),
			hashed_token: "x".into(),
			scope: r#"["alice/demo"]"#.into(),
			expires_at: None,
			last_used_at: None,
			created_at: Utc::now(),
		};
		assert!(AuthResolver::check_pat_scope(&token, "alice/demo"));
		assert!(!AuthResolver::check_pat_scope(&token, "alice/other"));
	}

	#[test]
	fn hash_token_is_stable() {
		assert_eq!(hash_token("abc"), hash_token("abc"));
		assert_ne!(hash_token("abc"), hash_token("abd"));
	}
}
