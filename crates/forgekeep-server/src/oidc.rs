//! Hand-rolled OIDC authorization-code client. No provider SDK exists in the
//! dependency stack this workspace draws from, so this follows the same
//! shape as a per-provider OAuth client elsewhere in the corpus: a thin
//! `reqwest` wrapper around discovery, the authorize redirect, and code
//! exchange, plus `jsonwebtoken` to verify the returned `id_token` against
//! the provider's published JWKS.

use forgekeep_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::OidcConfig;

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
	#[error("oidc is not configured")]
	NotConfigured,

	#[error("discovery request failed: {0}")]
	Discovery(String),

	#[error("token exchange failed: {0}")]
	TokenExchange(String),

	#[error("id_token verification failed: {0}")]
	Verification(String),

	#[error("invalid redirect state")]
	InvalidState,
}

pub type Result<T> = std::result::Result<T, OidcError>;

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
	issuer: String,
	authorization_endpoint: String,
	token_endpoint: String,
	jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
	keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
	kid: String,
	n: String,
	e: String,
	#[serde(default)]
	kty: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	id_token: String,
	#[serde(default)]
	access_token: Option<String>,
}

/// Claims pulled out of a verified `id_token`, enough for
/// [`forgekeep_auth::AuthResolver::resolve_oidc_login`].
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
	pub sub: String,
	pub iss: String,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub preferred_username: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
	pub exp: i64,
	pub aud: String,
}

pub struct OidcClient {
	http: reqwest::Client,
	issuer: String,
	authorization_endpoint: Url,
	token_endpoint: Url,
	jwks_uri: Url,
	client_id: String,
	client_secret: SecretString,
	redirect_url: String,
	scopes: Vec<String>,
}

impl OidcClient {
	#[tracing::instrument(skip(config))]
	pub async fn discover(config: &OidcConfig) -> Result<Self> {
		let issuer_url = config.issuer_url.as_deref().ok_or(OidcError::NotConfigured)?;
		let client_id = config.client_id.clone().ok_or(OidcError::NotConfigured)?;
		let client_secret = config.client_secret.clone().ok_or(OidcError::NotConfigured)?;
		let redirect_url = config.redirect_url.clone().ok_or(OidcError::NotConfigured)?;

		let http = reqwest::Client::new();
		let discovery_url = format!("{}/.well-known/openid-configuration", issuer_url.trim_end_matches('/'));
		let doc: DiscoveryDocument = http
			.get(&discovery_url)
			.send()
			.await
			.map_err(|e| OidcError::Discovery(e.to_string()))?
			.error_for_status()
			.map_err(|e| OidcError::Discovery(e.to_string()))?
			.json()
			.await
			.map_err(|e| OidcError::Discovery(e.to_string()))?;

		Ok(Self {
			http,
			issuer: doc.issuer,
			authorization_endpoint: Url::parse(&doc.authorization_endpoint)
				.map_err(|e| OidcError::Discovery(e.to_string()))?,
			token_endpoint: Url::parse(&doc.token_endpoint).map_err(|e| OidcError::Discovery(e.to_string()))?,
			jwks_uri: Url::parse(&doc.jwks_uri).map_err(|e| OidcError::Discovery(e.to_string()))?,
			client_id,
			client_secret,
			redirect_url,
			scopes: config.scopes.clone(),
		})
	}

	/// Builds the redirect target for step one of the authorization code
	/// flow. `state` is an opaque, caller-generated anti-CSRF token that the
	/// caller must persist and compare on callback.
	pub fn authorization_url(&self, state: &str) -> Url {
		let mut url = self.authorization_endpoint.clone();
		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", &self.redirect_url)
			.append_pair("scope", &self.scopes.join(" "))
			.append_pair("state", state);
		url
	}

	#[tracing::instrument(skip(self, code))]
	pub async fn exchange_code(&self, code: &str) -> Result<IdTokenClaims> {
		let params = [
			("grant_type", "authorization_code"),
			("code", code),
			("redirect_uri", self.redirect_url.as_str()),
			("client_id", self.client_id.as_str()),
			("client_secret", self.client_secret.expose().as_str()),
		];

		let response: TokenResponse = self
			.http
			.post(self.token_endpoint.clone())
			.form(&params)
			.send()
			.await
			.map_err(|e| OidcError::TokenExchange(e.to_string()))?
			.error_for_status()
			.map_err(|e| OidcError::TokenExchange(e.to_string()))?
			.json()
			.await
			.map_err(|e| OidcError::TokenExchange(e.to_string()))?;

		self.verify_id_token(&response.id_token).await
	}

	#[tracing::instrument(skip(self, id_token))]
	async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims> {
		let header = jsonwebtoken::decode_header(id_token)
			.map_err(|e| OidcError::Verification(e.to_string()))?;
		let kid = header.kid.ok_or_else(|| OidcError::Verification("id_token is missing kid".to_string()))?;

		let jwks: JwksDocument = self
			.http
			.get(self.jwks_uri.clone())
			.send()
			.await
			.map_err(|e| OidcError::Verification(e.to_string()))?
			.json()
			.await
			.map_err(|e| OidcError::Verification(e.to_string()))?;

		let jwk = jwks
			.keys
			.iter()
			.find(|k| k.kid == kid)
			.ok_or_else(|| OidcError::Verification(format!("no jwk matching kid {kid}")))?;
		if !jwk.kty.is_empty() && jwk.kty != "RSA" {
			return Err(OidcError::Verification(format!("unsupported key type {}", jwk.kty)));
		}

		let decoding_key = jsonwebtoken::DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
			.map_err(|e| OidcError::Verification(e.to_string()))?;

		let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
		validation.set_issuer(&[&self.issuer]);
		validation.set_audience(&[&self.client_id]);

		let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
			.map_err(|e| OidcError::Verification(e.to_string()))?;
		Ok(data.claims)
	}
}

#[derive(Debug, Serialize)]
pub struct OidcLoginConfig {
	pub enabled: bool,
}
