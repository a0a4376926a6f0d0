//! Session JWT claims (§4.2 `AuthenticateSession`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
	pub iss: String,
	pub sub: String,
	pub iat: i64,
	pub exp: i64,
	pub nbf: i64,
	pub user_id: Uuid,
	pub username: String,
	pub email: String,
	pub is_admin: bool,
}
