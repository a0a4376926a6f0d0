//! The versioned `/v1` REST surface (§6). Git's own wire protocols (Smart-HTTP,
//! SSH) live in `forgekeep-transport`; everything here is the browser/API
//! client surface that rides on top of the same stores and `GitEngine`.

pub mod auth;
pub mod ci;
pub mod dto;
pub mod repos;
pub mod ssh_keys;
pub mod tokens;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
	Router::new()
		.nest("/auth", auth::router())
		.nest("/repos", repos::router())
		.nest("/repos/{owner}/{repo}/ci/jobs", ci::router())
		.nest("/ssh-keys", ssh_keys::router())
		.nest("/tokens", tokens::router())
}
