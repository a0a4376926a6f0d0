//! Self-hosted Git hosting service: Smart-HTTP/SSH transport (delegated to
//! `forgekeep-transport`), the versioned REST API, mirror scheduling, and CI
//! dispatch, all wired together here into one process.

pub mod api;
pub mod config;
pub mod oauth_state;
pub mod oidc;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Merges the versioned REST surface with the ambient Git-wire and health
/// routers `forgekeep-transport` builds from the same `AppState` handles.
pub fn build_router(state: AppState) -> Router {
	let git_http = forgekeep_transport::git_http::router(Arc::clone(&state.git_http));
	let health = forgekeep_transport::health::router(Arc::clone(&state.health));
	let api = Router::new().nest("/v1", api::router()).with_state(state);

	Router::new().merge(git_http).merge(health).merge(api).layer(TraceLayer::new_for_http())
}
