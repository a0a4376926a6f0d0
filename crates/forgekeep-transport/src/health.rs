//! Ambient `/healthz` and `/metrics` (§10.5): not part of the versioned
//! `/v1` surface, but every component above is observable through them.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use sqlx::SqlitePool;

pub struct HealthState {
	pub db_pool: SqlitePool,
	pub storage_base_path: PathBuf,
	pub ssh_listening: std::sync::atomic::AtomicBool,
	pub registry: Registry,
}

pub fn router(state: Arc<HealthState>) -> Router {
	Router::new()
		.route("/healthz", get(healthz))
		.route("/metrics", get(metrics))
		.with_state(state)
}

#[derive(Serialize)]
struct ComponentHealth {
	database: bool,
	storage: bool,
	ssh: bool,
}

#[derive(Serialize)]
struct HealthResponse {
	status: &'static str,
	components: ComponentHealth,
}

async fn healthz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
	let database = sqlx::query("SELECT 1").execute(&state.db_pool).await.is_ok();
	let storage = tokio::fs::metadata(&state.storage_base_path)
		.await
		.map(|m| m.is_dir())
		.unwrap_or(false);
	let ssh = state.ssh_listening.load(std::sync::atomic::Ordering::Relaxed);

	let healthy = database && storage;
	let status = if healthy { "ok" } else { "degraded" };
	let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

	(code, Json(HealthResponse { status, components: ComponentHealth { database, storage, ssh } }))
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
	let encoder = TextEncoder::new();
	let metric_families = state.registry.gather();
	let mut buffer = Vec::new();
	if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!(error = %e, "failed to encode prometheus metrics");
		return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
	}
	(StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}
