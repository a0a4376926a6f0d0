//! Binary entry point: loads config, builds `AppState`, starts the mirror
//! scheduler, and drives the HTTP and SSH listeners side by side until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use forgekeep_server::config::{ForgekeepConfig, LogFormat, LogOutput};
use forgekeep_server::state::AppState;
use forgekeep_transport::ssh::ForgekeepSshServer;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(info(title = "forgekeep", description = "Self-hosted Git hosting service REST API"))]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = match ForgekeepConfig::load() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("configuration error: {e}");
			std::process::exit(1);
		}
	};
	init_tracing(&config);

	let state = AppState::build(config.clone()).await?;
	state.mirror_scheduler.start().await;

	let ssh_handle = tokio::spawn(run_ssh_server(state.ssh.clone(), config.ssh_listen, config.ssh_host_key_path.clone()));

	let router = forgekeep_server::build_router(state)
		.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

	let listener = TcpListener::bind(config.http_listen).await?;
	tracing::info!(addr = %config.http_listen, "http listener bound");

	axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

	ssh_handle.abort();
	Ok(())
}

async fn run_ssh_server(
	ssh_state: Arc<forgekeep_transport::SshState>,
	listen: std::net::SocketAddr,
	host_key_path: std::path::PathBuf,
) {
	let key = match load_or_generate_host_key(&host_key_path) {
		Ok(key) => key,
		Err(e) => {
			tracing::error!(error = %e, "failed to obtain an ssh host key, ssh listener disabled");
			return;
		}
	};

	let config = Arc::new(russh::server::Config {
		inactivity_timeout: Some(Duration::from_secs(3600)),
		auth_rejection_time: Duration::from_secs(1),
		keys: vec![key],
		..Default::default()
	});

	tracing::info!(addr = %listen, "ssh listener bound");
	let server = ForgekeepSshServer::new(ssh_state);
	if let Err(e) = russh::server::run(config, listen, server).await {
		tracing::error!(error = %e, "ssh listener exited");
	}
}

fn load_or_generate_host_key(path: &std::path::Path) -> anyhow::Result<russh_keys::key::KeyPair> {
	match russh_keys::load_secret_key(path, None) {
		Ok(key) => Ok(key),
		Err(_) => {
			tracing::warn!(path = %path.display(), "no ssh host key found at this path, generating an ephemeral one for this run");
			russh_keys::key::KeyPair::generate_ed25519().ok_or_else(|| anyhow::anyhow!("failed to generate an ed25519 ssh host key"))
		}
	}
}

fn init_tracing(config: &ForgekeepConfig) {
	let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
	let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
	let writer_is_stderr = matches!(config.log.output, LogOutput::Stderr);

	match (config.log.format, writer_is_stderr) {
		(LogFormat::Json, true) => subscriber.json().with_writer(std::io::stderr).init(),
		(LogFormat::Json, false) => subscriber.json().init(),
		(LogFormat::Pretty, true) => subscriber.with_writer(std::io::stderr).init(),
		(LogFormat::Pretty, false) => subscriber.init(),
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install sigterm handler")
			.recv()
			.await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	tracing::info!("shutdown signal received");
}
