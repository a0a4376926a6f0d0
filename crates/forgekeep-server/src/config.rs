//! `ForgekeepConfig`: the single configuration type for the binary, mirroring
//! the closed environment key set one field at a time. Three layers are
//! merged with flags taking precedence over environment, and environment
//! over the TOML file: `clap` (`derive`, `env`) resolves CLI flags and env
//! vars together into `Option<T>` fields, `.env` is pulled in by `dotenvy`
//! before `clap` parses so both are visible to it, and anything still
//! unset falls back to the TOML file, then to a hardcoded default.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use forgekeep_common_secret::SecretString;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("{key} is required but was not set in any config source")]
	Missing { key: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
	Filesystem,
	S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Pretty,
	Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
	Stdout,
	Stderr,
}

/// CLI flags and environment variables, one per closed config key. Every
/// field is optional here; absence means "fall through to the TOML file,
/// then the hardcoded default" in [`ForgekeepConfig::load`].
#[derive(Debug, Parser)]
#[command(name = "forgekeep-server", version, about = "Self-hosted Git hosting service")]
pub struct Cli {
	/// Path to the TOML config file.
	#[arg(long, env = "FORGEKEEP_CONFIG", default_value = "./forgekeep.toml")]
	pub config: PathBuf,

	#[arg(long, env = "FORGEKEEP_HTTP_LISTEN")]
	pub http_listen: Option<SocketAddr>,
	#[arg(long, env = "FORGEKEEP_SSH_LISTEN")]
	pub ssh_listen: Option<SocketAddr>,
	#[arg(long, env = "FORGEKEEP_SSH_HOST_KEY_PATH")]
	pub ssh_host_key_path: Option<PathBuf>,

	#[arg(long, env = "FORGEKEEP_STORAGE_BASE_PATH")]
	pub storage_base_path: Option<PathBuf>,

	#[arg(long, env = "FORGEKEEP_DB_DSN")]
	pub db_dsn: Option<String>,

	#[arg(long, env = "FORGEKEEP_OIDC_ENABLED")]
	pub oidc_enabled: Option<bool>,
	#[arg(long, env = "FORGEKEEP_OIDC_ISSUER_URL")]
	pub oidc_issuer_url: Option<String>,
	#[arg(long, env = "FORGEKEEP_OIDC_CLIENT_ID")]
	pub oidc_client_id: Option<String>,
	#[arg(long, env = "FORGEKEEP_OIDC_CLIENT_SECRET")]
	pub oidc_client_secret: Option<String>,
	#[arg(long, env = "FORGEKEEP_OIDC_REDIRECT_URL")]
	pub oidc_redirect_url: Option<String>,
	#[arg(long, env = "FORGEKEEP_OIDC_JWT_SECRET")]
	pub oidc_jwt_secret: Option<String>,

	#[arg(long, env = "FORGEKEEP_CI_ENABLED")]
	pub ci_enabled: Option<bool>,
	#[arg(long, env = "FORGEKEEP_CI_SERVER_URL")]
	pub ci_server_url: Option<String>,
	#[arg(long, env = "FORGEKEEP_CI_API_KEY")]
	pub ci_api_key: Option<String>,
	#[arg(long, env = "FORGEKEEP_CI_TIMEOUT_SECS")]
	pub ci_timeout_secs: Option<u64>,
	#[arg(long, env = "FORGEKEEP_CI_GIT_SERVER_URL")]
	pub ci_git_server_url: Option<String>,

	#[arg(long, env = "FORGEKEEP_MIRROR_INTERVAL_SECS")]
	pub mirror_interval_secs: Option<u64>,

	#[arg(long, env = "FORGEKEEP_LOG_LEVEL")]
	pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServer,
	#[serde(default)]
	storage: FileStorage,
	#[serde(default)]
	db: FileDb,
	#[serde(default)]
	oidc: FileOidc,
	#[serde(default)]
	ci: FileCi,
	#[serde(default)]
	mirror: FileMirror,
	#[serde(default)]
	log: FileLog,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
	http: FileHttp,
	ssh: FileSsh,
}

#[derive(Debug, Default, Deserialize)]
struct FileHttp {
	listen: Option<SocketAddr>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSsh {
	listen: Option<SocketAddr>,
	host_key_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileStorage {
	#[serde(rename = "type")]
	kind: Option<StorageKind>,
	base_path: Option<PathBuf>,
	s3_bucket: Option<String>,
	s3_region: Option<String>,
	s3_access_key: Option<String>,
	s3_secret_key: Option<String>,
	s3_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDb {
	dsn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileOidc {
	enabled: Option<bool>,
	issuer_url: Option<String>,
	client_id: Option<String>,
	client_secret: Option<String>,
	redirect_url: Option<String>,
	scopes: Option<Vec<String>>,
	jwt_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileCi {
	enabled: Option<bool>,
	server_url: Option<String>,
	api_key: Option<String>,
	timeout: Option<u64>,
	config_path: Option<String>,
	retention_days: Option<u32>,
	git_server_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileMirror {
	interval: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLog {
	level: Option<String>,
	format: Option<LogFormat>,
	output: Option<LogOutput>,
}

fn load_file_config(path: &std::path::Path) -> Result<FileConfig> {
	if !path.exists() {
		tracing::debug!(path = %path.display(), "config file not found, using defaults");
		return Ok(FileConfig::default());
	}
	let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
		path: path.to_path_buf(),
		source: e,
	})?;
	toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
		path: path.to_path_buf(),
		source: e,
	})
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
	pub kind: StorageKind,
	pub base_path: PathBuf,
	pub s3_bucket: Option<String>,
	pub s3_region: Option<String>,
	pub s3_access_key: Option<String>,
	pub s3_secret_key: Option<SecretString>,
	pub s3_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
	pub enabled: bool,
	pub issuer_url: Option<String>,
	pub client_id: Option<String>,
	pub client_secret: Option<SecretString>,
	pub redirect_url: Option<String>,
	pub scopes: Vec<String>,
	pub jwt_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct CiConfig {
	pub enabled: bool,
	pub server_url: Option<String>,
	pub api_key: Option<SecretString>,
	pub timeout_secs: u64,
	pub config_path: Option<String>,
	pub retention_days: u32,
	pub git_server_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
	pub level: String,
	pub format: LogFormat,
	pub output: LogOutput,
}

/// Fully resolved configuration, one field per closed environment key.
#[derive(Debug, Clone)]
pub struct ForgekeepConfig {
	pub http_listen: SocketAddr,
	pub ssh_listen: SocketAddr,
	pub ssh_host_key_path: PathBuf,
	pub storage: StorageConfig,
	pub db_dsn: String,
	pub oidc: OidcConfig,
	pub ci: CiConfig,
	pub mirror_interval_secs: u64,
	pub log: LogConfig,
}

impl ForgekeepConfig {
	/// Loads `.env` via `dotenvy`, parses CLI flags/env vars, reads the TOML
	/// file named by `--config`/`FORGEKEEP_CONFIG`, then resolves every key
	/// with precedence flags/env > file > default.
	pub fn load() -> Result<Self> {
		if let Err(e) = dotenvy::dotenv() {
			if !matches!(e, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound) {
				tracing::warn!(error = %e, "failed to load .env file");
			}
		}
		let cli = Cli::parse();
		Self::resolve(cli)
	}

	fn resolve(cli: Cli) -> Result<Self> {
		let file = load_file_config(&cli.config)?;

		let http_listen = cli
			.http_listen
			.or(file.server.http.listen)
			.unwrap_or_else(|| "0.0.0.0:8080".parse().unwrap());
		let ssh_listen = cli
			.ssh_listen
			.or(file.server.ssh.listen)
			.unwrap_or_else(|| "0.0.0.0:2222".parse().unwrap());
		let ssh_host_key_path = cli
			.ssh_host_key_path
			.or(file.server.ssh.host_key_path)
			.unwrap_or_else(|| PathBuf::from("./data/ssh_host_key"));

		let storage = StorageConfig {
			kind: file.storage.kind.unwrap_or(StorageKind::Filesystem),
			base_path: cli
				.storage_base_path
				.or(file.storage.base_path)
				.unwrap_or_else(|| PathBuf::from("./data/repos")),
			s3_bucket: file.storage.s3_bucket,
			s3_region: file.storage.s3_region,
			s3_access_key: file.storage.s3_access_key,
			s3_secret_key: file.storage.s3_secret_key.map(SecretString::new),
			s3_endpoint: file.storage.s3_endpoint,
		};

		let db_dsn = cli
			.db_dsn
			.or(file.db.dsn)
			.unwrap_or_else(|| "sqlite://./data/forgekeep.db".to_string());

		let jwt_secret = cli
			.oidc_jwt_secret
			.or(file.oidc.jwt_secret)
			.ok_or_else(|| ConfigError::Missing { key: "oidc.jwt_secret".to_string() })?;

		let oidc = OidcConfig {
			enabled: cli.oidc_enabled.or(file.oidc.enabled).unwrap_or(false),
			issuer_url: cli.oidc_issuer_url.or(file.oidc.issuer_url),
			client_id: cli.oidc_client_id.or(file.oidc.client_id),
			client_secret: cli.oidc_client_secret.or(file.oidc.client_secret).map(SecretString::new),
			redirect_url: cli.oidc_redirect_url.or(file.oidc.redirect_url),
			scopes: file.oidc.scopes.unwrap_or_else(|| {
				vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
			}),
			jwt_secret: SecretString::new(jwt_secret),
		};

		let ci = CiConfig {
			enabled: cli.ci_enabled.or(file.ci.enabled).unwrap_or(false),
			server_url: cli.ci_server_url.or(file.ci.server_url),
			api_key: cli.ci_api_key.or(file.ci.api_key).map(SecretString::new),
			timeout_secs: cli.ci_timeout_secs.or(file.ci.timeout).unwrap_or(30),
			config_path: file.ci.config_path,
			retention_days: file.ci.retention_days.unwrap_or(30),
			git_server_url: cli.ci_git_server_url.or(file.ci.git_server_url),
		};

		let mirror_interval_secs = cli.mirror_interval_secs.or(file.mirror.interval).unwrap_or(3600);

		let log = LogConfig {
			level: cli.log_level.or(file.log.level).unwrap_or_else(|| "info".to_string()),
			format: file.log.format.unwrap_or(LogFormat::Pretty),
			output: file.log.output.unwrap_or(LogOutput::Stdout),
		};

		Ok(ForgekeepConfig {
			http_listen,
			ssh_listen,
			ssh_host_key_path,
			storage,
			db_dsn,
			oidc,
			ci,
			mirror_interval_secs,
			log,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_cli() -> Cli {
		Cli {
			config: PathBuf::from("/nonexistent/forgekeep.toml"),
			http_listen: None,
			ssh_listen: None,
			ssh_host_key_path: None,
			storage_base_path: None,
			db_dsn: None,
			oidc_enabled: None,
			oidc_issuer_url: None,
			oidc_client_id: None,
			oidc_client_secret: None,
			oidc_redirect_url: None,
			oidc_jwt_secret: Some("test-secret".to_string()),
			ci_enabled: None,
			ci_server_url: None,
			ci_api_key: None,
			ci_timeout_secs: None,
			ci_git_server_url: None,
			mirror_interval_secs: None,
			log_level: None,
		}
	}

	#[test]
	fn missing_config_file_falls_back_to_defaults() {
		let config = ForgekeepConfig::resolve(base_cli()).unwrap();
		assert_eq!(config.http_listen.port(), 8080);
		assert_eq!(config.ssh_listen.port(), 2222);
		assert!(!config.oidc.enabled);
		assert!(!config.ci.enabled);
		assert_eq!(config.mirror_interval_secs, 3600);
	}

	#[test]
	fn missing_jwt_secret_is_an_error() {
		let mut cli = base_cli();
		cli.oidc_jwt_secret = None;
		assert!(matches!(ForgekeepConfig::resolve(cli), Err(ConfigError::Missing { .. })));
	}

	#[test]
	fn cli_flag_overrides_file() {
		let mut cli = base_cli();
		cli.http_listen = Some("127.0.0.1:9000".parse().unwrap());
		let config = ForgekeepConfig::resolve(cli).unwrap();
		assert_eq!(config.http_listen.port(), 9000);
	}
}
