//! SSH entry point (§4.6): on `exec` of `git-upload-pack`/`git-receive-pack`
//! against `/<owner>/<repo>(.git)?`, authenticate by the session's offered
//! public-key fingerprint, ACL-check, then hand the session's stdio to the
//! stateful pack subprocess `GitEngine::spawn_stateful_pack` already spawns
//! for this purpose. `git-upload-archive` and command-less sessions are
//! handled per spec: the former rejected, the latter answered with a
//! welcome banner.

use std::sync::Arc;

use async_trait::async_trait;
use forgekeep_auth::fingerprint::fingerprint_from_blob;
use forgekeep_auth::{Action, AuthResolver};
use forgekeep_db::{RepositoryStore, SqliteRepositoryStore, SqliteUserStore, UserRecord, UserStore};
use forgekeep_scm::GitEngine;
use russh::server::{Auth, Handle, Handler, Msg, Server as RusshServer, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

pub struct SshState {
	pub engine: GitEngine,
	pub repos: Arc<SqliteRepositoryStore>,
	pub users: Arc<SqliteUserStore>,
	pub auth: Arc<AuthResolver>,
}

#[derive(Clone)]
pub struct ForgekeepSshServer {
	state: Arc<SshState>,
}

impl ForgekeepSshServer {
	pub fn new(state: Arc<SshState>) -> Self {
		Self { state }
	}
}

impl RusshServer for ForgekeepSshServer {
	type Handler = SshSession;

	fn new_client(&mut self, _peer_addr: Option<std::net::SocketAddr>) -> SshSession {
		SshSession {
			state: self.state.clone(),
			user: None,
			stdin_tx: None,
		}
	}
}

pub struct SshSession {
	state: Arc<SshState>,
	user: Option<UserRecord>,
	stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
}

struct ParsedCommand {
	service: &'static str,
	owner: String,
	repo: String,
}

/// `argv[0] ∈ {git-upload-pack, git-receive-pack, git-upload-archive}`,
/// `argv[1]` a `'/<owner>/<repo>(.git)?'` path. `git-upload-archive` parses
/// but is rejected by the caller, matching the spec's explicit carve-out.
fn parse_exec_command(raw: &str) -> Option<ParsedCommand> {
	let parts = shell_words_split(raw)?;
	let (service, path) = (parts.first()?.as_str(), parts.get(1)?.as_str());
	if !matches!(service, "git-upload-pack" | "git-receive-pack" | "git-upload-archive") {
		return None;
	}
	let path = path.trim_start_matches('/');
	let path = path.strip_suffix(".git").unwrap_or(path);
	let mut segments = path.splitn(2, '/');
	let owner = segments.next()?.to_string();
	let repo = segments.next()?.to_string();
	if owner.is_empty() || repo.is_empty() {
		return None;
	}
	let service = match service {
		"git-upload-pack" => "git-upload-pack",
		"git-receive-pack" => "git-receive-pack",
		_ => "git-upload-archive",
	};
	Some(ParsedCommand { service, owner, repo })
}

/// Minimal whitespace/quote splitting for the handful of shapes Git's own
/// client emits (`git-upload-pack '/owner/repo.git'`); not a general shell
/// parser, and deliberately rejects anything with shell metacharacters.
fn shell_words_split(raw: &str) -> Option<Vec<String>> {
	if raw.contains([';', '&', '|', '$', '`', '\n']) {
		return None;
	}
	let mut out = Vec::new();
	for token in raw.split_whitespace() {
		out.push(token.trim_matches(['\'', '"']).to_string());
	}
	if out.is_empty() {
		None
	} else {
		Some(out)
	}
}

impl SshSession {
	async fn run_pack_service(
		&mut self,
		channel_id: ChannelId,
		handle: Handle,
		command: ParsedCommand,
	) -> Result<(), russh::Error> {
		let Some(user) = self.user.clone() else {
			let _ = handle.exit_status_request(channel_id, 1).await;
			let _ = handle.close(channel_id).await;
			return Ok(());
		};

		if command.service == "git-upload-archive" {
			let _ = handle
				.data(channel_id, CryptoVec::from(b"git-upload-archive is not supported\n".to_vec()))
				.await;
			let _ = handle.exit_status_request(channel_id, 1).await;
			let _ = handle.close(channel_id).await;
			return Ok(());
		}

		let owner_user = match self.state.users.get_user_by_username(&command.owner).await {
			Ok(Some(u)) => u,
			_ => {
				let _ = handle.data(channel_id, CryptoVec::from(b"repository not found\n".to_vec())).await;
				let _ = handle.exit_status_request(channel_id, 1).await;
				let _ = handle.close(channel_id).await;
				return Ok(());
			}
		};
		let repository = match self
			.state
			.repos
			.get_repository_by_owner_and_name(owner_user.id, &command.repo)
			.await
		{
			Ok(Some(r)) => r,
			_ => {
				let _ = handle.data(channel_id, CryptoVec::from(b"repository not found\n".to_vec())).await;
				let _ = handle.exit_status_request(channel_id, 1).await;
				let _ = handle.close(channel_id).await;
				return Ok(());
			}
		};

		let action = if command.service == "git-receive-pack" { Action::Write } else { Action::Read };
		if !AuthResolver::check_repository_access(Some(&user), &repository, action) {
			let _ = handle.data(channel_id, CryptoVec::from(b"access denied\n".to_vec())).await;
			let _ = handle.exit_status_request(channel_id, 1).await;
			let _ = handle.close(channel_id).await;
			return Ok(());
		}

		let mut child = match self.state.engine.spawn_stateful_pack(&repository.git_path, command.service) {
			Ok(c) => c,
			Err(e) => {
				let _ = handle.data(channel_id, CryptoVec::from(format!("failed to start git: {e}\n").into_bytes())).await;
				let _ = handle.exit_status_request(channel_id, 1).await;
				let _ = handle.close(channel_id).await;
				return Ok(());
			}
		};

		let mut stdin = child.stdin.take().expect("stdin piped");
		let mut stdout = child.stdout.take().expect("stdout piped");

		let (tx, mut rx) = mpsc::channel::<Vec<u8>>(32);
		self.stdin_tx = Some(tx);

		tokio::spawn(async move {
			while let Some(chunk) = rx.recv().await {
				if stdin.write_all(&chunk).await.is_err() {
					break;
				}
			}
			let _ = stdin.shutdown().await;
		});

		let stdout_handle = handle.clone();
		tokio::spawn(async move {
			let mut buf = [0u8; 32 * 1024];
			loop {
				match stdout.read(&mut buf).await {
					Ok(0) => break,
					Ok(n) => {
						if stdout_handle.data(channel_id, CryptoVec::from(buf[..n].to_vec())).await.is_err() {
							break;
						}
					}
					Err(_) => break,
				}
			}
			let status = child.wait().await.ok().and_then(|s| s.code()).unwrap_or(1);
			let _ = stdout_handle.exit_status_request(channel_id, status as u32).await;
			let _ = stdout_handle.eof(channel_id).await;
			let _ = stdout_handle.close(channel_id).await;
		});

		Ok(())
	}
}

#[async_trait]
impl Handler for SshSession {
	type Error = russh::Error;

	async fn auth_publickey_offered(&mut self, _user: &str, _key: &PublicKey) -> Result<Auth, Self::Error> {
		Ok(Auth::Accept)
	}

	async fn auth_publickey(&mut self, _user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
		let fingerprint = fingerprint_from_blob(&key.public_key_bytes());
		match self.state.auth.authenticate_ssh(&fingerprint).await {
			Ok(user) => {
				self.user = Some(user);
				Ok(Auth::Accept)
			}
			Err(_) => Ok(Auth::Reject { proceed_with_methods: None }),
		}
	}

	async fn channel_open_session(&mut self, _channel: Channel<Msg>, _session: &mut Session) -> Result<bool, Self::Error> {
		Ok(true)
	}

	async fn exec_request(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
		let raw_command = String::from_utf8_lossy(data).into_owned();
		let handle = session.handle();
		match parse_exec_command(&raw_command) {
			Some(command) => self.run_pack_service(channel, handle, command).await,
			None => {
				session.data(channel, CryptoVec::from(b"unsupported command\n".to_vec()));
				session.exit_status_request(channel, 1);
				session.close(channel);
				Ok(())
			}
		}
	}

	/// A command-less session (interactive shell request) prints a welcome
	/// banner and exits 0, per spec.
	async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
		let name = self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("there");
		let banner = format!("Hi {name}! You've successfully authenticated to forgekeep, but shell access is not supported.\n");
		session.data(channel, CryptoVec::from(banner.into_bytes()));
		session.exit_status_request(channel, 0);
		session.close(channel);
		Ok(())
	}

	async fn data(&mut self, _channel: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
		if let Some(tx) = &self.stdin_tx {
			let _ = tx.send(data.to_vec()).await;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_upload_pack_with_quoted_path() {
		let cmd = parse_exec_command("git-upload-pack '/alice/proj.git'").unwrap();
		assert_eq!(cmd.service, "git-upload-pack");
		assert_eq!(cmd.owner, "alice");
		assert_eq!(cmd.repo, "proj");
	}

	#[test]
	fn rejects_shell_metacharacters() {
		assert!(parse_exec_command("git-upload-pack '/alice/proj.git; rm -rf /'").is_none());
	}

	#[test]
	fn accepts_but_flags_upload_archive() {
		let cmd = parse_exec_command("git-upload-archive /alice/proj.git").unwrap();
		assert_eq!(cmd.service, "git-upload-archive");
	}

	#[test]
	fn rejects_unknown_command() {
		assert!(parse_exec_command("rm -rf /").is_none());
	}

	#[test]
	fn rejects_missing_path() {
		assert!(parse_exec_command("git-upload-pack").is_none());
	}
}
