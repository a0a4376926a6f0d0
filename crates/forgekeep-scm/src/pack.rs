//! The two pack services and the ref advertisement, implemented as
//! stateless-RPC wrappers over the `git` binary's own
//! `upload-pack`/`receive-pack` (`--stateless-rpc`), since no Rust Git
//! library yet implements the server side of the smart protocol (§9).

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ScmError};
use crate::packetline;

fn validate_service(service: &str) -> Result<()> {
	match service {
		"git-upload-pack" | "git-receive-pack" => Ok(()),
		other => Err(ScmError::InvalidName(format!("unsupported service {other}"))),
	}
}

fn subcommand(service: &str) -> &'static str {
	match service {
		"git-upload-pack" => "upload-pack",
		_ => "receive-pack",
	}
}

/// Builds the ref-advertisement response for `GetInfoRefs`: a `"#
/// service=<name>\n"` pkt-line, a flush, then the service's own
/// advertisement (obtained by invoking it with `--advertise-refs`).
pub async fn get_info_refs(path: &Path, service: &str) -> Result<Vec<u8>> {
	validate_service(service)?;
	let sub = subcommand(service);
	let mut cmd = Command::new("git");
	cmd.arg(sub)
		.arg("--stateless-rpc")
		.arg("--advertise-refs")
		.arg(path)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());
	let output = cmd.output().await.map_err(|e| ScmError::Git(e.to_string()))?;
	if !output.status.success() {
		return Err(ScmError::Git(String::from_utf8_lossy(&output.stderr).into_owned()));
	}
	Ok(packetline::info_refs_response(service, &output.stdout))
}

/// Runs `git upload-pack --stateless-rpc` against `input`, returning the
/// pack stream written to stdout. Used by the HTTP transport; the SSH
/// transport instead spawns a stateful (non `--stateless-rpc`) process
/// wired directly to the session's stdio (see `spawn_stateful`).
pub async fn upload_pack(path: &Path, input: &[u8], cancel: CancellationToken) -> Result<Vec<u8>> {
	run_stateless(path, "upload-pack", input, cancel).await
}

/// Runs `git receive-pack --stateless-rpc` against `input`. Callers MUST
/// invoke [`crate::repo::run_update_server_info`] afterwards on success —
/// this function only executes the pack exchange itself.
pub async fn receive_pack(path: &Path, input: &[u8], cancel: CancellationToken) -> Result<Vec<u8>> {
	run_stateless(path, "receive-pack", input, cancel).await
}

async fn run_stateless(
	path: &Path,
	sub: &str,
	input: &[u8],
	cancel: CancellationToken,
) -> Result<Vec<u8>> {
	let mut cmd = Command::new("git");
	cmd.arg(sub)
		.arg("--stateless-rpc")
		.arg(path)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());

	let mut child = cmd.spawn().map_err(|e| ScmError::Git(e.to_string()))?;
	let mut stdin = child.stdin.take().expect("stdin piped");
	let input = input.to_vec();
	let write_task = tokio::spawn(async move {
		let _ = stdin.write_all(&input).await;
		drop(stdin);
	});

	let output = tokio::select! {
		biased;
		_ = cancel.cancelled() => {
			let _ = child.start_kill();
			return Err(ScmError::Cancelled);
		}
		res = child.wait_with_output() => res,
	}
	.map_err(|e| ScmError::Git(e.to_string()))?;
	let _ = write_task.await;

	if !output.status.success() {
		return Err(ScmError::Git(String::from_utf8_lossy(&output.stderr).into_owned()));
	}
	Ok(output.stdout)
}

/// Spawns a stateful (interactive) pack process wired to the caller's own
/// pipes, for the SSH transport where the session owns stdin/stdout
/// directly rather than handing over a single request/response body.
pub fn spawn_stateful(path: &Path, service: &str) -> Result<tokio::process::Child> {
	validate_service(service)?;
	let sub = subcommand(service);
	Command::new("git")
		.arg(sub)
		.arg(path)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(|e| ScmError::Git(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_unknown_service() {
		assert!(validate_service("git-upload-archive").is_err());
	}

	#[tokio::test]
	async fn advertises_refs_for_upload_pack() {
		let tmp = tempfile::tempdir().unwrap();
		std::process::Command::new("git")
			.args(["init", "--bare"])
			.arg(tmp.path())
			.output()
			.unwrap();
		let advertisement = get_info_refs(tmp.path(), "git-upload-pack").await.unwrap();
		assert_eq!(&advertisement[..4], b"001e");
		assert!(advertisement.windows(b"# service=git-upload-pack".len()).any(|w| w == b"# service=git-upload-pack"));
	}
}
