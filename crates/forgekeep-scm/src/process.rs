//! Thin wrapper around spawning the `git` binary for the handful of
//! operations gix does not implement server-side: blame, diff, and the two
//! pack services (§9's design note: "the reference implementation shells
//! out to a local Git binary for pack services because no library fully
//! implements server-side receive-pack").

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, ScmError};

pub struct ProcessOutput {
	pub stdout: Vec<u8>,
	pub stderr: Vec<u8>,
	pub success: bool,
}

/// Runs `git <args>` with `cwd` as the working directory, collecting output.
/// Cooperatively cancellable: if `cancel` resolves before the child exits,
/// the child is killed and `ScmError::Cancelled` is returned.
pub async fn run_git(
	cwd: &Path,
	args: &[&str],
	cancel: Option<tokio_util::sync::CancellationToken>,
) -> Result<ProcessOutput> {
	let mut cmd = Command::new("git");
	cmd.args(args)
		.current_dir(cwd)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());

	let mut child = cmd.spawn().map_err(|e| ScmError::Git(e.to_string()))?;

	let output = match cancel {
		Some(token) => {
			tokio::select! {
				biased;
				_ = token.cancelled() => {
					let _ = child.start_kill();
					return Err(ScmError::Cancelled);
				}
				res = child.wait_with_output() => res,
			}
		}
		None => child.wait_with_output().await,
	}
	.map_err(|e| ScmError::Git(e.to_string()))?;

	Ok(ProcessOutput {
		success: output.status.success(),
		stdout: output.stdout,
		stderr: output.stderr,
	})
}

pub fn require_success(out: &ProcessOutput, context: &str) -> Result<()> {
	if out.success {
		Ok(())
	} else {
		Err(ScmError::Git(format!(
			"{context}: {}",
			String::from_utf8_lossy(&out.stderr)
		)))
	}
}
