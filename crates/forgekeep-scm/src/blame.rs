//! `GetBlame`: per-line authorship, parsed from `git blame --porcelain`.
//!
//! gix does not yet expose a server-grade blame implementation, so (per the
//! design note in §9) this shells out to the `git` binary, the same way
//! `pack.rs` does for the two pack services.

use std::path::Path;

use crate::error::{Result, ScmError};
use crate::process::{require_success, run_git};
use crate::types::BlameLine;

pub async fn get_blame(path: &Path, ref_spec: &str, file_path: &str) -> Result<Vec<BlameLine>> {
	let rev = if ref_spec.is_empty() { "HEAD" } else { ref_spec };
	let out = run_git(
		path,
		&["blame", "--porcelain", rev, "--", file_path],
		None,
	)
	.await?;
	require_success(&out, "git blame failed")?;
	parse_porcelain_blame(&out.stdout)
}

fn parse_porcelain_blame(raw: &[u8]) -> Result<Vec<BlameLine>> {
	let text = String::from_utf8_lossy(raw);
	let mut lines = Vec::new();

	let mut commit_hash = String::new();
	let mut author_name = String::new();
	let mut author_email = String::new();
	let mut author_time: i64 = 0;
	let mut line_no: u32 = 0;

	for raw_line in text.lines() {
		if raw_line.is_empty() {
			continue;
		}
		if let Some(rest) = raw_line.strip_prefix('\t') {
			lines.push(BlameLine {
				line_no,
				commit: commit_hash.clone(),
				author_name: author_name.clone(),
				author_email: author_email.clone(),
				timestamp: chrono::DateTime::from_timestamp(author_time, 0)
					.unwrap_or_else(chrono::Utc::now),
				content: rest.to_string(),
			});
			continue;
		}
		if raw_line.starts_with("author ") {
			author_name = raw_line.trim_start_matches("author ").to_string();
		} else if raw_line.starts_with("author-mail ") {
			author_email = raw_line
				.trim_start_matches("author-mail ")
				.trim_matches(|c| c == '<' || c == '>')
				.to_string();
		} else if raw_line.starts_with("author-time ") {
			author_time = raw_line
				.trim_start_matches("author-time ")
				.parse()
				.unwrap_or(0);
		} else {
			let mut parts = raw_line.split_whitespace();
			if let Some(hash) = parts.next() {
				if hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
					commit_hash = hash.to_string();
					if let Some(final_line) = parts.nth(1) {
						if let Ok(n) = final_line.parse() {
							line_no = n;
						}
					}
				}
			}
		}
	}

	if lines.is_empty() && !raw.is_empty() {
		return Err(ScmError::Internal("could not parse blame output".into()));
	}
	Ok(lines)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_porcelain_record() {
		let sample = "\
abcdef0123456789abcdef0123456789abcdef01 1 1 1
author Jane Doe
author-mail <jane@example.com>
author-time 1700000000
summary init
\tfn main() {}
";
		let parsed = parse_porcelain_blame(sample.as_bytes()).unwrap();
		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].line_no, 1);
		assert_eq!(parsed[0].author_email, "jane@example.com");
		assert_eq!(parsed[0].content, "fn main() {}");
		assert_eq!(
			parsed[0].commit,
			"abcdef0123456789abcdef0123456789abcdef01"
		);
	}

	#[tokio::test]
	async fn blame_missing_file_errors() {
		let tmp = tempfile::tempdir().unwrap();
		std::process::Command::new("git").args(["init"]).arg(tmp.path()).output().unwrap();
		std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
		std::process::Command::new("git").args(["add", "."]).current_dir(tmp.path()).output().unwrap();
		std::process::Command::new("git")
			.args(["-c", "user.email=t@t.com", "-c", "user.name=T", "commit", "-m", "i"])
			.current_dir(tmp.path())
			.output()
			.unwrap();
		let err = get_blame(tmp.path(), "HEAD", "missing.txt").await.unwrap_err();
		assert!(matches!(err, ScmError::Git(_)));
	}
}
