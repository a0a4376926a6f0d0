//! `GetDiff` / `GetCompareDiff`: unified patch plus per-file summary, parsed
//! from `git diff --numstat` (counts) and `git diff` (raw patch with rename
//! detection enabled by default).

use std::path::Path;

use crate::error::Result;
use crate::process::{require_success, run_git};
use crate::types::{DiffResult, FileChangeStatus, FileDiff};

async fn numstat(path: &Path, range: &str) -> Result<Vec<(u32, u32, String, Option<String>)>> {
	let out = run_git(path, &["diff", "--numstat", "-M", range], None).await?;
	require_success(&out, "git diff --numstat failed")?;
	let text = String::from_utf8_lossy(&out.stdout);
	let mut rows = Vec::new();
	for line in text.lines() {
		let mut cols = line.splitn(3, '\t');
		let additions = cols.next().unwrap_or("0");
		let deletions = cols.next().unwrap_or("0");
		let name_field = cols.next().unwrap_or("");
		let additions = additions.parse().unwrap_or(0);
		let deletions = deletions.parse().unwrap_or(0);

		// Rename syntax: "old => new" or "{old => new}/rest".
		if let Some((old, new)) = split_rename(name_field) {
			rows.push((additions, deletions, new, Some(old)));
		} else {
			rows.push((additions, deletions, name_field.to_string(), None));
		}
	}
	Ok(rows)
}

fn split_rename(field: &str) -> Option<(String, String)> {
	if let Some(brace_start) = field.find('{') {
		let brace_end = field.find('}')?;
		let prefix = &field[..brace_start];
		let suffix = &field[brace_end + 1..];
		let inner = &field[brace_start + 1..brace_end];
		let (old, new) = inner.split_once(" => ")?;
		return Some((
			format!("{prefix}{old}{suffix}"),
			format!("{prefix}{new}{suffix}"),
		));
	}
	if let Some((old, new)) = field.split_once(" => ") {
		return Some((old.to_string(), new.to_string()));
	}
	None
}

async fn name_status(path: &Path, range: &str) -> Result<Vec<(FileChangeStatus, String, Option<String>)>> {
	let out = run_git(path, &["diff", "--name-status", "-M", range], None).await?;
	require_success(&out, "git diff --name-status failed")?;
	let text = String::from_utf8_lossy(&out.stdout);
	let mut rows = Vec::new();
	for line in text.lines() {
		let mut cols = line.split('\t');
		let code = cols.next().unwrap_or("");
		match code.chars().next() {
			Some('A') => {
				if let Some(name) = cols.next() {
					rows.push((FileChangeStatus::Added, name.to_string(), None));
				}
			}
			Some('D') => {
				if let Some(name) = cols.next() {
					rows.push((FileChangeStatus::Deleted, name.to_string(), None));
				}
			}
			Some('M') => {
				if let Some(name) = cols.next() {
					rows.push((FileChangeStatus::Modified, name.to_string(), None));
				}
			}
			Some('R') => {
				let old = cols.next().unwrap_or_default().to_string();
				let new = cols.next().unwrap_or_default().to_string();
				rows.push((FileChangeStatus::Renamed, new, Some(old)));
			}
			_ => {}
		}
	}
	Ok(rows)
}

async fn per_file_patch(path: &Path, range: &str, file: &str) -> Result<String> {
	let out = run_git(path, &["diff", "-M", range, "--", file], None).await?;
	require_success(&out, "git diff (per-file) failed")?;
	Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

async fn build_diff(path: &Path, range: &str) -> Result<DiffResult> {
	let raw_out = run_git(path, &["diff", "-M", range], None).await?;
	require_success(&raw_out, "git diff failed")?;
	let raw_patch = String::from_utf8_lossy(&raw_out.stdout).into_owned();

	let statuses = name_status(path, range).await?;
	let counts = numstat(path, range).await?;

	let mut files = Vec::with_capacity(statuses.len());
	for (status, new_path, old_path) in statuses {
		let (additions, deletions) = counts
			.iter()
			.find(|(_, _, name, _)| *name == new_path)
			.map(|(a, d, _, _)| (*a, *d))
			.unwrap_or((0, 0));
		let patch = per_file_patch(path, range, &new_path).await?;
		files.push(FileDiff {
			old_path: old_path.or_else(|| Some(new_path.clone())),
			new_path: Some(new_path),
			status,
			additions,
			deletions,
			patch,
		});
	}

	Ok(DiffResult { raw_patch, files })
}

pub async fn get_diff(path: &Path, commit: &str) -> Result<DiffResult> {
	let range = format!("{commit}~1..{commit}");
	// First commit in a repo has no parent; fall back to an empty-tree diff.
	match build_diff(path, &range).await {
		Ok(result) => Ok(result),
		Err(_) => build_diff(path, &format!("4b825dc642cb6eb9a060e54bf8d69288fbee4904..{commit}")).await,
	}
}

pub async fn get_compare_diff(path: &Path, from: &str, to: &str) -> Result<DiffResult> {
	build_diff(path, &format!("{from}..{to}")).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn split_rename_plain() {
		let (old, new) = split_rename("old.txt => new.txt").unwrap();
		assert_eq!(old, "old.txt");
		assert_eq!(new, "new.txt");
	}

	#[test]
	fn split_rename_braced() {
		let (old, new) = split_rename("src/{old.rs => new.rs}").unwrap();
		assert_eq!(old, "src/old.rs");
		assert_eq!(new, "src/new.rs");
	}

	#[test]
	fn split_rename_none_for_plain_path() {
		assert!(split_rename("src/lib.rs").is_none());
	}

	#[tokio::test]
	async fn compare_diff_on_identical_refs_is_empty() {
		let tmp = tempfile::tempdir().unwrap();
		std::process::Command::new("git").args(["init"]).arg(tmp.path()).output().unwrap();
		std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
		std::process::Command::new("git").args(["add", "."]).current_dir(tmp.path()).output().unwrap();
		std::process::Command::new("git")
			.args(["-c", "user.email=t@t.com", "-c", "user.name=T", "commit", "-m", "i"])
			.current_dir(tmp.path())
			.output()
			.unwrap();

		let result = get_compare_diff(tmp.path(), "HEAD", "HEAD").await.unwrap();
		assert!(result.files.is_empty());
		assert!(result.raw_patch.is_empty());
	}
}
