//! Ref resolution, shared by every read operation in the engine: given a ref
//! string, try in order (per spec §4.1) empty -> HEAD; 7-40 hex chars that
//! resolve to a commit; `refs/heads/<ref>`; `refs/tags/<ref>` (dereferenced);
//! arbitrary reference name. First match wins.

use gix::bstr::ByteSlice;
use gix::ObjectId;

use crate::error::{Result, ScmError};

fn looks_like_hex_oid(s: &str) -> bool {
	(7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolves `ref_spec` against `repo`, returning the commit it points at
/// (peeling tags and annotated objects down to a commit).
pub fn resolve_to_commit_id_sync(repo: &gix::Repository, ref_spec: &str) -> Result<ObjectId> {
	if ref_spec.is_empty() {
		let head = repo.head_id().map_err(|_| ScmError::NotFound)?;
		return peel_to_commit(repo, head.detach());
	}

	if looks_like_hex_oid(ref_spec) {
		if let Ok(id) = repo.rev_parse_single(ref_spec) {
			return peel_to_commit(repo, id.detach());
		}
	}

	for candidate in [
		format!("refs/heads/{ref_spec}"),
		format!("refs/tags/{ref_spec}"),
		ref_spec.to_string(),
	] {
		if let Ok(mut reference) = repo.find_reference(candidate.as_bytes().as_bstr()) {
			if let Ok(id) = reference.peel_to_id_in_place() {
				return peel_to_commit(repo, id.detach());
			}
		}
	}

	Err(ScmError::NotFound)
}

fn peel_to_commit(repo: &gix::Repository, id: ObjectId) -> Result<ObjectId> {
	let object = repo
		.find_object(id)
		.map_err(|e| ScmError::Git(e.to_string()))?;
	let commit = object
		.peel_to_kind(gix::object::Kind::Commit)
		.map_err(|e| ScmError::Git(e.to_string()))?;
	Ok(commit.id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::process::Command;

	fn init_repo_with_commit(dir: &std::path::Path) -> String {
		Command::new("git").args(["init"]).arg(dir).output().unwrap();
		std::fs::write(dir.join("a.txt"), "hello").unwrap();
		Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
		Command::new("git")
			.args(["-c", "user.email=t@t.com", "-c", "user.name=T", "commit", "-m", "init"])
			.current_dir(dir)
			.output()
			.unwrap();
		let out = Command::new("git")
			.args(["rev-parse", "HEAD"])
			.current_dir(dir)
			.output()
			.unwrap();
		String::from_utf8_lossy(&out.stdout).trim().to_string()
	}

	#[test]
	fn resolves_head_and_short_hash() {
		let tmp = tempfile::tempdir().unwrap();
		let sha = init_repo_with_commit(tmp.path());
		let repo = gix::open(tmp.path()).unwrap();

		let resolved = resolve_to_commit_id_sync(&repo, "").unwrap();
		assert_eq!(resolved.to_string(), sha);

		let short = &sha[..7];
		let resolved = resolve_to_commit_id_sync(&repo, short).unwrap();
		assert_eq!(resolved.to_string(), sha);
	}

	#[test]
	fn unknown_ref_is_not_found() {
		let tmp = tempfile::tempdir().unwrap();
		init_repo_with_commit(tmp.path());
		let repo = gix::open(tmp.path()).unwrap();
		let err = resolve_to_commit_id_sync(&repo, "does-not-exist").unwrap_err();
		assert!(matches!(err, ScmError::NotFound));
	}
}
