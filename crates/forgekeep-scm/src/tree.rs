//! `GetTree` / `GetFileContent`: tree listing and blob retrieval at a
//! resolved ref and path.

use std::path::Path;

use gix::bstr::ByteSlice;
use gix::objs::tree::EntryKind as GixEntryKind;

use crate::error::{Result, ScmError};
use crate::types::{Encoding, EntryKind, FileContent, TreeEntry};

fn gix_err(e: impl std::fmt::Display) -> ScmError {
	ScmError::Git(e.to_string())
}

fn entry_kind(kind: GixEntryKind) -> EntryKind {
	match kind {
		GixEntryKind::Tree => EntryKind::Tree,
		GixEntryKind::Commit => EntryKind::Commit,
		_ => EntryKind::Blob,
	}
}

/// Walks from the tree root down `path` (empty = tree root), returning the
/// subtree's direct children.
fn lookup_subtree<'repo>(
	repo: &'repo gix::Repository,
	root: &gix::Tree<'repo>,
	path: &str,
) -> Result<gix::Tree<'repo>> {
	if path.is_empty() {
		return Ok(root.clone());
	}
	let entry = root
		.clone()
		.peel_to_path(path.as_bytes().as_bstr())
		.map_err(|_| ScmError::NotFound)?;
	let object = repo
		.find_object(entry.id())
		.map_err(|_| ScmError::NotFound)?;
	object.try_into_tree().map_err(|_| ScmError::NotFound)
}

pub async fn get_tree(path: &Path, ref_spec: &str, tree_path: &str) -> Result<Vec<TreeEntry>> {
	let path = path.to_path_buf();
	let ref_spec = ref_spec.to_string();
	let tree_path = tree_path.trim_matches('/').to_string();
	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path).map_err(gix_err)?;
		let commit_id = crate::resolve::resolve_to_commit_id_sync(&repo, &ref_spec)?;
		let commit = repo.find_object(commit_id).map_err(gix_err)?.try_into_commit().map_err(gix_err)?;
		let root = commit.tree().map_err(gix_err)?;
		let subtree = lookup_subtree(&repo, &root, &tree_path)?;

		let mut out = Vec::new();
		for entry in subtree.iter() {
			let entry = entry.map_err(gix_err)?;
			let name = entry.filename().to_str_lossy().to_string();
			let full_path = if tree_path.is_empty() {
				name.clone()
			} else {
				format!("{tree_path}/{name}")
			};
			let kind = entry_kind(entry.mode().kind());
			let size = if kind == EntryKind::Blob {
				repo.find_object(entry.oid())
					.ok()
					.map(|o| o.data.len() as u64)
					.unwrap_or(0)
			} else {
				0
			};
			out.push(TreeEntry {
				name,
				full_path,
				kind,
				mode: entry.mode().value() as u32,
				hash: entry.oid().to_string(),
				size,
			});
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

/// Binary/text classification per spec §4.1: NUL in the first 8000 bytes ->
/// binary; declared mime starting `text/` or json/xml -> text; invalid utf-8
/// -> binary; else text.
fn classify(data: &[u8], declared_mime: Option<&str>) -> bool {
	let probe_len = data.len().min(8000);
	if data[..probe_len].contains(&0u8) {
		return true;
	}
	if let Some(mime) = declared_mime {
		if mime.starts_with("text/") || mime == "application/json" || mime == "application/xml" {
			return false;
		}
	}
	std::str::from_utf8(data).is_err()
}

/// Best-effort MIME guess by extension, used only to feed `classify`'s
/// second tier; unknown extensions fall through to the UTF-8 check.
fn guess_mime(file_path: &str) -> Option<&'static str> {
	let ext = file_path.rsplit('.').next()?.to_ascii_lowercase();
	Some(match ext.as_str() {
		"json" => "application/json",
		"xml" => "application/xml",
		"txt" | "md" | "rs" | "go" | "py" | "js" | "ts" | "toml" | "yaml" | "yml" | "html"
		| "css" | "sh" => "text/plain",
		_ => return None,
	})
}

pub async fn get_file_content(path: &Path, ref_spec: &str, file_path: &str) -> Result<FileContent> {
	let path = path.to_path_buf();
	let ref_spec = ref_spec.to_string();
	let file_path_owned = file_path.trim_matches('/').to_string();
	let data = tokio::task::spawn_blocking({
		let file_path_owned = file_path_owned.clone();
		move || -> Result<Vec<u8>> {
			let repo = gix::open(&path).map_err(gix_err)?;
			let commit_id = crate::resolve::resolve_to_commit_id_sync(&repo, &ref_spec)?;
			let commit = repo
				.find_object(commit_id)
				.map_err(gix_err)?
				.try_into_commit()
				.map_err(gix_err)?;
			let root = commit.tree().map_err(gix_err)?;
			let entry = root
				.peel_to_path(file_path_owned.as_bytes().as_bstr())
				.map_err(|_| ScmError::NotFound)?;
			if !entry.mode().is_blob() {
				return Err(ScmError::InvalidName(format!("{file_path_owned} is not a file")));
			}
			let object = repo.find_object(entry.id()).map_err(gix_err)?;
			Ok(object.data.clone())
		}
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))??;

	let declared = guess_mime(&file_path_owned);
	let is_binary = classify(&data, declared);
	let encoding = if is_binary { Encoding::Base64 } else { Encoding::Utf8 };
	Ok(FileContent {
		data,
		is_binary,
		encoding,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classify_detects_nul_byte() {
		let mut data = vec![b'a'; 100];
		data[50] = 0;
		assert!(classify(&data, None));
	}

	#[test]
	fn classify_ascii_is_text() {
		assert!(!classify(b"fn main() {}", None));
	}

	#[test]
	fn classify_declared_json_overrides_heuristic() {
		assert!(!classify(b"{}", Some("application/json")));
	}

	#[test]
	fn classify_invalid_utf8_is_binary() {
		let data = vec![0xff, 0xfe, 0x00, 0x01];
		// contains a NUL in this case, but exercise the non-NUL path too
		let data_no_nul = vec![0xff, 0xfe, 0xfd];
		assert!(classify(&data, None));
		assert!(classify(&data_no_nul, None));
	}
}
