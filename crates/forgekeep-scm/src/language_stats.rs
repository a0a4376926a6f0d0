//! Language byte-size breakdown for the stats endpoint, computed on demand
//! by walking the tree at HEAD (spec §4.1).

use std::collections::BTreeMap;
use std::path::Path;

use gix::bstr::ByteSlice;

use crate::error::{Result, ScmError};
use crate::types::{language_for_extension, LanguageStats, BINARY_EXTENSIONS, MAINTENANCE_SKIP_DIRS, SKIPPED_FILENAMES};

fn gix_err(e: impl std::fmt::Display) -> ScmError {
	ScmError::Git(e.to_string())
}

fn classify_path(name: &str) -> Option<&'static str> {
	if SKIPPED_FILENAMES.contains(&name) {
		return None;
	}
	if name == "Dockerfile" {
		return Some("Dockerfile");
	}
	let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
	if ext == name.to_ascii_lowercase() {
		// No extension (rsplit returned the whole name): unknown language.
		return Some("Other");
	}
	if BINARY_EXTENSIONS.contains(&ext.as_str()) {
		return None;
	}
	Some(language_for_extension(&ext))
}

pub async fn compute_language_stats(path: &Path) -> Result<LanguageStats> {
	let path = path.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path).map_err(gix_err)?;
		let head = match repo.head_id() {
			Ok(id) => id,
			Err(_) => return Ok(LanguageStats::new()),
		};
		let commit = repo
			.find_object(head.detach())
			.map_err(gix_err)?
			.try_into_commit()
			.map_err(gix_err)?;
		let tree = commit.tree().map_err(gix_err)?;

		let mut byte_counts: BTreeMap<String, u64> = BTreeMap::new();
		walk_tree(&repo, &tree, "", &mut byte_counts)?;

		let total: u64 = byte_counts.values().sum();
		let mut stats = LanguageStats::new();
		if total == 0 {
			return Ok(stats);
		}
		for (lang, bytes) in byte_counts {
			let pct = (bytes as f64 / total as f64) * 100.0;
			stats.insert(lang, (pct * 100.0).round() / 100.0);
		}
		Ok(stats)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

fn walk_tree(
	repo: &gix::Repository,
	tree: &gix::Tree<'_>,
	dir_name: &str,
	out: &mut BTreeMap<String, u64>,
) -> Result<()> {
	if MAINTENANCE_SKIP_DIRS.contains(&dir_name) {
		return Ok(());
	}
	for entry in tree.iter() {
		let entry = entry.map_err(gix_err)?;
		let name = entry.filename().to_str_lossy().to_string();
		let mode = entry.mode();
		if mode.is_tree() {
			let object = repo.find_object(entry.oid()).map_err(gix_err)?;
			let subtree = object.try_into_tree().map_err(gix_err)?;
			walk_tree(repo, &subtree, &name, out)?;
		} else if mode.is_blob() {
			if let Some(lang) = classify_path(&name) {
				let object = repo.find_object(entry.oid()).map_err(gix_err)?;
				*out.entry(lang.to_string()).or_insert(0) += object.data.len() as u64;
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_known_extensions() {
		assert_eq!(classify_path("main.rs"), Some("Rust"));
		assert_eq!(classify_path("main.go"), Some("Go"));
		assert_eq!(classify_path("Dockerfile"), Some("Dockerfile"));
	}

	#[test]
	fn skips_binary_and_lockfiles() {
		assert_eq!(classify_path("logo.png"), None);
		assert_eq!(classify_path("Cargo.lock"), None);
		assert_eq!(classify_path("yarn.lock"), None);
	}

	#[test]
	fn unknown_extension_is_other() {
		assert_eq!(classify_path("weird.xyz123"), Some("Other"));
	}

	#[test]
	fn extensionless_file_is_other() {
		assert_eq!(classify_path("Makefile"), Some("Other"));
	}
}
