//! Opaque filesystem-shaped key/value storage for Git object directories.
//!
//! Only the filesystem backend is implemented here; the object-storage
//! (`storage.type = s3`) variant is one of the documented external
//! collaborators (§1) and is wired up by the server crate against whichever
//! S3-compatible SDK it chooses — this trait is the seam that makes that
//! swap possible without touching `GitEngine`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, ScmError};

#[async_trait]
pub trait StorageBackend: Send + Sync {
	async fn exists(&self, key: &str) -> Result<bool>;
	async fn read_dir(&self, key: &str) -> Result<Vec<String>>;
	async fn read(&self, key: &str) -> Result<Vec<u8>>;
	async fn write(&self, key: &str, data: &[u8]) -> Result<()>;
	async fn delete(&self, key: &str) -> Result<()>;
	async fn move_key(&self, from: &str, to: &str) -> Result<()>;
	async fn disk_usage(&self, key: &str) -> Result<u64>;
	async fn walk(&self, key: &str) -> Result<Vec<String>>;

	/// Resolves the storage key for a repository, used by `RepoService`
	/// before any Git I/O happens.
	fn repo_path(&self, owner: &str, name: &str) -> String {
		format!("{owner}/{name}.git")
	}

	/// Resolves a storage key to an absolute filesystem path. Only the
	/// filesystem backend can do this meaningfully; object-storage backends
	/// return an error since there is no local path to shell `git` against
	/// (that's precisely why the spec only requires `StorageBackend` for
	/// non-Git data under `storage.type = s3`, and `GitEngine` always
	/// operates against `storage.base_path` for Git object directories).
	fn absolute_path(&self, key: &str) -> Result<PathBuf>;
}

pub struct FilesystemStorage {
	base_path: PathBuf,
}

impl FilesystemStorage {
	pub fn new(base_path: impl Into<PathBuf>) -> Self {
		Self {
			base_path: base_path.into(),
		}
	}

	fn resolve(&self, key: &str) -> Result<PathBuf> {
		if key.contains("..") {
			return Err(ScmError::Storage(format!("invalid key: {key}")));
		}
		Ok(self.base_path.join(key))
	}
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
	async fn exists(&self, key: &str) -> Result<bool> {
		let path = self.resolve(key)?;
		Ok(tokio::fs::try_exists(&path).await?)
	}

	async fn read_dir(&self, key: &str) -> Result<Vec<String>> {
		let path = self.resolve(key)?;
		let mut entries = tokio::fs::read_dir(&path).await?;
		let mut names = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			names.push(entry.file_name().to_string_lossy().into_owned());
		}
		names.sort();
		Ok(names)
	}

	async fn read(&self, key: &str) -> Result<Vec<u8>> {
		let path = self.resolve(key)?;
		Ok(tokio::fs::read(&path).await?)
	}

	async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
		let path = self.resolve(key)?;
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&path, data).await?;
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		let path = self.resolve(key)?;
		if path.is_dir() {
			tokio::fs::remove_dir_all(&path).await?;
		} else {
			tokio::fs::remove_file(&path).await?;
		}
		Ok(())
	}

	async fn move_key(&self, from: &str, to: &str) -> Result<()> {
		let from_path = self.resolve(from)?;
		let to_path = self.resolve(to)?;
		if let Some(parent) = to_path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::rename(&from_path, &to_path).await?;
		Ok(())
	}

	async fn disk_usage(&self, key: &str) -> Result<u64> {
		let path = self.resolve(key)?;
		Ok(dir_size(&path).await?)
	}

	async fn walk(&self, key: &str) -> Result<Vec<String>> {
		let path = self.resolve(key)?;
		let mut out = Vec::new();
		walk_into(&path, &path, &mut out).await?;
		Ok(out)
	}

	fn absolute_path(&self, key: &str) -> Result<PathBuf> {
		self.resolve(key)
	}
}

async fn dir_size(path: &Path) -> std::io::Result<u64> {
	if !tokio::fs::try_exists(path).await? {
		return Ok(0);
	}
	if path.is_file() {
		return Ok(tokio::fs::metadata(path).await?.len());
	}
	let mut total = 0u64;
	let mut stack = vec![path.to_path_buf()];
	while let Some(dir) = stack.pop() {
		let mut entries = tokio::fs::read_dir(&dir).await?;
		while let Some(entry) = entries.next_entry().await? {
			let meta = entry.metadata().await?;
			if meta.is_dir() {
				stack.push(entry.path());
			} else {
				total += meta.len();
			}
		}
	}
	Ok(total)
}

async fn walk_into(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
	if !tokio::fs::try_exists(dir).await? {
		return Ok(());
	}
	let mut entries = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if path.is_dir() {
			Box::pin(walk_into(root, &path, out)).await?;
		} else if let Ok(rel) = path.strip_prefix(root) {
			out.push(rel.to_string_lossy().into_owned());
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn write_read_round_trip() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = FilesystemStorage::new(tmp.path());
		storage.write("a/b.txt", b"hello").await.unwrap();
		assert!(storage.exists("a/b.txt").await.unwrap());
		assert_eq!(storage.read("a/b.txt").await.unwrap(), b"hello");
	}

	#[tokio::test]
	async fn rejects_path_traversal() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = FilesystemStorage::new(tmp.path());
		let err = storage.write("../escape.txt", b"x").await.unwrap_err();
		assert!(matches!(err, ScmError::Storage(_)));
	}

	#[tokio::test]
	async fn move_key_relocates_file() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = FilesystemStorage::new(tmp.path());
		storage.write("from/file.txt", b"data").await.unwrap();
		storage.move_key("from/file.txt", "to/file.txt").await.unwrap();
		assert!(!storage.exists("from/file.txt").await.unwrap());
		assert!(storage.exists("to/file.txt").await.unwrap());
	}

	#[tokio::test]
	async fn disk_usage_sums_nested_files() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = FilesystemStorage::new(tmp.path());
		storage.write("repo/a.txt", b"12345").await.unwrap();
		storage.write("repo/sub/b.txt", b"12").await.unwrap();
		assert_eq!(storage.disk_usage("repo").await.unwrap(), 7);
	}
}
