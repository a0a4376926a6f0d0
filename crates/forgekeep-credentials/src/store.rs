//! Credential storage backends, keyed by the opaque `creds_ref` strings
//! `MirrorConfigRecord::upstream_creds_ref`/`downstream_creds_ref` point at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::CredentialError;
use crate::value::{CredentialValue, PersistedCredentialValue};

pub type PersistedCredentialStore = HashMap<String, PersistedCredentialValue>;

#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
	async fn load(&self, creds_ref: &str) -> Result<Option<CredentialValue>, CredentialError>;
	async fn save(&self, creds_ref: &str, creds: &CredentialValue) -> Result<(), CredentialError>;
	async fn delete(&self, creds_ref: &str) -> Result<(), CredentialError>;

	async fn exists(&self, creds_ref: &str) -> Result<bool, CredentialError> {
		Ok(self.load(creds_ref).await?.is_some())
	}
}

/// File-based credential store, one JSON document keyed by `creds_ref`,
/// written with 0600 permissions on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
	path: PathBuf,
}

impl FileCredentialStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn read_store(&self) -> Result<PersistedCredentialStore, CredentialError> {
		if !self.path.exists() {
			return Ok(HashMap::new());
		}
		let contents = fs::read_to_string(&self.path).await?;
		let store: PersistedCredentialStore = serde_json::from_str(&contents)?;
		Ok(store)
	}

	async fn write_store(&self, store: &PersistedCredentialStore) -> Result<(), CredentialError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await?;
		}
		let contents = serde_json::to_string_pretty(store)?;

		let temp_path = self.path.with_extension("tmp");
		let mut file = fs::File::create(&temp_path).await?;
		file.write_all(contents.as_bytes()).await?;
		file.sync_all().await?;
		drop(file);

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let perms = std::fs::Permissions::from_mode(0o600);
			if let Err(e) = std::fs::set_permissions(&temp_path, perms) {
				tracing::warn!(path = ?temp_path, error = %e, "failed to set credential file permissions to 0600");
			}
		}

		fs::rename(&temp_path, &self.path).await?;
		debug!(path = ?self.path, "credential store written");
		Ok(())
	}
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
	async fn load(&self, creds_ref: &str) -> Result<Option<CredentialValue>, CredentialError> {
		let store = self.read_store().await?;
		Ok(store.get(creds_ref).cloned().map(CredentialValue::from))
	}

	async fn save(&self, creds_ref: &str, creds: &CredentialValue) -> Result<(), CredentialError> {
		let mut store = self.read_store().await?;
		store.insert(creds_ref.to_string(), PersistedCredentialValue::from(creds));
		self.write_store(&store).await
	}

	async fn delete(&self, creds_ref: &str) -> Result<(), CredentialError> {
		let mut store = self.read_store().await?;
		store.remove(creds_ref);
		self.write_store(&store).await
	}
}

/// In-memory store for tests and single-process deployments without a
/// persistent credential file configured.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
	credentials: tokio::sync::RwLock<HashMap<String, CredentialValue>>,
}

impl MemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
	async fn load(&self, creds_ref: &str) -> Result<Option<CredentialValue>, CredentialError> {
		let creds = self.credentials.read().await;
		Ok(creds.get(creds_ref).cloned())
	}

	async fn save(&self, creds_ref: &str, creds: &CredentialValue) -> Result<(), CredentialError> {
		let mut store = self.credentials.write().await;
		store.insert(creds_ref.to_string(), creds.clone());
		Ok(())
	}

	async fn delete(&self, creds_ref: &str) -> Result<(), CredentialError> {
		let mut store = self.credentials.write().await;
		store.remove(creds_ref);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use forgekeep_common_secret::SecretString;

	#[tokio::test]
	async fn memory_store_roundtrip() {
		let store = MemoryCredentialStore::new();
		let creds = CredentialValue::Token {
			token: SecretString::new("ghp_test".to_string()),
		};
		store.save("github-upstream", &creds).await.unwrap();

		let loaded = store.load("github-upstream").await.unwrap();
		assert!(loaded.is_some());

		store.delete("github-upstream").await.unwrap();
		assert!(store.load("github-upstream").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn file_store_roundtrip() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("credentials.json");
		let store = FileCredentialStore::new(&path);

		let creds = CredentialValue::UsernamePassword {
			username: "mirror-bot".to_string(),
			password: SecretString::new("hunter2".to_string()),
		};
		store.save("gitlab-downstream", &creds).await.unwrap();
		assert!(path.exists());

		let loaded = store.load("gitlab-downstream").await.unwrap().unwrap();
		if let CredentialValue::UsernamePassword { username, password } = loaded {
			assert_eq!(username, "mirror-bot");
			assert_eq!(password.expose(), "hunter2");
		} else {
			panic!("expected UsernamePassword credentials");
		}
	}

	#[tokio::test]
	async fn file_store_missing_key_is_none() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("credentials.json");
		let store = FileCredentialStore::new(&path);
		assert!(store.load("nonexistent").await.unwrap().is_none());
	}
}
