//! Credential storage for mirror upstream/downstream remotes.
//!
//! `MirrorConfigRecord::upstream_creds_ref`/`downstream_creds_ref` are
//! opaque keys into a [`CredentialStore`]; the mirror syncer resolves them
//! to a [`CredentialValue`] at sync time and never persists the secret
//! itself in the metadata database.

mod error;
mod store;
mod value;

pub use error::CredentialError;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use value::{CredentialValue, PersistedCredentialValue};
