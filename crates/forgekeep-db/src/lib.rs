//! Durable mapping from identifiers to users, repositories, keys, tokens,
//! and CI records — the MetadataStore component of the hosting service.
//!
//! Every `Sqlite*Store` exposes transactional single-row operations over a
//! shared `SqlitePool`; none of them hold locks or caches of their own; the
//! pool's serializable semantics (`pool::create_pool` configures WAL mode)
//! are the authoritative concurrency boundary for everything in this crate.
//! `DbError::NotFound` is reserved for ids that should exist but don't; a
//! normal "does this row exist" query returns `Option<T>` instead.

pub mod ci;
pub mod error;
pub mod pool;
pub mod repo;
pub mod ssh_key;
pub mod token;
pub mod types;
pub mod user;

pub use ci::{CiStore, SqliteCiStore};
pub use error::{DbError, Result};
pub use pool::create_pool;
pub use repo::{RepositoryStore, SqliteRepositoryStore};
pub use ssh_key::{SqliteSshKeyStore, SshKeyStore};
pub use token::{SqliteTokenStore, TokenStore};
pub use types::{
	CiArtifactRecord, CiJobLogRecord, CiJobRecord, CiJobStepRecord, MirrorConfigRecord,
	RepositoryRecord, SshKeyRecord, TokenRecord, UserRecord,
};
pub use user::{SqliteUserStore, UserStore};
