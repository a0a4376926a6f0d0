//! Branch and tag management plus HEAD manipulation, backed by `gix`'s
//! reference-transaction API. Every mutating function here runs on the
//! blocking thread pool since `gix` reference edits are synchronous.

use std::path::Path;

use gix::bstr::ByteSlice;
use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit};
use gix::refs::{FullName, Target};

use crate::error::{Result, ScmError};
use crate::types::{Branch, Tag, TagSignature};

fn gix_err(e: impl std::fmt::Display) -> ScmError {
	ScmError::Git(e.to_string())
}

fn open(path: &Path) -> Result<gix::Repository> {
	gix::open(path).map_err(gix_err)
}

pub async fn list_branches(path: &Path) -> Result<Vec<Branch>> {
	let path = path.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let default = get_head_branch_sync(&repo)?;
		let mut out = Vec::new();
		let platform = repo.references().map_err(gix_err)?;
		for r in platform.local_branches().map_err(gix_err)?.flatten() {
			let name = r
				.name()
				.shorten()
				.to_str_lossy()
				.to_string();
			let target = r
				.clone()
				.peel_to_id_in_place()
				.map_err(gix_err)?
				.to_string();
			let is_default = default.as_deref() == Some(name.as_str());
			out.push(Branch {
				name,
				target_commit: target,
				is_default,
			});
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn list_tags(path: &Path) -> Result<Vec<Tag>> {
	let path = path.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let mut out = Vec::new();
		let platform = repo.references().map_err(gix_err)?;
		for r in platform.tags().map_err(gix_err)?.flatten() {
			let name = r.name().shorten().to_str_lossy().to_string();
			out.push(tag_from_reference(&repo, &name)?);
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

fn tag_from_reference(repo: &gix::Repository, name: &str) -> Result<Tag> {
	let full_name = format!("refs/tags/{name}");
	let mut reference = repo
		.find_reference(full_name.as_bytes().as_bstr())
		.map_err(|_| ScmError::NotFound)?;
	let target_id = reference.peel_to_id_in_place().map_err(gix_err)?;

	let object = repo.find_object(target_id).map_err(gix_err)?;
	let (target_commit, annotation, signature) = if let Ok(tag) = object.clone().try_into_tag() {
		let message = tag.message().map_err(gix_err)?;
		let tagger = tag.tagger().map_err(gix_err)?;
		let target_commit = tag.target_id().map_err(gix_err)?.detach().to_string();
		let sig = tagger.map(|t| TagSignature {
			name: t.name.to_string(),
			email: t.email.to_string(),
			timestamp: chrono::DateTime::from_timestamp(t.time().map(|ti| ti.seconds).unwrap_or(0), 0)
				.unwrap_or_else(chrono::Utc::now),
		});
		(
			target_commit,
			Some(message.body.to_str_lossy().to_string()),
			sig,
		)
	} else {
		(target_id.to_string(), None, None)
	};

	Ok(Tag {
		name: name.to_string(),
		target_commit,
		annotation,
		signature,
	})
}

pub async fn get_branch(path: &Path, name: &str) -> Result<Branch> {
	let branches = list_branches(path).await?;
	branches
		.into_iter()
		.find(|b| b.name == name)
		.ok_or(ScmError::NotFound)
}

pub async fn get_tag(path: &Path, name: &str) -> Result<Tag> {
	let path = path.to_path_buf();
	let name = name.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		tag_from_reference(&repo, &name)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn branch_exists(path: &Path, name: &str) -> Result<bool> {
	match get_branch(path, name).await {
		Ok(_) => Ok(true),
		Err(ScmError::NotFound) => Ok(false),
		Err(e) => Err(e),
	}
}

pub async fn create_branch(path: &Path, name: &str, start_point: &str) -> Result<()> {
	let path = path.to_path_buf();
	let name = name.to_string();
	let start_point = start_point.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let target = crate::resolve::resolve_to_commit_id_sync(&repo, &start_point)?;

		let ref_name = FullName::try_from(format!("refs/heads/{name}").as_bytes().as_bstr())
			.map_err(gix_err)?;
		let edit = RefEdit {
			change: Change::Update {
				log: LogChange::default(),
				expected: PreviousValue::MustNotExist,
				new: Target::Object(target),
			},
			name: ref_name,
			deref: false,
		};
		repo
			.refs
			.transaction()
			.prepare(vec![edit], gix::lock::acquire::Fail::Immediately, gix::lock::acquire::Fail::Immediately)
			.map_err(|e| match e {
				gix::refs::transaction::prepare::Error::LockAcquire { .. } => {
					ScmError::AlreadyExists
				}
				other => gix_err(other),
			})?
			.commit(None)
			.map_err(gix_err)?;
		Ok(())
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn delete_branch(path: &Path, name: &str) -> Result<()> {
	let path_buf = path.to_path_buf();
	let head = get_head_branch(path).await?;
	if head.as_deref() == Some(name) {
		return Err(ScmError::DefaultBranch);
	}
	let name = name.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path_buf)?;
		let ref_name = FullName::try_from(format!("refs/heads/{name}").as_bytes().as_bstr())
			.map_err(gix_err)?;
		repo
			.refs
			.find(ref_name.as_ref())
			.map_err(|_| ScmError::NotFound)?;
		let edit = RefEdit {
			change: Change::Delete {
				expected: PreviousValue::Any,
				log: gix::refs::transaction::RefLog::AndReference,
			},
			name: ref_name,
			deref: false,
		};
		repo
			.refs
			.transaction()
			.prepare(vec![edit], gix::lock::acquire::Fail::Immediately, gix::lock::acquire::Fail::Immediately)
			.map_err(gix_err)?
			.commit(None)
			.map_err(gix_err)?;
		Ok(())
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn create_tag(
	path: &Path,
	name: &str,
	target_ref: &str,
	annotation: Option<(&str, &TagSignature)>,
) -> Result<()> {
	let path = path.to_path_buf();
	let name = name.to_string();
	let target_ref = target_ref.to_string();
	let annotation = annotation.map(|(msg, sig)| (msg.to_string(), sig.clone()));
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let target = crate::resolve::resolve_to_commit_id_sync(&repo, &target_ref)?;

		if let Some((message, sig)) = annotation {
			let time = gix::date::Time::new(sig.timestamp.timestamp(), 0);
			let time_str = time.to_string();
			let signature = gix::actor::SignatureRef {
				name: sig.name.as_bytes().into(),
				email: sig.email.as_bytes().into(),
				time: &time_str,
			};
			repo
				.tag(
					&name,
					target,
					gix::objs::Kind::Commit,
					Some(signature),
					&message,
					PreviousValue::MustNotExist,
				)
				.map_err(|_| ScmError::AlreadyExists)?;
		} else {
			let ref_name = FullName::try_from(format!("refs/tags/{name}").as_bytes().as_bstr())
				.map_err(gix_err)?;
			let edit = RefEdit {
				change: Change::Update {
					log: LogChange::default(),
					expected: PreviousValue::MustNotExist,
					new: Target::Object(target),
				},
				name: ref_name,
				deref: false,
			};
			repo
				.refs
				.transaction()
				.prepare(vec![edit], gix::lock::acquire::Fail::Immediately, gix::lock::acquire::Fail::Immediately)
				.map_err(|_| ScmError::AlreadyExists)?
				.commit(None)
				.map_err(gix_err)?;
		}
		Ok(())
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn delete_tag(path: &Path, name: &str) -> Result<()> {
	let path = path.to_path_buf();
	let name = name.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let ref_name = FullName::try_from(format!("refs/tags/{name}").as_bytes().as_bstr())
			.map_err(gix_err)?;
		repo
			.refs
			.find(ref_name.as_ref())
			.map_err(|_| ScmError::NotFound)?;
		let edit = RefEdit {
			change: Change::Delete {
				expected: PreviousValue::Any,
				log: gix::refs::transaction::RefLog::AndReference,
			},
			name: ref_name,
			deref: false,
		};
		repo
			.refs
			.transaction()
			.prepare(vec![edit], gix::lock::acquire::Fail::Immediately, gix::lock::acquire::Fail::Immediately)
			.map_err(gix_err)?
			.commit(None)
			.map_err(gix_err)?;
		Ok(())
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

fn get_head_branch_sync(repo: &gix::Repository) -> Result<Option<String>> {
	let head = repo.head().map_err(gix_err)?;
	match head.referent_name() {
		Some(name) => Ok(Some(name.shorten().to_str_lossy().to_string())),
		None => Ok(None),
	}
}

pub async fn get_head_branch(path: &Path) -> Result<Option<String>> {
	let path = path.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		get_head_branch_sync(&repo)
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

pub async fn set_head_branch(path: &Path, name: &str) -> Result<()> {
	if !branch_exists(path, name).await? {
		return Err(ScmError::NotFound);
	}
	let path = path.to_path_buf();
	let name = name.to_string();
	tokio::task::spawn_blocking(move || {
		let repo = open(&path)?;
		let target_name = FullName::try_from(format!("refs/heads/{name}").as_bytes().as_bstr())
			.map_err(gix_err)?;
		let head_name = FullName::try_from("HEAD".as_bytes().as_bstr()).map_err(gix_err)?;
		let edit = RefEdit {
			change: Change::Update {
				log: LogChange::default(),
				expected: PreviousValue::Any,
				new: Target::Symbolic(target_name),
			},
			name: head_name,
			deref: false,
		};
		repo
			.refs
			.transaction()
			.prepare(vec![edit], gix::lock::acquire::Fail::Immediately, gix::lock::acquire::Fail::Immediately)
			.map_err(gix_err)?
			.commit(None)
			.map_err(gix_err)?;
		Ok(())
	})
	.await
	.map_err(|e| ScmError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::process::Command;

	fn init_repo_with_commit(dir: &Path) {
		Command::new("git").args(["init", "--bare"]).arg(dir).output().unwrap();
	}

	#[tokio::test]
	async fn branch_lifecycle() {
		let tmp = tempfile::tempdir().unwrap();
		let repo_path = tmp.path().join("repo.git");
		init_repo_with_commit(&repo_path);
		// Bare, empty repos have no commits; branch operations against a
		// nonexistent start point should surface NotFound rather than panic.
		let err = create_branch(&repo_path, "feature", "HEAD").await.unwrap_err();
		assert!(matches!(err, ScmError::NotFound | ScmError::Git(_)));
	}
}
