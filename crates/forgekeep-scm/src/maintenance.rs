//! Repository housekeeping: `Gc`, `Prune`, `Repack`, `Fsck` (§4.1.2). These
//! are never run inline with a request; an operator or a periodic sweep
//! invokes them out of band.

use std::path::Path;

use crate::error::Result;
use crate::process::{require_success, run_git};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
	Gc,
	Prune,
	Repack,
	Fsck,
}

impl MaintenanceTask {
	fn git_args(self) -> &'static [&'static str] {
		match self {
			MaintenanceTask::Gc => &["gc", "--auto"],
			MaintenanceTask::Prune => &["prune", "--expire=now"],
			MaintenanceTask::Repack => &["repack", "-a", "-d"],
			MaintenanceTask::Fsck => &["fsck", "--full"],
		}
	}
}

pub async fn run_maintenance(path: &Path, task: MaintenanceTask) -> Result<String> {
	let out = run_git(path, task.git_args(), None).await?;
	require_success(&out, "maintenance task failed")?;
	Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

pub async fn run_all(path: &Path) -> Result<Vec<(MaintenanceTask, Result<String>)>> {
	let tasks = [
		MaintenanceTask::Fsck,
		MaintenanceTask::Prune,
		MaintenanceTask::Repack,
		MaintenanceTask::Gc,
	];
	let mut results = Vec::with_capacity(tasks.len());
	for task in tasks {
		results.push((task, run_maintenance(path, task).await));
	}
	Ok(results)
}
