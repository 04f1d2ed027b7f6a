//! Tree walking stage (pipeline producer)
//!
//! Visits the sync root depth-first and emits one `PathEntry` per kept file
//! or directory. Excluded directories are pruned with their whole subtree.
//! The walk itself is blocking and runs on tokio's blocking pool; entries go
//! out through a bounded channel so the walk cannot outrun its consumer by
//! more than the queue depth.

use ignore::{DirEntry, WalkBuilder};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::exclusion::IgnoreRules;
use crate::logging::*;
use crate::types::PathEntry;

/// Start walking `root`; returns the entry stream and the stage's error stream
pub fn walk(
	root: &Path,
	rules: Arc<IgnoreRules>,
	token: CancellationToken,
	buffer: usize,
) -> (mpsc::Receiver<PathEntry>, mpsc::Receiver<SyncError>) {
	let (out_tx, out_rx) = mpsc::channel(buffer);
	let (err_tx, err_rx) = mpsc::channel(1);
	let root = root.to_path_buf();

	tokio::task::spawn_blocking(move || {
		walk_blocking(&root, rules, &token, &out_tx, &err_tx);
	});

	(out_rx, err_rx)
}

fn walk_blocking(
	root: &Path,
	rules: Arc<IgnoreRules>,
	token: &CancellationToken,
	out_tx: &mpsc::Sender<PathEntry>,
	err_tx: &mpsc::Sender<SyncError>,
) {
	debug!("Walking {}", root.display());

	let mut builder = WalkBuilder::new(root);
	builder
		.standard_filters(false) // our own rules only
		.follow_links(false)
		.filter_entry(move |entry| keep_entry(&rules, entry));

	let mut emitted = 0u64;
	for result in builder.build() {
		if token.is_cancelled() {
			debug!("Walk cancelled after {} entries", emitted);
			return;
		}

		let entry = match result {
			Ok(entry) => entry,
			Err(e) => {
				// the failed node's subtree is not descended; siblings continue
				let path = error_path(&e).unwrap_or(root).to_path_buf();
				report(err_tx, SyncError::Walk { path, message: e.to_string() });
				continue;
			}
		};

		let file_type = match entry.file_type() {
			Some(ft) => ft,
			None => continue,
		};

		if entry.depth() == 0 {
			if !file_type.is_dir() {
				report(
					err_tx,
					SyncError::Walk {
						path: root.to_path_buf(),
						message: "sync root is not a directory".to_string(),
					},
				);
				return;
			}
			continue;
		}

		if !file_type.is_dir() && !file_type.is_file() {
			trace!("Skipping special file {}", entry.path().display());
			continue;
		}

		let path_entry = PathEntry::new(entry.into_path(), file_type.is_dir());
		if out_tx.blocking_send(path_entry).is_err() {
			// consumer stopped, nothing left to do
			debug!("Walk consumer closed after {} entries", emitted);
			return;
		}
		emitted += 1;
	}

	debug!("Walk of {} finished: {} entries", root.display(), emitted);
}

fn keep_entry(rules: &IgnoreRules, entry: &DirEntry) -> bool {
	if entry.depth() == 0 {
		return true;
	}
	let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
	if is_dir {
		let name = entry.file_name().to_string_lossy();
		if rules.is_excluded_dir(&name) {
			debug!("Skipping directory {}", entry.path().display());
			return false;
		}
		true
	} else {
		!rules.is_excluded_file(entry.path())
	}
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
	match err {
		ignore::Error::WithPath { path, .. } => Some(path.as_path()),
		ignore::Error::WithDepth { err, .. } => error_path(err),
		ignore::Error::WithLineNumber { err, .. } => error_path(err),
		ignore::Error::Loop { child, .. } => Some(child.as_path()),
		_ => None,
	}
}

/// Report an error without ever blocking the walk
fn report(err_tx: &mpsc::Sender<SyncError>, err: SyncError) {
	if let Err(mpsc::error::TrySendError::Full(err)) = err_tx.try_send(err) {
		warn!("Additional walk error: {}", err);
	}
}


// vim: ts=4
