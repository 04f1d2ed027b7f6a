//! Path classification stage (pipeline transform)
//!
//! Resolves each walked entry against the sync root and splits the stream
//! into directories and files. A path that cannot be made relative to the
//! root is fatal for the whole run.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::logging::*;
use crate::types::PathEntry;

/// Output streams of the classifier stage
pub struct Classified {
	pub dirs: mpsc::Receiver<PathEntry>,
	pub files: mpsc::Receiver<PathEntry>,
	pub errors: mpsc::Receiver<SyncError>,
}

/// Compute the root-relative form of an entry
pub fn resolve(root: &Path, mut entry: PathEntry) -> Result<PathEntry, SyncError> {
	let relative = entry.absolute_path.strip_prefix(root).map_err(|_| SyncError::RelativePath {
		path: entry.absolute_path.clone(),
		root: root.to_path_buf(),
	})?;
	entry.relative_path = relative.to_path_buf();
	Ok(entry)
}

/// Start the classifier over an entry stream
pub fn classify(
	root: &Path,
	mut entries: mpsc::Receiver<PathEntry>,
	token: CancellationToken,
	buffer: usize,
) -> Classified {
	let (dir_tx, dir_rx) = mpsc::channel(buffer);
	let (file_tx, file_rx) = mpsc::channel(buffer);
	let (err_tx, err_rx) = mpsc::channel(1);
	let root: PathBuf = root.to_path_buf();

	tokio::spawn(async move {
		let (mut dirs, mut files) = (0u64, 0u64);

		loop {
			let entry = tokio::select! {
				_ = token.cancelled() => {
					debug!("Classifier cancelled");
					return;
				}
				next = entries.recv() => match next {
					Some(entry) => entry,
					None => break,
				},
			};

			let entry = match resolve(&root, entry) {
				Ok(entry) => entry,
				Err(e) => {
					let _ = err_tx.send(e).await;
					return;
				}
			};
			if entry.relative_path.as_os_str().is_empty() {
				continue;
			}

			let out = if entry.is_directory { &dir_tx } else { &file_tx };
			let sent = tokio::select! {
				_ = token.cancelled() => return,
				res = out.send(entry) => res,
			};
			if sent.is_err() {
				debug!("Classifier output closed");
				return;
			}

			if out.same_channel(&dir_tx) {
				dirs += 1;
			} else {
				files += 1;
			}
		}

		debug!("Classified {} directories and {} files", dirs, files);
	});

	Classified { dirs: dir_rx, files: file_rx, errors: err_rx }
}


// vim: ts=4
