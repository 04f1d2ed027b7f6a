//! Shared data types flowing between pipeline stages

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SyncError;

/// One visited filesystem node
///
/// The walker fills `absolute_path` and `is_directory`; `relative_path`
/// stays empty until the classifier resolves it against the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
	pub absolute_path: PathBuf,
	pub relative_path: PathBuf,
	pub is_directory: bool,
}

impl PathEntry {
	pub fn new(absolute_path: PathBuf, is_directory: bool) -> Self {
		PathEntry { absolute_path, relative_path: PathBuf::new(), is_directory }
	}

	/// Name used to identify this entry on the remote side
	pub fn remote_name(&self) -> Result<String, SyncError> {
		wire_name(&self.relative_path)
	}
}

/// File identity metadata sent ahead of a file's bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIdentity {
	pub name: String,
	pub file_type: String,
}

impl FileIdentity {
	/// Identity of a root-relative path: `/`-joined name and dot-prefixed extension
	pub fn for_path(relative: &Path) -> Result<Self, SyncError> {
		Ok(FileIdentity { name: wire_name(relative)?, file_type: extension_of(relative) })
	}
}

/// Dot-prefixed extension of a path, empty when it has none
pub fn extension_of(path: &Path) -> String {
	path.extension().map(|ext| format!(".{}", ext.to_string_lossy())).unwrap_or_default()
}

/// Render a relative path with `/` separators regardless of platform
///
/// Names that are not valid UTF-8 are rejected, never rendered lossily.
pub fn wire_name(relative: &Path) -> Result<String, SyncError> {
	let mut parts = Vec::new();
	for component in relative.components() {
		if let Component::Normal(part) = component {
			let part = part.to_str().ok_or_else(|| SyncError::InvalidPath {
				name: relative.display().to_string(),
				reason: "name is not valid UTF-8".to_string(),
			})?;
			parts.push(part);
		}
	}
	Ok(parts.join("/"))
}

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
	Idle,
	Running,
	Completed,
	Failed,
	Cancelled,
}

/// Counters shared by concurrent stages during a run
#[derive(Debug, Default)]
pub struct RunCounters {
	dirs_created: AtomicU64,
	files_synced: AtomicU64,
	bytes_uploaded: AtomicU64,
	literal_bytes: AtomicU64,
	copied_blocks: AtomicU64,
}

impl RunCounters {
	pub fn add_dir(&self) {
		self.dirs_created.fetch_add(1, Ordering::Relaxed);
	}

	pub fn add_file(&self, uploaded: u64, literal: u64, copied: u64) {
		self.files_synced.fetch_add(1, Ordering::Relaxed);
		self.bytes_uploaded.fetch_add(uploaded, Ordering::Relaxed);
		self.literal_bytes.fetch_add(literal, Ordering::Relaxed);
		self.copied_blocks.fetch_add(copied, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> SyncReport {
		SyncReport {
			dirs_created: self.dirs_created.load(Ordering::Relaxed),
			files_synced: self.files_synced.load(Ordering::Relaxed),
			bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
			literal_bytes: self.literal_bytes.load(Ordering::Relaxed),
			copied_blocks: self.copied_blocks.load(Ordering::Relaxed),
		}
	}
}

/// Summary of a finished (or cancelled) run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
	pub dirs_created: u64,
	pub files_synced: u64,
	pub bytes_uploaded: u64,
	pub literal_bytes: u64,
	pub copied_blocks: u64,
}

/// Non-failure outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
	Completed(SyncReport),
	Cancelled(SyncReport),
}

impl SyncOutcome {
	pub fn report(&self) -> SyncReport {
		match self {
			SyncOutcome::Completed(r) | SyncOutcome::Cancelled(r) => *r,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_file_identity_for_path() {
		let id = FileIdentity::for_path(Path::new("docs/readme.md")).unwrap();
		assert_eq!(id.name, "docs/readme.md");
		assert_eq!(id.file_type, ".md");

		let id = FileIdentity::for_path(Path::new("Makefile")).unwrap();
		assert_eq!(id.file_type, "");
	}

	#[test]
	fn test_wire_name_skips_non_normal_components() {
		assert_eq!(wire_name(Path::new("./a/b")).unwrap(), "a/b");
		assert_eq!(wire_name(Path::new("")).unwrap(), "");
	}

	#[cfg(unix)]
	#[test]
	fn test_wire_name_rejects_non_utf8() {
		use std::ffi::OsStr;
		use std::os::unix::ffi::OsStrExt;

		let relative = Path::new("dir").join(OsStr::from_bytes(b"f\xff.txt"));
		let err = wire_name(&relative).unwrap_err();
		assert!(matches!(err, SyncError::InvalidPath { .. }), "got {}", err);

		let mut entry = PathEntry::new(Path::new("/root").join(&relative), false);
		entry.relative_path = relative.clone();
		assert!(entry.remote_name().is_err());
		assert!(FileIdentity::for_path(&relative).is_err());
	}

	#[test]
	fn test_counters_snapshot() {
		let counters = RunCounters::default();
		counters.add_dir();
		counters.add_file(10, 4, 2);
		let report = counters.snapshot();
		assert_eq!(report.dirs_created, 1);
		assert_eq!(report.files_synced, 1);
		assert_eq!(report.bytes_uploaded, 10);
		assert_eq!(report.literal_bytes, 4);
		assert_eq!(report.copied_blocks, 2);
	}
}

// vim: ts=4
