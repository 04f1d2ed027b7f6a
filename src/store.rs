//! Server-side file store rooted at the served directory
//!
//! Files are written to a temporary sibling first and renamed into place, so
//! a reader never sees a partially written file. Leftover temporaries from an
//! interrupted upload are removed when the server starts.

use std::path::{Component, Path, PathBuf};
use tokio::fs as afs;
use tokio::io::AsyncWriteExt;

use crate::error::SyncError;
use crate::logging::*;

/// Suffix of in-flight upload files
pub const TEMP_SUFFIX: &str = ".DeLtA-TmP";

/// Check that a wire name is a non-empty relative path without `..`
pub fn validate_name(name: &str) -> Result<PathBuf, SyncError> {
	let invalid = |reason: &str| SyncError::InvalidPath { name: name.to_string(), reason: reason.to_string() };

	if name.is_empty() {
		return Err(invalid("empty name"));
	}
	let path = Path::new(name);
	if path.is_absolute() {
		return Err(invalid("path must be relative"));
	}

	let mut clean = PathBuf::new();
	for component in path.components() {
		match component {
			Component::Normal(part) => clean.push(part),
			Component::CurDir => {}
			Component::ParentDir => return Err(invalid("path contains parent directory reference (..)")),
			Component::RootDir | Component::Prefix(_) => return Err(invalid("path must be relative")),
		}
	}
	if clean.as_os_str().is_empty() {
		return Err(invalid("empty name"));
	}
	Ok(clean)
}

#[derive(Debug, Clone)]
pub struct FileStore {
	root: PathBuf,
}

impl FileStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		FileStore { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Absolute location of a validated wire name
	pub fn resolve(&self, name: &str) -> Result<PathBuf, SyncError> {
		Ok(self.root.join(validate_name(name)?))
	}

	/// Create a directory and its missing parents; existing directories are fine
	pub async fn make_dir(&self, name: &str) -> Result<PathBuf, SyncError> {
		let path = self.resolve(name)?;
		afs::create_dir_all(&path).await?;
		Ok(path)
	}

	/// Current contents of a stored file, `None` when there is no regular file
	pub async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, SyncError> {
		let path = self.resolve(name)?;
		match afs::metadata(&path).await {
			Ok(meta) if meta.is_file() => Ok(Some(afs::read(&path).await?)),
			Ok(_) => Ok(None),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Size of a stored file, `None` when there is no regular file
	pub async fn size_of(&self, name: &str) -> Result<Option<u64>, SyncError> {
		let path = self.resolve(name)?;
		match afs::metadata(&path).await {
			Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
			Ok(_) => Ok(None),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Atomically replace a file's contents, returning the stored size
	pub async fn save(&self, name: &str, data: &[u8]) -> Result<u64, SyncError> {
		let path = self.resolve(name)?;
		if let Some(parent) = path.parent() {
			afs::create_dir_all(parent).await?;
		}

		let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
		tmp_name.push(TEMP_SUFFIX);
		let tmp_path = path.with_file_name(tmp_name);

		let written: std::io::Result<()> = async {
			let mut file = afs::File::create(&tmp_path).await?;
			file.write_all(data).await?;
			file.sync_all().await?;
			afs::rename(&tmp_path, &path).await
		}
		.await;

		if let Err(e) = written {
			if let Err(cleanup) = afs::remove_file(&tmp_path).await {
				trace!("Cannot remove {}: {}", tmp_path.display(), cleanup);
			}
			return Err(e.into());
		}

		debug!("Stored {} ({} bytes)", path.display(), data.len());
		Ok(data.len() as u64)
	}

	/// Remove orphaned temporaries below the root, returning how many were removed
	pub fn cleanup_temp_files(&self) -> usize {
		fn scan_dir(dir: &Path, count: &mut usize) {
			let entries = match std::fs::read_dir(dir) {
				Ok(entries) => entries,
				Err(e) => {
					warn!("Cannot read directory {} during cleanup: {}", dir.display(), e);
					return;
				}
			};

			for entry in entries.flatten() {
				let path = entry.path();
				let file_type = match entry.file_type() {
					Ok(ft) => ft,
					Err(_) => continue,
				};

				if file_type.is_dir() {
					scan_dir(&path, count);
				} else if file_type.is_file()
					&& path.to_string_lossy().ends_with(TEMP_SUFFIX)
				{
					match std::fs::remove_file(&path) {
						Ok(()) => {
							debug!("Removed orphaned temp file {}", path.display());
							*count += 1;
						}
						Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
					}
				}
			}
		}

		let mut count = 0;
		scan_dir(&self.root, &mut count);
		if count > 0 {
			info!("Cleaned up {} temporary files", count);
		}
		count
	}
}


// vim: ts=4
