//! Exclusion rules applied during the tree walk
//!
//! Rules are built once per run from an ignore file and stay immutable for
//! the run's lifetime.

mod ignore;

pub use self::ignore::{IgnoreFileParser, IgnoreLine};

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::VCS_DIR;
use crate::error::SyncError;
use crate::logging::*;
use crate::types::extension_of;

/// Directory names and file extensions/names excluded from a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
	pub excluded_dir_names: BTreeSet<String>,
	pub excluded_extensions_or_names: BTreeSet<String>,
}

impl Default for IgnoreRules {
	/// Rules excluding only the version-control directory
	fn default() -> Self {
		let mut excluded_dir_names = BTreeSet::new();
		excluded_dir_names.insert(VCS_DIR.to_string());
		IgnoreRules { excluded_dir_names, excluded_extensions_or_names: BTreeSet::new() }
	}
}

impl IgnoreRules {
	/// Load rules from an ignore file; a missing file yields the defaults
	pub fn load(path: &Path) -> Result<Self, SyncError> {
		match IgnoreFileParser::parse_file(path)? {
			Some(lines) => {
				let rules = Self::from_lines(lines);
				debug!(
					"Loaded ignore rules from {}: {} dirs, {} extensions",
					path.display(),
					rules.excluded_dir_names.len(),
					rules.excluded_extensions_or_names.len()
				);
				Ok(rules)
			}
			None => {
				debug!("No ignore file at {}, using defaults", path.display());
				Ok(Self::default())
			}
		}
	}

	/// Build rules from ignore file text
	pub fn parse(contents: &str) -> Self {
		Self::from_lines(IgnoreFileParser::parse_contents(contents))
	}

	fn from_lines(lines: Vec<IgnoreLine>) -> Self {
		let mut rules = Self::default();
		for line in lines {
			match line {
				IgnoreLine::Extension(ext) => {
					rules.excluded_extensions_or_names.insert(ext);
				}
				IgnoreLine::DirName(name) => {
					rules.excluded_dir_names.insert(name);
				}
			}
		}
		rules
	}

	/// Check if a directory with this base name is skipped with its whole subtree
	pub fn is_excluded_dir(&self, name: &str) -> bool {
		self.excluded_dir_names.contains(name)
	}

	/// Check if a file is skipped by extension or base name
	pub fn is_excluded_file(&self, path: &Path) -> bool {
		let ext = extension_of(path);
		if !ext.is_empty() && self.excluded_extensions_or_names.contains(&ext) {
			return true;
		}
		path.file_name()
			.map(|name| self.excluded_extensions_or_names.contains(name.to_string_lossy().as_ref()))
			.unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	#[test]
	fn test_missing_file_excludes_only_vcs_dir() {
		let temp_dir = TempDir::new().unwrap();
		let rules = IgnoreRules::load(&temp_dir.path().join("absent")).unwrap();

		assert!(rules.is_excluded_dir(".git"));
		assert_eq!(rules.excluded_dir_names.len(), 1);
		assert!(rules.excluded_extensions_or_names.is_empty());
	}

	#[test]
	fn test_load_from_file() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join(".gitignore");
		fs::write(&path, "# build output\n*.log\ntarget\n\n").unwrap();

		let rules = IgnoreRules::load(&path).unwrap();

		assert!(rules.is_excluded_dir(".git"));
		assert!(rules.is_excluded_dir("target"));
		assert!(rules.is_excluded_file(Path::new("skip.log")));
		assert!(rules.is_excluded_file(Path::new("deep/dir/other.log")));
		assert!(!rules.is_excluded_file(Path::new("a.txt")));
	}

	#[test]
	fn test_extensionless_files_are_not_excluded_by_extension() {
		let rules = IgnoreRules::parse("*.log\n");
		assert!(!rules.is_excluded_file(Path::new("Makefile")));
		assert!(!rules.is_excluded_file(Path::new("log")));
	}
}

// vim: ts=4
