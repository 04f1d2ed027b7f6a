//! Ignore file parsing
//!
//! Only a minimal subset of gitignore syntax is understood: blank lines and
//! `#` comments are skipped, `*.<ext>` excludes an extension and every other
//! line is taken verbatim as a directory name. Negation, anchoring and
//! general globs are not interpreted.

use std::path::Path;

/// One meaningful line of an ignore file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreLine {
	/// `*.log` → `.log`
	Extension(String),
	/// Any other non-comment line
	DirName(String),
}

/// Parser for individual ignore files
pub struct IgnoreFileParser;

impl IgnoreFileParser {
	/// Read and parse an ignore file; `Ok(None)` when it does not exist
	pub fn parse_file(path: &Path) -> std::io::Result<Option<Vec<IgnoreLine>>> {
		match std::fs::read_to_string(path) {
			Ok(contents) => Ok(Some(Self::parse_contents(&contents))),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Parse ignore file contents
	pub fn parse_contents(contents: &str) -> Vec<IgnoreLine> {
		contents
			.lines()
			.filter_map(|line| {
				let line = line.trim();

				if line.is_empty() || line.starts_with('#') {
					return None;
				}

				match line.strip_prefix("*.") {
					Some(ext) => Some(IgnoreLine::Extension(format!(".{}", ext))),
					None => Some(IgnoreLine::DirName(line.to_string())),
				}
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	#[test]
	fn test_parse_ignore_contents() {
		let contents = r#"
# This is a comment
*.log
node_modules

   # indented comment
*.tmp

target
"#;

		let lines = IgnoreFileParser::parse_contents(contents);

		assert_eq!(
			lines,
			vec![
				IgnoreLine::Extension(".log".to_string()),
				IgnoreLine::DirName("node_modules".to_string()),
				IgnoreLine::Extension(".tmp".to_string()),
				IgnoreLine::DirName("target".to_string()),
			]
		);
	}

	#[test]
	fn test_lines_are_kept_verbatim() {
		// no glob interpretation beyond `*.<ext>`
		let lines = IgnoreFileParser::parse_contents("build/\n!keep.log\n");
		assert_eq!(
			lines,
			vec![
				IgnoreLine::DirName("build/".to_string()),
				IgnoreLine::DirName("!keep.log".to_string()),
			]
		);
	}

	#[test]
	fn test_parse_missing_file() {
		let temp_dir = TempDir::new().unwrap();
		let result = IgnoreFileParser::parse_file(&temp_dir.path().join(".gitignore")).unwrap();
		assert!(result.is_none());
	}

	#[test]
	fn test_parse_existing_file() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join(".gitignore");
		fs::write(&path, "*.o\n").unwrap();

		let lines = IgnoreFileParser::parse_file(&path).unwrap().unwrap();
		assert_eq!(lines, vec![IgnoreLine::Extension(".o".to_string())]);
	}
}

// vim: ts=4
