//! Configuration for deltasync runs and the serving peer
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (TOML, passed with `--config`)
//! 3. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;

/// Default checksum block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Default transport chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Chunk size used by the serving side for large remote-read fetches
pub const DEFAULT_FETCH_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Largest payload carried by a single chunk frame
pub const MAX_PAYLOAD_LEN: usize = DEFAULT_FETCH_CHUNK_SIZE + 64 * 1024;

/// Hard cap on the size of a single transferred file (1 GiB)
pub const MAX_FILE_SIZE: u64 = 1 << 30;

/// Per-call network deadline in seconds
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;

/// Bounded queue depth between pipeline stages
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Version-control directory excluded from every walk
pub const VCS_DIR: &str = ".git";

/// Unified configuration passed explicitly into the coordinator and the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Block size used for checksum indexing and delta matching
	pub block_size: usize,

	/// Payload size of upload chunks
	pub chunk_size: usize,

	/// Payload size of download chunks sent by the server
	pub fetch_chunk_size: usize,

	/// Largest file accepted on either side of a transfer
	pub max_file_size: u64,

	/// Deadline for each network operation
	pub call_timeout_secs: u64,

	/// Capacity of the queues connecting pipeline stages
	pub channel_buffer_size: usize,

	/// Number of files synchronized at the same time
	pub max_concurrent_files: usize,

	/// Ignore file, relative paths are resolved against the sync root
	pub ignore_file: PathBuf,

	/// Send copy instructions instead of resolved bytes on upload
	pub wire_delta: bool,

	/// Numeric verbosity: 0 debug, 1 info, 2 warn, 3 and above error
	pub log_level: u8,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			block_size: DEFAULT_BLOCK_SIZE,
			chunk_size: DEFAULT_CHUNK_SIZE,
			fetch_chunk_size: DEFAULT_FETCH_CHUNK_SIZE,
			max_file_size: MAX_FILE_SIZE,
			call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
			channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
			max_concurrent_files: 4,
			ignore_file: PathBuf::from(".gitignore"),
			wire_delta: false,
			log_level: 1,
		}
	}
}

impl Config {
	/// Load configuration from a TOML file, keys missing from the file keep their defaults
	pub fn load(path: &Path) -> Result<Self, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		Self::from_toml(&contents)
	}

	/// Parse configuration from TOML text
	pub fn from_toml(contents: &str) -> Result<Self, SyncError> {
		let config: Config = toml::from_str(contents)
			.map_err(|e| SyncError::InvalidConfig { message: e.to_string() })?;
		config.validate()?;
		Ok(config)
	}

	/// Deadline applied to each network operation
	pub fn call_timeout(&self) -> Duration {
		Duration::from_secs(self.call_timeout_secs)
	}

	/// Ignore file location for a given sync root
	pub fn ignore_path(&self, root: &Path) -> PathBuf {
		if self.ignore_file.is_absolute() {
			self.ignore_file.clone()
		} else {
			root.join(&self.ignore_file)
		}
	}

	/// Validate the configuration
	pub fn validate(&self) -> Result<(), SyncError> {
		let fail = |message: String| Err(SyncError::InvalidConfig { message });

		if self.block_size == 0 {
			return fail("blockSize must be > 0".to_string());
		}
		if self.chunk_size == 0 || self.fetch_chunk_size == 0 {
			return fail("chunk sizes must be > 0".to_string());
		}
		if self.chunk_size > MAX_PAYLOAD_LEN || self.fetch_chunk_size > MAX_PAYLOAD_LEN {
			return fail(format!("chunk sizes must not exceed {} bytes", MAX_PAYLOAD_LEN));
		}
		if self.call_timeout_secs == 0 {
			return fail("callTimeoutSecs must be > 0".to_string());
		}
		if self.channel_buffer_size == 0 {
			return fail("channelBufferSize must be > 0".to_string());
		}
		if self.max_concurrent_files == 0 {
			return fail("maxConcurrentFiles must be > 0".to_string());
		}
		if self.block_size > MAX_PAYLOAD_LEN {
			return fail(format!("blockSize must not exceed {} bytes", MAX_PAYLOAD_LEN));
		}
		if self.block_size as u64 > self.max_file_size {
			return fail(format!(
				"blockSize {} exceeds maxFileSize {}",
				self.block_size, self.max_file_size
			));
		}
		Ok(())
	}
}


// vim: ts=4
