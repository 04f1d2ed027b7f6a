//! Error types for deltasync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// A node of the local tree could not be accessed during the walk
	Walk { path: PathBuf, message: String },

	/// A walked path could not be expressed relative to the sync root
	RelativePath { path: PathBuf, root: PathBuf },

	/// Network-level failure (dial, send, receive, remote-reported)
	Transport(TransportError),

	/// An incoming file grew past the configured size cap
	SizeLimitExceeded { received: u64, limit: u64 },

	/// A network operation did not finish within its deadline
	Timeout { operation: String },

	/// The run was cancelled by the caller
	Cancelled,

	/// Malformed frame or unexpected message on the wire
	Protocol { message: String },

	/// A name received from a peer does not denote a safe relative path
	InvalidPath { name: String, reason: String },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// I/O error
	Io(io::Error),
}

impl SyncError {
	/// True for the cancellation outcome, which callers report as an early stop
	pub fn is_cancellation(&self) -> bool {
		matches!(self, SyncError::Cancelled)
	}

	/// True when the error is the distinguished size-limit kind
	pub fn is_size_limit(&self) -> bool {
		matches!(self, SyncError::SizeLimitExceeded { .. })
	}

	pub(crate) fn protocol(message: impl Into<String>) -> Self {
		SyncError::Protocol { message: message.into() }
	}

	pub(crate) fn timeout(operation: impl Into<String>) -> Self {
		SyncError::Timeout { operation: operation.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Walk { path, message } => {
				write!(f, "Error accessing path {}: {}", path.display(), message)
			}
			SyncError::RelativePath { path, root } => {
				write!(f, "Cannot make {} relative to {}", path.display(), root.display())
			}
			SyncError::Transport(e) => write!(f, "Transport error: {}", e),
			SyncError::SizeLimitExceeded { received, limit } => {
				write!(f, "File is too large: {} > {}", received, limit)
			}
			SyncError::Timeout { operation } => write!(f, "Deadline exceeded: {}", operation),
			SyncError::Cancelled => write!(f, "Operation cancelled"),
			SyncError::Protocol { message } => write!(f, "Protocol error: {}", message),
			SyncError::InvalidPath { name, reason } => {
				write!(f, "Invalid path {:?}: {}", name, reason)
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io(e) => Some(e),
			SyncError::Transport(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<TransportError> for SyncError {
	fn from(e: TransportError) -> Self {
		SyncError::Transport(e)
	}
}

impl From<serde_json::Error> for SyncError {
	fn from(e: serde_json::Error) -> Self {
		SyncError::Protocol { message: e.to_string() }
	}
}

/// Transport-specific errors
#[derive(Debug)]
pub enum TransportError {
	/// Could not open a stream to the remote peer
	DialFailed { address: String, source: io::Error },

	/// Writing a frame failed
	SendFailed { what: String, source: io::Error },

	/// Reading a frame failed
	ReceiveFailed { what: String, source: io::Error },

	/// The peer closed the stream before the exchange finished
	Disconnected { what: String },

	/// The peer answered with an error frame
	Remote { code: String, message: String },
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::DialFailed { address, source } => {
				write!(f, "Failed to dial {}: {}", address, source)
			}
			TransportError::SendFailed { what, source } => {
				write!(f, "Cannot send {}: {}", what, source)
			}
			TransportError::ReceiveFailed { what, source } => {
				write!(f, "Cannot receive {}: {}", what, source)
			}
			TransportError::Disconnected { what } => {
				write!(f, "Connection closed while waiting for {}", what)
			}
			TransportError::Remote { code, message } => {
				write!(f, "Remote error [{}]: {}", code, message)
			}
		}
	}
}

impl Error for TransportError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			TransportError::DialFailed { source, .. } => Some(source),
			TransportError::SendFailed { source, .. } => Some(source),
			TransportError::ReceiveFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_size_limit_is_distinguished() {
		let err = SyncError::SizeLimitExceeded { received: 11, limit: 10 };
		assert!(err.is_size_limit());
		assert!(!err.is_cancellation());
		assert_eq!(err.to_string(), "File is too large: 11 > 10");

		let io_err = SyncError::from(io::Error::new(io::ErrorKind::Other, "boom"));
		assert!(!io_err.is_size_limit());
	}

	#[test]
	fn test_transport_error_display() {
		let err: SyncError =
			TransportError::Remote { code: "IO".to_string(), message: "disk full".to_string() }
				.into();
		assert!(err.to_string().contains("Remote error [IO]: disk full"));
	}
}

// vim: ts=4
