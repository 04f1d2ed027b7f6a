//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("file synced");
//! debug!("stage finished");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Map the numeric verbosity (0 debug, 1 info, 2 warn, 3 and above error) onto a filter directive
pub fn level_directive(level: u8) -> &'static str {
	match level {
		0 => "debug",
		1 => "info",
		2 => "warn",
		_ => "error",
	}
}

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise the numeric level decides:
///
/// ```bash
/// RUST_LOG=deltasync=trace deltasync sync . --remote 127.0.0.1:7777
/// RUST_LOG=deltasync::pipeline=debug deltasync serve ./files
/// ```
pub fn init_tracing(level: u8) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level_directive(level))),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_level_directive() {
		assert_eq!(level_directive(0), "debug");
		assert_eq!(level_directive(1), "info");
		assert_eq!(level_directive(2), "warn");
		assert_eq!(level_directive(3), "error");
		assert_eq!(level_directive(9), "error");
	}
}

// vim: ts=4
