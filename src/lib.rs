//! # deltasync - rsync-style one-way directory synchronization
//!
//! deltasync walks a local directory tree and brings a remote copy of it up
//! to date. Directories are created remotely, and every file is synchronized
//! with a rolling-checksum delta against the remote's current version, so
//! only changed regions need new bytes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use deltasync::{Config, PipelineCoordinator, TcpConnector};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let connector = Arc::new(TcpConnector::new("127.0.0.1:7777", config.call_timeout()));
//!     let coordinator = PipelineCoordinator::new("./project", config, connector);
//!     let outcome = coordinator.run(&CancellationToken::new()).await?;
//!     println!("Synced {} files", outcome.report().files_synced);
//!     Ok(())
//! }
//! ```
//!
//! The remote side is a [`Server`] serving a directory:
//!
//! ```rust,ignore
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7777").await?;
//! Server::new("./mirror", Config::default()).serve(listener, CancellationToken::new()).await?;
//! ```

pub mod checksum;
pub mod classify;
pub mod config;
pub mod delta;
pub mod dirsync;
pub mod error;
pub mod exclusion;
pub mod filesync;
pub mod logging;
pub mod patch;
pub mod pipeline;
pub mod protocol;
pub mod store;
pub mod types;
pub mod walker;

#[cfg(test)]
mod test_support;

// Re-export commonly used types and functions
pub use checksum::{BlockChecksum, ChecksumIndex, RollingChecksum};
pub use config::Config;
pub use delta::{compute_delta, reconstruct, DeltaOp};
pub use error::{SyncError, TransportError};
pub use exclusion::IgnoreRules;
pub use pipeline::PipelineCoordinator;
pub use protocol::{Client, Connector, Server, TcpConnector};
pub use types::{PathEntry, PipelineState, SyncOutcome, SyncReport};

// vim: ts=4
