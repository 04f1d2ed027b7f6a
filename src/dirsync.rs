//! Remote directory creation stage (pipeline sink)
//!
//! All directory entries share one `MAKE_DIR` stream: one request per
//! directory, one acknowledgement back. The walker emits parents before
//! their children, which is what keeps nested creation in order here.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::logging::*;
use crate::protocol::{remote_error, Client, Frame, Rpc};
use crate::types::{PathEntry, RunCounters};

/// Start the directory creator over a directory stream
pub fn create_all(
	client: Client,
	dirs: mpsc::Receiver<PathEntry>,
	token: CancellationToken,
	counters: Arc<RunCounters>,
) -> mpsc::Receiver<SyncError> {
	let (err_tx, err_rx) = mpsc::channel(1);

	tokio::spawn(async move {
		match run(&client, dirs, &token, &counters).await {
			Ok(created) => debug!("Directory creator finished: {} created", created),
			Err(e) if e.is_cancellation() => debug!("Directory creator cancelled"),
			Err(e) => {
				let _ = err_tx.send(e).await;
			}
		}
	});

	err_rx
}

async fn next_entry(
	dirs: &mut mpsc::Receiver<PathEntry>,
	token: &CancellationToken,
) -> Result<Option<PathEntry>, SyncError> {
	tokio::select! {
		_ = token.cancelled() => Err(SyncError::Cancelled),
		next = dirs.recv() => Ok(next),
	}
}

async fn run(
	client: &Client,
	mut dirs: mpsc::Receiver<PathEntry>,
	token: &CancellationToken,
	counters: &RunCounters,
) -> Result<u64, SyncError> {
	// the stream is only opened once there is something to create
	let mut pending = match next_entry(&mut dirs, token).await? {
		Some(entry) => Some(entry),
		None => return Ok(0),
	};
	let mut session = client.session(Rpc::MakeDir).await?;
	let mut created = 0u64;

	loop {
		let entry = match pending.take() {
			Some(entry) => entry,
			None => match next_entry(&mut dirs, token).await? {
				Some(entry) => entry,
				None => break,
			},
		};

		let name = entry.remote_name()?;
		if let Err(e) = session.send(&Frame::MakeDir { name: name.clone() }).await {
			// no retry: surface the peer's reason when it left one
			return Err(session.pending_error(e, 0, client.max_file_size()).await);
		}

		match session.expect("DIR_ACK").await? {
			Frame::DirAck => {
				trace!("Created remote directory {}", name);
				counters.add_dir();
				created += 1;
			}
			frame @ Frame::Error { .. } => return Err(remote_error(frame, 0, client.max_file_size())),
			other => {
				return Err(SyncError::protocol(format!("expected DIR_ACK, got {}", other.command())));
			}
		}
	}

	session.send(&Frame::End).await?;
	match session.recv("END").await? {
		Some(Frame::End) | None => Ok(created),
		Some(other) => Err(SyncError::protocol(format!("expected END, got {}", other.command()))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::error::TransportError;
	use crate::test_support::TestServer;
	use std::path::PathBuf;

	fn dir_entry(relative: &str) -> PathEntry {
		let mut entry = PathEntry::new(PathBuf::from("/local").join(relative), true);
		entry.relative_path = PathBuf::from(relative);
		entry
	}

	#[tokio::test]
	async fn test_creates_nested_directories() {
		let server = TestServer::start(Config::default()).await;
		let counters = Arc::new(RunCounters::default());
		let (tx, rx) = mpsc::channel(8);
		for name in &["a", "a/b", "a/b/c", "d"] {
			tx.send(dir_entry(name)).await.unwrap();
		}
		drop(tx);

		let mut errors = create_all(server.client(), rx, CancellationToken::new(), counters.clone());
		assert!(errors.recv().await.is_none());

		assert!(server.dir.path().join("a/b/c").is_dir());
		assert!(server.dir.path().join("d").is_dir());
		assert_eq!(counters.snapshot().dirs_created, 4);
	}

	#[tokio::test]
	async fn test_no_directories_opens_no_stream() {
		// the server is gone, so opening a stream would fail
		let server = TestServer::start(Config::default()).await;
		let client = server.client();
		drop(server);

		let (tx, rx) = mpsc::channel::<PathEntry>(1);
		drop(tx);
		let mut errors = create_all(client, rx, CancellationToken::new(), Arc::new(RunCounters::default()));
		assert!(errors.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_rejected_directory_stops_the_stage() {
		let server = TestServer::start(Config::default()).await;
		let (tx, rx) = mpsc::channel(8);
		tx.send(dir_entry("ok")).await.unwrap();
		let mut bad = dir_entry("x");
		bad.relative_path = PathBuf::new();
		tx.send(bad).await.unwrap();
		tx.send(dir_entry("never")).await.unwrap();
		drop(tx);

		let mut errors = create_all(server.client(), rx, CancellationToken::new(), Arc::new(RunCounters::default()));
		match errors.recv().await {
			Some(SyncError::Transport(TransportError::Remote { code, .. })) => assert_eq!(code, "INVALID_PATH"),
			other => panic!("unexpected {:?}", other),
		}
		assert!(server.dir.path().join("ok").is_dir());
		assert!(!server.dir.path().join("never").exists());
	}

	#[tokio::test]
	async fn test_cancellation_is_not_reported() {
		let server = TestServer::start(Config::default()).await;
		let token = CancellationToken::new();
		let (tx, rx) = mpsc::channel::<PathEntry>(1);

		let mut errors = create_all(server.client(), rx, token.clone(), Arc::new(RunCounters::default()));
		token.cancel();
		assert!(errors.recv().await.is_none());
		drop(tx);
	}
}

// vim: ts=4
