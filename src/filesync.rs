//! Per-file synchronization (pipeline sink)
//!
//! Every file entry runs its own sub-pipeline: download the remote copy,
//! index it, compute the delta against the local bytes, stream the patch.
//! Files are processed with bounded concurrency; the first failure stops
//! the stage from starting more files.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::checksum::ChecksumIndex;
use crate::config::Config;
use crate::delta::{compute_delta, DeltaStats};
use crate::error::SyncError;
use crate::logging::*;
use crate::patch::{PatchAck, PatchStreamer};
use crate::protocol::Client;
use crate::types::{FileIdentity, PathEntry, RunCounters};

/// Outcome of synchronizing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
	pub ack: PatchAck,
	pub stats: DeltaStats,
	pub remote_existed: bool,
}

pub struct FileSynchronizer {
	client: Client,
	streamer: PatchStreamer,
	block_size: usize,
}

impl FileSynchronizer {
	pub fn new(client: Client, config: &Config) -> Self {
		FileSynchronizer {
			streamer: PatchStreamer::new(client.clone(), config),
			client,
			block_size: config.block_size,
		}
	}

	/// Bring the remote copy of one file in line with the local one
	pub async fn sync_file(&self, entry: &PathEntry) -> Result<FileReport, SyncError> {
		let identity = FileIdentity::for_path(&entry.relative_path)?;

		let remote = self.client.download(&identity.name).await?;
		let remote_existed = remote.is_some();
		let remote_data = remote.map(|file| file.data).unwrap_or_default();

		let local = read_local(entry, self.client.max_file_size()).await?;

		// hashing a large file is CPU bound, keep it off the async workers
		let block_size = self.block_size;
		let (local, remote_len, ops) = tokio::task::spawn_blocking(move || {
			let index = ChecksumIndex::build(&remote_data, block_size);
			let ops = compute_delta(&local, &index);
			(local, remote_data.len(), ops)
		})
		.await
		.map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

		let stats = DeltaStats::of(&ops);
		let ack = self.streamer.stream(&identity, ops, &local, remote_len).await?;
		Ok(FileReport { ack, stats, remote_existed })
	}
}

async fn read_local(entry: &PathEntry, limit: u64) -> Result<Vec<u8>, SyncError> {
	let path = &entry.absolute_path;
	let walk_error = |e: std::io::Error| SyncError::Walk { path: path.clone(), message: e.to_string() };

	let meta = tokio::fs::metadata(path).await.map_err(walk_error)?;
	if meta.len() > limit {
		return Err(SyncError::SizeLimitExceeded { received: meta.len(), limit });
	}
	tokio::fs::read(path).await.map_err(walk_error)
}

/// Start synchronizing every file of the stream
pub fn sync_all(
	sync: Arc<FileSynchronizer>,
	files: mpsc::Receiver<PathEntry>,
	token: CancellationToken,
	concurrency: usize,
	counters: Arc<RunCounters>,
) -> mpsc::Receiver<SyncError> {
	let (err_tx, err_rx) = mpsc::channel(1);

	tokio::spawn(async move {
		// stops new files after the first failure, without cancelling the caller
		let stop = token.child_token();
		let entries = futures::stream::unfold(files, |mut files| async move {
			files.recv().await.map(|entry| (entry, files))
		})
		.take_until(stop.clone().cancelled_owned());

		entries
			.for_each_concurrent(concurrency.max(1), |entry| {
				let sync = sync.clone();
				let stop = stop.clone();
				let err_tx = err_tx.clone();
				let counters = counters.clone();
				async move {
					let result = tokio::select! {
						_ = stop.cancelled() => return,
						result = sync.sync_file(&entry) => result,
					};

					match result {
						Ok(report) => {
							info!(
								"Synced {} ({} bytes, {} literal, {} blocks copied{})",
								report.ack.name,
								report.ack.size,
								report.stats.literal_bytes,
								report.stats.copied_blocks,
								if report.remote_existed { "" } else { ", new file" }
							);
							counters.add_file(
								report.ack.bytes_sent,
								report.stats.literal_bytes,
								report.stats.copied_blocks,
							);
						}
						Err(e) => {
							warn!("Sync of {} failed: {}", entry.absolute_path.display(), e);
							if let Err(mpsc::error::TrySendError::Full(e)) = err_tx.try_send(e) {
								debug!("Additional file error: {}", e);
							}
							stop.cancel();
						}
					}
				}
			})
			.await;

		debug!("File synchronizer finished");
	});

	err_rx
}


// vim: ts=4
