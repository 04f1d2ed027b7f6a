//! Pipeline coordination
//!
//! Wires walker → classifier → {directory creator, file synchronizer} and
//! fans their error channels into one. The first error cancels every stage
//! and becomes the run's result; a cancelled caller token ends the run as
//! `SyncOutcome::Cancelled` instead.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classify::classify;
use crate::config::Config;
use crate::dirsync::create_all;
use crate::error::SyncError;
use crate::exclusion::IgnoreRules;
use crate::filesync::{sync_all, FileSynchronizer};
use crate::logging::*;
use crate::protocol::{Client, Connector};
use crate::types::{PipelineState, RunCounters, SyncOutcome};
use crate::walker::walk;

/// Fan several error streams into one channel sized to the number of streams
pub fn merge_errors(streams: Vec<mpsc::Receiver<SyncError>>) -> mpsc::Receiver<SyncError> {
	let (tx, rx) = mpsc::channel(streams.len().max(1));
	for mut stream in streams {
		let tx = tx.clone();
		tokio::spawn(async move {
			while let Some(err) = stream.recv().await {
				if tx.send(err).await.is_err() {
					break;
				}
			}
		});
	}
	rx
}

pub struct PipelineCoordinator {
	root: PathBuf,
	config: Config,
	connector: Arc<dyn Connector>,
	state: Mutex<PipelineState>,
}

impl PipelineCoordinator {
	pub fn new(root: impl Into<PathBuf>, config: Config, connector: Arc<dyn Connector>) -> Self {
		PipelineCoordinator { root: root.into(), config, connector, state: Mutex::new(PipelineState::Idle) }
	}

	pub fn state(&self) -> PipelineState {
		*self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn set_state(&self, state: PipelineState) {
		*self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
	}

	/// Run one synchronization pass
	///
	/// `cancel` belongs to the caller; the run only ever cancels a child of it.
	pub async fn run(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
		{
			let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
			if *state == PipelineState::Running {
				return Err(SyncError::InvalidConfig { message: "a run is already in progress".to_string() });
			}
			*state = PipelineState::Running;
		}

		match self.run_stages(cancel).await {
			Ok(outcome) => {
				self.set_state(match outcome {
					SyncOutcome::Completed(_) => PipelineState::Completed,
					SyncOutcome::Cancelled(_) => PipelineState::Cancelled,
				});
				Ok(outcome)
			}
			Err(e) => {
				self.set_state(PipelineState::Failed);
				Err(e)
			}
		}
	}

	async fn run_stages(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
		self.config.validate()?;
		let rules = Arc::new(IgnoreRules::load(&self.config.ignore_path(&self.root))?);
		let buffer = self.config.channel_buffer_size;

		info!("Synchronizing {} to {}", self.root.display(), self.connector.peer());

		let token = cancel.child_token();
		let counters = Arc::new(RunCounters::default());
		let client = Client::new(self.connector.clone(), self.config.call_timeout(), self.config.max_file_size);

		let (entries, walk_errors) = walk(&self.root, rules, token.clone(), buffer);
		let classified = classify(&self.root, entries, token.clone(), buffer);
		let dir_errors = create_all(client.clone(), classified.dirs, token.clone(), counters.clone());
		let synchronizer = Arc::new(FileSynchronizer::new(client, &self.config));
		let file_errors = sync_all(
			synchronizer,
			classified.files,
			token.clone(),
			self.config.max_concurrent_files,
			counters.clone(),
		);

		let mut errors = merge_errors(vec![walk_errors, classified.errors, dir_errors, file_errors]);

		if let Some(err) = errors.recv().await {
			token.cancel();
			if cancel.is_cancelled() || err.is_cancellation() {
				debug!("Run cancelled while a stage was failing: {}", err);
				return Ok(SyncOutcome::Cancelled(counters.snapshot()));
			}
			error!("Synchronization failed: {}", err);
			return Err(err);
		}

		let report = counters.snapshot();
		if cancel.is_cancelled() {
			info!("Synchronization cancelled after {} files", report.files_synced);
			return Ok(SyncOutcome::Cancelled(report));
		}

		info!(
			"Synchronization complete: {} directories, {} files, {} bytes uploaded",
			report.dirs_created, report.files_synced, report.bytes_uploaded
		);
		Ok(SyncOutcome::Completed(report))
	}
}


// vim: ts=4
