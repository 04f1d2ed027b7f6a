//! Patch streaming (per-file sink)
//!
//! Sends one file's edit script over an `UPLOAD` stream. By default every
//! `CopyBlock` is resolved to the matching local bytes and the server only
//! ever sees literal chunks. With `wire_delta` the copies travel as `COPY`
//! frames and the server resolves them against its current copy.

use crate::checksum::block_range;
use crate::config::Config;
use crate::delta::DeltaOp;
use crate::error::SyncError;
use crate::logging::*;
use crate::protocol::{remote_error, Client, Frame, Rpc, Session};
use crate::types::FileIdentity;

/// Server acknowledgement of a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchAck {
	pub name: String,
	pub size: u64,
	/// Payload bytes put on the wire, excluding frame headers
	pub bytes_sent: u64,
}

/// Local byte segments an edit script resolves to, in order
pub fn resolve_segments<'a>(
	ops: &'a [DeltaOp],
	local: &'a [u8],
	block_size: usize,
	remote_len: usize,
) -> Result<Vec<&'a [u8]>, SyncError> {
	let mut segments = Vec::with_capacity(ops.len());
	let mut offset = 0usize;

	for op in ops {
		match op {
			DeltaOp::Literal { bytes } => {
				offset += bytes.len();
				segments.push(bytes.as_slice());
			}
			DeltaOp::CopyBlock { remote_block_index } => {
				let len = block_range(*remote_block_index, block_size, remote_len)
					.map(|range| range.len())
					.ok_or_else(|| SyncError::protocol(format!("unknown remote block {}", remote_block_index)))?;
				let segment = local.get(offset..offset + len).ok_or_else(|| {
					SyncError::protocol(format!("block {} runs past the local file", remote_block_index))
				})?;
				offset += len;
				segments.push(segment);
			}
		}
	}

	if offset != local.len() {
		return Err(SyncError::protocol(format!(
			"edit script covers {} of {} bytes",
			offset,
			local.len()
		)));
	}
	Ok(segments)
}

/// Packs byte segments into fixed-size chunk frames
struct ChunkSender<'s> {
	session: &'s mut Session,
	chunk_size: usize,
	pending: Vec<u8>,
	sent: u64,
}

impl<'s> ChunkSender<'s> {
	async fn write(&mut self, mut data: &[u8]) -> Result<(), SyncError> {
		while !data.is_empty() {
			let room = self.chunk_size - self.pending.len();
			let take = room.min(data.len());
			self.pending.extend_from_slice(&data[..take]);
			data = &data[take..];
			if self.pending.len() == self.chunk_size {
				self.flush().await?;
			}
		}
		Ok(())
	}

	async fn flush(&mut self) -> Result<(), SyncError> {
		if self.pending.is_empty() {
			return Ok(());
		}
		self.session.send_chunk(&self.pending).await?;
		self.sent += self.pending.len() as u64;
		self.pending.clear();
		Ok(())
	}
}

pub struct PatchStreamer {
	client: Client,
	chunk_size: usize,
	block_size: usize,
	wire_delta: bool,
}

impl PatchStreamer {
	pub fn new(client: Client, config: &Config) -> Self {
		PatchStreamer {
			client,
			chunk_size: config.chunk_size.max(1),
			block_size: config.block_size,
			wire_delta: config.wire_delta,
		}
	}

	/// Upload `ops` for `identity` and wait for the server's acknowledgement
	///
	/// `local` is the file the script was computed for and `remote_len` the
	/// size of the remote copy the block indices refer to.
	pub async fn stream(
		&self,
		identity: &FileIdentity,
		ops: Vec<DeltaOp>,
		local: &[u8],
		remote_len: usize,
	) -> Result<PatchAck, SyncError> {
		let limit = self.client.max_file_size();
		if local.len() as u64 > limit {
			return Err(SyncError::SizeLimitExceeded { received: local.len() as u64, limit });
		}
		let segments = resolve_segments(&ops, local, self.block_size, remote_len)?;

		let mut session = self.client.session(Rpc::Upload).await?;
		let info = Frame::Info {
			name: identity.name.clone(),
			file_type: identity.file_type.clone(),
			block_size: if self.wire_delta { Some(self.block_size) } else { None },
		};
		session.send(&info).await?;

		let sent = match self.send_body(&mut session, &ops, &segments).await {
			Ok(sent) => sent,
			Err(e @ SyncError::Transport(_)) => {
				return Err(session.pending_error(e, local.len() as u64, limit).await);
			}
			Err(e) => return Err(e),
		};

		match session.expect("STORED").await? {
			Frame::Stored { name, size } => {
				if name != identity.name || size != local.len() as u64 {
					return Err(SyncError::protocol(format!(
						"server stored {} ({} bytes), expected {} ({} bytes)",
						name,
						size,
						identity.name,
						local.len()
					)));
				}
				trace!("Upload of {} acknowledged ({} bytes on the wire)", name, sent);
				Ok(PatchAck { name, size, bytes_sent: sent })
			}
			frame @ Frame::Error { .. } => Err(remote_error(frame, local.len() as u64, limit)),
			other => Err(SyncError::protocol(format!("expected STORED, got {}", other.command()))),
		}
	}

	async fn send_body(&self, session: &mut Session, ops: &[DeltaOp], segments: &[&[u8]]) -> Result<u64, SyncError> {
		let mut chunks = ChunkSender { session, chunk_size: self.chunk_size, pending: Vec::new(), sent: 0 };

		if self.wire_delta {
			for op in ops {
				match op {
					DeltaOp::Literal { bytes } => chunks.write(bytes).await?,
					DeltaOp::CopyBlock { remote_block_index } => {
						chunks.flush().await?;
						chunks.session.send(&Frame::Copy { block: *remote_block_index }).await?;
					}
				}
			}
		} else {
			for segment in segments {
				chunks.write(segment).await?;
			}
		}
		chunks.flush().await?;

		chunks.session.send(&Frame::End).await?;
		// half-close: nothing more comes from this side, only STORED is awaited
		chunks.session.finish().await?;
		Ok(chunks.sent)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::checksum::ChecksumIndex;
	use crate::delta::compute_delta;
	use crate::test_support::TestServer;
	use std::fs;

	fn identity(name: &str) -> FileIdentity {
		FileIdentity::for_path(std::path::Path::new(name)).unwrap()
	}

	#[test]
	fn test_resolve_segments_uses_local_bytes() {
		let remote = b"AAAABBBBCC";
		let local = b"xxAAAABBBBCC";
		let index = ChecksumIndex::build(remote, 4);
		let ops = compute_delta(local, &index);

		let segments = resolve_segments(&ops, local, 4, remote.len()).unwrap();
		assert_eq!(segments.concat(), local.to_vec());
	}

	#[test]
	fn test_resolve_segments_rejects_short_cover() {
		let ops = vec![DeltaOp::Literal { bytes: b"ab".to_vec() }];
		assert!(resolve_segments(&ops, b"abc", 4, 0).is_err());
	}

	#[tokio::test]
	async fn test_stream_literal_file() {
		let server = TestServer::start(Config::default()).await;
		let config = Config { chunk_size: 4, ..Default::default() };
		let streamer = PatchStreamer::new(server.client(), &config);

		let local = b"hello world";
		let ops = compute_delta(local, &ChecksumIndex::empty(128));
		let ack = streamer.stream(&identity("greeting.txt"), ops, local, 0).await.unwrap();

		assert_eq!(ack.size, 11);
		assert_eq!(ack.bytes_sent, 11);
		assert_eq!(fs::read(server.dir.path().join("greeting.txt")).unwrap(), b"hello world");
	}

	#[tokio::test]
	async fn test_stream_with_copy_frames_sends_only_literals() {
		let server = TestServer::start(Config::default()).await;
		let remote: Vec<u8> = (0..512u32).map(|i| (i * 7 % 256) as u8).collect();
		fs::write(server.dir.path().join("data.bin"), &remote).unwrap();

		let mut local = remote.clone();
		local.extend_from_slice(b"appended tail");

		let config = Config { wire_delta: true, ..Default::default() };
		let streamer = PatchStreamer::new(server.client(), &config);
		let ops = compute_delta(&local, &ChecksumIndex::build(&remote, config.block_size));
		let ack = streamer.stream(&identity("data.bin"), ops, &local, remote.len()).await.unwrap();

		assert_eq!(ack.bytes_sent, 13);
		assert_eq!(fs::read(server.dir.path().join("data.bin")).unwrap(), local);
	}

	#[tokio::test]
	async fn test_stream_reports_server_size_limit() {
		let server = TestServer::start(Config { max_file_size: 16, ..Default::default() }).await;
		let streamer = PatchStreamer::new(server.client(), &Config { chunk_size: 8, ..Default::default() });

		let local = vec![b'z'; 64];
		let ops = compute_delta(&local, &ChecksumIndex::empty(128));
		let err = streamer.stream(&identity("big.txt"), ops, &local, 0).await.unwrap_err();

		assert!(err.is_size_limit(), "got {}", err);
		match err {
			SyncError::SizeLimitExceeded { limit, .. } => assert_eq!(limit, 16),
			_ => unreachable!(),
		}
	}
}

// vim: ts=4
