//! Frame codec over async byte streams

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::messages::Frame;
use crate::config::MAX_PAYLOAD_LEN;
use crate::error::{SyncError, TransportError};

/// Longest accepted JSON header line
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reads frames and chunk payloads
pub struct FrameReader<R> {
	inner: R,
	line: String,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
	pub fn new(inner: R) -> Self {
		FrameReader { inner, line: String::new() }
	}

	/// Next frame, `None` on a clean end of stream
	pub async fn read_frame(&mut self) -> Result<Option<Frame>, SyncError> {
		loop {
			self.line.clear();
			let n = (&mut self.inner)
				.take(MAX_LINE_LEN as u64)
				.read_line(&mut self.line)
				.await
				.map_err(|source| TransportError::ReceiveFailed { what: "frame".to_string(), source })?;

			if n == 0 {
				return Ok(None);
			}
			if !self.line.ends_with('\n') {
				if n >= MAX_LINE_LEN {
					return Err(SyncError::protocol("frame header too long"));
				}
				return Err(TransportError::Disconnected { what: "end of frame".to_string() }.into());
			}

			let trimmed = self.line.trim();
			if trimmed.is_empty() {
				continue;
			}
			return Ok(Some(serde_json::from_str(trimmed)?));
		}
	}

	/// Raw payload announced by a `CHUNK` header
	pub async fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, SyncError> {
		if len > MAX_PAYLOAD_LEN {
			return Err(SyncError::protocol(format!(
				"chunk of {} bytes exceeds {}",
				len, MAX_PAYLOAD_LEN
			)));
		}

		let mut data = vec![0u8; len];
		self.inner.read_exact(&mut data).await.map_err(payload_error)?;

		let mut trailing = [0u8; 1];
		self.inner.read_exact(&mut trailing).await.map_err(payload_error)?;
		if trailing[0] != b'\n' {
			return Err(SyncError::protocol("expected newline after chunk data"));
		}
		Ok(data)
	}

	/// Discard the rest of the stream, returning how many bytes were dropped
	pub async fn drain(&mut self) -> std::io::Result<u64> {
		tokio::io::copy(&mut self.inner, &mut tokio::io::sink()).await
	}
}

fn payload_error(source: std::io::Error) -> SyncError {
	if source.kind() == std::io::ErrorKind::UnexpectedEof {
		TransportError::Disconnected { what: "chunk data".to_string() }.into()
	} else {
		TransportError::ReceiveFailed { what: "chunk data".to_string(), source }.into()
	}
}

/// Writes frames and chunk payloads
pub struct FrameWriter<W> {
	inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
	pub fn new(inner: W) -> Self {
		FrameWriter { inner }
	}

	/// Write and flush one frame
	pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), SyncError> {
		let mut line = serde_json::to_vec(frame)?;
		line.push(b'\n');
		self.write_all(frame.command(), &line).await?;
		self.flush(frame.command()).await
	}

	/// Write a `CHUNK` header followed by its payload
	pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), SyncError> {
		let mut header = serde_json::to_vec(&Frame::Chunk { len: data.len() })?;
		header.push(b'\n');
		self.write_all("CHUNK", &header).await?;
		self.write_all("CHUNK", data).await?;
		self.write_all("CHUNK", b"\n").await?;
		self.flush("CHUNK").await
	}

	/// Half-close the stream
	pub async fn shutdown(&mut self) -> Result<(), SyncError> {
		self.inner.shutdown().await.map_err(|source| send_error("shutdown", source))
	}

	async fn write_all(&mut self, what: &str, data: &[u8]) -> Result<(), SyncError> {
		self.inner.write_all(data).await.map_err(|source| send_error(what, source))
	}

	async fn flush(&mut self, what: &str) -> Result<(), SyncError> {
		self.inner.flush().await.map_err(|source| send_error(what, source))
	}
}

fn send_error(what: &str, source: std::io::Error) -> SyncError {
	TransportError::SendFailed { what: what.to_string(), source }.into()
}

/// Accumulates received bytes under a size cap
pub struct ReceiveBuffer {
	data: Vec<u8>,
	limit: u64,
}

impl ReceiveBuffer {
	pub fn new(limit: u64) -> Self {
		ReceiveBuffer { data: Vec::new(), limit }
	}

	/// Append bytes; bytes up to the cap are kept, anything past it fails the transfer
	pub fn push(&mut self, bytes: &[u8]) -> Result<(), SyncError> {
		let received = self.data.len() as u64 + bytes.len() as u64;
		if received > self.limit {
			let room = (self.limit - self.data.len() as u64) as usize;
			self.data.extend_from_slice(&bytes[..room]);
			return Err(SyncError::SizeLimitExceeded { received, limit: self.limit });
		}
		self.data.extend_from_slice(bytes);
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.data
	}
}


// vim: ts=4
