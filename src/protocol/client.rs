//! Client side of the RPCs
//!
//! A `Session` owns one stream opened through a `Connector`. Every frame
//! read or write runs under the configured per-call deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{BufReader, ReadHalf, WriteHalf};

use super::codec::{FrameReader, FrameWriter, ReceiveBuffer};
use super::messages::{Frame, Rpc, ERR_SIZE_LIMIT};
use super::transport::{with_deadline, BoxedStream, Connector};
use crate::error::{SyncError, TransportError};
use crate::logging::*;
use crate::types::FileIdentity;

/// One open RPC stream
pub struct Session {
	reader: FrameReader<BufReader<ReadHalf<BoxedStream>>>,
	writer: FrameWriter<WriteHalf<BoxedStream>>,
	timeout: Duration,
}

impl Session {
	/// Open a stream and announce the RPC
	pub async fn open(connector: &dyn Connector, rpc: Rpc, timeout: Duration) -> Result<Self, SyncError> {
		let stream = with_deadline(timeout, format!("open {:?} stream", rpc), connector.open()).await?;
		let (read, write) = tokio::io::split(stream);
		let mut session = Session {
			reader: FrameReader::new(BufReader::new(read)),
			writer: FrameWriter::new(write),
			timeout,
		};
		session.send(&Frame::Hello { rpc }).await?;
		Ok(session)
	}

	pub async fn send(&mut self, frame: &Frame) -> Result<(), SyncError> {
		let writer = &mut self.writer;
		with_deadline(self.timeout, format!("send {}", frame.command()), writer.write_frame(frame)).await
	}

	pub async fn send_chunk(&mut self, data: &[u8]) -> Result<(), SyncError> {
		let writer = &mut self.writer;
		with_deadline(self.timeout, "send CHUNK", writer.write_chunk(data)).await
	}

	/// Next frame, `None` when the peer closed the stream
	pub async fn recv(&mut self, what: &str) -> Result<Option<Frame>, SyncError> {
		let reader = &mut self.reader;
		with_deadline(self.timeout, format!("receive {}", what), reader.read_frame()).await
	}

	/// Next frame, a closed stream is an error
	pub async fn expect(&mut self, what: &str) -> Result<Frame, SyncError> {
		match self.recv(what).await? {
			Some(frame) => Ok(frame),
			None => Err(TransportError::Disconnected { what: what.to_string() }.into()),
		}
	}

	pub async fn recv_payload(&mut self, len: usize) -> Result<Vec<u8>, SyncError> {
		let reader = &mut self.reader;
		with_deadline(self.timeout, "receive chunk data", reader.read_payload(len)).await
	}

	/// Turn a failed send into the peer's pending error report, when it sent one
	pub async fn pending_error(&mut self, send_error: SyncError, received: u64, local_limit: u64) -> SyncError {
		match self.recv("pending response").await {
			Ok(Some(frame @ Frame::Error { .. })) => remote_error(frame, received, local_limit),
			_ => send_error,
		}
	}

	/// Half-close the sending side
	pub async fn finish(&mut self) -> Result<(), SyncError> {
		let writer = &mut self.writer;
		with_deadline(self.timeout, "close stream", writer.shutdown()).await
	}
}

/// Map an `ERROR` frame to the matching error kind
///
/// `received` is how many bytes of the transfer this side has seen or sent;
/// `local_limit` stands in when the peer did not report its cap.
pub fn remote_error(frame: Frame, received: u64, local_limit: u64) -> SyncError {
	match frame {
		Frame::Error { code, limit, .. } if code == ERR_SIZE_LIMIT => {
			SyncError::SizeLimitExceeded { received, limit: limit.unwrap_or(local_limit) }
		}
		Frame::Error { code, message, .. } => TransportError::Remote { code, message }.into(),
		other => SyncError::protocol(format!("unexpected {}", other.command())),
	}
}

/// A remote file fetched in full
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
	pub identity: FileIdentity,
	pub data: Vec<u8>,
}

/// Typed calls against the remote peer
#[derive(Clone)]
pub struct Client {
	connector: Arc<dyn Connector>,
	timeout: Duration,
	max_file_size: u64,
}

impl Client {
	pub fn new(connector: Arc<dyn Connector>, timeout: Duration, max_file_size: u64) -> Self {
		Client { connector, timeout, max_file_size }
	}

	pub fn max_file_size(&self) -> u64 {
		self.max_file_size
	}

	pub async fn session(&self, rpc: Rpc) -> Result<Session, SyncError> {
		Session::open(self.connector.as_ref(), rpc, self.timeout).await
	}

	/// Fetch the remote copy of `name`; `None` when the peer has no such file
	pub async fn download(&self, name: &str) -> Result<Option<RemoteFile>, SyncError> {
		let mut session = self.session(Rpc::Download).await?;
		session.send(&Frame::Download { name: name.to_string() }).await?;

		let identity = match session.recv("download info").await? {
			None | Some(Frame::End) => {
				trace!("No remote copy of {}", name);
				return Ok(None);
			}
			Some(Frame::Info { name, file_type, .. }) => FileIdentity { name, file_type },
			Some(frame @ Frame::Error { .. }) => {
				return Err(remote_error(frame, 0, self.max_file_size));
			}
			Some(other) => {
				return Err(SyncError::protocol(format!("unexpected {} in download", other.command())));
			}
		};

		let mut buffer = ReceiveBuffer::new(self.max_file_size);
		loop {
			match session.expect("download chunk").await? {
				Frame::Chunk { len } => {
					let payload = session.recv_payload(len).await?;
					buffer.push(&payload)?;
				}
				Frame::End => break,
				frame @ Frame::Error { .. } => {
					return Err(remote_error(frame, buffer.len() as u64, self.max_file_size));
				}
				other => {
					return Err(SyncError::protocol(format!("unexpected {} in download", other.command())));
				}
			}
		}

		debug!("Downloaded {} ({} bytes)", identity.name, buffer.len());
		Ok(Some(RemoteFile { identity, data: buffer.into_bytes() }))
	}
}

// vim: ts=4
