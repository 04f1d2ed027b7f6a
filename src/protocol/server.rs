//! Serving peer
//!
//! Accepts one TCP connection per RPC and answers it against a `FileStore`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::codec::{FrameReader, FrameWriter, ReceiveBuffer};
use super::messages::{Frame, Rpc, ERR_INVALID_PATH, ERR_IO, ERR_PROTOCOL, ERR_SIZE_LIMIT};
use super::transport::with_deadline;
use crate::config::Config;
use crate::delta::resolve_block;
use crate::error::{SyncError, TransportError};
use crate::logging::*;
use crate::store::FileStore;
use crate::types::extension_of;

/// Error code reported to the client, `None` when the connection itself failed
fn error_code(err: &SyncError) -> Option<&'static str> {
	match err {
		SyncError::SizeLimitExceeded { .. } => Some(ERR_SIZE_LIMIT),
		SyncError::InvalidPath { .. } => Some(ERR_INVALID_PATH),
		SyncError::Io(_) => Some(ERR_IO),
		SyncError::Transport(_) | SyncError::Timeout { .. } | SyncError::Cancelled => None,
		_ => Some(ERR_PROTOCOL),
	}
}

fn unexpected(frame: &Frame, during: &str) -> SyncError {
	SyncError::protocol(format!("unexpected {} during {}", frame.command(), during))
}

/// Server end of one RPC stream, every frame operation runs under the call deadline
struct Connection<R, W> {
	reader: FrameReader<R>,
	writer: FrameWriter<W>,
	deadline: Duration,
}

impl<R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
	async fn recv(&mut self, what: &str) -> Result<Option<Frame>, SyncError> {
		let reader = &mut self.reader;
		with_deadline(self.deadline, format!("receive {}", what), reader.read_frame()).await
	}

	async fn recv_payload(&mut self, len: usize) -> Result<Vec<u8>, SyncError> {
		let reader = &mut self.reader;
		with_deadline(self.deadline, "receive chunk data", reader.read_payload(len)).await
	}

	async fn send(&mut self, frame: &Frame) -> Result<(), SyncError> {
		let writer = &mut self.writer;
		with_deadline(self.deadline, format!("send {}", frame.command()), writer.write_frame(frame)).await
	}

	async fn send_chunk(&mut self, data: &[u8]) -> Result<(), SyncError> {
		let writer = &mut self.writer;
		with_deadline(self.deadline, "send CHUNK", writer.write_chunk(data)).await
	}
}

#[derive(Clone)]
pub struct Server {
	store: FileStore,
	config: Arc<Config>,
}

impl Server {
	pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
		Server { store: FileStore::new(root), config: Arc::new(config) }
	}

	pub fn root(&self) -> &Path {
		self.store.root()
	}

	/// Accept connections until `token` is cancelled
	pub async fn serve(&self, listener: TcpListener, token: CancellationToken) -> Result<(), SyncError> {
		let store = self.store.clone();
		tokio::task::spawn_blocking(move || store.cleanup_temp_files())
			.await
			.map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

		info!("Serving {} on {}", self.root().display(), listener.local_addr()?);

		loop {
			let accepted = tokio::select! {
				_ = token.cancelled() => break,
				accepted = listener.accept() => accepted,
			};

			match accepted {
				Ok((stream, peer)) => {
					if let Err(e) = stream.set_nodelay(true) {
						trace!("Cannot set TCP_NODELAY: {}", e);
					}
					let server = self.clone();
					let token = token.child_token();
					tokio::spawn(async move {
						tokio::select! {
							_ = token.cancelled() => debug!("Connection from {} cancelled", peer),
							result = server.handle_stream(stream) => {
								if let Err(e) = result {
									warn!("Connection from {} failed: {}", peer, e);
								}
							}
						}
					});
				}
				Err(e) => warn!("Accept failed: {}", e),
			}
		}

		debug!("Server on {} stopped", self.root().display());
		Ok(())
	}

	/// Answer the single RPC carried by `stream`
	pub async fn handle_stream<S>(&self, stream: S) -> Result<(), SyncError>
	where
		S: AsyncRead + AsyncWrite + Send + Unpin,
	{
		let (read, write) = tokio::io::split(stream);
		let mut conn = Connection {
			reader: FrameReader::new(BufReader::new(read)),
			writer: FrameWriter::new(write),
			deadline: self.config.call_timeout(),
		};

		let result = match conn.recv("HELLO").await {
			Ok(Some(Frame::Hello { rpc })) => {
				trace!("RPC {:?}", rpc);
				match rpc {
					Rpc::MakeDir => self.make_dirs(&mut conn).await,
					Rpc::Download => self.download(&mut conn).await,
					Rpc::Upload => self.upload(&mut conn).await,
				}
			}
			Ok(Some(other)) => Err(unexpected(&other, "HELLO")),
			Ok(None) => Ok(()),
			Err(e) => Err(e),
		};

		if let Err(e) = &result {
			if let Some(code) = error_code(e) {
				let frame = match e {
					SyncError::SizeLimitExceeded { limit, .. } => {
						Frame::Error { code: code.to_string(), message: e.to_string(), limit: Some(*limit) }
					}
					_ => Frame::error(code, e.to_string()),
				};
				if conn.send(&frame).await.is_ok() {
					// let the client finish sending so it can read the report
					if tokio::time::timeout(conn.deadline, conn.reader.drain()).await.is_err() {
						trace!("Client kept sending after error");
					}
				}
			}
		}
		result
	}

	async fn make_dirs<R, W>(&self, conn: &mut Connection<R, W>) -> Result<(), SyncError>
	where
		R: AsyncBufRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let mut created = 0u64;
		loop {
			match conn.recv("MAKE_DIR").await? {
				Some(Frame::MakeDir { name }) => {
					let path = self.store.make_dir(&name).await?;
					trace!("Created directory {}", path.display());
					conn.send(&Frame::DirAck).await?;
					created += 1;
				}
				Some(Frame::End) => {
					conn.send(&Frame::End).await?;
					break;
				}
				None => break,
				Some(other) => return Err(unexpected(&other, "MAKE_DIR")),
			}
		}
		debug!("Directory stream done: {} created", created);
		Ok(())
	}

	async fn download<R, W>(&self, conn: &mut Connection<R, W>) -> Result<(), SyncError>
	where
		R: AsyncBufRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let name = match conn.recv("DOWNLOAD").await? {
			Some(Frame::Download { name }) => name,
			Some(other) => return Err(unexpected(&other, "DOWNLOAD")),
			None => return Ok(()),
		};

		let limit = self.config.max_file_size;
		match self.store.size_of(&name).await? {
			None => {
				trace!("Download of missing {}", name);
				return conn.send(&Frame::End).await;
			}
			Some(size) if size > limit => {
				return Err(SyncError::SizeLimitExceeded { received: size, limit });
			}
			Some(_) => {}
		}

		let file_type = extension_of(Path::new(&name));
		conn.send(&Frame::Info { name: name.clone(), file_type, block_size: None }).await?;

		let mut file = tokio::fs::File::open(self.store.resolve(&name)?).await?;
		let mut buf = vec![0u8; self.config.fetch_chunk_size];
		let mut sent = 0u64;
		loop {
			let n = file.read(&mut buf).await?;
			if n == 0 {
				break;
			}
			sent += n as u64;
			if sent > limit {
				return Err(SyncError::SizeLimitExceeded { received: sent, limit });
			}
			conn.send_chunk(&buf[..n]).await?;
		}
		conn.send(&Frame::End).await?;

		debug!("Sent {} ({} bytes)", name, sent);
		Ok(())
	}

	async fn upload<R, W>(&self, conn: &mut Connection<R, W>) -> Result<(), SyncError>
	where
		R: AsyncBufRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let (name, block_size) = match conn.recv("INFO").await? {
			Some(Frame::Info { name, block_size, .. }) => (name, block_size.unwrap_or(self.config.block_size)),
			Some(other) => return Err(unexpected(&other, "UPLOAD")),
			None => return Ok(()),
		};
		self.store.resolve(&name)?;
		if block_size == 0 {
			return Err(SyncError::protocol("block size must be > 0"));
		}

		let mut buffer = ReceiveBuffer::new(self.config.max_file_size);
		let mut current: Option<Vec<u8>> = None;
		loop {
			match conn.recv("upload data").await? {
				Some(Frame::Chunk { len }) => {
					let payload = conn.recv_payload(len).await?;
					buffer.push(&payload)?;
				}
				Some(Frame::Copy { block }) => {
					if current.is_none() {
						current = Some(self.store.load(&name).await?.unwrap_or_default());
					}
					let base = current.as_deref().unwrap_or_default();
					buffer.push(resolve_block(base, block, block_size)?)?;
				}
				Some(Frame::End) => break,
				Some(other) => return Err(unexpected(&other, "UPLOAD")),
				None => return Err(TransportError::Disconnected { what: "upload END".to_string() }.into()),
			}
		}

		let size = self.store.save(&name, &buffer.into_bytes()).await?;
		conn.send(&Frame::Stored { name: name.clone(), size }).await?;
		info!("Stored {} ({} bytes)", name, size);
		Ok(())
	}
}


// vim: ts=4
