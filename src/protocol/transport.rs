//! Stream connectors and per-call deadlines

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{SyncError, TransportError};
use crate::logging::*;

/// Byte stream carrying one RPC
pub trait RpcStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RpcStream for T {}

pub type BoxedStream = Box<dyn RpcStream>;

/// Opens streams to the remote peer
#[async_trait]
pub trait Connector: Send + Sync {
	/// Open a fresh stream for one RPC
	async fn open(&self) -> Result<BoxedStream, SyncError>;

	/// Human readable peer description for logs
	fn peer(&self) -> String;
}

/// Connector dialing a TCP address
pub struct TcpConnector {
	address: String,
	timeout: Duration,
}

impl TcpConnector {
	pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
		TcpConnector { address: address.into(), timeout }
	}
}

#[async_trait]
impl Connector for TcpConnector {
	async fn open(&self) -> Result<BoxedStream, SyncError> {
		let address = self.address.clone();
		let stream = with_deadline(self.timeout, format!("dial {}", address), async {
			TcpStream::connect(&address)
				.await
				.map_err(|source| TransportError::DialFailed { address: address.clone(), source }.into())
		})
		.await?;

		if let Err(e) = stream.set_nodelay(true) {
			trace!("Cannot set TCP_NODELAY: {}", e);
		}
		Ok(Box::new(stream))
	}

	fn peer(&self) -> String {
		self.address.clone()
	}
}

/// Run `fut` under a deadline, an elapsed deadline becomes `SyncError::Timeout`
pub async fn with_deadline<T, F>(
	deadline: Duration,
	operation: impl Into<String>,
	fut: F,
) -> Result<T, SyncError>
where
	F: Future<Output = Result<T, SyncError>>,
{
	match tokio::time::timeout(deadline, fut).await {
		Ok(result) => result,
		Err(_) => Err(SyncError::timeout(operation)),
	}
}


// vim: ts=4
