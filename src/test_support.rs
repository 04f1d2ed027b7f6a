//! Helpers shared by unit tests that need a live serving peer

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::protocol::{Client, Connector, Server, TcpConnector};

pub struct TestServer {
	pub dir: TempDir,
	pub address: String,
	pub token: CancellationToken,
}

impl TestServer {
	/// Serve a fresh temporary directory on an ephemeral port
	pub async fn start(config: Config) -> TestServer {
		let dir = TempDir::new().unwrap();
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let address = listener.local_addr().unwrap().to_string();

		let server = Server::new(dir.path(), config);
		let token = CancellationToken::new();
		let serve_token = token.clone();
		tokio::spawn(async move { server.serve(listener, serve_token).await });

		TestServer { dir, address, token }
	}

	pub fn connector(&self) -> Arc<dyn Connector> {
		Arc::new(TcpConnector::new(self.address.clone(), Duration::from_secs(2)))
	}

	/// Client with a 1 MiB download cap
	pub fn client(&self) -> Client {
		Client::new(self.connector(), Duration::from_secs(2), 1 << 20)
	}
}

impl Drop for TestServer {
	fn drop(&mut self) {
		self.token.cancel();
	}
}

// vim: ts=4
