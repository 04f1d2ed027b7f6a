use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use deltasync::protocol::{Frame, Rpc};
use deltasync::{Client, Config, Connector, Server, SyncError, TcpConnector, TransportError};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start(dir: &TempDir, config: Config) -> (Arc<dyn Connector>, CancellationToken) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let address = listener.local_addr().unwrap().to_string();
	let token = CancellationToken::new();

	let server = Server::new(dir.path(), config);
	let serve_token = token.clone();
	tokio::spawn(async move { server.serve(listener, serve_token).await });

	(Arc::new(TcpConnector::new(address, TIMEOUT)), token)
}

#[tokio::test]
async fn test_download_is_split_into_fetch_chunks() {
	let dir = TempDir::new().unwrap();
	let data: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
	fs::create_dir(dir.path().join("docs")).unwrap();
	fs::write(dir.path().join("docs/big.dat"), &data).unwrap();

	let (connector, token) = start(&dir, Config { fetch_chunk_size: 1000, ..Default::default() }).await;

	let mut session = Client::new(connector.clone(), TIMEOUT, 1 << 20).session(Rpc::Download).await.unwrap();
	session.send(&Frame::Download { name: "docs/big.dat".to_string() }).await.unwrap();

	match session.expect("INFO").await.unwrap() {
		Frame::Info { name, file_type, .. } => {
			assert_eq!(name, "docs/big.dat");
			assert_eq!(file_type, ".dat");
		}
		other => panic!("unexpected {}", other.command()),
	}

	let mut chunks = 0;
	let mut received = Vec::new();
	loop {
		match session.expect("CHUNK").await.unwrap() {
			Frame::Chunk { len } => {
				assert!(len <= 1000);
				received.extend(session.recv_payload(len).await.unwrap());
				chunks += 1;
			}
			Frame::End => break,
			other => panic!("unexpected {}", other.command()),
		}
	}
	assert!(chunks >= 10);
	assert_eq!(received, data);

	// the high-level client reassembles the same bytes
	let file = Client::new(connector, TIMEOUT, 1 << 20).download("docs/big.dat").await.unwrap().unwrap();
	assert_eq!(file.data, data);
	token.cancel();
}

#[tokio::test]
async fn test_missing_file_downloads_as_none() {
	let dir = TempDir::new().unwrap();
	let (connector, token) = start(&dir, Config::default()).await;

	let client = Client::new(connector, TIMEOUT, 1 << 20);
	assert!(client.download("not/there.txt").await.unwrap().is_none());
	token.cancel();
}

#[tokio::test]
async fn test_escaping_names_are_rejected() {
	let dir = TempDir::new().unwrap();
	let (connector, token) = start(&dir, Config::default()).await;

	let client = Client::new(connector, TIMEOUT, 1 << 20);
	let mut session = client.session(Rpc::MakeDir).await.unwrap();
	session.send(&Frame::MakeDir { name: "../outside".to_string() }).await.unwrap();

	match session.expect("DIR_ACK").await.unwrap() {
		Frame::Error { code, .. } => assert_eq!(code, "INVALID_PATH"),
		other => panic!("unexpected {}", other.command()),
	}
	assert!(!dir.path().parent().unwrap().join("outside").exists());
	token.cancel();
}

#[tokio::test]
async fn test_download_over_client_cap_is_size_limit() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("big.bin"), vec![1u8; 4096]).unwrap();
	let (connector, token) = start(&dir, Config { fetch_chunk_size: 512, ..Default::default() }).await;

	let client = Client::new(connector, TIMEOUT, 1000);
	let err = client.download("big.bin").await.unwrap_err();
	assert!(matches!(err, SyncError::SizeLimitExceeded { limit: 1000, .. }), "got {}", err);
	token.cancel();
}

#[tokio::test]
async fn test_orphaned_temp_files_are_removed_at_start() {
	let dir = TempDir::new().unwrap();
	fs::create_dir(dir.path().join("sub")).unwrap();
	fs::write(dir.path().join("sub/file.txt.DeLtA-TmP"), b"half written").unwrap();
	fs::write(dir.path().join("sub/file.txt"), b"kept").unwrap();

	let (connector, token) = start(&dir, Config::default()).await;
	// any answered request means startup cleanup already ran
	let client = Client::new(connector, TIMEOUT, 1 << 20);
	let file = client.download("sub/file.txt").await.unwrap().unwrap();
	assert_eq!(file.data, b"kept");

	assert!(!dir.path().join("sub/file.txt.DeLtA-TmP").exists());
	token.cancel();
}

#[tokio::test]
async fn test_cancelled_server_refuses_new_streams() {
	let dir = TempDir::new().unwrap();
	let (connector, token) = start(&dir, Config::default()).await;
	token.cancel();
	tokio::time::sleep(Duration::from_millis(100)).await;

	let client = Client::new(connector, TIMEOUT, 1 << 20);
	match client.download("anything").await {
		Err(SyncError::Transport(TransportError::DialFailed { .. })) => {}
		other => panic!("expected dial failure, got {:?}", other.map(|f| f.map(|f| f.data.len()))),
	}
}

// vim: ts=4
