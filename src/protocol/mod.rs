//! Wire protocol between the syncing client and the serving peer
//!
//! Each RPC runs on its own stream: `HELLO` names the call, then the frames
//! of that call follow until `END`.
//!
//! # Example Usage
//!
//! ```ignore
//! use deltasync::protocol::{Client, TcpConnector};
//!
//! let connector = Arc::new(TcpConnector::new("127.0.0.1:7070", timeout));
//! let client = Client::new(connector, timeout, max_file_size);
//! if let Some(file) = client.download("src/main.rs").await? {
//!     // build a checksum index over file.data
//! }
//! ```

pub mod client;
pub mod codec;
pub mod messages;
pub mod server;
pub mod transport;

pub use client::{remote_error, Client, RemoteFile, Session};
pub use codec::{FrameReader, FrameWriter, ReceiveBuffer};
pub use messages::{Frame, Rpc};
pub use server::Server;
pub use transport::{with_deadline, BoxedStream, Connector, RpcStream, TcpConnector};

// vim: ts=4
