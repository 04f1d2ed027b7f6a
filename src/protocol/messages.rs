//! Wire frames
//!
//! Every frame is one JSON object on its own line, tagged by `cmd`. A
//! `CHUNK` header line is followed by exactly `len` raw bytes and a newline.

use serde::{Deserialize, Serialize};

pub const ERR_SIZE_LIMIT: &str = "SIZE_LIMIT";
pub const ERR_INVALID_PATH: &str = "INVALID_PATH";
pub const ERR_IO: &str = "IO";
pub const ERR_PROTOCOL: &str = "PROTOCOL";

/// Remote procedure selected by the first frame of a connection
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rpc {
	/// Bidirectional: many `MAKE_DIR` requests, one `DIR_ACK` each
	MakeDir,
	/// Server-streaming: `INFO`, `CHUNK`..., `END`
	Download,
	/// Client-streaming: `INFO`, `CHUNK`/`COPY`..., `END`, answered by `STORED`
	Upload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frame {
	Hello {
		rpc: Rpc,
	},
	MakeDir {
		name: String,
	},
	DirAck,
	Download {
		name: String,
	},
	Info {
		name: String,
		#[serde(rename = "fileType")]
		file_type: String,
		#[serde(rename = "blockSize", default, skip_serializing_if = "Option::is_none")]
		block_size: Option<usize>,
	},
	Chunk {
		len: usize,
	},
	Copy {
		block: u32,
	},
	End,
	Stored {
		name: String,
		size: u64,
	},
	Error {
		code: String,
		message: String,
		/// Cap that was exceeded, only set with `SIZE_LIMIT`
		#[serde(default, skip_serializing_if = "Option::is_none")]
		limit: Option<u64>,
	},
}

impl Frame {
	/// Short name used in log lines and error messages
	pub fn command(&self) -> &'static str {
		match self {
			Frame::Hello { .. } => "HELLO",
			Frame::MakeDir { .. } => "MAKE_DIR",
			Frame::DirAck => "DIR_ACK",
			Frame::Download { .. } => "DOWNLOAD",
			Frame::Info { .. } => "INFO",
			Frame::Chunk { .. } => "CHUNK",
			Frame::Copy { .. } => "COPY",
			Frame::End => "END",
			Frame::Stored { .. } => "STORED",
			Frame::Error { .. } => "ERROR",
		}
	}

	pub fn error(code: &str, message: impl Into<String>) -> Self {
		Frame::Error { code: code.to_string(), message: message.into(), limit: None }
	}
}


// vim: ts=4
