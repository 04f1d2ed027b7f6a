//! Delta computation against a remote checksum index
//!
//! The local file is scanned once with a rolling window of `block_size`
//! bytes. A window whose weak and strong hashes match a remote block becomes
//! a `CopyBlock`; unmatched bytes accumulate into `Literal` runs. Matching
//! is greedy and deterministic: among confirmed candidates the lowest block
//! index wins.

use crate::checksum::{block_range, ChecksumIndex, RollingChecksum};
use crate::error::SyncError;

/// One instruction of a file's edit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
	CopyBlock { remote_block_index: u32 },
	Literal { bytes: Vec<u8> },
}

/// Totals of an edit script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
	pub literal_bytes: u64,
	pub copied_blocks: u64,
}

impl DeltaStats {
	pub fn of(ops: &[DeltaOp]) -> Self {
		ops.iter().fold(DeltaStats::default(), |mut stats, op| {
			match op {
				DeltaOp::CopyBlock { .. } => stats.copied_blocks += 1,
				DeltaOp::Literal { bytes } => stats.literal_bytes += bytes.len() as u64,
			}
			stats
		})
	}
}

struct ScriptBuilder<'a> {
	local: &'a [u8],
	ops: Vec<DeltaOp>,
	literal_start: usize,
}

impl<'a> ScriptBuilder<'a> {
	fn flush_literal(&mut self, end: usize) {
		if end > self.literal_start {
			self.ops.push(DeltaOp::Literal { bytes: self.local[self.literal_start..end].to_vec() });
		}
	}

	fn copy(&mut self, at: usize, len: usize, remote_block_index: u32) {
		self.flush_literal(at);
		self.ops.push(DeltaOp::CopyBlock { remote_block_index });
		self.literal_start = at + len;
	}
}

/// Compute the edit script turning the indexed remote file into `local`
///
/// The block size is the one the index was built with.
pub fn compute_delta(local: &[u8], index: &ChecksumIndex) -> Vec<DeltaOp> {
	let block_size = index.block_size();
	let mut script = ScriptBuilder { local, ops: Vec::new(), literal_start: 0 };

	if index.is_empty() || block_size == 0 {
		script.flush_literal(local.len());
		return script.ops;
	}

	let n = local.len();
	let mut pos = 0;

	if n >= block_size {
		let mut rolling = RollingChecksum::from_block(&local[..block_size]);
		loop {
			let window = &local[pos..pos + block_size];
			if let Some(block) = index.find_match(rolling.digest(), window) {
				script.copy(pos, block_size, block.block_index);
				pos += block_size;
				if pos + block_size > n {
					break;
				}
				rolling = RollingChecksum::from_block(&local[pos..pos + block_size]);
			} else {
				if pos + block_size >= n {
					break;
				}
				rolling.roll(local[pos], local[pos + block_size]);
				pos += 1;
			}
		}
	}

	// a short remote tail can only match the very end of the local file
	if let Some(tail) = index.tail_len() {
		if n >= tail && n - tail >= script.literal_start {
			let window = &local[n - tail..];
			let weak = RollingChecksum::from_block(window).digest();
			if let Some(block) = index.find_match(weak, window) {
				script.copy(n - tail, tail, block.block_index);
			}
		}
	}

	script.flush_literal(n);
	script.ops
}

/// Resolve a single remote block against the remote file's bytes
pub fn resolve_block(remote: &[u8], remote_block_index: u32, block_size: usize) -> Result<&[u8], SyncError> {
	block_range(remote_block_index, block_size, remote.len())
		.map(|range| &remote[range])
		.ok_or_else(|| {
			SyncError::protocol(format!(
				"block {} out of range for {} bytes",
				remote_block_index,
				remote.len()
			))
		})
}

/// Apply an edit script to the remote file's bytes
pub fn reconstruct(ops: &[DeltaOp], remote: &[u8], block_size: usize) -> Result<Vec<u8>, SyncError> {
	let mut out = Vec::new();
	for op in ops {
		match op {
			DeltaOp::CopyBlock { remote_block_index } => {
				out.extend_from_slice(resolve_block(remote, *remote_block_index, block_size)?);
			}
			DeltaOp::Literal { bytes } => out.extend_from_slice(bytes),
		}
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	// xorshift, no short period that could produce accidental block matches
	fn sample(len: usize, seed: u32) -> Vec<u8> {
		let mut x = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
		(0..len)
			.map(|_| {
				x ^= x << 13;
				x ^= x >> 17;
				x ^= x << 5;
				(x >> 24) as u8
			})
			.collect()
	}

	fn round_trip(remote: &[u8], local: &[u8], block_size: usize) -> Vec<DeltaOp> {
		let index = ChecksumIndex::build(remote, block_size);
		let ops = compute_delta(local, &index);
		assert_eq!(reconstruct(&ops, remote, block_size).unwrap(), local);
		ops
	}

	#[test]
	fn test_empty_index_is_single_literal() {
		let ops = round_trip(b"", b"hello world", 128);
		assert_eq!(ops, vec![DeltaOp::Literal { bytes: b"hello world".to_vec() }]);
	}

	#[test]
	fn test_identical_files_copy_every_block() {
		let data = sample(256, 1);
		let ops = round_trip(&data, &data, 128);
		assert_eq!(
			ops,
			vec![
				DeltaOp::CopyBlock { remote_block_index: 0 },
				DeltaOp::CopyBlock { remote_block_index: 1 },
			]
		);
		assert_eq!(DeltaStats::of(&ops).literal_bytes, 0);
	}

	#[test]
	fn test_identical_files_with_short_tail() {
		let data = sample(300, 2);
		let ops = round_trip(&data, &data, 128);
		let stats = DeltaStats::of(&ops);
		assert_eq!(stats.copied_blocks, 3);
		assert_eq!(stats.literal_bytes, 0);
	}

	#[test]
	fn test_empty_local_file() {
		let ops = round_trip(&sample(200, 3), b"", 128);
		assert!(ops.is_empty());
	}

	#[test]
	fn test_both_empty() {
		assert!(round_trip(b"", b"", 128).is_empty());
	}

	#[test]
	fn test_insertion_shifts_matches() {
		let remote = sample(512, 4);
		let mut local = b"prefix!".to_vec();
		local.extend_from_slice(&remote);

		let ops = round_trip(&remote, &local, 128);
		assert_eq!(ops[0], DeltaOp::Literal { bytes: b"prefix!".to_vec() });
		assert_eq!(DeltaStats::of(&ops).copied_blocks, 4);
	}

	#[test]
	fn test_modified_middle_block() {
		let remote = sample(384, 5);
		let mut local = remote.clone();
		local[200] ^= 0xff;

		let ops = round_trip(&remote, &local, 128);
		let stats = DeltaStats::of(&ops);
		assert_eq!(stats.copied_blocks, 2);
		assert_eq!(stats.literal_bytes, 128);
	}

	#[test]
	fn test_local_shorter_than_block() {
		let remote = sample(256, 6);
		let ops = round_trip(&remote, b"tiny", 128);
		assert_eq!(ops, vec![DeltaOp::Literal { bytes: b"tiny".to_vec() }]);
	}

	#[test]
	fn test_reconstruct_rejects_unknown_block() {
		let ops = vec![DeltaOp::CopyBlock { remote_block_index: 9 }];
		assert!(matches!(reconstruct(&ops, b"abc", 128), Err(SyncError::Protocol { .. })));
	}
}

// vim: ts=4
