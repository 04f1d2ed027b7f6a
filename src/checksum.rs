//! Block checksums and the per-file checksum index
//!
//! A remote file is cut into sequential, non-overlapping blocks of
//! `block_size` bytes (the last one may be shorter). Each block gets a weak
//! rolling checksum, cheap enough to evaluate at every byte offset while
//! matching, and a BLAKE3 digest that confirms weak matches.

use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Adler-style rolling checksum over a sliding window
///
/// `s1` is the byte sum and `s2` the sum of prefix sums, both kept to 16 bits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RollingChecksum {
	s1: u32,
	s2: u32,
	len: usize,
}

impl RollingChecksum {
	pub fn new() -> Self {
		Self::default()
	}

	/// Checksum of a whole block
	pub fn from_block(block: &[u8]) -> Self {
		let mut sum = Self::new();
		sum.update(block);
		sum
	}

	/// Append bytes to the window
	pub fn update(&mut self, chunk: &[u8]) {
		let (mut s1, mut s2) = (self.s1, self.s2);
		for &byte in chunk {
			s1 = s1.wrapping_add(u32::from(byte));
			s2 = s2.wrapping_add(s1);
		}
		self.s1 = s1 & 0xffff;
		self.s2 = s2 & 0xffff;
		self.len += chunk.len();
	}

	/// Slide the window by one byte: drop `outgoing` at the front, add `incoming` at the back
	pub fn roll(&mut self, outgoing: u8, incoming: u8) {
		let out = u32::from(outgoing);
		let window_len = self.len as u32;

		self.s1 = self.s1.wrapping_sub(out).wrapping_add(u32::from(incoming)) & 0xffff;
		self.s2 = self.s2.wrapping_sub(window_len.wrapping_mul(out)).wrapping_add(self.s1) & 0xffff;
	}

	/// Number of bytes in the window
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// 32-bit weak hash of the window
	pub fn digest(&self) -> u32 {
		(self.s2 << 16) | self.s1
	}
}

/// Strong digest used to confirm weak hash matches
pub fn strong_hash(data: &[u8]) -> [u8; 32] {
	*blake3::hash(data).as_bytes()
}

/// Checksums of one block of a remote file
#[derive(Clone, PartialEq, Eq)]
pub struct BlockChecksum {
	pub block_index: u32,
	pub weak_hash: u32,
	pub strong_hash: [u8; 32],
	pub len: usize,
}

impl BlockChecksum {
	pub fn compute(block_index: u32, block: &[u8]) -> Self {
		BlockChecksum {
			block_index,
			weak_hash: RollingChecksum::from_block(block).digest(),
			strong_hash: strong_hash(block),
			len: block.len(),
		}
	}
}

impl fmt::Debug for BlockChecksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BlockChecksum")
			.field("block_index", &self.block_index)
			.field("weak_hash", &format_args!("{:08x}", self.weak_hash))
			.field("strong_hash", &hex::encode(&self.strong_hash[..8]))
			.field("len", &self.len)
			.finish()
	}
}

/// Weak hash lookup over all blocks of a remote file
///
/// Candidates sharing a weak hash are kept in block order.
#[derive(Debug, Clone)]
pub struct ChecksumIndex {
	block_size: usize,
	block_count: usize,
	tail_len: Option<usize>,
	lookup: HashMap<u32, Vec<BlockChecksum>>,
}

impl ChecksumIndex {
	/// Index with no blocks, used when the remote copy does not exist
	pub fn empty(block_size: usize) -> Self {
		ChecksumIndex { block_size, block_count: 0, tail_len: None, lookup: HashMap::new() }
	}

	/// Index a complete in-memory file
	pub fn build(data: &[u8], block_size: usize) -> Self {
		let mut index = Self::empty(block_size);
		for block in data.chunks(block_size.max(1)) {
			index.push(block);
		}
		index
	}

	/// Index a file read block by block from an async reader
	pub async fn build_from_reader<R: AsyncRead + Unpin>(
		reader: &mut R,
		block_size: usize,
	) -> std::io::Result<Self> {
		let mut index = Self::empty(block_size);
		let mut buf = vec![0u8; block_size.max(1)];
		loop {
			let n = fill_block(reader, &mut buf).await?;
			if n == 0 {
				break;
			}
			index.push(&buf[..n]);
			if n < buf.len() {
				break;
			}
		}
		Ok(index)
	}

	fn push(&mut self, block: &[u8]) {
		let checksum = BlockChecksum::compute(self.block_count as u32, block);
		if block.len() < self.block_size {
			self.tail_len = Some(block.len());
		}
		self.lookup.entry(checksum.weak_hash).or_insert_with(Vec::new).push(checksum);
		self.block_count += 1;
	}

	pub fn block_size(&self) -> usize {
		self.block_size
	}

	pub fn block_count(&self) -> usize {
		self.block_count
	}

	pub fn is_empty(&self) -> bool {
		self.block_count == 0
	}

	/// Length of the final block when it is shorter than `block_size`
	pub fn tail_len(&self) -> Option<usize> {
		self.tail_len
	}

	/// All candidates for a weak hash, lowest block index first
	pub fn candidates(&self, weak_hash: u32) -> &[BlockChecksum] {
		self.lookup.get(&weak_hash).map(Vec::as_slice).unwrap_or(&[])
	}

	/// First block whose weak and strong hashes both match `window`
	pub fn find_match(&self, weak_hash: u32, window: &[u8]) -> Option<&BlockChecksum> {
		let candidates = self.candidates(weak_hash);
		if candidates.is_empty() {
			return None;
		}

		// strong hash computed at most once per window
		let mut strong: Option<[u8; 32]> = None;
		candidates.iter().find(|block| {
			block.len == window.len()
				&& *strong.get_or_insert_with(|| strong_hash(window)) == block.strong_hash
		})
	}
}

/// Byte range of block `index` in a file of `file_len` bytes
pub fn block_range(index: u32, block_size: usize, file_len: usize) -> Option<std::ops::Range<usize>> {
	let start = (index as usize).checked_mul(block_size)?;
	if start >= file_len {
		return None;
	}
	Some(start..(start + block_size).min(file_len))
}

/// Read until `buf` is full or the reader is exhausted
async fn fill_block<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = reader.read(&mut buf[filled..]).await?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(len: usize) -> Vec<u8> {
		(0..len).map(|i| (i * 31 % 251) as u8).collect()
	}

	#[test]
	fn test_rolling_matches_fresh_computation() {
		let data = sample(300);
		let window = 64;
		let mut rolling = RollingChecksum::from_block(&data[..window]);

		for start in 1..=(data.len() - window) {
			rolling.roll(data[start - 1], data[start + window - 1]);
			let fresh = RollingChecksum::from_block(&data[start..start + window]);
			assert_eq!(rolling.digest(), fresh.digest(), "offset {}", start);
		}
	}

	#[test]
	fn test_rolling_known_value() {
		// s1 = 97+98+99 = 294, s2 = 97 + 195 + 294 = 586
		let sum = RollingChecksum::from_block(b"abc");
		assert_eq!(sum.digest(), (586 << 16) | 294);
		assert_eq!(sum.len(), 3);
	}

	#[test]
	fn test_block_size_file_has_one_block() {
		let index = ChecksumIndex::build(&sample(128), 128);
		assert_eq!(index.block_count(), 1);
		assert_eq!(index.tail_len(), None);
	}

	#[test]
	fn test_short_file_has_one_short_block() {
		let index = ChecksumIndex::build(&sample(127), 128);
		assert_eq!(index.block_count(), 1);
		assert_eq!(index.tail_len(), Some(127));
	}

	#[test]
	fn test_empty_file_has_no_blocks() {
		let index = ChecksumIndex::build(&[], 128);
		assert!(index.is_empty());
		assert_eq!(index.block_count(), 0);
	}

	#[test]
	fn test_find_match_prefers_lowest_index() {
		let mut data = vec![7u8; 16];
		data.extend(vec![7u8; 16]);
		let index = ChecksumIndex::build(&data, 16);

		let window = vec![7u8; 16];
		let weak = RollingChecksum::from_block(&window).digest();
		assert_eq!(index.candidates(weak).len(), 2);
		assert_eq!(index.find_match(weak, &window).unwrap().block_index, 0);
	}

	#[test]
	fn test_find_match_rejects_weak_collision() {
		// weak hash forced to match, strong hash must still reject the window
		let index = ChecksumIndex::build(b"abcd", 4);
		let weak = RollingChecksum::from_block(b"abcd").digest();
		assert!(index.find_match(weak, b"abcd").is_some());
		assert!(index.find_match(weak, b"abce").is_none());
	}

	#[test]
	fn test_block_range() {
		assert_eq!(block_range(0, 4, 10), Some(0..4));
		assert_eq!(block_range(2, 4, 10), Some(8..10));
		assert_eq!(block_range(3, 4, 10), None);
	}

	#[tokio::test]
	async fn test_build_from_reader_matches_build() {
		let data = sample(1000);
		let mut reader = &data[..];
		let streamed = ChecksumIndex::build_from_reader(&mut reader, 128).await.unwrap();
		let direct = ChecksumIndex::build(&data, 128);

		assert_eq!(streamed.block_count(), direct.block_count());
		assert_eq!(streamed.block_count(), 8);
		assert_eq!(streamed.tail_len(), Some(1000 - 7 * 128));

		let weak = RollingChecksum::from_block(&data[128..256]).digest();
		assert_eq!(streamed.find_match(weak, &data[128..256]).unwrap().block_index, 1);
	}
}

// vim: ts=4
