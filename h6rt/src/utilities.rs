use crate::error::{Result, RtError};

/// A cursor over borrowed module bytes with bounds-checked little-endian reads.
///
/// Adapted from the teacher workspace's `FromByteStream`/`Cursor` reader: the
/// same "pull primitives off a byte slice, advancing a position" shape, but
/// reporting [`RtError::MalformedModule`] (with the offending offset) instead
/// of a bare `std::io::Error` — every read here is module-format data the
/// interpreter must diagnose precisely, per the error taxonomy.
pub(crate) struct ByteReader<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> ByteReader<'a> {
	pub fn new(bytes: &'a [u8], pos: usize) -> Self {
		Self { bytes, pos }
	}

	pub fn position(&self) -> usize {
		self.pos
	}

	fn take(&mut self, n: usize, reason: &'static str) -> Result<&'a [u8]> {
		let start = self.pos;
		let end = start.checked_add(n).filter(|e| *e <= self.bytes.len());
		let Some(end) = end else {
			return Err(RtError::MalformedModule { offset: start, reason });
		};
		let slice = &self.bytes[start..end];
		self.pos = end;
		Ok(slice)
	}

	pub fn u8(&mut self) -> Result<u8> {
		Ok(self.take(1, "read past end of module")?[0])
	}

	pub fn u16(&mut self) -> Result<u16> {
		let b = self.take(2, "read past end of module")?;
		Ok(u16::from_le_bytes([b[0], b[1]]))
	}

	pub fn u32(&mut self) -> Result<u32> {
		let b = self.take(4, "read past end of module")?;
		Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
	}
}

/// Reads a NUL-terminated string starting at `at` in `bytes`.
pub(crate) fn read_cstr(bytes: &[u8], at: usize) -> Result<&str> {
	let tail = bytes
		.get(at..)
		.ok_or(RtError::MalformedModule { offset: at, reason: "string offset out of bounds" })?;
	let len = tail
		.iter()
		.position(|b| *b == 0)
		.ok_or(RtError::MalformedModule { offset: at, reason: "unterminated string" })?;
	std::str::from_utf8(&tail[..len])
		.map_err(|_| RtError::MalformedModule { offset: at, reason: "string is not valid utf-8" })
}
