use crate::error::{Result, RtError};
use crate::utilities::{read_cstr, ByteReader};

/// A parsed H6 bytecode module: a borrowed view over the fixed 16-byte
/// header, the globals table, and (optionally) the DSO extension header.
///
/// Borrows its bytes for the module's whole lifetime, mirroring the teacher
/// workspace's own borrowed-bytes `Assembly<'l>`/`MetadataRoot<'l>` — the
/// module buffer must outlive every `Module`/`Rt` built from it, and Rust's
/// lifetime enforces that at compile time instead of by convention.
#[derive(Debug, Clone, Copy)]
pub struct Module<'a> {
	bytes: &'a [u8],
	reserved: [u8; 6],
	globals_count: u16,
	globals_offset: u32,
	ex_header_offset: u32,
}

/// A single entry in the globals table: a name and the (header-relative)
/// offset of a decodable op stream.
#[derive(Debug, Clone, Copy)]
pub struct Global<'a> {
	pub name: &'a str,
	pub value_offset: u32,
}

const HEADER_LEN: usize = 16;

impl<'a> Module<'a> {
	/// Parses the fixed header. Does not decode the entry routine or any
	/// globals' bodies — those are decoded lazily, on demand, matching the
	/// decoder's "lazy by call-site" discipline.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(len = bytes.len())))]
	pub fn parse(bytes: &'a [u8]) -> Result<Self> {
		if bytes.len() < HEADER_LEN {
			return Err(RtError::MalformedModule { offset: 0, reason: "buffer shorter than the 16-byte header" });
		}

		let mut reserved = [0u8; 6];
		reserved.copy_from_slice(&bytes[0..6]);

		let globals_count = u16::from_le_bytes([bytes[6], bytes[7]]);
		let globals_offset = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
		let ex_header_offset = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

		let module = Module { bytes, reserved, globals_count, globals_offset, ex_header_offset };
		// Validate the globals table and entry offset are in-bounds eagerly,
		// so a malformed header is caught at load time rather than on first
		// use of an unrelated global.
		let _ = module.globals_table_offset()?;
		if module.entry_offset() > bytes.len() {
			return Err(RtError::MalformedModule { offset: module.entry_offset(), reason: "entry routine offset out of bounds" });
		}
		Ok(module)
	}

	pub fn bytes(&self) -> &'a [u8] {
		self.bytes
	}

	/// The first 6 header bytes, unused by the core but exposed for callers
	/// that want to validate a magic/version of their own.
	pub fn reserved_header(&self) -> [u8; 6] {
		self.reserved
	}

	pub fn globals_count(&self) -> u16 {
		self.globals_count
	}

	pub fn ex_header_offset(&self) -> u32 {
		self.ex_header_offset
	}

	/// Absolute offset where the entry routine's opcode stream begins.
	pub fn entry_offset(&self) -> usize {
		HEADER_LEN + self.globals_offset as usize + 8 * self.globals_count as usize
	}

	fn globals_table_offset(&self) -> Result<usize> {
		let offset = HEADER_LEN + self.globals_offset as usize;
		let table_len = 8usize
			.checked_mul(self.globals_count as usize)
			.ok_or(RtError::MalformedModule { offset, reason: "globals table length overflow" })?;
		let end = offset
			.checked_add(table_len)
			.filter(|e| *e <= self.bytes.len())
			.ok_or(RtError::MalformedModule { offset, reason: "globals table out of bounds" })?;
		let _ = end;
		Ok(offset)
	}

	/// Reads the `index`-th globals-table entry.
	pub fn global_at(&self, index: u16) -> Result<Global<'a>> {
		if index >= self.globals_count {
			return Err(RtError::MalformedModule { offset: 0, reason: "globals table index out of range" });
		}
		let base = self.globals_table_offset()? + 8 * index as usize;
		let mut r = ByteReader::new(self.bytes, base);
		let name_offset = r.u32()? as usize;
		let value_offset = r.u32()?;
		let name = read_cstr(self.bytes, HEADER_LEN + name_offset)?;
		Ok(Global { name, value_offset })
	}

	/// Linear scan for a global by exact name match, returning its
	/// (header-relative) value offset. A `Vec`/scan rather than a hash map:
	/// globals tables are small, and this keeps the lookup policy identical
	/// to the DSO linker's own by-name resolution in §4.E.
	pub fn global(&self, name: &str) -> Option<u32> {
		for i in 0..self.globals_count {
			if let Ok(g) = self.global_at(i) {
				if g.name == name {
					return Some(g.value_offset);
				}
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testsupport::ModuleBuilder;

	#[test]
	fn parses_header_fields() {
		let mut b = ModuleBuilder::new();
		b.global("answer", |ops| ops.push(0));
		let bytes = b.finish(|_| {});
		let module = Module::parse(&bytes).unwrap();
		assert_eq!(module.globals_count(), 1);
		assert_eq!(module.ex_header_offset(), 0);
	}

	#[test]
	fn looks_up_global_by_name() {
		let mut b = ModuleBuilder::new();
		b.global("one", |ops| ops.push(0));
		b.global("two", |ops| ops.push(0));
		let bytes = b.finish(|_| {});
		let module = Module::parse(&bytes).unwrap();
		assert!(module.global("two").is_some());
		assert!(module.global("three").is_none());
	}

	#[test]
	fn rejects_truncated_header() {
		let bytes = [0u8; 4];
		assert!(Module::parse(&bytes).is_err());
	}
}
