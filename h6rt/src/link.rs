use crate::error::{Result, RtError};
use crate::module::Module;
use crate::utilities::{read_cstr, ByteReader};

/// A resolved binding between a main module's DSO reference table and a
/// loaded shared-object module's globals.
///
/// Resolution happens once, eagerly, at [`DsoLink::resolve`] time: every
/// entry in the main module's reference table must name a global the DSO
/// actually exports, or linking itself fails before any bytecode runs. This
/// mirrors the reference implementation's own "link once up front" DSO
/// model rather than resolving names lazily on first `ConstDso`.
pub(crate) struct DsoLink<'a> {
	dso: Module<'a>,
	/// `resolved[i]` is the *absolute* byte offset into `dso.bytes()` of
	/// reference `i`'s decodable op stream (`16 + value_offset`).
	resolved: Vec<u32>,
}

impl<'a> DsoLink<'a> {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn resolve(main: &Module<'a>, dso: Module<'a>) -> Result<Self> {
		let names = ex_header_ref_names(main)?;
		let mut resolved = Vec::with_capacity(names.len());
		for name in names {
			let value_offset = dso.global(name).ok_or_else(|| {
				#[cfg(feature = "tracing")]
				tracing::warn!(name, "dso reference unresolved");
				RtError::DsoUnresolved { name: name.to_string() }
			})?;
			resolved.push(16 + value_offset);
		}
		#[cfg(feature = "tracing")]
		tracing::debug!(refs = resolved.len(), "dso linked");
		Ok(DsoLink { dso, resolved })
	}

	pub fn dso(&self) -> Module<'a> {
		self.dso
	}

	/// The absolute offset into `dso().bytes()` for reference `index`.
	pub fn value_offset(&self, index: u32) -> Result<u32> {
		self.resolved.get(index as usize).copied().ok_or(RtError::DsoMissing)
	}
}

/// Reads the main module's extension header (§4.E): a `u16` length
/// (`ex_header_len`, counted from the start of the extension header), a
/// `u32` count, and `count` header-relative `u32` name offsets.
///
/// The reference (`h6_set_dso` in `crt/rt.c`) locates the reference table at
/// `&ex_header[ex_header_len]` — i.e. `ex_header_len` bytes past the start
/// of the extension header, not hardcoded right after the two fixed fields
/// — so `ex_header_len` may leave padding between the count and the table;
/// that padding must be skipped using the length actually read, not assumed
/// to always be 6.
fn ex_header_ref_names<'a>(main: &Module<'a>) -> Result<Vec<&'a str>> {
	let offset = main.ex_header_offset() as usize;
	if offset == 0 {
		return Ok(Vec::new());
	}

	let bytes = main.bytes();
	let mut r = ByteReader::new(bytes, offset);
	let ex_header_len = r.u16()? as usize;
	let count = r.u32()?;

	let mut table = ByteReader::new(bytes, offset + ex_header_len);
	let mut names = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let name_offset = table.u32()? as usize;
		let name = read_cstr(bytes, 16 + name_offset)?;
		names.push(name);
	}
	Ok(names)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testsupport::ModuleBuilder;

	#[test]
	fn no_ex_header_resolves_to_no_refs() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.push(0);
		});
		let module = Module::parse(&bytes).unwrap();
		assert!(ex_header_ref_names(&module).unwrap().is_empty());
	}

	#[test]
	fn resolves_a_dso_reference_by_name() {
		let mut main = ModuleBuilder::new();
		main.dso_ref("helper");
		let main_bytes = main.finish(|e| {
			e.const_dso(0);
		});

		let mut dso = ModuleBuilder::new();
		dso.global("helper", |ops| {
			ops.push(7);
		});
		let dso_bytes = dso.finish(|_| {});

		let main_module = Module::parse(&main_bytes).unwrap();
		let dso_module = Module::parse(&dso_bytes).unwrap();
		let link = DsoLink::resolve(&main_module, dso_module).unwrap();
		assert!(link.value_offset(0).is_ok());
	}

	#[test]
	fn ref_table_is_located_via_ex_header_len_not_a_fixed_offset() {
		let mut main = ModuleBuilder::new();
		main.dso_ref("helper");
		main.ex_header_padding(10);
		let main_bytes = main.finish(|e| {
			e.const_dso(0);
		});
		let module = Module::parse(&main_bytes).unwrap();
		let names = ex_header_ref_names(&module).unwrap();
		assert_eq!(names, vec!["helper"]);
	}

	#[test]
	fn unresolved_reference_is_an_error() {
		let mut main = ModuleBuilder::new();
		main.dso_ref("missing");
		let main_bytes = main.finish(|e| {
			e.const_dso(0);
		});
		let dso_bytes = ModuleBuilder::new().finish(|_| {});

		let main_module = Module::parse(&main_bytes).unwrap();
		let dso_module = Module::parse(&dso_bytes).unwrap();
		assert!(matches!(DsoLink::resolve(&main_module, dso_module), Err(RtError::DsoUnresolved { .. })));
	}
}
