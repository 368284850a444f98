//! Tiny in-memory module assembler used only by tests.
//!
//! The container format (§4.B/§6.1) is simple enough to build by hand
//! rather than check in binary fixtures: this is a two-pass assembler (fix
//! every chunk's length first, since every opcode's encoded size is
//! independent of what any address it carries resolves to; then fill in
//! resolved offsets) — the same shape as the real DSO linker it exercises.

use std::collections::HashMap;

use crate::opcode::Opcode;

#[derive(Clone, Copy)]
pub struct PoolRef(usize);

#[derive(Clone)]
enum Instr {
	NoArg(u8),
	Arg(u8, i32),
	ArgPool(u8, usize),
}

#[derive(Clone, Default)]
pub struct OpStream(Vec<Instr>);

impl OpStream {
	pub fn new() -> Self {
		Self::default()
	}

	fn no_arg(&mut self, tag: u8) -> &mut Self {
		self.0.push(Instr::NoArg(tag));
		self
	}

	fn arg(&mut self, tag: u8, v: i32) -> &mut Self {
		self.0.push(Instr::Arg(tag, v));
		self
	}

	fn arg_pool(&mut self, tag: u8, p: PoolRef) -> &mut Self {
		self.0.push(Instr::ArgPool(tag, p.0));
		self
	}

	pub fn push(&mut self, n: i32) -> &mut Self {
		self.arg(Opcode::Push.tag(), n)
	}
	pub fn add(&mut self) -> &mut Self {
		self.no_arg(Opcode::Add.tag())
	}
	pub fn sub(&mut self) -> &mut Self {
		self.no_arg(Opcode::Sub.tag())
	}
	pub fn mul(&mut self) -> &mut Self {
		self.no_arg(Opcode::Mul.tag())
	}
	pub fn dup(&mut self) -> &mut Self {
		self.no_arg(Opcode::Dup.tag())
	}
	pub fn swap(&mut self) -> &mut Self {
		self.no_arg(Opcode::Swap.tag())
	}
	pub fn pop(&mut self) -> &mut Self {
		self.no_arg(Opcode::Pop.tag())
	}
	pub fn exec(&mut self) -> &mut Self {
		self.no_arg(Opcode::Exec.tag())
	}
	pub fn select(&mut self) -> &mut Self {
		self.no_arg(Opcode::Select.tag())
	}
	pub fn lt(&mut self) -> &mut Self {
		self.no_arg(Opcode::Lt.tag())
	}
	pub fn gt(&mut self) -> &mut Self {
		self.no_arg(Opcode::Gt.tag())
	}
	pub fn eq(&mut self) -> &mut Self {
		self.no_arg(Opcode::Eq.tag())
	}
	pub fn not(&mut self) -> &mut Self {
		self.no_arg(Opcode::Not.tag())
	}
	pub fn type_id(&mut self) -> &mut Self {
		self.no_arg(Opcode::TypeId.tag())
	}
	pub fn rol(&mut self) -> &mut Self {
		self.no_arg(Opcode::RoL.tag())
	}
	pub fn ror(&mut self) -> &mut Self {
		self.no_arg(Opcode::RoR.tag())
	}
	pub fn reach(&mut self, k: u32) -> &mut Self {
		self.arg(Opcode::Reach.tag(), k as i32)
	}
	pub fn const_(&mut self, p: PoolRef) -> &mut Self {
		self.arg_pool(Opcode::Const.tag(), p)
	}
	pub fn const_dso(&mut self, idx: u32) -> &mut Self {
		self.arg(Opcode::ConstDso.tag(), idx as i32)
	}
	pub fn arr_begin(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrBegin.tag())
	}
	pub fn arr_end(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrEnd.tag())
	}
	pub fn arr_cat(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrCat.tag())
	}
	pub fn arr_first(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrFirst.tag())
	}
	pub fn arr_len(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrLen.tag())
	}
	pub fn arr_skip1(&mut self) -> &mut Self {
		self.no_arg(Opcode::ArrSkip1.tag())
	}
	pub fn pack(&mut self) -> &mut Self {
		self.no_arg(Opcode::Pack.tag())
	}
	pub fn mod_(&mut self) -> &mut Self {
		self.no_arg(Opcode::Mod.tag())
	}
	pub fn div(&mut self) -> &mut Self {
		self.no_arg(Opcode::Div.tag())
	}
	pub fn system(&mut self, id: u32) -> &mut Self {
		self.arg(Opcode::System.tag(), id as i32)
	}
	pub fn materialize(&mut self) -> &mut Self {
		self.no_arg(Opcode::Materialize.tag())
	}
	pub fn ops_of(&mut self) -> &mut Self {
		self.no_arg(Opcode::OpsOf.tag())
	}
	pub fn const_at(&mut self) -> &mut Self {
		self.no_arg(Opcode::ConstAt.tag())
	}
	pub fn u8arr_at(&mut self, p: PoolRef) -> &mut Self {
		self.arg_pool(Opcode::U8ArrAt.tag(), p)
	}
	pub fn i16arr_at(&mut self, p: PoolRef) -> &mut Self {
		self.arg_pool(Opcode::I16ArrAt.tag(), p)
	}
	pub fn raw_tag(&mut self, tag: u8) -> &mut Self {
		self.no_arg(tag)
	}

	fn encoded_len(&self) -> usize {
		self.0
			.iter()
			.map(|i| match i {
				Instr::NoArg(_) => 1,
				Instr::Arg(..) | Instr::ArgPool(..) => 5,
			})
			.sum::<usize>()
			+ 1 // Terminate
	}

	fn encode(&self, pool_offsets: &HashMap<usize, u32>) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.encoded_len());
		for instr in &self.0 {
			match instr {
				Instr::NoArg(tag) => out.push(*tag),
				Instr::Arg(tag, v) => {
					out.push(*tag);
					out.extend(v.to_le_bytes());
				},
				Instr::ArgPool(tag, idx) => {
					out.push(*tag);
					out.extend(pool_offsets[idx].to_le_bytes());
				},
			}
		}
		out.push(Opcode::Terminate.tag());
		out
	}
}

enum PoolKind {
	U8(Vec<u8>),
	I16(Vec<i16>),
	Ops(OpStream),
}

#[derive(Default)]
pub struct ModuleBuilder {
	globals: Vec<(String, OpStream)>,
	pools: Vec<PoolKind>,
	dso_refs: Vec<String>,
	/// Extra bytes inserted between the fixed `ex_header_len`/`dso_ref_count`
	/// fields and the reference table, so tests can exercise an
	/// `ex_header_len` other than the fixed-fields-only minimum of 6.
	ex_header_padding: usize,
}

impl ModuleBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn global(&mut self, name: &str, build: impl FnOnce(&mut OpStream)) -> &mut Self {
		let mut ops = OpStream::new();
		build(&mut ops);
		self.globals.push((name.to_string(), ops));
		self
	}

	pub fn pool_u8(&mut self, data: &[u8]) -> PoolRef {
		let idx = self.pools.len();
		self.pools.push(PoolKind::U8(data.to_vec()));
		PoolRef(idx)
	}

	pub fn pool_i16(&mut self, data: &[i16]) -> PoolRef {
		let idx = self.pools.len();
		self.pools.push(PoolKind::I16(data.to_vec()));
		PoolRef(idx)
	}

	pub fn pool_ops(&mut self, build: impl FnOnce(&mut OpStream)) -> PoolRef {
		let mut ops = OpStream::new();
		build(&mut ops);
		let idx = self.pools.len();
		self.pools.push(PoolKind::Ops(ops));
		PoolRef(idx)
	}

	/// Registers a name to import from a DSO, returning its reference index
	/// (for use with `OpStream::const_dso`).
	pub fn dso_ref(&mut self, name: &str) -> u32 {
		self.dso_refs.push(name.to_string());
		(self.dso_refs.len() - 1) as u32
	}

	/// Inserts `n` extra bytes between the extension header's fixed fields
	/// and its reference table, so the encoded `ex_header_len` is `6 + n`
	/// instead of the default 6. Exercises linker code that must locate the
	/// table via the read length rather than a hardcoded offset.
	pub fn ex_header_padding(&mut self, n: usize) -> &mut Self {
		self.ex_header_padding = n;
		self
	}

	pub fn finish(&self, build_entry: impl FnOnce(&mut OpStream)) -> Vec<u8> {
		let mut entry = OpStream::new();
		build_entry(&mut entry);

		let globals_count = self.globals.len() as u16;
		let header_len = 16usize;
		let table_len = 8usize * globals_count as usize;
		let mut cursor = header_len + table_len;

		let entry_start = cursor;
		cursor += entry.encoded_len();

		let mut pool_offsets = HashMap::new();
		let mut pool_starts = Vec::with_capacity(self.pools.len());
		for (i, pool) in self.pools.iter().enumerate() {
			pool_offsets.insert(i, (cursor - header_len) as u32);
			pool_starts.push(cursor);
			cursor += match pool {
				PoolKind::U8(bytes) => 2 + bytes.len(),
				PoolKind::I16(values) => 2 + 2 * values.len(),
				PoolKind::Ops(ops) => ops.encoded_len(),
			};
		}

		let mut global_name_offsets = Vec::with_capacity(self.globals.len());
		let mut global_value_offsets = Vec::with_capacity(self.globals.len());
		let mut global_starts = Vec::with_capacity(self.globals.len());
		for (name, ops) in &self.globals {
			global_name_offsets.push((cursor - header_len) as u32);
			let name_start = cursor;
			cursor += name.len() + 1;
			global_value_offsets.push((cursor - header_len) as u32);
			let body_start = cursor;
			cursor += ops.encoded_len();
			global_starts.push((name_start, body_start));
		}

		let ex_header_len = 6usize + self.ex_header_padding;
		let mut ex_header_offset = 0u32;
		let mut dso_name_offsets = Vec::with_capacity(self.dso_refs.len());
		let mut dso_name_starts = Vec::with_capacity(self.dso_refs.len());
		let mut ex_table_start = 0usize;
		if !self.dso_refs.is_empty() {
			ex_header_offset = cursor as u32;
			cursor += ex_header_len;
			ex_table_start = cursor;
			cursor += 4 * self.dso_refs.len();
			for name in &self.dso_refs {
				dso_name_offsets.push((cursor - header_len) as u32);
				dso_name_starts.push(cursor);
				cursor += name.len() + 1;
			}
		}

		let mut out = vec![0u8; cursor];
		out[6..8].copy_from_slice(&globals_count.to_le_bytes());
		out[8..12].copy_from_slice(&0u32.to_le_bytes());
		out[12..16].copy_from_slice(&ex_header_offset.to_le_bytes());

		let entry_bytes = entry.encode(&pool_offsets);
		out[entry_start..entry_start + entry_bytes.len()].copy_from_slice(&entry_bytes);

		for (i, pool) in self.pools.iter().enumerate() {
			let start = pool_starts[i];
			let bytes = match pool {
				PoolKind::U8(data) => {
					let mut b = Vec::with_capacity(2 + data.len());
					b.extend((data.len() as u16).to_le_bytes());
					b.extend_from_slice(data);
					b
				},
				PoolKind::I16(values) => {
					let mut b = Vec::with_capacity(2 + 2 * values.len());
					b.extend((values.len() as u16).to_le_bytes());
					for v in values {
						b.extend((*v as u16).to_le_bytes());
					}
					b
				},
				PoolKind::Ops(ops) => ops.encode(&pool_offsets),
			};
			out[start..start + bytes.len()].copy_from_slice(&bytes);
		}

		for (gi, (name, ops)) in self.globals.iter().enumerate() {
			let (name_start, body_start) = global_starts[gi];
			out[name_start..name_start + name.len()].copy_from_slice(name.as_bytes());
			out[name_start + name.len()] = 0;
			let table_off = header_len + 8 * gi;
			out[table_off..table_off + 4].copy_from_slice(&global_name_offsets[gi].to_le_bytes());
			out[table_off + 4..table_off + 8].copy_from_slice(&global_value_offsets[gi].to_le_bytes());
			let body = ops.encode(&pool_offsets);
			out[body_start..body_start + body.len()].copy_from_slice(&body);
		}

		if !self.dso_refs.is_empty() {
			let eho = ex_header_offset as usize;
			out[eho..eho + 2].copy_from_slice(&(ex_header_len as u16).to_le_bytes());
			out[eho + 2..eho + 6].copy_from_slice(&(self.dso_refs.len() as u32).to_le_bytes());
			for (i, name) in self.dso_refs.iter().enumerate() {
				let slot = ex_table_start + 4 * i;
				out[slot..slot + 4].copy_from_slice(&dso_name_offsets[i].to_le_bytes());
				let start = dso_name_starts[i];
				out[start..start + name.len()].copy_from_slice(name.as_bytes());
				out[start + name.len()] = 0;
			}
		}

		out
	}
}
