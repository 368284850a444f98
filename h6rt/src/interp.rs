use crate::decode::decode;
use crate::error::{Result, RtError};
use crate::link::DsoLink;
use crate::module::Module;
use crate::opcode::Opcode;
use crate::utilities::ByteReader;
use crate::value::{Array, Op};

/// The host syscall callback invoked by `System(id)`. Argument passing is
/// entirely through `rt.stack()`/`rt.stack_mut()`; the callback owns
/// whatever opaque state it needs to close over (the Rust realization of
/// the reference implementation's `(callback, void *userptr)` pair — a
/// closure already carries its own captured state, so no separate userptr
/// field is needed).
pub type SyscallFn<'a> = dyn FnMut(&mut Rt<'a>, u32) -> Result<()> + 'a;

/// Runtime state for one execution of an H6 module.
///
/// Not `Send`/`Sync`: the operand stack and every nested array are
/// `Rc<RefCell<_>>`, so one `Rt` is confined to the thread that created it,
/// matching §5's single-threaded execution model.
pub struct Rt<'a> {
	stack: Array,
	bytecode: &'a [u8],
	dso: Option<DsoLink<'a>>,
	syscall: Option<Box<SyscallFn<'a>>>,
	build_depth: u32,
	building: Option<Array>,
}

impl<'a> Rt<'a> {
	pub fn new(module: Module<'a>) -> Self {
		Rt {
			stack: Array::new(),
			bytecode: module.bytes(),
			dso: None,
			syscall: None,
			build_depth: 0,
			building: None,
		}
	}

	/// Installs the syscall handler invoked by `System(id)`. Without one,
	/// `System` fails with `RtError::HostError`.
	pub fn with_syscall(mut self, f: impl FnMut(&mut Rt<'a>, u32) -> Result<()> + 'a) -> Self {
		self.syscall = Some(Box::new(f));
		self
	}

	pub fn stack(&self) -> &Array {
		&self.stack
	}

	/// Resolves `dso`'s globals against `main`'s extension header (§4.E).
	/// May be called at most once per `Rt`.
	pub fn attach_dso(&mut self, main: &Module<'a>, dso: Module<'a>) -> Result<()> {
		if self.dso.is_some() {
			return Err(RtError::AlreadyLinked);
		}
		self.dso = Some(DsoLink::resolve(main, dso)?);
		Ok(())
	}

	/// Decodes and runs `module`'s entry routine (§4.D.3).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn run_entry(&mut self, module: &Module<'a>) -> Result<()> {
		let ops = decode(module.bytes(), module.entry_offset())?;
		self.run(&ops)
	}

	/// Decodes and runs a named global directly (§4.D.4), independent of
	/// the entry routine.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self, module)))]
	pub fn run_global(&mut self, module: &Module<'a>, name: &str) -> Result<()> {
		let value_offset = module
			.global(name)
			.ok_or(RtError::MalformedModule { offset: 0, reason: "no such global" })?;
		let ops = decode(module.bytes(), 16 + value_offset as usize)?;
		self.run(&ops)
	}

	/// Executes every item of `ops` in order (§4.D.1).
	pub(crate) fn run(&mut self, ops: &Array) -> Result<()> {
		for i in 0..ops.len() {
			let op = ops.get(i)?;
			self.dispatch(op)?;
		}
		Ok(())
	}

	fn dispatch(&mut self, op: Op) -> Result<()> {
		match op.kind {
			Opcode::ArrBegin => {
				if self.build_depth == 0 {
					self.building = Some(Array::new());
				} else if let Some(building) = &self.building {
					building.push(op);
				}
				self.build_depth += 1;
				Ok(())
			},
			Opcode::ArrEnd => {
				self.build_depth = self
					.build_depth
					.checked_sub(1)
					.ok_or(RtError::MalformedModule { offset: 0, reason: "ArrEnd without matching ArrBegin" })?;
				if self.build_depth == 0 {
					let built = self.building.take().ok_or(RtError::MalformedModule {
						offset: 0,
						reason: "ArrEnd closed with no array under construction",
					})?;
					self.stack.push(Op::array(built));
				} else if let Some(building) = &self.building {
					building.push(op);
				}
				Ok(())
			},
			_ if self.build_depth > 0 => {
				if let Some(building) = &self.building {
					building.push(op);
				}
				Ok(())
			},
			_ => self.execute(op),
		}
	}

	fn pop_nums(&mut self) -> Result<(i32, i32)> {
		let b = self.stack.pop()?.as_num()?;
		let a = self.stack.pop()?.as_num()?;
		Ok((a, b))
	}

	fn execute(&mut self, op: Op) -> Result<()> {
		match op.kind {
			Opcode::Push => self.stack.push(Op::num(op.arg)),

			Opcode::Add => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num(a.wrapping_add(b)));
			},
			Opcode::Sub => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num(a.wrapping_sub(b)));
			},
			Opcode::Mul => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num(a.wrapping_mul(b)));
			},
			Opcode::Div => {
				let (a, b) = self.pop_nums()?;
				if b == 0 {
					return Err(RtError::Arithmetic);
				}
				self.stack.push(Op::num(a.wrapping_div(b)));
			},
			Opcode::Mod => {
				let (a, b) = self.pop_nums()?;
				if b == 0 {
					return Err(RtError::Arithmetic);
				}
				self.stack.push(Op::num(a.wrapping_rem(b)));
			},

			Opcode::Lt => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num((a < b) as i32));
			},
			Opcode::Gt => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num((a > b) as i32));
			},
			Opcode::Eq => {
				let (a, b) = self.pop_nums()?;
				self.stack.push(Op::num((a == b) as i32));
			},

			Opcode::Not => {
				let v = self.stack.get(0)?.as_num()?;
				self.stack.set_bottom(Op::num((v == 0) as i32))?;
			},

			Opcode::Dup => {
				let top = self.stack.last()?;
				self.stack.push(top);
			},
			Opcode::Swap => {
				let top = self.stack.pop()?;
				let second = self.stack.pop()?;
				self.stack.push(top);
				self.stack.push(second);
			},
			Opcode::Pop => {
				self.stack.pop()?;
			},

			Opcode::Exec => {
				let arr = self.stack.pop()?.into_array()?;
				self.run(&arr)?;
			},

			Opcode::Select => {
				let cond = self.stack.pop()?.as_num()?;
				let a = self.stack.pop()?;
				let b = self.stack.pop()?;
				self.stack.push(if cond != 0 { a } else { b });
			},

			Opcode::RoL => {
				let t0 = self.stack.pop()?;
				let t1 = self.stack.pop()?;
				let t2 = self.stack.pop()?;
				self.stack.push(t1);
				self.stack.push(t0);
				self.stack.push(t2);
			},
			Opcode::RoR => {
				let t0 = self.stack.pop()?;
				let t1 = self.stack.pop()?;
				let t2 = self.stack.pop()?;
				self.stack.push(t0);
				self.stack.push(t2);
				self.stack.push(t1);
			},

			Opcode::Reach => {
				let k = op.arg as u32 as usize;
				let len = self.stack.len();
				if k >= len {
					return Err(RtError::StackUnderflow { needed: k + 1, len });
				}
				let v = self.stack.get(len - 1 - k)?;
				self.stack.push(v);
			},

			Opcode::Const => {
				let off = op.arg as u32 as usize;
				let arr = decode(self.bytecode, 16 + off)?;
				self.run(&arr)?;
			},
			Opcode::ConstDso => {
				let idx = op.arg as u32;
				let offset = self.dso.as_ref().ok_or(RtError::DsoMissing)?.value_offset(idx)?;
				let bytes = self.dso.as_ref().ok_or(RtError::DsoMissing)?.dso().bytes();
				let arr = decode(bytes, offset as usize)?;
				self.run(&arr)?;
			},

			Opcode::U8ArrAt => {
				let off = 16 + op.arg as u32 as usize;
				let mut r = ByteReader::new(self.bytecode, off);
				let len = r.u16()? as usize;
				let mut items = Vec::with_capacity(len);
				for _ in 0..len {
					items.push(Op::num(r.u8()? as i32));
				}
				self.stack.push(Op::array(Array::from_vec(items)));
			},
			Opcode::I16ArrAt => {
				let off = 16 + op.arg as u32 as usize;
				let mut r = ByteReader::new(self.bytecode, off);
				let len = r.u16()? as usize;
				let mut items = Vec::with_capacity(len);
				for _ in 0..len {
					// Zero-extends, per the reference (`(uint16_t*)arrp` widened
					// to `int32_t`): 0xFFFF reads back as 65535, not -1.
					items.push(Op::num(r.u16()? as i32));
				}
				self.stack.push(Op::array(Array::from_vec(items)));
			},

			Opcode::Pack => {
				let v = self.stack.pop()?;
				self.stack.push(Op::array(Array::from_vec(vec![v])));
			},

			Opcode::ArrCat => {
				let b = self.stack.pop()?.into_array()?;
				let a = self.stack.pop()?.into_array()?;
				let a = a.cow();
				a.append(b);
				self.stack.push(Op::array(a));
			},
			Opcode::ArrFirst => {
				let a = self.stack.pop()?.into_array()?;
				let first = a.pop_front()?;
				drop(a);
				self.stack.push(first);
			},
			Opcode::ArrSkip1 => {
				let a = self.stack.pop()?.into_array()?;
				let a = a.cow();
				a.pop_front()?;
				self.stack.push(Op::array(a));
			},
			Opcode::ArrLen => {
				let a = self.stack.pop()?.into_array()?;
				self.stack.push(Op::num(a.len() as i32));
			},

			Opcode::TypeId => {
				let v = self.stack.pop()?;
				self.stack.push(Op::num(!v.is_num() as i32));
			},

			Opcode::Materialize => {
				let quotation = self.stack.pop()?.into_array()?;
				let outer = std::mem::replace(&mut self.stack, Array::new());
				let run_result = self.run(&quotation);
				let sub_stack = std::mem::replace(&mut self.stack, outer);
				run_result?;
				self.stack.push(Op::array(sub_stack));
			},

			Opcode::OpsOf => {
				let arr = self.stack.pop()?.into_array()?;
				let mut bytes = Vec::new();
				for i in 0..arr.len() {
					let item = arr.get(i)?;
					bytes.push(item.kind.tag());
					if item.kind.carries_immediate() {
						bytes.extend(item.arg.to_le_bytes());
					}
				}
				let items = bytes.into_iter().map(|b| Op::num(b as i32)).collect();
				self.stack.push(Op::array(Array::from_vec(items)));
			},

			Opcode::System => {
				let id = op.arg as u32;
				#[cfg(feature = "tracing")]
				tracing::trace!(id, "syscall dispatched");
				let mut callback = self
					.syscall
					.take()
					.ok_or_else(|| RtError::host_msg("no syscall handler installed"))?;
				let result = callback(self, id);
				self.syscall = Some(callback);
				result?;
			},

			Opcode::ConstAt => return Err(RtError::UnsupportedOp { tag: Opcode::ConstAt.tag() }),

			Opcode::ArrBegin | Opcode::ArrEnd => unreachable!("handled in dispatch"),
			Opcode::Terminate | Opcode::ArrLit => {
				unreachable!("never produced by the decoder into an executing stream")
			},
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testsupport::{ModuleBuilder, OpStream};

	fn run(build: impl FnOnce(&mut OpStream)) -> Array {
		let bytes = ModuleBuilder::new().finish(build);
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		rt.run_entry(&module).unwrap();
		rt.stack().clone()
	}

	fn nums(arr: &Array) -> Vec<i32> {
		(0..arr.len()).map(|i| arr.get(i).unwrap().as_num().unwrap()).collect()
	}

	#[test]
	fn seed_1_add() {
		let stack = run(|e| {
			e.push(2).push(3).add();
		});
		assert_eq!(nums(&stack), vec![5]);
	}

	#[test]
	fn seed_2_mod_and_div() {
		let stack = run(|e| {
			e.push(7).push(2).mod_().push(6).push(2).div().add();
		});
		assert_eq!(nums(&stack), vec![4]);
	}

	#[test]
	fn seed_3_swap_and_sub() {
		let stack = run(|e| {
			e.push(10).push(20).swap().sub();
		});
		assert_eq!(nums(&stack), vec![10]);
	}

	#[test]
	fn seed_4_rol() {
		let stack = run(|e| {
			e.push(1).push(2).push(3).rol();
		});
		assert_eq!(nums(&stack), vec![2, 3, 1]);
	}

	#[test]
	fn seed_5_quotation_len_and_first() {
		let stack = run(|e| {
			e.arr_begin().push(1).push(2).arr_end().dup().arr_len().swap().arr_first();
		});
		assert_eq!(nums(&stack), vec![2, 1]);
	}

	#[test]
	fn seed_6_materialize() {
		let stack = run(|e| {
			e.arr_begin().push(9).push(10).add().arr_end().materialize();
		});
		assert_eq!(stack.len(), 1);
		let inner = stack.get(0).unwrap().into_array().unwrap();
		assert_eq!(nums(&inner), vec![19]);
	}

	#[test]
	fn seed_7_select() {
		let stack = run(|e| {
			e.push(0).push(5).push(6).select();
		});
		assert_eq!(nums(&stack), vec![5]);
	}

	#[test]
	fn seed_8_arr_cat() {
		let stack = run(|e| {
			e.arr_begin().push(1).arr_end().arr_begin().push(2).arr_end().arr_cat().arr_len();
		});
		assert_eq!(nums(&stack), vec![2]);
	}

	#[test]
	fn not_flips_stack_bottom_not_top() {
		let stack = run(|e| {
			e.push(0).push(1).not();
		});
		assert_eq!(nums(&stack), vec![1, 1]);
	}

	#[test]
	fn pop_on_empty_stack_is_underflow() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.pop();
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		assert!(matches!(rt.run_entry(&module), Err(RtError::StackUnderflow { .. })));
	}

	#[test]
	fn reach_past_stack_len_errors() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.push(1).reach(5);
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		assert!(matches!(rt.run_entry(&module), Err(RtError::StackUnderflow { .. })));
	}

	#[test]
	fn division_by_zero_is_arithmetic_error() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.push(1).push(0).div();
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		assert!(matches!(rt.run_entry(&module), Err(RtError::Arithmetic)));
	}

	#[test]
	fn const_dso_without_dso_attached_errors() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.const_dso(0);
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		assert!(matches!(rt.run_entry(&module), Err(RtError::DsoMissing)));
	}

	#[test]
	fn system_without_handler_is_a_host_error() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.system(0);
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module);
		assert!(matches!(rt.run_entry(&module), Err(RtError::HostError(_))));
	}

	#[test]
	fn system_handler_can_read_and_write_the_stack() {
		let bytes = ModuleBuilder::new().finish(|e| {
			e.push(41).system(0);
		});
		let module = Module::parse(&bytes).unwrap();
		let mut rt = Rt::new(module).with_syscall(|rt, id| {
			assert_eq!(id, 0);
			let n = rt.stack().pop()?.as_num()?;
			rt.stack().push(Op::num(n + 1));
			Ok(())
		});
		rt.run_entry(&module).unwrap();
		assert_eq!(nums(rt.stack()), vec![42]);
	}

	#[test]
	fn ops_of_then_decode_round_trips() {
		let stack = run(|e| {
			e.arr_begin().push(5).add().arr_end().ops_of();
		});
		assert_eq!(stack.len(), 1);
		let reified = stack.get(0).unwrap().into_array().unwrap();
		let bytes: Vec<u8> = nums(&reified).into_iter().map(|n| n as u8).collect();
		let mut bytes_with_terminator = bytes;
		bytes_with_terminator.push(Opcode::Terminate.tag());
		let decoded = decode(&bytes_with_terminator, 0).unwrap();
		assert_eq!(decoded.len(), 2);
		assert_eq!(decoded.get(0).unwrap().kind, Opcode::Push);
		assert_eq!(decoded.get(0).unwrap().arg, 5);
		assert_eq!(decoded.get(1).unwrap().kind, Opcode::Add);
	}
}
