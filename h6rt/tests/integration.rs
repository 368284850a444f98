//! End-to-end coverage driven entirely through the public `Module`/`Rt`
//! API, assembling modules in memory via `h6rt::testsupport` rather than
//! checking in binary fixtures (see §8 of the design spec for the seed
//! scenarios and invariants this suite exercises).

use h6rt::testsupport::ModuleBuilder;
use h6rt::{Module, Op, Rt, RtError};

fn run(build: impl FnOnce(&mut h6rt::testsupport::OpStream)) -> h6rt::Array {
	let bytes = ModuleBuilder::new().finish(build);
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	rt.stack().clone()
}

fn nums(arr: &h6rt::Array) -> Vec<i32> {
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
fn seed_2_mod_then_div_then_add() {
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
fn seed_5_quotation_len_then_first() {
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
fn seed_7_select_picks_false_branch() {
	let stack = run(|e| {
		e.push(0).push(5).push(6).select();
	});
	assert_eq!(nums(&stack), vec![5]);
}

#[test]
fn seed_8_arr_cat_then_len() {
	let stack = run(|e| {
		e.arr_begin().push(1).arr_end().arr_begin().push(2).arr_end().arr_cat().arr_len();
	});
	assert_eq!(nums(&stack), vec![2]);
}

#[test]
fn invariant_round_trip_on_num() {
	let stack = run(|e| {
		e.push(7).dup();
	});
	assert_eq!(nums(&stack), vec![7, 7]);

	let stack = run(|e| {
		e.push(7).type_id();
	});
	assert_eq!(nums(&stack), vec![0]);

	let stack = run(|e| {
		e.arr_begin().push(7).arr_end().type_id();
	});
	assert_eq!(nums(&stack), vec![1]);
}

#[test]
fn invariant_materialization_leaves_outer_stack_otherwise_unchanged() {
	let stack = run(|e| {
		e.push(100).arr_begin().push(1).push(2).arr_end().materialize();
	});
	assert_eq!(stack.len(), 2);
	assert_eq!(stack.get(0).unwrap().as_num().unwrap(), 100);
	let inner = stack.get(1).unwrap().into_array().unwrap();
	assert_eq!(nums(&inner), vec![1, 2]);
}

#[test]
fn invariant_quotation_fidelity_exec_matches_inline() {
	let inline = run(|e| {
		e.push(2).push(3).add();
	});
	let via_exec = run(|e| {
		e.arr_begin().push(2).push(3).add().arr_end().exec();
	});
	assert_eq!(nums(&inline), nums(&via_exec));
}

#[test]
fn invariant_rc_soundness_repeated_dup_pop_does_not_leak() {
	// Each `dup().pop()` cycle bumps then drops one reference; if `pop`
	// failed to release its handle the refcount would grow with every
	// cycle instead of settling back down.
	let bytes = ModuleBuilder::new().finish(|e| {
		e.arr_begin().push(1).arr_end();
		for _ in 0..5 {
			e.dup().pop();
		}
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	// `get` itself clones (bumping rc by one for the handle it returns),
	// so the only live holders at this point are the stack slot and this
	// local clone.
	let arr = rt.stack().get(0).unwrap().into_array().unwrap();
	assert_eq!(arr.rc(), 2);
}

#[test]
fn invariant_cow_isolation_arr_cat_does_not_mutate_shared_original() {
	let bytes = ModuleBuilder::new().finish(|e| {
		// Build `a`, dup it so a shared copy survives, then ArrCat the
		// popped copy with `b`. The surviving `dup` must be untouched.
		e.arr_begin().push(1).arr_end().dup().arr_begin().push(2).arr_end().arr_cat().pop();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	let surviving = rt.stack().get(0).unwrap().into_array().unwrap();
	assert_eq!(nums(&surviving), vec![1]);
}

#[test]
fn invariant_reflection_law_decode_of_ops_of_round_trips() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.arr_begin().push(5).add().arr_end().ops_of();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	let reified = rt.stack().get(0).unwrap().into_array().unwrap();
	assert_eq!(reified.len(), 1 + 4 + 1);
}

#[test]
fn boundary_pop_on_empty_stack_errors() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.pop();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::StackUnderflow { .. })));
}

#[test]
fn boundary_reach_past_stack_length_errors() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.push(1).push(2).reach(5);
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::StackUnderflow { .. })));
}

#[test]
fn boundary_div_and_mod_by_zero_error() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.push(1).push(0).div();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::Arithmetic)));

	let bytes = ModuleBuilder::new().finish(|e| {
		e.push(1).push(0).mod_();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::Arithmetic)));
}

#[test]
fn boundary_const_dso_without_a_dso_errors() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.const_dso(0);
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::DsoMissing)));
}

#[test]
fn boundary_unknown_tag_is_unsupported_op() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.raw_tag(255);
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::UnsupportedOp { tag: 255 })));
}

#[test]
fn boundary_const_at_is_reserved_and_fatal() {
	let bytes = ModuleBuilder::new().finish(|e| {
		e.const_at();
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	assert!(matches!(rt.run_entry(&module), Err(RtError::UnsupportedOp { .. })));
}

#[test]
fn dso_link_resolves_and_runs_a_const_dso_reference() {
	let mut main = ModuleBuilder::new();
	main.dso_ref("double");
	let main_bytes = main.finish(|e| {
		e.push(21).const_dso(0);
	});

	let mut dso = ModuleBuilder::new();
	dso.global("double", |ops| {
		ops.dup().add();
	});
	let dso_bytes = dso.finish(|_| {});

	let main_module = Module::parse(&main_bytes).unwrap();
	let dso_module = Module::parse(&dso_bytes).unwrap();
	let mut rt = Rt::new(main_module);
	rt.attach_dso(&main_module, dso_module).unwrap();
	rt.run_entry(&main_module).unwrap();
	assert_eq!(nums(rt.stack()), vec![42]);
}

#[test]
fn dso_link_missing_name_is_unresolved() {
	let mut main = ModuleBuilder::new();
	main.dso_ref("nonexistent");
	let main_bytes = main.finish(|e| {
		e.const_dso(0);
	});
	let dso_bytes = ModuleBuilder::new().finish(|_| {});

	let main_module = Module::parse(&main_bytes).unwrap();
	let dso_module = Module::parse(&dso_bytes).unwrap();
	let mut rt = Rt::new(main_module);
	assert!(matches!(rt.attach_dso(&main_module, dso_module), Err(RtError::DsoUnresolved { .. })));
}

#[test]
fn named_global_runs_independently_of_entry_routine() {
	let mut b = ModuleBuilder::new();
	b.global("five", |ops| {
		ops.push(5);
	});
	let bytes = b.finish(|e| {
		e.push(1);
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_global(&module, "five").unwrap();
	assert_eq!(nums(rt.stack()), vec![5]);
}

#[test]
fn syscall_round_trips_through_the_stack() {
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
fn u8_and_i16_array_pools_decode_in_order() {
	let mut b = ModuleBuilder::new();
	let u8_pool = b.pool_u8(&[1, 2, 3]);
	let i16_pool = b.pool_i16(&[-1, 1000]);
	let bytes = b.finish(|e| {
		e.u8arr_at(u8_pool).i16arr_at(i16_pool);
	});
	let module = Module::parse(&bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	let stack = rt.stack();
	assert_eq!(stack.len(), 2);
	let a = stack.get(0).unwrap().into_array().unwrap();
	assert_eq!(nums(&a), vec![1, 2, 3]);
	let b = stack.get(1).unwrap().into_array().unwrap();
	// `I16ArrAt` zero-extends, per the reference's `(uint16_t*)` read widened
	// to `int32_t`: the on-disk `-1` (`0xFFFF`) reads back as `65535`, never
	// sign-extended to `-1`.
	assert_eq!(nums(&b), vec![65535, 1000]);
}

#[test]
fn dso_link_handles_a_padded_ex_header_len() {
	// The reference locates the reference table at `ex_header_len` bytes
	// past the start of the extension header, not hardcoded right after the
	// two fixed fields, so a header with extra padding before the table
	// must still resolve correctly.
	let mut main = ModuleBuilder::new();
	main.dso_ref("double");
	main.ex_header_padding(8);
	let main_bytes = main.finish(|e| {
		e.push(21).const_dso(0);
	});

	let mut dso = ModuleBuilder::new();
	dso.global("double", |ops| {
		ops.dup().add();
	});
	let dso_bytes = dso.finish(|_| {});

	let main_module = Module::parse(&main_bytes).unwrap();
	let dso_module = Module::parse(&dso_bytes).unwrap();
	let mut rt = Rt::new(main_module);
	rt.attach_dso(&main_module, dso_module).unwrap();
	rt.run_entry(&main_module).unwrap();
	assert_eq!(nums(rt.stack()), vec![42]);
}
