use std::fs::File;
use std::io::BufWriter;
use std::time::SystemTime;

use h6rt::{Module, Opcode, Rt};
use memory_stats::memory_stats;
use tracing_flame::FlameLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

fn setup_global_subscriber() -> impl Drop {
	let file = File::create("./trace.folded").unwrap();
	let flame_layer = FlameLayer::new(BufWriter::new(file)).with_file_and_line(false);
	let guard = flame_layer.flush_on_drop();

	let subscriber = Registry::default().with(flame_layer);

	tracing::subscriber::set_global_default(subscriber).expect("Could not set global default");
	guard
}

/// Hand-assembles a module with no globals and an entry routine that builds
/// a quotation summing `0..=n`, then runs it through `Materialize`. Good
/// enough to put real work under the interpreter without a module file on
/// disk.
fn build_summing_module(n: i32) -> Vec<u8> {
	let mut bytes = vec![0u8; 16];

	bytes.push(Opcode::ArrBegin.tag());
	push_imm(&mut bytes, Opcode::Push, 0);
	for i in 1..=n {
		push_imm(&mut bytes, Opcode::Push, i);
		bytes.push(Opcode::Add.tag());
	}
	bytes.push(Opcode::ArrEnd.tag());
	bytes.push(Opcode::Materialize.tag());
	bytes.push(Opcode::Terminate.tag());

	bytes
}

fn push_imm(bytes: &mut Vec<u8>, op: Opcode, imm: i32) {
	bytes.push(op.tag());
	bytes.extend_from_slice(&imm.to_le_bytes());
}

fn main() {
	let _guard = setup_global_subscriber();

	let start = SystemTime::now();
	let module_bytes = build_summing_module(50_000);
	println! {
		"Assembly time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	let start = SystemTime::now();
	let module = Module::parse(&module_bytes).unwrap();
	let mut rt = Rt::new(module);
	rt.run_entry(&module).unwrap();
	println! {
		"Run time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1_000_000.0,
	}

	println!("Final stack depth: {}", rt.stack().len());
}
