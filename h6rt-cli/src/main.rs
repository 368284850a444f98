use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use h6rt::io::read_module_file;
use h6rt::{Module, Op, Result as RtResult, Rt, RtError};
use tracing_subscriber::EnvFilter;

/// Runs an H6 bytecode module and prints its final operand stack.
#[derive(Parser)]
#[command(name = "h6rt")]
struct Args {
	/// Module file to execute.
	input_file: PathBuf,

	/// A DSO module to link against `input_file`.
	#[arg(long, value_name = "PATH")]
	dso: Option<PathBuf>,

	/// Raise diagnostic verbosity. Repeatable (-v, -vv, -vvv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

fn main() -> ExitCode {
	let args = Args::parse();
	init_tracing(args.verbose);

	match run(&args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("error: {err:#}");
			ExitCode::FAILURE
		},
	}
}

fn init_tracing(verbose: u8) {
	let default_level = match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: &Args) -> anyhow::Result<()> {
	let main_bytes =
		read_module_file(&args.input_file).with_context(|| format!("reading {}", args.input_file.display()))?;
	let main_module = Module::parse(&main_bytes)?;

	let dso_bytes = args
		.dso
		.as_ref()
		.map(read_module_file)
		.transpose()
		.context("reading --dso module")?;
	let dso_module = dso_bytes.as_deref().map(Module::parse).transpose()?;

	let mut rt = Rt::new(main_module).with_syscall(conventional_syscall);
	if let Some(dso_module) = dso_module {
		rt.attach_dso(&main_module, dso_module)?;
	}

	rt.run_entry(&main_module)?;
	print_stack(&rt)?;
	Ok(())
}

fn print_stack(rt: &Rt) -> RtResult<()> {
	let stack = rt.stack();
	if stack.is_empty() {
		return Ok(());
	}
	println!("BOT");
	for i in 0..stack.len() {
		println!("  {}", stack.get(i)?);
	}
	println!("TOP");
	Ok(())
}

/// The conventional syscall binding: `id=0` writes a byte to a stream,
/// `id=1` reads one. Stream `1` is standard output/input.
fn conventional_syscall(rt: &mut Rt, id: u32) -> RtResult<()> {
	match id {
		0 => {
			let byte = rt.stack().pop()?.as_num()?;
			let stream = rt.stack().pop()?.as_num()?;
			if stream == 1 {
				std::io::stdout()
					.write_all(&[byte as u8])
					.map_err(|e| RtError::host_msg(e.to_string()))?;
			}
			Ok(())
		},
		1 => {
			let stream = rt.stack().pop()?.as_num()?;
			let mut buf = [0u8];
			if stream == 1 {
				std::io::stdin().read_exact(&mut buf).map_err(|e| RtError::host_msg(e.to_string()))?;
			}
			rt.stack().push(Op::num(buf[0] as i32));
			Ok(())
		},
		_ => Err(RtError::host_msg(format!("unknown syscall id {id}"))),
	}
}
