use std::fmt::{Display, Formatter};

/// Every fatal condition the runtime can encounter.
///
/// The core never recovers from one of these: the first error aborts
/// execution of the current [`crate::interp::Rt`] and is handed back to the
/// caller. The stack may be in an arbitrary state at the point of failure.
#[derive(Debug)]
pub enum RtError {
	/// A header read or offset fell outside the module buffer, or the
	/// opcode stream ran past the end of the buffer before a `Terminate`.
	MalformedModule { offset: usize, reason: &'static str },
	/// An op required `Num` but found `ArrRef`, or vice versa.
	TypeMismatch { expected: &'static str, found: &'static str },
	/// A pop/peek/reach went past the current stack length.
	StackUnderflow { needed: usize, len: usize },
	/// Division or modulus by zero.
	Arithmetic,
	/// `ConstDso` executed without a DSO attached, or with an out-of-range index.
	DsoMissing,
	/// A link-time `name_offset` the DSO does not export.
	DsoUnresolved { name: String },
	/// A DSO was attached to an [`crate::interp::Rt`] that already has one.
	AlreadyLinked,
	/// `ConstAt`, or a byte in the opcode stream that names no known opcode.
	UnsupportedOp { tag: u8 },
	/// Surfaced by the host's syscall callback.
	HostError(Box<dyn std::error::Error + Send + Sync>),
}

impl Display for RtError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			RtError::MalformedModule { offset, reason } => {
				write!(f, "malformed module at offset {offset}: {reason}")
			},
			RtError::TypeMismatch { expected, found } => {
				write!(f, "type mismatch: expected {expected}, found {found}")
			},
			RtError::StackUnderflow { needed, len } => {
				write!(f, "stack underflow: needed {needed} element(s), stack has {len}")
			},
			RtError::Arithmetic => write!(f, "division or modulus by zero"),
			RtError::DsoMissing => write!(f, "no DSO attached, or DSO reference index out of range"),
			RtError::DsoUnresolved { name } => write!(f, "dso not found: {name}"),
			RtError::AlreadyLinked => write!(f, "a DSO is already linked to this runtime"),
			RtError::UnsupportedOp { tag } => write!(f, "unsupported opcode <op {tag}>"),
			RtError::HostError(e) => write!(f, "host error: {e}"),
		}
	}
}

impl std::error::Error for RtError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			RtError::HostError(e) => Some(e.as_ref()),
			_ => None,
		}
	}
}

impl RtError {
	/// Wraps a plain message as a [`RtError::HostError`], for callers (the
	/// default `System` dispatch, a host without a syscall handler) that have
	/// no underlying `std::error::Error` to carry.
	pub fn host_msg(msg: impl Into<String>) -> RtError {
		RtError::HostError(Box::new(Msg(msg.into())))
	}
}

#[derive(Debug)]
struct Msg(String);

impl Display for Msg {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::error::Error for Msg {}

pub type Result<T> = std::result::Result<T, RtError>;
