//! A runtime for H6, a compact stack-oriented bytecode language.
//!
//! Loads a binary module (see [`module`]), decodes its opcode stream
//! ([`decode`]/[`opcode`]), and executes it against an operand stack of
//! tagged, reference-counted values ([`value`]) through [`interp::Rt`].
//! Programs reach the host through a single syscall trapdoor and may
//! optionally link against one DSO module ([`link`]) whose globals are
//! resolved by name.

mod decode;
mod error;
mod fmt;
mod interp;
pub mod io;
mod link;
mod module;
mod opcode;
mod utilities;
mod value;

/// Tiny in-memory module assembler, normally test-only. Exposed publicly
/// under the `testsupport` feature so the crate-level `tests/` integration
/// suite can assemble modules through the same builder the unit tests use,
/// without checking in binary fixtures.
#[cfg(any(test, feature = "testsupport"))]
pub mod testsupport;

pub use error::{Result, RtError};
pub use interp::{Rt, SyscallFn};
pub use module::{Global, Module};
pub use opcode::Opcode;
pub use value::{Array, Op};
