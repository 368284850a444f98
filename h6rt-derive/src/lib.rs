mod opcode;

use proc_macro::TokenStream;

/// Generates `from_tag`/`tag`/`carries_immediate` for a fieldless, explicitly
/// discriminated enum, keeping the on-disk tag table, its inverse, and the
/// "does this opcode read a trailing 4-byte immediate" predicate defined
/// exactly once. Mark immediate-carrying variants with `#[imm]`.
#[proc_macro_derive(OpCode, attributes(imm))]
pub fn derive_opcode(input: TokenStream) -> TokenStream {
	opcode::derive(input).into()
}
