use crate::error::{Result, RtError};
use crate::opcode::Opcode;
use crate::utilities::ByteReader;
use crate::value::{Array, Op};

/// Decodes an opcode stream starting at `offset`, stopping at `Terminate`
/// (exclusive) or the first unrecognized byte.
///
/// `Terminate` itself is never pushed onto the resulting [`Array`]: it is
/// purely an end-of-stream marker, matching the reference decoder. `ArrLit`
/// (tag 100) has no on-disk encoding — it only ever exists as a runtime
/// value tagging a materialized array — so seeing it in a module's bytes is
/// as fatal as any other unrecognized byte.
pub(crate) fn decode(bytes: &[u8], offset: usize) -> Result<Array> {
	let out = Array::new();
	let mut r = ByteReader::new(bytes, offset);

	loop {
		let tag = r.u8()?;
		if tag == Opcode::Terminate.tag() {
			break;
		}

		let kind = match Opcode::from_tag(tag) {
			Some(Opcode::ArrLit) | None => return Err(RtError::UnsupportedOp { tag }),
			Some(kind) => kind,
		};

		let arg = match kind.carries_immediate() {
			true => r.u32()? as i32,
			false => 0,
		};

		out.push(Op { kind, arg, arr: None });
	}

	Ok(out)
}
