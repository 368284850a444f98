use std::fmt::{self, Display, Formatter};

use crate::value::Op;

/// Renders a value the way the CLI prints a stack: a bare number for
/// `Num`, and `{ item item ... }` for `ArrRef`, recursing into nested
/// arrays. Any other decoded-but-unmaterialized op prints as `<op N>` — it
/// has no value representation, only an instruction one.
impl Display for Op {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if self.is_num() {
			return write!(f, "{}", self.arg);
		}
		if let Some(arr) = &self.arr {
			write!(f, "{{")?;
			let len = arr.len();
			for i in 0..len {
				write!(f, " {}", arr.get(i).map_err(|_| fmt::Error)?)?;
			}
			if len > 0 {
				write!(f, " ")?;
			}
			return write!(f, "}}");
		}
		write!(f, "<op {}>", self.kind.tag())
	}
}
