use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Result, RtError};
use crate::opcode::Opcode;

/// A tagged datum: an operand-stack value, or a single decoded instruction.
///
/// The value model and the decoded bytecode share exactly one representation
/// (§4.D's "quotations as code"), so `Op` is simultaneously "a `Push`
/// instruction" and "a `Num` value" — the reference implementation's own
/// reuse of one `struct`, carried over rather than split into two Rust
/// types that would need to agree with each other forever.
#[derive(Clone, Debug)]
pub struct Op {
	pub kind: Opcode,
	/// Signed for `Num`, unsigned (reinterpret via `as u32`) for index/offset
	/// carrying tags.
	pub arg: i32,
	pub arr: Option<Array>,
}

impl Op {
	pub fn num(n: i32) -> Op {
		Op { kind: Opcode::Push, arg: n, arr: None }
	}

	pub fn array(arr: Array) -> Op {
		Op { kind: Opcode::ArrLit, arg: 0, arr: Some(arr) }
	}

	pub fn is_num(&self) -> bool {
		self.kind == Opcode::Push
	}

	pub fn is_array(&self) -> bool {
		self.kind == Opcode::ArrLit
	}

	pub fn as_num(&self) -> Result<i32> {
		match self.kind {
			Opcode::Push => Ok(self.arg),
			_ => Err(RtError::TypeMismatch { expected: "Num", found: "ArrRef" }),
		}
	}

	pub fn as_array(&self) -> Result<&Array> {
		match (&self.kind, &self.arr) {
			(Opcode::ArrLit, Some(a)) => Ok(a),
			_ => Err(RtError::TypeMismatch { expected: "ArrRef", found: "Num" }),
		}
	}

	pub fn into_array(self) -> Result<Array> {
		match (self.kind, self.arr) {
			(Opcode::ArrLit, Some(a)) => Ok(a),
			_ => Err(RtError::TypeMismatch { expected: "ArrRef", found: "Num" }),
		}
	}
}

/// A reference-counted, mutable, ordered sequence of [`Op`] values.
///
/// Reference counting and recursive drop fall out of `Rc` for free: cloning
/// an `Array` (via `Op::clone`, since `Array` derives `Clone`) is exactly the
/// spec's `clone(v)` (bump `rc`), and letting the last handle go out of
/// scope is exactly `drop(v)` (decrement `rc`; on reaching zero, `Vec<Op>`'s
/// own `Drop` recursively drops every element, cascading into any nested
/// arrays). No manual bookkeeping is needed beyond `cow`.
#[derive(Clone, Debug, Default)]
pub struct Array(Rc<RefCell<Vec<Op>>>);

impl Array {
	pub fn new() -> Self {
		Array(Rc::new(RefCell::new(Vec::new())))
	}

	pub fn from_vec(items: Vec<Op>) -> Self {
		Array(Rc::new(RefCell::new(items)))
	}

	/// Current reference count. `> 1` means another holder is live and any
	/// mutator must go through [`Array::cow`] first.
	pub fn rc(&self) -> usize {
		Rc::strong_count(&self.0)
	}

	pub fn len(&self) -> usize {
		self.0.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn push(&self, op: Op) {
		self.0.borrow_mut().push(op);
	}

	pub fn pop(&self) -> Result<Op> {
		self.0.borrow_mut().pop().ok_or(RtError::StackUnderflow { needed: 1, len: 0 })
	}

	pub fn pop_front(&self) -> Result<Op> {
		let mut items = self.0.borrow_mut();
		if items.is_empty() {
			return Err(RtError::StackUnderflow { needed: 1, len: 0 });
		}
		Ok(items.remove(0))
	}

	pub fn last(&self) -> Result<Op> {
		let items = self.0.borrow();
		items.last().cloned().ok_or(RtError::StackUnderflow { needed: 1, len: 0 })
	}

	/// Clone of the element at `idx` (0 = bottom). Bumps `rc` for array
	/// elements, matching `clone(v)`.
	pub fn get(&self, idx: usize) -> Result<Op> {
		let items = self.0.borrow();
		items.get(idx).cloned().ok_or(RtError::StackUnderflow { needed: idx + 1, len: items.len() })
	}

	/// Replaces the bottom element in place. Used only by `Not`, which (per
	/// the reference implementation) mutates `items[0]` rather than the top.
	pub fn set_bottom(&self, op: Op) -> Result<()> {
		let mut items = self.0.borrow_mut();
		if items.is_empty() {
			return Err(RtError::StackUnderflow { needed: 1, len: 0 });
		}
		items[0] = op;
		Ok(())
	}

	/// Appends `other`'s items onto the end of `self`, cloning each (so
	/// nested arrays get their `rc` bumped before `other`'s own copies are
	/// dropped at the end of this call). Caller must have already ensured
	/// `self.rc() == 1` via [`Array::cow`].
	pub fn append(&self, other: Array) {
		let cloned: Vec<Op> = other.0.borrow().iter().cloned().collect();
		self.0.borrow_mut().extend(cloned);
	}

	/// Copy-on-write: returns `self` unchanged if uniquely held, else a
	/// fresh array with every element cloned (nested arrays get `rc` bumped,
	/// not deep-copied — arrays form a tree, so this is always safe).
	pub fn cow(self) -> Array {
		if Rc::strong_count(&self.0) == 1 {
			self
		} else {
			let cloned: Vec<Op> = self.0.borrow().iter().cloned().collect();
			Array::from_vec(cloned)
		}
	}
}

impl PartialEq for Array {
	fn eq(&self, other: &Self) -> bool {
		*self.0.borrow() == *other.0.borrow()
	}
}

impl PartialEq for Op {
	fn eq(&self, other: &Self) -> bool {
		self.kind == other.kind && self.arg == other.arg && self.arr == other.arr
	}
}
