use h6rt_derive::OpCode;

/// The H6 opcode set.
///
/// Tag values and the "carries a 4-byte immediate" predicate are generated
/// by `#[derive(OpCode)]` from the explicit discriminants and `#[imm]`
/// markers below, so the decoder, the reflection opcode (`OpsOf`), and the
/// dispatcher can never disagree about which tags take an argument —
/// generalizing the teacher workspace's `FromRepr` derive, which keeps a
/// single table instead of three parallel `match`es.
#[repr(u8)]
#[derive(OpCode, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
	Terminate = 0,
	#[imm]
	Const = 2,
	TypeId = 3,
	#[imm]
	Push = 8,
	Add = 9,
	Sub = 10,
	Mul = 11,
	Dup = 12,
	Swap = 14,
	Pop = 15,
	Exec = 16,
	Select = 17,
	Lt = 18,
	Gt = 19,
	Eq = 20,
	Not = 21,
	RoL = 22,
	RoR = 24,
	#[imm]
	Reach = 25,
	ArrBegin = 26,
	ArrEnd = 27,
	ArrCat = 29,
	ArrFirst = 30,
	ArrLen = 31,
	ArrSkip1 = 32,
	Pack = 33,
	Mod = 34,
	Div = 36,
	#[imm]
	System = 41,
	Materialize = 42,
	OpsOf = 43,
	/// Reserved; fatal if executed.
	ConstAt = 44,
	#[imm]
	ConstDso = 45,
	#[imm]
	U8ArrAt = 46,
	#[imm]
	I16ArrAt = 47,
	/// Not emitted by the decoder; constructed at runtime to tag a
	/// materialized array value on the stack. Corresponds to the reference
	/// implementation's internal `CustomPushArr`.
	ArrLit = 100,
}
