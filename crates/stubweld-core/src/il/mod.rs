//! # Instruction Model
//!
//! Typed CIL instructions, method bodies and the stack verifier.
//!
//! Instructions are kept in a flat vector; branch operands are indices into
//! that vector. Byte offsets only exist in the encoded form.

mod body;
mod instruction;
mod opcode;
mod verify;

pub use body::{ExceptionRegion, MethodBody, RegionKind};
pub use instruction::{Instruction, Operand, Token};
pub use opcode::{FlowControl, OpCode, OperandKind, StackEffect};
pub use verify::verify;
