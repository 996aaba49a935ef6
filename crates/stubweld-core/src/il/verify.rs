//! # Stack Verifier
//!
//! Abstract interpretation of evaluation stack depth over a method body.
//!
//! Every instruction is visited with the depth it is reached with. A second
//! path reaching the same instruction must agree on that depth, otherwise the
//! body is unbalanced at a merge point. `ret` must leave exactly one value for
//! value-returning methods and none for `void`.
//!
//! ## Example
//!
//! ```rust
//! use stubweld_core::il::{verify, Instruction, MethodBody, OpCode};
//! use stubweld_core::metadata::{Module, Version};
//!
//! let module = Module::new("Demo", Version::default());
//! let body = MethodBody {
//!     instructions: vec![Instruction::ldarg(0), Instruction::simple(OpCode::Ret)],
//!     ..MethodBody::default()
//! };
//! assert_eq!(verify(&module, &body, true), Ok(1));
//! ```

use super::body::MethodBody;
use super::instruction::{Instruction, Token};
use super::opcode::{FlowControl, OpCode, StackEffect};
use crate::error::EmissionError;
use crate::metadata::{MethodSig, Module};

/// Check `body` for stack balance and return its maximum stack depth.
///
/// `returns_value` is whether the owning method has a non-`void` return type.
/// Call operands are resolved against `module`.
///
/// ## Errors
///
/// Returns the first [`EmissionError`] found in visiting order.
pub fn verify(module: &Module, body: &MethodBody, returns_value: bool) -> Result<u16, EmissionError>
{
    let count = body.instructions.len();
    if count == 0 {
        return Err(EmissionError::FallsThrough);
    }

    let expected_ret = u16::from(returns_value);
    let mut depths: Vec<Option<u16>> = vec![None; count];
    let mut worklist: Vec<(usize, u16)> = vec![(0, 0)];
    for region in &body.regions {
        worklist.push((region.try_range.start, 0));
        worklist.push((region.handler_range.start, region.kind.entry_depth()));
        if let Some(filter) = region.filter_start {
            worklist.push((filter, 1));
        }
    }

    let mut max_stack = 0u16;
    while let Some((index, depth)) = worklist.pop() {
        if index >= count {
            return Err(EmissionError::InvalidBranch { index, target: index });
        }
        match depths[index] {
            Some(existing) if existing == depth => continue,
            Some(existing) => {
                return Err(EmissionError::MergeMismatch {
                    index,
                    existing,
                    incoming: depth,
                });
            }
            None => depths[index] = Some(depth),
        }

        let instruction = &body.instructions[index];
        let (pops, pushes) = stack_effect(module, instruction, index, expected_ret)?;
        if depth < pops {
            return Err(EmissionError::StackUnderflow {
                index,
                opcode: instruction.opcode.name(),
            });
        }
        let after = depth - pops + pushes;
        max_stack = max_stack.max(depth).max(after);

        match instruction.opcode.flow() {
            FlowControl::Next | FlowControl::Call => {
                if index + 1 >= count {
                    return Err(EmissionError::FallsThrough);
                }
                worklist.push((index + 1, after));
            }
            FlowControl::Branch => worklist.push((branch_target(instruction, index, count)?, after)),
            FlowControl::CondBranch => {
                if index + 1 >= count {
                    return Err(EmissionError::FallsThrough);
                }
                worklist.push((index + 1, after));
                worklist.push((branch_target(instruction, index, count)?, after));
            }
            FlowControl::Return => {
                if depth != expected_ret {
                    return Err(EmissionError::UnbalancedReturn {
                        index,
                        depth,
                        expected: expected_ret,
                    });
                }
            }
            FlowControl::Throw => {}
        }
    }

    Ok(max_stack)
}

fn branch_target(instruction: &Instruction, index: usize, count: usize) -> Result<usize, EmissionError>
{
    match instruction.target() {
        Some(target) if target < count => Ok(target),
        Some(target) => Err(EmissionError::InvalidBranch { index, target }),
        None => Err(EmissionError::InvalidBranch { index, target: count }),
    }
}

fn stack_effect(
    module: &Module,
    instruction: &Instruction,
    index: usize,
    expected_ret: u16,
) -> Result<(u16, u16), EmissionError>
{
    let opcode = instruction.opcode;
    if opcode == OpCode::Ret {
        return Ok((expected_ret, 0));
    }
    if matches!(opcode, OpCode::Call | OpCode::Callvirt | OpCode::Newobj) {
        let sig = instruction
            .token()
            .and_then(|token| method_sig(module, token))
            .ok_or(EmissionError::UnknownToken { index })?;
        return Ok(match opcode {
            OpCode::Newobj => (sig.params.len() as u16, 1),
            _ => (sig.stack_inputs() as u16, u16::from(!sig.ret.is_void())),
        });
    }
    if instruction.token().is_some_and(|token| !token_exists(module, token)) {
        return Err(EmissionError::UnknownToken { index });
    }

    let fixed = |effect: StackEffect| match effect {
        StackEffect::Fixed(n) => u16::from(n),
        StackEffect::Varies => 0,
    };
    Ok((fixed(opcode.pops()), fixed(opcode.pushes())))
}

fn method_sig(module: &Module, token: Token) -> Option<&MethodSig>
{
    let row = token.row()? as usize;
    match token.table() {
        Token::METHOD_DEF => module.methods().get(row).map(|method| &method.sig),
        Token::MEMBER_REF => module.member_refs().get(row).and_then(|member| member.sig.as_method()),
        _ => None,
    }
}

fn token_exists(module: &Module, token: Token) -> bool
{
    let Some(row) = token.row().map(|row| row as usize) else {
        return false;
    };
    match token.table() {
        Token::TYPE_REF => row < module.type_refs().len(),
        Token::TYPE_DEF => row < module.types().len(),
        Token::FIELD => row < module.fields().len(),
        Token::METHOD_DEF => row < module.methods().len(),
        Token::MEMBER_REF => row < module.member_refs().len(),
        _ => false,
    }
}
