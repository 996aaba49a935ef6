//! Method bodies and exception regions.

use std::ops::Range;

use super::instruction::{Instruction, Token};
use crate::metadata::TypeSig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind
{
    Catch,
    Filter,
    Finally,
    Fault,
}

impl RegionKind
{
    /// Evaluation stack depth on entry to the handler.
    #[must_use]
    pub const fn entry_depth(self) -> u16
    {
        match self {
            RegionKind::Catch | RegionKind::Filter => 1,
            RegionKind::Finally | RegionKind::Fault => 0,
        }
    }
}

/// A protected region with its handler. Ranges are instruction indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion
{
    pub kind: RegionKind,
    pub try_range: Range<usize>,
    pub handler_range: Range<usize>,
    /// Caught type for `Catch`
    pub class: Option<Token>,
    /// First filter instruction for `Filter`
    pub filter_start: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody
{
    pub max_stack: u16,
    pub init_locals: bool,
    pub locals: Vec<TypeSig>,
    pub instructions: Vec<Instruction>,
    pub regions: Vec<ExceptionRegion>,
}

impl MethodBody
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Drop instructions, locals and exception regions.
    pub fn clear(&mut self)
    {
        self.instructions.clear();
        self.locals.clear();
        self.regions.clear();
        self.max_stack = 0;
        self.init_locals = false;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.instructions.is_empty()
    }

    /// Byte offset of every instruction, followed by the code size.
    #[must_use]
    pub fn offsets(&self) -> Vec<u32>
    {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0u32;
        offsets.push(0);
        for instruction in &self.instructions {
            offset += instruction.size() as u32;
            offsets.push(offset);
        }
        offsets
    }

    #[must_use]
    pub fn code_size(&self) -> u32
    {
        self.instructions.iter().map(|i| i.size() as u32).sum()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::il::OpCode;

    #[test]
    fn test_clear_resets_everything()
    {
        let mut body = MethodBody {
            max_stack: 3,
            init_locals: true,
            locals: vec![TypeSig::IntPtr],
            instructions: vec![Instruction::simple(OpCode::Ret)],
            regions: vec![ExceptionRegion {
                kind: RegionKind::Finally,
                try_range: 0..1,
                handler_range: 1..1,
                class: None,
                filter_start: None,
            }],
        };
        body.clear();
        assert_eq!(body, MethodBody::new());
    }

    #[test]
    fn test_offsets()
    {
        let body = MethodBody {
            instructions: vec![
                Instruction::ldarg(0),
                Instruction::branch(OpCode::Brtrue, 3),
                Instruction::ldc_i4(0x1000),
                Instruction::simple(OpCode::Ret),
            ],
            ..MethodBody::default()
        };
        assert_eq!(body.offsets(), vec![0, 1, 6, 11, 12]);
        assert_eq!(body.code_size(), 12);
    }
}
