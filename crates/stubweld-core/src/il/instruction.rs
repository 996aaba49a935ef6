//! Instructions and metadata tokens.

use std::fmt;

use super::opcode::{OpCode, OperandKind};
use crate::metadata::{FieldId, MemberRefId, MethodId, TypeId, TypeRefId};

/// Metadata token: table number in the high byte, one-based row below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u32);

impl Token
{
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD_DEF: u8 = 0x06;
    pub const MEMBER_REF: u8 = 0x0A;

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self
    {
        Self(raw)
    }

    const fn make(table: u8, index: u32) -> Self
    {
        Self(((table as u32) << 24) | (index + 1))
    }

    #[must_use]
    pub const fn type_ref(id: TypeRefId) -> Self
    {
        Self::make(Self::TYPE_REF, id.raw())
    }

    #[must_use]
    pub const fn type_def(id: TypeId) -> Self
    {
        Self::make(Self::TYPE_DEF, id.raw())
    }

    #[must_use]
    pub const fn field(id: FieldId) -> Self
    {
        Self::make(Self::FIELD, id.raw())
    }

    #[must_use]
    pub const fn method_def(id: MethodId) -> Self
    {
        Self::make(Self::METHOD_DEF, id.raw())
    }

    #[must_use]
    pub const fn member_ref(id: MemberRefId) -> Self
    {
        Self::make(Self::MEMBER_REF, id.raw())
    }

    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }

    #[must_use]
    pub const fn table(self) -> u8
    {
        (self.0 >> 24) as u8
    }

    /// Zero-based row, `None` for the null token of a table.
    #[must_use]
    pub const fn row(self) -> Option<u32>
    {
        match self.0 & 0x00FF_FFFF {
            0 => None,
            row => Some(row - 1),
        }
    }
}

impl fmt::Display for Token
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Decoded operand.
///
/// Branch targets are instruction indices in memory and byte offsets on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand
{
    None,
    Int32(i32),
    Int64(i64),
    Local(u16),
    Arg(u16),
    Token(Token),
    Target(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction
{
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction
{
    #[must_use]
    pub const fn simple(opcode: OpCode) -> Self
    {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    #[must_use]
    pub const fn with_token(opcode: OpCode, token: Token) -> Self
    {
        Self {
            opcode,
            operand: Operand::Token(token),
        }
    }

    /// `ldarg` in its shortest form.
    #[must_use]
    pub fn ldarg(index: u16) -> Self
    {
        match index {
            0 => Self::simple(OpCode::Ldarg0),
            1 => Self::simple(OpCode::Ldarg1),
            2 => Self::simple(OpCode::Ldarg2),
            3 => Self::simple(OpCode::Ldarg3),
            n if n <= 0xFF => Self::var(OpCode::LdargS, Operand::Arg(n)),
            n => Self::var(OpCode::Ldarg, Operand::Arg(n)),
        }
    }

    #[must_use]
    pub fn ldarga(index: u16) -> Self
    {
        if index <= 0xFF {
            Self::var(OpCode::LdargaS, Operand::Arg(index))
        } else {
            Self::var(OpCode::Ldarga, Operand::Arg(index))
        }
    }

    #[must_use]
    pub fn ldloc(index: u16) -> Self
    {
        match index {
            0 => Self::simple(OpCode::Ldloc0),
            1 => Self::simple(OpCode::Ldloc1),
            2 => Self::simple(OpCode::Ldloc2),
            3 => Self::simple(OpCode::Ldloc3),
            n if n <= 0xFF => Self::var(OpCode::LdlocS, Operand::Local(n)),
            n => Self::var(OpCode::Ldloc, Operand::Local(n)),
        }
    }

    #[must_use]
    pub fn stloc(index: u16) -> Self
    {
        match index {
            0 => Self::simple(OpCode::Stloc0),
            1 => Self::simple(OpCode::Stloc1),
            2 => Self::simple(OpCode::Stloc2),
            3 => Self::simple(OpCode::Stloc3),
            n if n <= 0xFF => Self::var(OpCode::StlocS, Operand::Local(n)),
            n => Self::var(OpCode::Stloc, Operand::Local(n)),
        }
    }

    #[must_use]
    pub fn ldloca(index: u16) -> Self
    {
        if index <= 0xFF {
            Self::var(OpCode::LdlocaS, Operand::Local(index))
        } else {
            Self::var(OpCode::Ldloca, Operand::Local(index))
        }
    }

    /// `ldc.i4` in its shortest form.
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self
    {
        let opcode = match value {
            -1 => OpCode::LdcI4M1,
            0 => OpCode::LdcI40,
            1 => OpCode::LdcI41,
            2 => OpCode::LdcI42,
            3 => OpCode::LdcI43,
            4 => OpCode::LdcI44,
            5 => OpCode::LdcI45,
            6 => OpCode::LdcI46,
            7 => OpCode::LdcI47,
            8 => OpCode::LdcI48,
            v if i8::try_from(v).is_ok() => {
                return Self {
                    opcode: OpCode::LdcI4S,
                    operand: Operand::Int32(v),
                };
            }
            v => {
                return Self {
                    opcode: OpCode::LdcI4,
                    operand: Operand::Int32(v),
                };
            }
        };
        Self::simple(opcode)
    }

    /// Branch to an instruction index, always in the long form.
    #[must_use]
    pub const fn branch(opcode: OpCode, target: usize) -> Self
    {
        Self {
            opcode,
            operand: Operand::Target(target),
        }
    }

    const fn var(opcode: OpCode, operand: Operand) -> Self
    {
        Self { opcode, operand }
    }

    /// Argument index read or written, including the implicit `ldarg.N` forms.
    #[must_use]
    pub fn arg_index(&self) -> Option<u16>
    {
        match (self.opcode, self.operand) {
            (OpCode::Ldarg0, _) => Some(0),
            (OpCode::Ldarg1, _) => Some(1),
            (OpCode::Ldarg2, _) => Some(2),
            (OpCode::Ldarg3, _) => Some(3),
            (_, Operand::Arg(n)) => Some(n),
            _ => None,
        }
    }

    /// Local index read or written, including the implicit `ldloc.N`/`stloc.N` forms.
    #[must_use]
    pub fn local_index(&self) -> Option<u16>
    {
        match (self.opcode, self.operand) {
            (OpCode::Ldloc0 | OpCode::Stloc0, _) => Some(0),
            (OpCode::Ldloc1 | OpCode::Stloc1, _) => Some(1),
            (OpCode::Ldloc2 | OpCode::Stloc2, _) => Some(2),
            (OpCode::Ldloc3 | OpCode::Stloc3, _) => Some(3),
            (_, Operand::Local(n)) => Some(n),
            _ => None,
        }
    }

    /// Constant pushed by an `ldc.i4` form.
    #[must_use]
    pub fn i4_value(&self) -> Option<i32>
    {
        match self.opcode {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI40 => Some(0),
            OpCode::LdcI41 => Some(1),
            OpCode::LdcI42 => Some(2),
            OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            OpCode::LdcI4S | OpCode::LdcI4 => match self.operand {
                Operand::Int32(v) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<Token>
    {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<usize>
    {
        match self.operand {
            Operand::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Encoded width in bytes.
    #[must_use]
    pub fn size(&self) -> usize
    {
        self.opcode.size() + self.opcode.operand_kind().size()
    }

    /// Whether the operand variant agrees with the opcode's operand kind.
    #[must_use]
    pub fn is_well_formed(&self) -> bool
    {
        match (self.opcode.operand_kind(), self.operand) {
            (OperandKind::None, Operand::None)
            | (OperandKind::Int8 | OperandKind::Int32, Operand::Int32(_))
            | (OperandKind::Int64, Operand::Int64(_))
            | (OperandKind::ShortVar | OperandKind::Var, Operand::Local(_) | Operand::Arg(_))
            | (OperandKind::Token, Operand::Token(_))
            | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Instruction
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::Int32(v) => write!(f, "{} {v}", self.opcode),
            Operand::Int64(v) => write!(f, "{} {v}", self.opcode),
            Operand::Local(n) => write!(f, "{} V_{n}", self.opcode),
            Operand::Arg(n) => write!(f, "{} A_{n}", self.opcode),
            Operand::Token(token) => write!(f, "{} {token}", self.opcode),
            Operand::Target(target) => write!(f, "{} IL_{target:04}", self.opcode),
        }
    }
}
