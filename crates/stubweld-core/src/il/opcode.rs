//! Opcode table.
//!
//! Only the opcodes the synthesizer emits, plus the ones that appear in stub
//! bodies, are modelled. Encodings follow ECMA-335 Partition III; two-byte
//! opcodes carry the `0xFE` prefix in their high byte.

use std::fmt;

/// Inline operand that follows the opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind
{
    None,
    /// Signed 8-bit constant
    Int8,
    Int32,
    Int64,
    /// 8-bit local or argument index
    ShortVar,
    /// 16-bit local or argument index
    Var,
    /// 32-bit metadata token
    Token,
    /// 8-bit signed branch displacement
    ShortBranch,
    /// 32-bit signed branch displacement
    Branch,
}

impl OperandKind
{
    /// Encoded operand width in bytes.
    #[must_use]
    pub const fn size(self) -> usize
    {
        match self {
            OperandKind::None => 0,
            OperandKind::Int8 | OperandKind::ShortVar | OperandKind::ShortBranch => 1,
            OperandKind::Var => 2,
            OperandKind::Int32 | OperandKind::Token | OperandKind::Branch => 4,
            OperandKind::Int64 => 8,
        }
    }
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl
{
    Next,
    Call,
    Branch,
    CondBranch,
    Return,
    Throw,
}

/// Number of stack slots an instruction pops or pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect
{
    Fixed(u8),
    /// Depends on the called signature or the enclosing method's return type
    Varies,
}

macro_rules! stack {
    (var) => {
        StackEffect::Varies
    };
    ($n:literal) => {
        StackEffect::Fixed($n)
    };
}

macro_rules! opcodes {
    ($($variant:ident = $code:literal, $name:literal, $operand:ident, $flow:ident, $pop:tt, $push:tt;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode
        {
            $($variant,)*
        }

        impl OpCode
        {
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant,)*];

            /// Numeric encoding, `0xFExx` for two-byte opcodes.
            #[must_use]
            pub const fn code(self) -> u16
            {
                match self {
                    $(OpCode::$variant => $code,)*
                }
            }

            #[must_use]
            pub const fn from_code(code: u16) -> Option<OpCode>
            {
                match code {
                    $($code => Some(OpCode::$variant),)*
                    _ => None,
                }
            }

            /// ILAsm mnemonic.
            #[must_use]
            pub const fn name(self) -> &'static str
            {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            #[must_use]
            pub const fn operand_kind(self) -> OperandKind
            {
                match self {
                    $(OpCode::$variant => OperandKind::$operand,)*
                }
            }

            #[must_use]
            pub const fn flow(self) -> FlowControl
            {
                match self {
                    $(OpCode::$variant => FlowControl::$flow,)*
                }
            }

            #[must_use]
            pub const fn pops(self) -> StackEffect
            {
                match self {
                    $(OpCode::$variant => stack!($pop),)*
                }
            }

            #[must_use]
            pub const fn pushes(self) -> StackEffect
            {
                match self {
                    $(OpCode::$variant => stack!($push),)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, Next, 0, 0;
    Ldarg0 = 0x02, "ldarg.0", None, Next, 0, 1;
    Ldarg1 = 0x03, "ldarg.1", None, Next, 0, 1;
    Ldarg2 = 0x04, "ldarg.2", None, Next, 0, 1;
    Ldarg3 = 0x05, "ldarg.3", None, Next, 0, 1;
    Ldloc0 = 0x06, "ldloc.0", None, Next, 0, 1;
    Ldloc1 = 0x07, "ldloc.1", None, Next, 0, 1;
    Ldloc2 = 0x08, "ldloc.2", None, Next, 0, 1;
    Ldloc3 = 0x09, "ldloc.3", None, Next, 0, 1;
    Stloc0 = 0x0A, "stloc.0", None, Next, 1, 0;
    Stloc1 = 0x0B, "stloc.1", None, Next, 1, 0;
    Stloc2 = 0x0C, "stloc.2", None, Next, 1, 0;
    Stloc3 = 0x0D, "stloc.3", None, Next, 1, 0;
    LdargS = 0x0E, "ldarg.s", ShortVar, Next, 0, 1;
    LdargaS = 0x0F, "ldarga.s", ShortVar, Next, 0, 1;
    StargS = 0x10, "starg.s", ShortVar, Next, 1, 0;
    LdlocS = 0x11, "ldloc.s", ShortVar, Next, 0, 1;
    LdlocaS = 0x12, "ldloca.s", ShortVar, Next, 0, 1;
    StlocS = 0x13, "stloc.s", ShortVar, Next, 1, 0;
    Ldnull = 0x14, "ldnull", None, Next, 0, 1;
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Next, 0, 1;
    LdcI40 = 0x16, "ldc.i4.0", None, Next, 0, 1;
    LdcI41 = 0x17, "ldc.i4.1", None, Next, 0, 1;
    LdcI42 = 0x18, "ldc.i4.2", None, Next, 0, 1;
    LdcI43 = 0x19, "ldc.i4.3", None, Next, 0, 1;
    LdcI44 = 0x1A, "ldc.i4.4", None, Next, 0, 1;
    LdcI45 = 0x1B, "ldc.i4.5", None, Next, 0, 1;
    LdcI46 = 0x1C, "ldc.i4.6", None, Next, 0, 1;
    LdcI47 = 0x1D, "ldc.i4.7", None, Next, 0, 1;
    LdcI48 = 0x1E, "ldc.i4.8", None, Next, 0, 1;
    LdcI4S = 0x1F, "ldc.i4.s", Int8, Next, 0, 1;
    LdcI4 = 0x20, "ldc.i4", Int32, Next, 0, 1;
    LdcI8 = 0x21, "ldc.i8", Int64, Next, 0, 1;
    Dup = 0x25, "dup", None, Next, 1, 2;
    Pop = 0x26, "pop", None, Next, 1, 0;
    Call = 0x28, "call", Token, Call, var, var;
    Ret = 0x2A, "ret", None, Return, var, 0;
    BrS = 0x2B, "br.s", ShortBranch, Branch, 0, 0;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch, CondBranch, 1, 0;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch, CondBranch, 1, 0;
    Br = 0x38, "br", Branch, Branch, 0, 0;
    Brfalse = 0x39, "brfalse", Branch, CondBranch, 1, 0;
    Brtrue = 0x3A, "brtrue", Branch, CondBranch, 1, 0;
    ConvI8 = 0x6A, "conv.i8", None, Next, 1, 1;
    Callvirt = 0x6F, "callvirt", Token, Call, var, var;
    Newobj = 0x73, "newobj", Token, Call, var, 1;
    Throw = 0x7A, "throw", None, Throw, 1, 0;
    Ldfld = 0x7B, "ldfld", Token, Next, 1, 1;
    Ldflda = 0x7C, "ldflda", Token, Next, 1, 1;
    Stfld = 0x7D, "stfld", Token, Next, 2, 0;
    ConvI = 0xD3, "conv.i", None, Next, 1, 1;
    ConvU = 0xE0, "conv.u", None, Next, 1, 1;
    Ceq = 0xFE01, "ceq", None, Next, 2, 1;
    Ldarg = 0xFE09, "ldarg", Var, Next, 0, 1;
    Ldarga = 0xFE0A, "ldarga", Var, Next, 0, 1;
    Ldloc = 0xFE0C, "ldloc", Var, Next, 0, 1;
    Ldloca = 0xFE0D, "ldloca", Var, Next, 0, 1;
    Stloc = 0xFE0E, "stloc", Var, Next, 1, 0;
    Initobj = 0xFE15, "initobj", Token, Next, 1, 0;
}

impl OpCode
{
    /// Encoded opcode width in bytes.
    #[must_use]
    pub const fn size(self) -> usize
    {
        if self.code() > 0xFF { 2 } else { 1 }
    }

    #[must_use]
    pub const fn is_branch(self) -> bool
    {
        matches!(self.flow(), FlowControl::Branch | FlowControl::CondBranch)
    }

    /// Ends a basic block without falling through to the next instruction.
    #[must_use]
    pub const fn is_terminator(self) -> bool
    {
        matches!(self.flow(), FlowControl::Branch | FlowControl::Return | FlowControl::Throw)
    }
}

impl fmt::Display for OpCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}
