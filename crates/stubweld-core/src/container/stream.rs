//! Primitive encodings shared by the metadata tables and the instruction stream.
//!
//! Everything is little-endian. Strings are a `u16` byte length followed by
//! UTF-8. Failures surface as [`io::Error`]s with [`io::ErrorKind::InvalidData`]
//! so that truncation and malformed content travel through the same `?` path.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};

use crate::il::{ExceptionRegion, Instruction, MethodBody, OpCode, Operand, OperandKind, RegionKind, Token};
use crate::metadata::{MethodSig, TypeHandle, TypeId, TypeRefId, TypeSig};

/// Nesting limit for pointer and by-ref signatures.
const MAX_SIG_DEPTH: usize = 32;

const ELEMENT_VOID: u8 = 0x01;
const ELEMENT_BOOLEAN: u8 = 0x02;
const ELEMENT_I4: u8 = 0x08;
const ELEMENT_U4: u8 = 0x09;
const ELEMENT_I8: u8 = 0x0A;
const ELEMENT_U8: u8 = 0x0B;
const ELEMENT_R4: u8 = 0x0C;
const ELEMENT_R8: u8 = 0x0D;
const ELEMENT_STRING: u8 = 0x0E;
const ELEMENT_PTR: u8 = 0x0F;
const ELEMENT_BYREF: u8 = 0x10;
const ELEMENT_VALUETYPE: u8 = 0x11;
const ELEMENT_CLASS: u8 = 0x12;
const ELEMENT_I: u8 = 0x18;
const ELEMENT_U: u8 = 0x19;
const ELEMENT_OBJECT: u8 = 0x1C;

const HASTHIS: u8 = 0x20;
const INIT_LOCALS: u8 = 0x01;

pub(crate) fn invalid(message: impl Into<String>) -> io::Error
{
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn narrow<T: TryFrom<usize>>(value: usize, what: &str) -> io::Result<T>
{
    T::try_from(value).map_err(|_| invalid(format!("{what} too large: {value}")))
}

/// Row counts a signature may refer to.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SigBounds
{
    pub types: u32,
    pub type_refs: u32,
}

pub(crate) fn read_string(reader: &mut Cursor<&[u8]>) -> io::Result<String>
{
    let len = reader.read_u16::<LE>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| invalid(format!("string is not UTF-8: {err}")))
}

pub(crate) fn write_string(writer: &mut Vec<u8>, value: &str) -> io::Result<()>
{
    writer.write_u16::<LE>(narrow(value.len(), "string")?)?;
    writer.write_all(value.as_bytes())
}

pub(crate) fn read_type_sig(reader: &mut Cursor<&[u8]>, bounds: SigBounds) -> io::Result<TypeSig>
{
    read_type_sig_at(reader, bounds, 0)
}

fn read_type_sig_at(reader: &mut Cursor<&[u8]>, bounds: SigBounds, depth: usize) -> io::Result<TypeSig>
{
    if depth > MAX_SIG_DEPTH {
        return Err(invalid("signature nesting too deep"));
    }
    let element = reader.read_u8()?;
    Ok(match element {
        ELEMENT_VOID => TypeSig::Void,
        ELEMENT_BOOLEAN => TypeSig::Boolean,
        ELEMENT_I4 => TypeSig::Int32,
        ELEMENT_U4 => TypeSig::UInt32,
        ELEMENT_I8 => TypeSig::Int64,
        ELEMENT_U8 => TypeSig::UInt64,
        ELEMENT_R4 => TypeSig::Float32,
        ELEMENT_R8 => TypeSig::Float64,
        ELEMENT_STRING => TypeSig::String,
        ELEMENT_PTR => TypeSig::Ptr(Box::new(read_type_sig_at(reader, bounds, depth + 1)?)),
        ELEMENT_BYREF => TypeSig::ByRef(Box::new(read_type_sig_at(reader, bounds, depth + 1)?)),
        ELEMENT_VALUETYPE => TypeSig::ValueType(read_handle(reader, bounds)?),
        ELEMENT_CLASS => TypeSig::Class(read_handle(reader, bounds)?),
        ELEMENT_I => TypeSig::IntPtr,
        ELEMENT_U => TypeSig::UIntPtr,
        ELEMENT_OBJECT => TypeSig::Object,
        other => return Err(invalid(format!("unknown element type 0x{other:02X}"))),
    })
}

fn read_handle(reader: &mut Cursor<&[u8]>, bounds: SigBounds) -> io::Result<TypeHandle>
{
    let tag = reader.read_u8()?;
    let index = reader.read_u32::<LE>()?;
    match tag {
        0 if index < bounds.types => Ok(TypeHandle::Def(TypeId::new(index))),
        1 if index < bounds.type_refs => Ok(TypeHandle::Ref(TypeRefId::new(index))),
        0 | 1 => Err(invalid(format!("type handle {index} out of range"))),
        other => Err(invalid(format!("unknown type handle tag {other}"))),
    }
}

pub(crate) fn write_type_sig(writer: &mut Vec<u8>, sig: &TypeSig) -> io::Result<()>
{
    match sig {
        TypeSig::Void => writer.write_u8(ELEMENT_VOID),
        TypeSig::Boolean => writer.write_u8(ELEMENT_BOOLEAN),
        TypeSig::Int32 => writer.write_u8(ELEMENT_I4),
        TypeSig::UInt32 => writer.write_u8(ELEMENT_U4),
        TypeSig::Int64 => writer.write_u8(ELEMENT_I8),
        TypeSig::UInt64 => writer.write_u8(ELEMENT_U8),
        TypeSig::Float32 => writer.write_u8(ELEMENT_R4),
        TypeSig::Float64 => writer.write_u8(ELEMENT_R8),
        TypeSig::String => writer.write_u8(ELEMENT_STRING),
        TypeSig::Ptr(inner) => {
            writer.write_u8(ELEMENT_PTR)?;
            write_type_sig(writer, inner)
        }
        TypeSig::ByRef(inner) => {
            writer.write_u8(ELEMENT_BYREF)?;
            write_type_sig(writer, inner)
        }
        TypeSig::ValueType(handle) => {
            writer.write_u8(ELEMENT_VALUETYPE)?;
            write_handle(writer, *handle)
        }
        TypeSig::Class(handle) => {
            writer.write_u8(ELEMENT_CLASS)?;
            write_handle(writer, *handle)
        }
        TypeSig::IntPtr => writer.write_u8(ELEMENT_I),
        TypeSig::UIntPtr => writer.write_u8(ELEMENT_U),
        TypeSig::Object => writer.write_u8(ELEMENT_OBJECT),
    }
}

fn write_handle(writer: &mut Vec<u8>, handle: TypeHandle) -> io::Result<()>
{
    let (tag, index) = match handle {
        TypeHandle::Def(id) => (0, id.raw()),
        TypeHandle::Ref(id) => (1, id.raw()),
    };
    writer.write_u8(tag)?;
    writer.write_u32::<LE>(index)
}

pub(crate) fn read_method_sig(reader: &mut Cursor<&[u8]>, bounds: SigBounds) -> io::Result<MethodSig>
{
    let flags = reader.read_u8()?;
    let count = reader.read_u16::<LE>()?;
    let ret = read_type_sig(reader, bounds)?;
    let params = (0..count)
        .map(|_| read_type_sig(reader, bounds))
        .collect::<io::Result<_>>()?;
    Ok(MethodSig {
        has_this: flags & HASTHIS != 0,
        ret,
        params,
    })
}

pub(crate) fn write_method_sig(writer: &mut Vec<u8>, sig: &MethodSig) -> io::Result<()>
{
    writer.write_u8(if sig.has_this { HASTHIS } else { 0 })?;
    writer.write_u16::<LE>(narrow(sig.params.len(), "parameter count")?)?;
    write_type_sig(writer, &sig.ret)?;
    for param in &sig.params {
        write_type_sig(writer, param)?;
    }
    Ok(())
}

/// Append an encoded method body.
pub(crate) fn write_body(writer: &mut Vec<u8>, body: &MethodBody) -> io::Result<()>
{
    let offsets = body.offsets();
    writer.write_u16::<LE>(body.max_stack)?;
    writer.write_u8(if body.init_locals { INIT_LOCALS } else { 0 })?;
    writer.write_u16::<LE>(narrow(body.locals.len(), "local count")?)?;
    for local in &body.locals {
        write_type_sig(writer, local)?;
    }

    let code_size = offsets.last().copied().unwrap_or(0);
    writer.write_u32::<LE>(code_size)?;
    for (index, instruction) in body.instructions.iter().enumerate() {
        write_instruction(writer, instruction, &offsets, index)?;
    }

    let offset_of = |index: usize| {
        offsets
            .get(index)
            .copied()
            .ok_or_else(|| invalid(format!("exception region bound {index} outside the body")))
    };
    writer.write_u16::<LE>(narrow(body.regions.len(), "region count")?)?;
    for region in &body.regions {
        let kind = match region.kind {
            RegionKind::Catch => 0,
            RegionKind::Filter => 1,
            RegionKind::Finally => 2,
            RegionKind::Fault => 3,
        };
        let try_start = offset_of(region.try_range.start)?;
        let try_end = offset_of(region.try_range.end)?;
        let handler_start = offset_of(region.handler_range.start)?;
        let handler_end = offset_of(region.handler_range.end)?;
        let extra = match region.kind {
            RegionKind::Catch => region.class.map_or(0, Token::raw),
            RegionKind::Filter => offset_of(region.filter_start.unwrap_or(region.handler_range.start))?,
            RegionKind::Finally | RegionKind::Fault => 0,
        };
        writer.write_u8(kind)?;
        writer.write_u32::<LE>(try_start)?;
        writer.write_u32::<LE>(try_end.saturating_sub(try_start))?;
        writer.write_u32::<LE>(handler_start)?;
        writer.write_u32::<LE>(handler_end.saturating_sub(handler_start))?;
        writer.write_u32::<LE>(extra)?;
    }
    Ok(())
}

fn write_instruction(writer: &mut Vec<u8>, instruction: &Instruction, offsets: &[u32], index: usize) -> io::Result<()>
{
    if !instruction.is_well_formed() {
        return Err(invalid(format!("malformed operand for {instruction} at {index}")));
    }
    let code = instruction.opcode.code();
    if code > 0xFF {
        writer.write_u8(0xFE)?;
    }
    writer.write_u8((code & 0xFF) as u8)?;

    let next = i64::from(offsets[index + 1]);
    match (instruction.opcode.operand_kind(), instruction.operand) {
        (OperandKind::Int8, Operand::Int32(v)) => {
            let v = i8::try_from(v).map_err(|_| invalid(format!("{v} does not fit ldc.i4.s")))?;
            writer.write_i8(v)
        }
        (OperandKind::Int32, Operand::Int32(v)) => writer.write_i32::<LE>(v),
        (OperandKind::Int64, Operand::Int64(v)) => writer.write_i64::<LE>(v),
        (OperandKind::ShortVar, Operand::Local(n) | Operand::Arg(n)) => {
            writer.write_u8(narrow(n.into(), "short index")?)
        }
        (OperandKind::Var, Operand::Local(n) | Operand::Arg(n)) => writer.write_u16::<LE>(n),
        (OperandKind::Token, Operand::Token(token)) => writer.write_u32::<LE>(token.raw()),
        (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(target)) => {
            let destination = offsets
                .get(target)
                .copied()
                .ok_or_else(|| invalid(format!("branch at {index} targets {target}, outside the body")))?;
            let displacement = i64::from(destination) - next;
            if instruction.opcode.operand_kind() == OperandKind::ShortBranch {
                let short = i8::try_from(displacement)
                    .map_err(|_| invalid(format!("branch at {index} out of range for {}", instruction.opcode)))?;
                writer.write_i8(short)
            } else {
                let long = i32::try_from(displacement).map_err(|_| invalid("branch displacement overflow"))?;
                writer.write_i32::<LE>(long)
            }
        }
        _ => Ok(()),
    }
}

/// Decode the body starting at `offset` in the instruction stream.
pub(crate) fn read_body(code: &[u8], offset: u32, bounds: SigBounds) -> io::Result<MethodBody>
{
    let mut reader = Cursor::new(code);
    reader.set_position(u64::from(offset));

    let max_stack = reader.read_u16::<LE>()?;
    let flags = reader.read_u8()?;
    let local_count = reader.read_u16::<LE>()?;
    let locals = (0..local_count)
        .map(|_| read_type_sig(&mut reader, bounds))
        .collect::<io::Result<Vec<_>>>()?;

    let code_size = reader.read_u32::<LE>()? as usize;
    let start = reader.position() as usize;
    let end = start
        .checked_add(code_size)
        .filter(|end| *end <= code.len())
        .ok_or_else(|| invalid("method body runs past the instruction stream"))?;
    let (instructions, offsets) = read_instructions(&code[start..end])?;
    reader.set_position(end as u64);

    let index_of = |offset: u32| {
        offsets
            .binary_search(&offset)
            .map_err(|_| invalid(format!("offset {offset} is not an instruction boundary")))
    };

    let region_count = reader.read_u16::<LE>()?;
    let mut regions = Vec::with_capacity(region_count as usize);
    for _ in 0..region_count {
        let kind = match reader.read_u8()? {
            0 => RegionKind::Catch,
            1 => RegionKind::Filter,
            2 => RegionKind::Finally,
            3 => RegionKind::Fault,
            other => return Err(invalid(format!("unknown exception region kind {other}"))),
        };
        let try_start = reader.read_u32::<LE>()?;
        let try_len = reader.read_u32::<LE>()?;
        let handler_start = reader.read_u32::<LE>()?;
        let handler_len = reader.read_u32::<LE>()?;
        let extra = reader.read_u32::<LE>()?;
        regions.push(ExceptionRegion {
            kind,
            try_range: index_of(try_start)?..index_of(try_start.saturating_add(try_len))?,
            handler_range: index_of(handler_start)?..index_of(handler_start.saturating_add(handler_len))?,
            class: (kind == RegionKind::Catch && extra != 0).then_some(Token::from_raw(extra)),
            filter_start: if kind == RegionKind::Filter { Some(index_of(extra)?) } else { None },
        });
    }

    Ok(MethodBody {
        max_stack,
        init_locals: flags & INIT_LOCALS != 0,
        locals,
        instructions,
        regions,
    })
}

/// Decode raw code bytes. Returns the instructions and the byte offset of
/// each one, followed by the code size.
fn read_instructions(code: &[u8]) -> io::Result<(Vec<Instruction>, Vec<u32>)>
{
    let mut reader = Cursor::new(code);
    let mut instructions = Vec::new();
    let mut offsets = Vec::new();
    // Branch destinations stay as byte offsets until every boundary is known.
    let mut pending = Vec::new();

    while (reader.position() as usize) < code.len() {
        offsets.push(reader.position() as u32);
        let first = reader.read_u8()?;
        let raw = if first == 0xFE {
            0xFE00 | u16::from(reader.read_u8()?)
        } else {
            u16::from(first)
        };
        let opcode = OpCode::from_code(raw).ok_or_else(|| invalid(format!("unknown opcode 0x{raw:X}")))?;
        let is_arg = matches!(
            opcode,
            OpCode::LdargS | OpCode::LdargaS | OpCode::StargS | OpCode::Ldarg | OpCode::Ldarga
        );
        let var = |n: u16| if is_arg { Operand::Arg(n) } else { Operand::Local(n) };
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::Int8 => Operand::Int32(i32::from(reader.read_i8()?)),
            OperandKind::Int32 => Operand::Int32(reader.read_i32::<LE>()?),
            OperandKind::Int64 => Operand::Int64(reader.read_i64::<LE>()?),
            OperandKind::ShortVar => var(u16::from(reader.read_u8()?)),
            OperandKind::Var => var(reader.read_u16::<LE>()?),
            OperandKind::Token => Operand::Token(Token::from_raw(reader.read_u32::<LE>()?)),
            OperandKind::ShortBranch | OperandKind::Branch => {
                let displacement = if opcode.operand_kind() == OperandKind::ShortBranch {
                    i64::from(reader.read_i8()?)
                } else {
                    i64::from(reader.read_i32::<LE>()?)
                };
                let destination = reader.position() as i64 + displacement;
                pending.push((instructions.len(), destination));
                Operand::Target(0)
            }
        };
        instructions.push(Instruction { opcode, operand });
    }
    offsets.push(code.len() as u32);

    for (index, destination) in pending {
        let target = u32::try_from(destination)
            .ok()
            .and_then(|destination| offsets[..offsets.len() - 1].binary_search(&destination).ok())
            .ok_or_else(|| invalid(format!("branch at {index} lands inside an instruction")))?;
        instructions[index].operand = Operand::Target(target);
    }
    Ok((instructions, offsets))
}
