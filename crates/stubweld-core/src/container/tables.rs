//! Metadata table layout.
//!
//! ```text
//! magic "SWMD" | u16 format version
//! module name  | version (4 x u16)
//! row counts   (assembly refs, type refs, types, fields, methods, member refs)
//! rows, table by table, in the order of the counts
//! ```
//!
//! Method rows carry the offset of their body in the instruction stream, or
//! `u32::MAX` when the method has no body.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};

use super::stream::{
    SigBounds, invalid, read_body, read_method_sig, read_string, read_type_sig, write_body, write_method_sig,
    write_string, write_type_sig,
};
use crate::metadata::{
    AssemblyRef, AssemblyRefId, FieldAttributes, FieldDef, MemberRef, MemberSig, MethodAttributes, MethodDef, Module,
    TypeDef, TypeId, TypeKind, TypeRef, TypeRefId, Version,
};

const MAGIC: &[u8; 4] = b"SWMD";
const FORMAT_VERSION: u16 = 1;
const NO_BODY: u32 = u32::MAX;

const MEMBER_METHOD: u8 = 0;
const MEMBER_FIELD: u8 = 1;

#[derive(Debug, Clone, Copy)]
struct Counts
{
    assembly_refs: u32,
    type_refs: u32,
    types: u32,
    fields: u32,
    methods: u32,
    member_refs: u32,
}

fn count(len: usize) -> io::Result<u32>
{
    u32::try_from(len).map_err(|_| invalid(format!("table too large: {len} rows")))
}

/// Encode `module` into metadata and instruction stream bytes.
pub(crate) fn encode(module: &Module) -> io::Result<(Vec<u8>, Vec<u8>)>
{
    let mut meta = Vec::new();
    let mut code = Vec::new();

    meta.extend_from_slice(MAGIC);
    meta.write_u16::<LE>(FORMAT_VERSION)?;
    write_string(&mut meta, module.name())?;
    write_version(&mut meta, module.version())?;

    for len in [
        module.assembly_refs().len(),
        module.type_refs().len(),
        module.types().len(),
        module.fields().len(),
        module.methods().len(),
        module.member_refs().len(),
    ] {
        meta.write_u32::<LE>(count(len)?)?;
    }

    for reference in module.assembly_refs() {
        write_string(&mut meta, &reference.name)?;
        write_version(&mut meta, reference.version)?;
    }

    for reference in module.type_refs() {
        meta.write_u32::<LE>(reference.scope.raw())?;
        write_string(&mut meta, &reference.namespace)?;
        write_string(&mut meta, &reference.name)?;
    }

    for def in module.types() {
        write_string(&mut meta, &def.namespace)?;
        write_string(&mut meta, &def.name)?;
        meta.write_u8(match def.kind {
            TypeKind::Class => 0,
            TypeKind::ValueType => 1,
            TypeKind::Interface => 2,
        })?;
        meta.write_u32::<LE>(def.enclosing.map_or(0, |outer| outer.raw() + 1))?;
        meta.write_u32::<LE>(def.fields.start)?;
        meta.write_u32::<LE>(def.fields.end - def.fields.start)?;
        meta.write_u32::<LE>(def.methods.start)?;
        meta.write_u32::<LE>(def.methods.end - def.methods.start)?;
    }

    for field in module.fields() {
        write_string(&mut meta, &field.name)?;
        meta.write_u16::<LE>(field.attributes.0)?;
        write_type_sig(&mut meta, &field.ty)?;
    }

    for method in module.methods() {
        write_string(&mut meta, &method.name)?;
        meta.write_u16::<LE>(method.attributes.0)?;
        write_method_sig(&mut meta, &method.sig)?;
        match &method.body {
            Some(body) => {
                meta.write_u32::<LE>(count(code.len())?)?;
                write_body(&mut code, body)?;
            }
            None => meta.write_u32::<LE>(NO_BODY)?,
        }
    }

    for member in module.member_refs() {
        meta.write_u32::<LE>(member.parent.raw())?;
        write_string(&mut meta, &member.name)?;
        match &member.sig {
            MemberSig::Method(sig) => {
                meta.write_u8(MEMBER_METHOD)?;
                write_method_sig(&mut meta, sig)?;
            }
            MemberSig::Field(ty) => {
                meta.write_u8(MEMBER_FIELD)?;
                write_type_sig(&mut meta, ty)?;
            }
        }
    }

    Ok((meta, code))
}

fn write_version(writer: &mut Vec<u8>, version: Version) -> io::Result<()>
{
    for part in [version.major, version.minor, version.build, version.revision] {
        writer.write_u16::<LE>(part)?;
    }
    Ok(())
}

fn read_version(reader: &mut Cursor<&[u8]>) -> io::Result<Version>
{
    Ok(Version {
        major: reader.read_u16::<LE>()?,
        minor: reader.read_u16::<LE>()?,
        build: reader.read_u16::<LE>()?,
        revision: reader.read_u16::<LE>()?,
    })
}

/// Decode a module from its metadata and instruction stream bytes.
pub(crate) fn decode(meta: &[u8], code: &[u8]) -> io::Result<Module>
{
    let mut reader = Cursor::new(meta);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid(format!("bad metadata magic {magic:02X?}")));
    }
    let format = reader.read_u16::<LE>()?;
    if format != FORMAT_VERSION {
        return Err(invalid(format!("unsupported metadata version {format}")));
    }

    let name = read_string(&mut reader)?;
    let version = read_version(&mut reader)?;
    let counts = Counts {
        assembly_refs: reader.read_u32::<LE>()?,
        type_refs: reader.read_u32::<LE>()?,
        types: reader.read_u32::<LE>()?,
        fields: reader.read_u32::<LE>()?,
        methods: reader.read_u32::<LE>()?,
        member_refs: reader.read_u32::<LE>()?,
    };
    // Every row takes at least one byte; reject counts the section cannot hold.
    let total = [
        counts.assembly_refs,
        counts.type_refs,
        counts.types,
        counts.fields,
        counts.methods,
        counts.member_refs,
    ]
    .iter()
    .map(|n| u64::from(*n))
    .sum::<u64>();
    if total > meta.len() as u64 {
        return Err(invalid(format!("row counts exceed section size ({total} rows)")));
    }

    let bounds = SigBounds {
        types: counts.types,
        type_refs: counts.type_refs,
    };
    let mut module = Module::new(name, version);

    for _ in 0..counts.assembly_refs {
        let name = read_string(&mut reader)?;
        let version = read_version(&mut reader)?;
        module.assembly_refs.push(AssemblyRef { name, version });
    }

    for _ in 0..counts.type_refs {
        let scope = reader.read_u32::<LE>()?;
        if scope >= counts.assembly_refs {
            return Err(invalid(format!("type ref scope {scope} out of range")));
        }
        module.type_refs.push(TypeRef {
            scope: AssemblyRefId::new(scope),
            namespace: read_string(&mut reader)?,
            name: read_string(&mut reader)?,
        });
    }

    for row in 0..counts.types {
        let namespace = read_string(&mut reader)?;
        let name = read_string(&mut reader)?;
        let kind = match reader.read_u8()? {
            0 => TypeKind::Class,
            1 => TypeKind::ValueType,
            2 => TypeKind::Interface,
            other => return Err(invalid(format!("unknown type kind {other}"))),
        };
        let enclosing = match reader.read_u32::<LE>()? {
            0 => None,
            outer if outer - 1 < counts.types && outer - 1 != row => Some(TypeId::new(outer - 1)),
            outer => return Err(invalid(format!("type {name} has invalid enclosing type {outer}"))),
        };
        let fields = read_range(&mut reader, counts.fields, "field")?;
        let methods = read_range(&mut reader, counts.methods, "method")?;
        module.types.push(TypeDef {
            namespace,
            name,
            kind,
            enclosing,
            fields,
            methods,
        });
    }

    check_enclosing_chains(&module.types)?;

    for _ in 0..counts.fields {
        let name = read_string(&mut reader)?;
        let attributes = FieldAttributes(reader.read_u16::<LE>()?);
        let ty = read_type_sig(&mut reader, bounds)?;
        module.fields.push(FieldDef { name, attributes, ty });
    }

    for _ in 0..counts.methods {
        let name = read_string(&mut reader)?;
        let attributes = MethodAttributes(reader.read_u16::<LE>()?);
        let sig = read_method_sig(&mut reader, bounds)?;
        let body = match reader.read_u32::<LE>()? {
            NO_BODY => None,
            offset => Some(read_body(code, offset, bounds)?),
        };
        module.methods.push(MethodDef {
            name,
            attributes,
            sig,
            body,
        });
    }

    for _ in 0..counts.member_refs {
        let parent = reader.read_u32::<LE>()?;
        if parent >= counts.type_refs {
            return Err(invalid(format!("member ref parent {parent} out of range")));
        }
        let name = read_string(&mut reader)?;
        let sig = match reader.read_u8()? {
            MEMBER_METHOD => MemberSig::Method(read_method_sig(&mut reader, bounds)?),
            MEMBER_FIELD => MemberSig::Field(read_type_sig(&mut reader, bounds)?),
            other => return Err(invalid(format!("unknown member ref kind {other}"))),
        };
        module.member_refs.push(MemberRef {
            parent: TypeRefId::new(parent),
            name,
            sig,
        });
    }

    if (reader.position() as usize) != meta.len() {
        return Err(invalid("trailing bytes after metadata tables"));
    }
    Ok(module)
}

/// Every enclosing chain must end within as many steps as there are types.
fn check_enclosing_chains(types: &[TypeDef]) -> io::Result<()>
{
    for (row, def) in types.iter().enumerate() {
        let mut current = def.enclosing;
        for _ in 0..types.len() {
            match current {
                Some(outer) => current = types[outer.index()].enclosing,
                None => break,
            }
        }
        if current.is_some() {
            return Err(invalid(format!("enclosing type cycle through type {row} ({})", def.name)));
        }
    }
    Ok(())
}

fn read_range(reader: &mut Cursor<&[u8]>, limit: u32, what: &str) -> io::Result<std::ops::Range<u32>>
{
    let start = reader.read_u32::<LE>()?;
    let len = reader.read_u32::<LE>()?;
    match start.checked_add(len) {
        Some(end) if end <= limit => Ok(start..end),
        _ => Err(invalid(format!("{what} range {start}+{len} exceeds table of {limit}"))),
    }
}
