//! # Module Container
//!
//! Modules travel as ordinary object files (ELF, COFF or Mach-O) carrying
//! three sections:
//!
//! - `.smeta`: the metadata tables
//! - `.sil`: method bodies
//! - `.sdbg`: an optional debug stream, kept on load and never written
//!
//! The object file itself is parsed and produced with the `object` crate; the
//! section contents use the little-endian layouts in [`tables`] and [`stream`].

mod stream;
mod tables;

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use object::write::{Object as ObjectWriter, StandardSegment};
use object::{Architecture, BinaryFormat, Endianness, Object, ObjectSection, SectionKind};
use tracing::debug;

use crate::error::{LoadError, WriteError};
use crate::metadata::{Module, ModuleAccess};

pub const METADATA_SECTION: &str = ".smeta";
pub const CODE_SECTION: &str = ".sil";
pub const DEBUG_SECTION: &str = ".sdbg";

/// Object file flavour of a loaded module, reused when writing it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerKind
{
    pub format: BinaryFormat,
    pub architecture: Architecture,
    pub endianness: Endianness,
}

impl Default for ContainerKind
{
    fn default() -> Self
    {
        Self {
            format: BinaryFormat::Elf,
            architecture: Architecture::X86_64,
            endianness: Endianness::Little,
        }
    }
}

impl ContainerKind
{
    /// The closest flavour the object writer can produce.
    ///
    /// PE images are written as COFF objects; anything else unsupported falls
    /// back to ELF.
    #[must_use]
    pub fn writable(self) -> Self
    {
        let format = match self.format {
            BinaryFormat::Elf | BinaryFormat::Coff | BinaryFormat::MachO => self.format,
            BinaryFormat::Pe => BinaryFormat::Coff,
            _ => BinaryFormat::Elf,
        };
        Self { format, ..self }
    }
}

/// Read and decode the module at `path`.
///
/// ## Errors
///
/// Returns a [`LoadError`] if the file cannot be read or is not a valid container.
pub fn read_module(path: &Path, access: ModuleAccess) -> Result<Module, LoadError>
{
    let data = fs::read(path).map_err(|source| LoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut module = parse_module(path, &data)?;
    module.set_origin(path.to_path_buf(), access);
    debug!(
        module = module.name(),
        path = %path.display(),
        types = module.types().len(),
        methods = module.methods().len(),
        "loaded module"
    );
    Ok(module)
}

/// Decode a module from container bytes. `path` is only used in errors.
///
/// ## Errors
///
/// Returns a [`LoadError`] if the container or its sections are malformed.
pub fn parse_module(path: &Path, data: &[u8]) -> Result<Module, LoadError>
{
    let file = object::File::parse(data).map_err(|err| LoadError::InvalidContainer {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let kind = ContainerKind {
        format: file.format(),
        architecture: file.architecture(),
        endianness: if file.is_little_endian() {
            Endianness::Little
        } else {
            Endianness::Big
        },
    };

    let metadata = section_bytes(&file, path, METADATA_SECTION)?.ok_or_else(|| LoadError::MissingSection {
        path: path.to_path_buf(),
        section: METADATA_SECTION,
    })?;
    let code = section_bytes(&file, path, CODE_SECTION)?.unwrap_or_default();
    let debug_stream = section_bytes(&file, path, DEBUG_SECTION)?;

    let mut module = tables::decode(&metadata, &code).map_err(|err| LoadError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    module.set_container(kind);
    module.set_debug_stream(debug_stream);
    Ok(module)
}

fn section_bytes(file: &object::File<'_>, path: &Path, name: &str) -> Result<Option<Vec<u8>>, LoadError>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(None);
    };
    let data = section.uncompressed_data().map_err(|err| LoadError::InvalidContainer {
        path: path.to_path_buf(),
        reason: format!("failed to read {name}: {err}"),
    })?;
    Ok(Some(match data {
        Cow::Borrowed(bytes) => bytes.to_vec(),
        Cow::Owned(vec) => vec,
    }))
}

/// Encode `module` into container bytes.
///
/// The debug stream is never written. Encoding is deterministic, so identical
/// modules always produce identical bytes.
///
/// ## Errors
///
/// Returns a [`WriteError`] if a table, body or the object file cannot be encoded.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, WriteError>
{
    let (metadata, code) = tables::encode(module).map_err(|err| WriteError::Encode(err.to_string()))?;

    let kind = module.container().writable();
    let mut object = ObjectWriter::new(kind.format, kind.architecture, kind.endianness);
    let segment = object.segment_name(StandardSegment::Data).to_vec();

    let metadata_section = object.add_section(
        segment.clone(),
        METADATA_SECTION.as_bytes().to_vec(),
        SectionKind::ReadOnlyData,
    );
    object.append_section_data(metadata_section, &metadata, 1);
    let code_section = object.add_section(segment, CODE_SECTION.as_bytes().to_vec(), SectionKind::ReadOnlyData);
    object.append_section_data(code_section, &code, 1);

    object.write().map_err(|err| WriteError::Container(err.to_string()))
}
