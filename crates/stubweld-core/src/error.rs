//! # Error Types
//!
//! Error handling for the patch pipeline.
//!
//! Errors are split by pipeline stage so callers can tell a corrupt input from
//! a missing symbol. The process exit status does not make that distinction:
//! every fatal [`PatchError`] maps to the same non-zero code.
//!
//! ## Error Categories
//!
//! 1. **Load errors**: unreadable paths, corrupt containers, missing host install
//! 2. **Resolution errors**: a named symbol is absent or has the wrong shape
//! 3. **Emission errors**: a synthesized body failed stack verification
//! 4. **Write errors**: the output could not be encoded or written

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A module or host installation could not be loaded.
///
/// Always fatal: the pipeline aborts before any mutation.
#[derive(Error, Debug)]
pub enum LoadError
{
    /// The file could not be read
    #[error("failed to read module {path}: {source}")]
    Unreadable
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not an object container the loader understands
    #[error("{path} is not a valid object container: {reason}")]
    InvalidContainer
    {
        path: PathBuf,
        reason: String,
    },

    /// The object container has no metadata section
    #[error("{path} carries no {section} section")]
    MissingSection
    {
        path: PathBuf,
        section: &'static str,
    },

    /// The metadata or instruction stream is malformed
    #[error("corrupt module {path}: {reason}")]
    Corrupt
    {
        path: PathBuf,
        reason: String,
    },

    /// None of the configured host layouts contained every reference module
    #[error("host installation not found under {root}; probed: {probed:?}")]
    HostNotFound
    {
        root: PathBuf,
        probed: Vec<PathBuf>,
    },
}

/// A named symbol could not be resolved.
///
/// Fatal when the symbol is foundational, otherwise the affected stub is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError
{
    /// No module with this name is loaded
    #[error("module {0} is not loaded")]
    ModuleNotLoaded(String),

    /// The type is absent from the module
    #[error("type {type_name} not found in {module}")]
    TypeNotFound
    {
        module: String,
        type_name: String,
    },

    /// No method with a matching name and shape exists on the type
    #[error("method {type_name}::{method} not found in {module}")]
    MethodNotFound
    {
        module: String,
        type_name: String,
        method: String,
    },

    /// The field is absent from the type and all of its nested types
    #[error("field {type_name}::{field} not found in {module}")]
    FieldNotFound
    {
        module: String,
        type_name: String,
        field: String,
    },

    /// The symbol exists but does not have the shape the template needs
    #[error("{symbol} has an unexpected shape: {reason}")]
    ShapeMismatch
    {
        symbol: String,
        reason: String,
    },
}

/// A synthesized body is not stack balanced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmissionError
{
    /// An instruction popped more values than the stack held
    #[error("stack underflow at instruction {index} ({opcode})")]
    StackUnderflow
    {
        index: usize,
        opcode: &'static str,
    },

    /// Two control-flow paths reach the same instruction with different depths
    #[error("stack depth mismatch at merge point {index}: {existing} vs {incoming}")]
    MergeMismatch
    {
        index: usize,
        existing: u16,
        incoming: u16,
    },

    /// `ret` executed with the wrong number of values on the stack
    #[error("return at instruction {index} leaves {depth} value(s) on the stack, expected {expected}")]
    UnbalancedReturn
    {
        index: usize,
        depth: u16,
        expected: u16,
    },

    /// A branch points outside the body
    #[error("branch at instruction {index} targets {target}, outside the body")]
    InvalidBranch
    {
        index: usize,
        target: usize,
    },

    /// Execution can run off the end of the body
    #[error("control falls off the end of the body")]
    FallsThrough,

    /// An operand token does not name a row in the module
    #[error("instruction {index} references an unknown token")]
    UnknownToken
    {
        index: usize,
    },

    /// A local or argument index does not fit the 16-bit operand
    #[error("{kind} index {index} exceeds the 16-bit limit")]
    IndexOverflow
    {
        kind: &'static str,
        index: usize,
    },
}

/// The patched module could not be written.
#[derive(Error, Debug)]
pub enum WriteError
{
    /// A table or body could not be encoded
    #[error("failed to encode module: {0}")]
    Encode(String),

    /// The object container could not be produced
    #[error("failed to build object container: {0}")]
    Container(String),

    /// The output file could not be written
    #[error("failed to write {path}: {source}")]
    Io
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Top-level pipeline error.
#[derive(Error, Debug)]
pub enum PatchError
{
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A foundational symbol is missing; no stub can be rewritten safely
    #[error("foundational symbol unavailable: {0}")]
    Foundational(#[from] ResolutionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Convenience alias for pipeline results
pub type PatchResult<T> = std::result::Result<T, PatchError>;
