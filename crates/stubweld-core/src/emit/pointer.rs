//! # Pointer Resolution
//!
//! Derives the native pointer behind a host object reference:
//!
//! 1. a null reference yields 0
//! 2. a nonzero cached pointer on the object is returned as is
//! 3. otherwise the object's instance id is fetched
//! 4. an id of 0 yields 0
//! 5. any other id goes through the host's id to pointer lookup
//!
//! The cache is consulted before the id so the warm path makes no calls, and
//! the lookup is never reached with a null object or a zero id. The lookup's
//! second argument is a type token the host ignores; `ldnull` is passed.
//!
//! Every branch target is entered with an empty evaluation stack.

use tracing::debug;

use super::BodyBuilder;
use crate::config::ObjectMarshalConfig;
use crate::error::{EmissionError, ResolutionError};
use crate::il::{Instruction, OpCode, Token};
use crate::import::Importer;
use crate::loader::ModuleSet;
use crate::metadata::{MemberRefId, ScalarClass, TypeSig};
use crate::resolve::{MethodShape, TypeLocation, require_field, require_method};

/// Host symbols used by the pointer resolution body, imported into the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerSymbols
{
    pub cache_field: MemberRefId,
    pub id_accessor: MemberRefId,
    pub lookup: MemberRefId,
    /// `Type::Method` of the lookup, for reporting
    pub lookup_name: String,
}

impl PointerSymbols
{
    /// Resolve the cache field, id accessor and lookup on the host object type
    /// at `location` and import them into the subject.
    ///
    /// ## Errors
    ///
    /// Returns a [`ResolutionError`] if a member is missing or has an
    /// unexpected signature.
    pub fn resolve(
        set: &mut ModuleSet,
        location: TypeLocation,
        config: &ObjectMarshalConfig,
    ) -> Result<Self, ResolutionError>
    {
        let reference = set.reference(location.module);
        let ty = location.ty;
        let type_name = reference.type_full_name(ty);
        let shape_error = |member: &str, reason: &str| ResolutionError::ShapeMismatch {
            symbol: format!("[{}]{type_name}::{member}", reference.name()),
            reason: reason.to_string(),
        };

        let cache_field = require_field(reference, ty, &config.cache_field)?;
        if reference.field(cache_field).ty.scalar_class() != Some(ScalarClass::Pointer) {
            return Err(shape_error(&config.cache_field, "cache field is not pointer sized"));
        }

        let id_accessor = require_method(reference, ty, &config.id_accessor, MethodShape::instance_with(0))?;
        if reference.method(id_accessor).sig.ret.scalar_class() != Some(ScalarClass::Int32) {
            return Err(shape_error(&config.id_accessor, "id accessor does not return int32"));
        }

        let lookup = require_method(reference, ty, &config.lookup, MethodShape::static_with(2))?;
        let lookup_sig = &reference.method(lookup).sig;
        let lookup_matches = lookup_sig.ret.scalar_class() == Some(ScalarClass::Pointer)
            && lookup_sig.params[0].scalar_class() == Some(ScalarClass::Int32)
            && lookup_sig.params[1].is_reference();
        if !lookup_matches {
            return Err(shape_error(&config.lookup, "lookup is not (int32, type) -> pointer"));
        }
        let lookup_name = format!("{type_name}::{}", config.lookup);

        let (subject, reference) = set.split_mut(location.module);
        let mut importer = Importer::new(subject, reference);
        let symbols = Self {
            cache_field: importer.import_field(cache_field)?,
            id_accessor: importer.import_method(id_accessor)?,
            lookup: importer.import_method(lookup)?,
            lookup_name,
        };
        debug!(module = reference.name(), lookup = %symbols.lookup_name, "pointer resolution symbols resolved");
        Ok(symbols)
    }
}

/// Emit the complete pointer resolution body for a static stub taking the
/// object as argument 0.
///
/// ## Errors
///
/// Fails if the body has no room for the two locals.
pub fn emit_pointer_resolution(builder: &mut BodyBuilder, symbols: &PointerSymbols) -> Result<(), EmissionError>
{
    let cached = builder.declare_local(TypeSig::IntPtr)?;
    let id = builder.declare_local(TypeSig::Int32)?;
    let check_cache = builder.define_label();
    let fetch_id = builder.define_label();
    let lookup = builder.define_label();

    // null reference
    builder.emit(Instruction::ldarg(0)).branch(OpCode::Brtrue, check_cache);
    return_zero(builder);

    builder.mark(check_cache);
    builder
        .emit(Instruction::ldarg(0))
        .op_token(OpCode::Ldfld, Token::member_ref(symbols.cache_field))
        .emit(Instruction::stloc(cached))
        .emit(Instruction::ldloc(cached))
        .branch(OpCode::Brfalse, fetch_id)
        .emit(Instruction::ldloc(cached))
        .op(OpCode::Ret);

    builder.mark(fetch_id);
    builder
        .emit(Instruction::ldarg(0))
        .op_token(OpCode::Callvirt, Token::member_ref(symbols.id_accessor))
        .emit(Instruction::stloc(id))
        .emit(Instruction::ldloc(id))
        .branch(OpCode::Brtrue, lookup);
    return_zero(builder);

    builder.mark(lookup);
    builder
        .emit(Instruction::ldloc(id))
        .op(OpCode::Ldnull)
        .op_token(OpCode::Call, Token::member_ref(symbols.lookup))
        .op(OpCode::Ret);
    Ok(())
}

fn return_zero(builder: &mut BodyBuilder)
{
    builder.emit(Instruction::ldc_i4(0)).op(OpCode::ConvI).op(OpCode::Ret);
}
