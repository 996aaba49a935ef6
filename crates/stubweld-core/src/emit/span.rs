//! # Struct-ABI Translation
//!
//! The subject module and the host each define a (pointer, length) value
//! type. They are laid out identically but live in different modules, so a
//! subject value cannot be passed where the host expects its own wrapper.
//!
//! The translation copies the two scalar fields into a local of the host type
//! through the host type's two-argument constructor:
//!
//! ```text
//! ldloca  wrapper
//! ldarg   span
//! ldfld   pointer
//! ldarg   span
//! ldfld   length
//! call    instance void Wrapper::.ctor(void*, int32)
//! ```
//!
//! The local is then passed by address or by value depending on the host
//! parameter. The underlying buffer is never copied.

use tracing::debug;

use super::BodyBuilder;
use crate::config::WrapperConfig;
use crate::error::{EmissionError, ResolutionError};
use crate::il::{Instruction, OpCode, Token};
use crate::import::Importer;
use crate::loader::ModuleSet;
use crate::metadata::{FieldId, MemberRefId, MethodId, Module, ScalarClass, TypeHandle, TypeId, TypeRefId, TypeSig};
use crate::resolve::{MethodShape, require_method, require_type};

/// Resolved symbols for translating subject spans into host wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanTranslation
{
    /// Span-like type in the subject module
    pub subject_type: TypeId,
    pub pointer_field: FieldId,
    pub length_field: FieldId,
    /// Host wrapper, imported into the subject
    pub wrapper: TypeRefId,
    /// Host wrapper constructor, imported into the subject
    pub ctor: MemberRefId,
}

impl SpanTranslation
{
    /// Resolve both wrapper types and import the host constructor.
    ///
    /// ## Errors
    ///
    /// Any failure here is foundational: without the wrapper pair no stub can
    /// be rewritten.
    pub fn prepare(set: &mut ModuleSet, config: &WrapperConfig) -> Result<Self, ResolutionError>
    {
        let subject_type = require_type(set.subject(), &config.subject_type)?;
        let module = set
            .ensure_loaded(&config.reference_module)
            .ok_or_else(|| ResolutionError::ModuleNotLoaded(config.reference_module.clone()))?;

        let reference = set.reference(module);
        let reference_type = require_type(reference, &config.reference_type)?;
        let ctor = require_method(reference, reference_type, ".ctor", MethodShape::instance_with(2))?;
        let (pointer_field, length_field) =
            check_structural_identity(set.subject(), subject_type, reference, reference_type, ctor)?;

        let (subject, reference) = set.split_mut(module);
        let mut importer = Importer::new(subject, reference);
        let wrapper = importer.import_type(reference_type);
        let ctor = importer.import_method(ctor)?;

        debug!(
            subject_type = %config.subject_type,
            host_type = %config.reference_type,
            "wrapper pair resolved"
        );
        Ok(Self {
            subject_type,
            pointer_field,
            length_field,
            wrapper,
            ctor,
        })
    }

    /// Whether a stub parameter of type `sig` needs translating.
    #[must_use]
    pub fn is_span(&self, sig: &TypeSig) -> bool
    {
        *sig == TypeSig::ValueType(TypeHandle::Def(self.subject_type))
    }

    /// Emit the translation of argument `arg` and leave the host wrapper on
    /// the stack, by address when `by_ref` is set. Returns the wrapper local.
    ///
    /// ## Errors
    ///
    /// Fails if the body has no room for another local.
    pub fn emit(&self, builder: &mut BodyBuilder, arg: u16, by_ref: bool) -> Result<u16, EmissionError>
    {
        let local = builder.declare_local(TypeSig::ValueType(TypeHandle::Ref(self.wrapper)))?;
        builder
            .emit(Instruction::ldloca(local))
            .emit(Instruction::ldarg(arg))
            .op_token(OpCode::Ldfld, Token::field(self.pointer_field))
            .emit(Instruction::ldarg(arg))
            .op_token(OpCode::Ldfld, Token::field(self.length_field))
            .op_token(OpCode::Call, Token::member_ref(self.ctor));
        if by_ref {
            builder.emit(Instruction::ldloca(local));
        } else {
            builder.emit(Instruction::ldloc(local));
        }
        Ok(local)
    }
}

/// Check that two value types share the (pointer, length) layout and that
/// `ctor` accepts exactly those two scalars.
///
/// Returns the subject type's pointer and length fields.
///
/// ## Errors
///
/// Returns [`ResolutionError::ShapeMismatch`] naming the first difference.
pub fn check_structural_identity(
    subject: &Module,
    subject_type: TypeId,
    reference: &Module,
    reference_type: TypeId,
    ctor: MethodId,
) -> Result<(FieldId, FieldId), ResolutionError>
{
    let subject_fields = pair_layout(subject, subject_type)?;
    let reference_fields = pair_layout(reference, reference_type)?;
    if subject_fields.2 != reference_fields.2 {
        return Err(mismatch(
            reference,
            reference_type,
            format!(
                "length field is {:?} but {} uses {:?}",
                reference_fields.2,
                subject.type_full_name(subject_type),
                subject_fields.2
            ),
        ));
    }

    let params = &reference.method(ctor).sig.params;
    let ctor_matches = params.len() == 2
        && params[0].scalar_class() == Some(ScalarClass::Pointer)
        && params[1].scalar_class() == Some(reference_fields.2);
    if !ctor_matches {
        return Err(mismatch(
            reference,
            reference_type,
            "constructor does not take (pointer, length)".to_string(),
        ));
    }
    Ok((subject_fields.0, subject_fields.1))
}

fn pair_layout(module: &Module, ty: TypeId) -> Result<(FieldId, FieldId, ScalarClass), ResolutionError>
{
    if !module.ty(ty).is_value_type() {
        return Err(mismatch(module, ty, "not a value type".to_string()));
    }
    let fields: Vec<_> = module
        .type_fields(ty)
        .filter(|(_, field)| !field.attributes.is_static())
        .collect();
    let [(pointer, pointer_def), (length, length_def)] = fields.as_slice() else {
        return Err(mismatch(module, ty, format!("expected 2 instance fields, found {}", fields.len())));
    };
    if pointer_def.ty.scalar_class() != Some(ScalarClass::Pointer) {
        return Err(mismatch(module, ty, format!("first field has type {}", pointer_def.ty)));
    }
    match length_def.ty.scalar_class() {
        Some(class @ (ScalarClass::Int32 | ScalarClass::Int64)) => Ok((*pointer, *length, class)),
        _ => Err(mismatch(module, ty, format!("second field has type {}", length_def.ty))),
    }
}

fn mismatch(module: &Module, ty: TypeId, reason: String) -> ResolutionError
{
    ResolutionError::ShapeMismatch {
        symbol: format!("[{}]{}", module.name(), module.type_full_name(ty)),
        reason,
    }
}
