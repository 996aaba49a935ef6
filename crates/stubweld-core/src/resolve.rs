//! # Symbol Resolver
//!
//! Name-based lookup of types, methods and fields inside one loaded module.
//!
//! Lookups return `Option`: a miss is an ordinary outcome that callers decide
//! how to treat. The `require_*` wrappers turn a miss into a
//! [`ResolutionError`] carrying the module and symbol names.
//!
//! Names are fully qualified and case-sensitive. Nested types are written
//! `Namespace.Outer/Inner`. When several definitions match, the first one in
//! table order wins.

use tracing::trace;

use crate::error::ResolutionError;
use crate::loader::ModuleSet;
use crate::metadata::{FieldId, MethodDef, MethodId, Module, TypeId, TypeRefId};

/// Constraints a method must satisfy besides its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodShape
{
    /// Number of declared parameters, excluding `this`
    pub param_count: Option<usize>,
    /// `Some(true)` for static methods only, `Some(false)` for instance methods only
    pub is_static: Option<bool>,
}

impl MethodShape
{
    /// Matches any method.
    #[must_use]
    pub const fn any() -> Self
    {
        Self {
            param_count: None,
            is_static: None,
        }
    }

    #[must_use]
    pub const fn with_params(param_count: usize) -> Self
    {
        Self {
            param_count: Some(param_count),
            is_static: None,
        }
    }

    #[must_use]
    pub const fn static_with(param_count: usize) -> Self
    {
        Self {
            param_count: Some(param_count),
            is_static: Some(true),
        }
    }

    #[must_use]
    pub const fn instance_with(param_count: usize) -> Self
    {
        Self {
            param_count: Some(param_count),
            is_static: Some(false),
        }
    }

    #[must_use]
    pub fn matches(&self, method: &MethodDef) -> bool
    {
        self.param_count.is_none_or(|count| method.sig.params.len() == count)
            && self.is_static.is_none_or(|is_static| method.is_static() == is_static)
    }
}

/// A type definition inside one of the reference modules of a [`ModuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLocation
{
    pub module: usize,
    pub ty: TypeId,
}

pub fn find_type(module: &Module, qualified_name: &str) -> Option<TypeId>
{
    let found = module.lookup_type(qualified_name);
    trace!(module = module.name(), type_name = qualified_name, found = found.is_some(), "find_type");
    found
}

/// First method of `ty` named `name` that also satisfies `shape`.
pub fn find_method(module: &Module, ty: TypeId, name: &str, shape: MethodShape) -> Option<MethodId>
{
    module
        .type_methods(ty)
        .find(|(_, method)| method.name == name && shape.matches(method))
        .map(|(id, _)| id)
}

/// Field of `ty` named `name`, falling back to the types nested inside it.
pub fn find_field(module: &Module, ty: TypeId, name: &str) -> Option<FieldId>
{
    if let Some((id, _)) = module.type_fields(ty).find(|(_, field)| field.name == name) {
        return Some(id);
    }
    module.nested_types(ty).find_map(|nested| {
        let nested = module.lookup_type(&module.type_full_name(nested))?;
        find_field(module, nested, name)
    })
}

pub fn require_type(module: &Module, qualified_name: &str) -> Result<TypeId, ResolutionError>
{
    find_type(module, qualified_name).ok_or_else(|| ResolutionError::TypeNotFound {
        module: module.name().to_string(),
        type_name: qualified_name.to_string(),
    })
}

pub fn require_method(module: &Module, ty: TypeId, name: &str, shape: MethodShape) -> Result<MethodId, ResolutionError>
{
    find_method(module, ty, name, shape).ok_or_else(|| ResolutionError::MethodNotFound {
        module: module.name().to_string(),
        type_name: module.type_full_name(ty),
        method: name.to_string(),
    })
}

pub fn require_field(module: &Module, ty: TypeId, name: &str) -> Result<FieldId, ResolutionError>
{
    find_field(module, ty, name).ok_or_else(|| ResolutionError::FieldNotFound {
        module: module.name().to_string(),
        type_name: module.type_full_name(ty),
        field: name.to_string(),
    })
}

/// Follow a type reference of the subject module to its definition.
///
/// The defining module is loaded through the search path if needed.
pub fn resolve_type_ref(set: &mut ModuleSet, reference: TypeRefId) -> Option<TypeLocation>
{
    let type_ref = set.subject().type_ref(reference);
    let scope = set.subject().assembly_ref(type_ref.scope).name.clone();
    let full_name = type_ref.full_name();

    let module = set.ensure_loaded(&scope)?;
    let ty = find_type(set.reference(module), &full_name)?;
    Some(TypeLocation { module, ty })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::metadata::{
        FieldAttributes, FieldDef, MethodAttributes, MethodSig, NewType, TypeKind, TypeSig, Version,
    };

    fn module() -> (Module, TypeId)
    {
        let mut module = Module::new("Host", Version::default());
        let object = module.add_type(
            NewType::new("Host", "Object", TypeKind::Class)
                .method(MethodDef::new(
                    "Lookup",
                    MethodAttributes::STATIC,
                    MethodSig::new_static(TypeSig::IntPtr, [TypeSig::Int32]),
                ))
                .method(MethodDef::new(
                    "Lookup",
                    MethodAttributes::STATIC,
                    MethodSig::new_static(TypeSig::IntPtr, [TypeSig::Int32, TypeSig::Object]),
                ))
                .method(MethodDef::new(
                    "Lookup",
                    MethodAttributes::PUBLIC,
                    MethodSig::new_instance(TypeSig::IntPtr, [TypeSig::Int32, TypeSig::Object]),
                )),
        );
        module.add_type(
            NewType::new("", "Bindings", TypeKind::ValueType)
                .nested_in(object)
                .field(FieldDef::new("m_CachedPtr", FieldAttributes::PRIVATE, TypeSig::IntPtr)),
        );
        (module, object)
    }

    #[test]
    fn test_find_method_first_match_by_shape()
    {
        let (module, object) = module();
        assert_eq!(find_method(&module, object, "Lookup", MethodShape::any()), Some(MethodId::new(0)));
        assert_eq!(
            find_method(&module, object, "Lookup", MethodShape::with_params(2)),
            Some(MethodId::new(1))
        );
        assert_eq!(
            find_method(&module, object, "Lookup", MethodShape::instance_with(2)),
            Some(MethodId::new(2))
        );
        assert_eq!(find_method(&module, object, "Lookup", MethodShape::static_with(3)), None);
        assert_eq!(find_method(&module, object, "lookup", MethodShape::any()), None);
    }

    #[test]
    fn test_find_field_falls_back_to_nested_types()
    {
        let (module, object) = module();
        assert_eq!(find_field(&module, object, "m_CachedPtr"), Some(FieldId::new(0)));
        assert_eq!(find_field(&module, object, "m_Missing"), None);
    }

    #[test]
    fn test_require_reports_names()
    {
        let (module, object) = module();
        assert_eq!(
            require_type(&module, "Host.Missing"),
            Err(ResolutionError::TypeNotFound {
                module: "Host".into(),
                type_name: "Host.Missing".into()
            })
        );
        let err = require_method(&module, object, "Absent", MethodShape::any()).unwrap_err();
        assert_eq!(err.to_string(), "method Host.Object::Absent not found in Host");
        assert!(require_field(&module, object, "m_CachedPtr").is_ok());
    }
}
