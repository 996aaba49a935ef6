//! Type and member signatures.
//!
//! Signatures reference types through [`TypeHandle`]s, which are only
//! meaningful inside the module that owns them. Moving a signature into another
//! module goes through the [`Importer`](crate::import::Importer).

use std::fmt;

use smallvec::SmallVec;

use super::{TypeId, TypeRefId};

/// A type defined in this module or referenced from another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeHandle
{
    Def(TypeId),
    Ref(TypeRefId),
}

/// Element types, encoded with their ECMA-335 element type constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig
{
    Void,
    Boolean,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    /// Unmanaged pointer (`T*`)
    Ptr(Box<TypeSig>),
    /// Managed reference (`ref T`)
    ByRef(Box<TypeSig>),
    ValueType(TypeHandle),
    Class(TypeHandle),
    IntPtr,
    UIntPtr,
    Object,
}

/// How a scalar is carried across a call boundary.
///
/// Two slots are ABI-compatible when their classes are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarClass
{
    Pointer,
    Int32,
    Int64,
    Boolean,
    Float32,
    Float64,
}

impl TypeSig
{
    /// Unmanaged `void*`.
    #[must_use]
    pub fn void_ptr() -> Self
    {
        TypeSig::Ptr(Box::new(TypeSig::Void))
    }

    #[must_use]
    pub fn by_ref(inner: TypeSig) -> Self
    {
        TypeSig::ByRef(Box::new(inner))
    }

    /// Scalar classification, `None` for objects, value types and `void`.
    #[must_use]
    pub fn scalar_class(&self) -> Option<ScalarClass>
    {
        match self {
            TypeSig::IntPtr | TypeSig::UIntPtr | TypeSig::Ptr(_) => Some(ScalarClass::Pointer),
            TypeSig::Int32 | TypeSig::UInt32 => Some(ScalarClass::Int32),
            TypeSig::Int64 | TypeSig::UInt64 => Some(ScalarClass::Int64),
            TypeSig::Boolean => Some(ScalarClass::Boolean),
            TypeSig::Float32 => Some(ScalarClass::Float32),
            TypeSig::Float64 => Some(ScalarClass::Float64),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool
    {
        self.scalar_class().is_some()
    }

    /// Object references: classes, `object` and `string`.
    #[must_use]
    pub fn is_reference(&self) -> bool
    {
        matches!(self, TypeSig::Class(_) | TypeSig::Object | TypeSig::String)
    }

    #[must_use]
    pub fn is_void(&self) -> bool
    {
        matches!(self, TypeSig::Void)
    }

    /// The handle this signature names directly, if any.
    #[must_use]
    pub fn handle(&self) -> Option<TypeHandle>
    {
        match self {
            TypeSig::ValueType(handle) | TypeSig::Class(handle) => Some(*handle),
            _ => None,
        }
    }
}

impl fmt::Display for TypeSig
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Boolean => write!(f, "bool"),
            TypeSig::Int32 => write!(f, "int32"),
            TypeSig::UInt32 => write!(f, "uint32"),
            TypeSig::Int64 => write!(f, "int64"),
            TypeSig::UInt64 => write!(f, "uint64"),
            TypeSig::Float32 => write!(f, "float32"),
            TypeSig::Float64 => write!(f, "float64"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Ptr(inner) => write!(f, "{inner}*"),
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
            TypeSig::ValueType(handle) => write!(f, "valuetype {handle}"),
            TypeSig::Class(handle) => write!(f, "class {handle}"),
            TypeSig::IntPtr => write!(f, "native int"),
            TypeSig::UIntPtr => write!(f, "native uint"),
            TypeSig::Object => write!(f, "object"),
        }
    }
}

impl fmt::Display for TypeHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeHandle::Def(id) => write!(f, "typedef#{}", id.index()),
            TypeHandle::Ref(id) => write!(f, "typeref#{}", id.index()),
        }
    }
}

/// Method calling convention, return type and parameters.
///
/// `params` does not include the implicit `this`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig
{
    pub has_this: bool,
    pub ret: TypeSig,
    pub params: SmallVec<[TypeSig; 4]>,
}

impl MethodSig
{
    #[must_use]
    pub fn new_static(ret: TypeSig, params: impl IntoIterator<Item = TypeSig>) -> Self
    {
        Self {
            has_this: false,
            ret,
            params: params.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn new_instance(ret: TypeSig, params: impl IntoIterator<Item = TypeSig>) -> Self
    {
        Self {
            has_this: true,
            ret,
            params: params.into_iter().collect(),
        }
    }

    /// Values a call pops: the parameters plus `this` for instance methods.
    #[must_use]
    pub fn stack_inputs(&self) -> usize
    {
        self.params.len() + usize::from(self.has_this)
    }
}

/// Signature carried by a member reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSig
{
    Method(MethodSig),
    Field(TypeSig),
}

impl MemberSig
{
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodSig>
    {
        match self {
            MemberSig::Method(sig) => Some(sig),
            MemberSig::Field(_) => None,
        }
    }
}
