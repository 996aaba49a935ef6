//! Module arena and metadata tables.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use super::{AssemblyRefId, FieldId, MemberRefId, MemberSig, MethodId, MethodSig, TypeId, TypeRefId, TypeSig};
use crate::container::ContainerKind;
use crate::il::MethodBody;

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version
{
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl Version
{
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self
    {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for Version
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

/// Module-level dependency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRef
{
    pub name: String,
    pub version: Version,
}

/// Reference to a type defined in another module.
///
/// Nested types are named `Outer/Inner` with the outermost type's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef
{
    pub scope: AssemblyRefId,
    pub namespace: String,
    pub name: String,
}

impl TypeRef
{
    #[must_use]
    pub fn full_name(&self) -> String
    {
        qualify(&self.namespace, &self.name)
    }
}

/// Reference to a method or field of a type defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef
{
    pub parent: TypeRefId,
    pub name: String,
    pub sig: MemberSig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind
{
    Class,
    ValueType,
    Interface,
}

/// A type definition. Its fields and methods are contiguous rows in the
/// module's field and method tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef
{
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub enclosing: Option<TypeId>,
    pub(crate) fields: Range<u32>,
    pub(crate) methods: Range<u32>,
}

impl TypeDef
{
    #[must_use]
    pub fn is_value_type(&self) -> bool
    {
        self.kind == TypeKind::ValueType
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId>
    {
        self.fields.clone().map(FieldId::new)
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId>
    {
        self.methods.clone().map(MethodId::new)
    }
}

/// Raw ECMA-335 field attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldAttributes(pub u16);

impl FieldAttributes
{
    pub const PRIVATE: Self = Self(0x0001);
    pub const PUBLIC: Self = Self(0x0006);
    pub const STATIC: Self = Self(0x0010);

    #[must_use]
    pub const fn union(self, other: Self) -> Self
    {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_static(self) -> bool
    {
        self.0 & Self::STATIC.0 != 0
    }

    #[must_use]
    pub const fn is_private(self) -> bool
    {
        self.0 & 0x0007 == Self::PRIVATE.0
    }
}

/// Raw ECMA-335 method attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodAttributes(pub u16);

impl MethodAttributes
{
    pub const PRIVATE: Self = Self(0x0001);
    pub const PUBLIC: Self = Self(0x0006);
    pub const STATIC: Self = Self(0x0010);
    pub const VIRTUAL: Self = Self(0x0040);
    pub const SPECIAL_NAME: Self = Self(0x0800);
    pub const RT_SPECIAL_NAME: Self = Self(0x1000);

    #[must_use]
    pub const fn union(self, other: Self) -> Self
    {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_static(self) -> bool
    {
        self.0 & Self::STATIC.0 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef
{
    pub name: String,
    pub attributes: FieldAttributes,
    pub ty: TypeSig,
}

impl FieldDef
{
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: FieldAttributes, ty: TypeSig) -> Self
    {
        Self {
            name: name.into(),
            attributes,
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef
{
    pub name: String,
    pub attributes: MethodAttributes,
    pub sig: MethodSig,
    pub body: Option<MethodBody>,
}

impl MethodDef
{
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: MethodAttributes, sig: MethodSig) -> Self
    {
        Self {
            name: name.into(),
            attributes,
            sig,
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self
    {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn is_static(&self) -> bool
    {
        !self.sig.has_this
    }
}

/// Whether the pipeline may mutate a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAccess
{
    ReadOnly,
    Writable,
}

/// Description of a type to append with [`Module::add_type`].
#[derive(Debug, Clone)]
pub struct NewType
{
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub enclosing: Option<TypeId>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl NewType
{
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: TypeKind) -> Self
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            enclosing: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn nested_in(mut self, enclosing: TypeId) -> Self
    {
        self.enclosing = Some(enclosing);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self
    {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodDef) -> Self
    {
        self.methods.push(method);
        self
    }
}

/// One loaded module.
///
/// Identified by its file path and its module name. Reference modules are
/// loaded with [`ModuleAccess::ReadOnly`]; only the subject is mutated.
#[derive(Debug)]
pub struct Module
{
    pub(crate) name: String,
    pub(crate) version: Version,
    pub(crate) path: PathBuf,
    pub(crate) access: ModuleAccess,
    pub(crate) container: ContainerKind,
    pub(crate) assembly_refs: Vec<AssemblyRef>,
    pub(crate) type_refs: Vec<TypeRef>,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) member_refs: Vec<MemberRef>,
    pub(crate) debug_stream: Option<Vec<u8>>,
    type_index: OnceCell<HashMap<String, TypeId>>,
}

impl Module
{
    /// Create an empty, writable module that is not backed by a file.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self
    {
        Self {
            name: name.into(),
            version,
            path: PathBuf::new(),
            access: ModuleAccess::Writable,
            container: ContainerKind::default(),
            assembly_refs: Vec::new(),
            type_refs: Vec::new(),
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            member_refs: Vec::new(),
            debug_stream: None,
            type_index: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn version(&self) -> Version
    {
        self.version
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn access(&self) -> ModuleAccess
    {
        self.access
    }

    pub fn is_writable(&self) -> bool
    {
        self.access == ModuleAccess::Writable
    }

    pub(crate) fn set_origin(&mut self, path: PathBuf, access: ModuleAccess)
    {
        self.path = path;
        self.access = access;
    }

    pub fn container(&self) -> ContainerKind
    {
        self.container
    }

    pub fn set_container(&mut self, container: ContainerKind)
    {
        self.container = container;
    }

    pub fn debug_stream(&self) -> Option<&[u8]>
    {
        self.debug_stream.as_deref()
    }

    pub fn set_debug_stream(&mut self, stream: Option<Vec<u8>>)
    {
        self.debug_stream = stream;
    }

    pub fn assembly_refs(&self) -> &[AssemblyRef]
    {
        &self.assembly_refs
    }

    pub fn type_refs(&self) -> &[TypeRef]
    {
        &self.type_refs
    }

    pub fn types(&self) -> &[TypeDef]
    {
        &self.types
    }

    pub fn fields(&self) -> &[FieldDef]
    {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodDef]
    {
        &self.methods
    }

    pub fn member_refs(&self) -> &[MemberRef]
    {
        &self.member_refs
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId>
    {
        (0..self.types.len() as u32).map(TypeId::new)
    }

    pub fn ty(&self, id: TypeId) -> &TypeDef
    {
        &self.types[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldDef
    {
        &self.fields[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodDef
    {
        &self.methods[id.index()]
    }

    pub fn type_ref(&self, id: TypeRefId) -> &TypeRef
    {
        &self.type_refs[id.index()]
    }

    pub fn member_ref(&self, id: MemberRefId) -> &MemberRef
    {
        &self.member_refs[id.index()]
    }

    pub fn assembly_ref(&self, id: AssemblyRefId) -> &AssemblyRef
    {
        &self.assembly_refs[id.index()]
    }

    /// Fully qualified name: `Namespace.Name`, or `Namespace.Outer/Inner` for nested types.
    pub fn type_full_name(&self, id: TypeId) -> String
    {
        let def = self.ty(id);
        match def.enclosing {
            Some(outer) => format!("{}/{}", self.type_full_name(outer), def.name),
            None => qualify(&def.namespace, &def.name),
        }
    }

    /// `Namespace.Type::member` for a method, used in diagnostics.
    pub fn method_full_name(&self, id: MethodId) -> String
    {
        match self.declaring_type(id) {
            Some(ty) => format!("{}::{}", self.type_full_name(ty), self.method(id).name),
            None => self.method(id).name.clone(),
        }
    }

    pub fn member_ref_full_name(&self, id: MemberRefId) -> String
    {
        let member = self.member_ref(id);
        format!("{}::{}", self.type_ref(member.parent).full_name(), member.name)
    }

    pub fn type_fields(&self, id: TypeId) -> impl Iterator<Item = (FieldId, &FieldDef)>
    {
        self.ty(id).field_ids().map(move |field| (field, self.field(field)))
    }

    pub fn type_methods(&self, id: TypeId) -> impl Iterator<Item = (MethodId, &MethodDef)>
    {
        self.ty(id).method_ids().map(move |method| (method, self.method(method)))
    }

    /// Types declared directly inside `id`, in table order.
    pub fn nested_types(&self, id: TypeId) -> impl Iterator<Item = TypeId> + '_
    {
        self.type_ids().filter(move |candidate| self.ty(*candidate).enclosing == Some(id))
    }

    pub fn declaring_type(&self, method: MethodId) -> Option<TypeId>
    {
        self.type_ids().find(|ty| self.ty(*ty).methods.contains(&method.raw()))
    }

    pub fn field_declaring_type(&self, field: FieldId) -> Option<TypeId>
    {
        self.type_ids().find(|ty| self.ty(*ty).fields.contains(&field.raw()))
    }

    /// Look a type up by its fully qualified, case-sensitive name.
    ///
    /// When two definitions share a name the first one in table order wins.
    pub fn lookup_type(&self, full_name: &str) -> Option<TypeId>
    {
        self.type_index
            .get_or_init(|| {
                let mut index = HashMap::with_capacity(self.types.len());
                for id in self.type_ids() {
                    index.entry(self.type_full_name(id)).or_insert(id);
                }
                index
            })
            .get(full_name)
            .copied()
    }

    pub fn find_assembly_ref(&self, name: &str) -> Option<AssemblyRefId>
    {
        self.assembly_refs
            .iter()
            .position(|candidate| candidate.name == name)
            .map(|index| AssemblyRefId::new(index as u32))
    }

    pub fn add_assembly_ref(&mut self, reference: AssemblyRef) -> AssemblyRefId
    {
        self.assembly_refs.push(reference);
        AssemblyRefId::new(self.assembly_refs.len() as u32 - 1)
    }

    pub fn add_type_ref(&mut self, reference: TypeRef) -> TypeRefId
    {
        self.type_refs.push(reference);
        TypeRefId::new(self.type_refs.len() as u32 - 1)
    }

    pub fn add_member_ref(&mut self, reference: MemberRef) -> MemberRefId
    {
        self.member_refs.push(reference);
        MemberRefId::new(self.member_refs.len() as u32 - 1)
    }

    /// Append a type together with its fields and methods.
    pub fn add_type(&mut self, new: NewType) -> TypeId
    {
        let field_start = self.fields.len() as u32;
        let method_start = self.methods.len() as u32;
        self.fields.extend(new.fields);
        self.methods.extend(new.methods);
        self.types.push(TypeDef {
            namespace: new.namespace,
            name: new.name,
            kind: new.kind,
            enclosing: new.enclosing,
            fields: field_start..self.fields.len() as u32,
            methods: method_start..self.methods.len() as u32,
        });
        self.type_index = OnceCell::new();
        TypeId::new(self.types.len() as u32 - 1)
    }

    /// Detach a method body, leaving the method without one.
    pub fn take_body(&mut self, method: MethodId) -> Option<MethodBody>
    {
        debug_assert!(self.is_writable(), "bodies of read-only modules are never mutated");
        self.methods[method.index()].body.take()
    }

    pub fn set_body(&mut self, method: MethodId, body: Option<MethodBody>)
    {
        debug_assert!(self.is_writable(), "bodies of read-only modules are never mutated");
        self.methods[method.index()].body = body;
    }

    /// Number of type refs that resolve through `id`.
    pub fn assembly_ref_users(&self, id: AssemblyRefId) -> usize
    {
        self.type_refs.iter().filter(|reference| reference.scope == id).count()
    }

    /// Current lengths of the reference tables.
    pub(crate) fn ref_marks(&self) -> RefMarks
    {
        RefMarks {
            assembly_refs: self.assembly_refs.len(),
            type_refs: self.type_refs.len(),
            member_refs: self.member_refs.len(),
        }
    }

    /// Drop reference rows appended after `marks` was taken.
    pub(crate) fn truncate_refs(&mut self, marks: RefMarks)
    {
        self.assembly_refs.truncate(marks.assembly_refs);
        self.type_refs.truncate(marks.type_refs);
        self.member_refs.truncate(marks.member_refs);
    }

    /// Move every type ref scoped to `from` onto `to`, returning how many moved.
    pub(crate) fn retarget_assembly_ref(&mut self, from: AssemblyRefId, to: AssemblyRefId) -> usize
    {
        let mut moved = 0;
        for reference in self.type_refs.iter_mut().filter(|reference| reference.scope == from) {
            reference.scope = to;
            moved += 1;
        }
        moved
    }

    /// Remove an assembly reference and renumber the scopes above it.
    ///
    /// Callers must retarget its users first; a type ref scoped to the
    /// removed row would dangle.
    pub(crate) fn remove_assembly_ref(&mut self, id: AssemblyRefId)
    {
        self.assembly_refs.remove(id.index());
        for reference in &mut self.type_refs {
            if reference.scope.raw() > id.raw() {
                reference.scope = AssemblyRefId::new(reference.scope.raw() - 1);
            }
        }
    }
}

/// Reference table lengths at one point in time.
///
/// Only valid while rows are appended, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefMarks
{
    assembly_refs: usize,
    type_refs: usize,
    member_refs: usize,
}

fn qualify(namespace: &str, name: &str) -> String
{
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}
