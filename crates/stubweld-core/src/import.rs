//! # Importer
//!
//! Turns symbols of a reference module into references the subject module can
//! use in its own instruction stream.
//!
//! A type defined in the source module becomes a [`TypeRef`] scoped to an
//! [`AssemblyRef`] named after the source module. A method or field becomes a
//! [`MemberRef`] whose parent is that type reference and whose signature is
//! rewritten into the subject's handles. Every row is looked up before it is
//! added, so importing the same symbol twice yields the same reference.

use crate::error::ResolutionError;
use crate::metadata::{
    AssemblyRef, AssemblyRefId, FieldId, MemberRef, MemberRefId, MemberSig, MethodId, MethodSig, Module, TypeHandle,
    TypeId, TypeRef, TypeRefId, TypeSig, Version,
};

pub struct Importer<'a>
{
    target: &'a mut Module,
    source: &'a Module,
}

impl<'a> Importer<'a>
{
    pub fn new(target: &'a mut Module, source: &'a Module) -> Self
    {
        Self { target, source }
    }

    /// Reference to a type defined in the source module.
    ///
    /// Nested types are flattened to `Outer/Inner` under the namespace of the
    /// outermost type.
    pub fn import_type(&mut self, ty: TypeId) -> TypeRefId
    {
        let source = self.source;
        let mut names = vec![source.ty(ty).name.as_str()];
        let mut outermost = ty;
        while let Some(outer) = source.ty(outermost).enclosing {
            names.push(source.ty(outer).name.as_str());
            outermost = outer;
        }
        names.reverse();
        let namespace = source.ty(outermost).namespace.clone();
        let name = names.join("/");

        let scope = self.scope(source.name(), source.version());
        self.type_ref(scope, namespace, name)
    }

    /// Reference to a type the source module itself references.
    pub fn import_type_ref(&mut self, reference: TypeRefId) -> TypeRefId
    {
        let source = self.source;
        let source_ref = source.type_ref(reference);
        let source_scope = source.assembly_ref(source_ref.scope);
        let scope = self.scope(&source_scope.name, source_scope.version);
        self.type_ref(scope, source_ref.namespace.clone(), source_ref.name.clone())
    }

    pub fn import_handle(&mut self, handle: TypeHandle) -> TypeHandle
    {
        match handle {
            TypeHandle::Def(ty) => TypeHandle::Ref(self.import_type(ty)),
            TypeHandle::Ref(reference) => TypeHandle::Ref(self.import_type_ref(reference)),
        }
    }

    pub fn import_sig(&mut self, sig: &TypeSig) -> TypeSig
    {
        match sig {
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(self.import_sig(inner))),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(self.import_sig(inner))),
            TypeSig::ValueType(handle) => TypeSig::ValueType(self.import_handle(*handle)),
            TypeSig::Class(handle) => TypeSig::Class(self.import_handle(*handle)),
            scalar => scalar.clone(),
        }
    }

    pub fn import_method_sig(&mut self, sig: &MethodSig) -> MethodSig
    {
        MethodSig {
            has_this: sig.has_this,
            ret: self.import_sig(&sig.ret),
            params: sig.params.iter().map(|param| self.import_sig(param)).collect(),
        }
    }

    /// Member reference to a method defined in the source module.
    ///
    /// ## Errors
    ///
    /// Fails if the method does not belong to any type.
    pub fn import_method(&mut self, method: MethodId) -> Result<MemberRefId, ResolutionError>
    {
        let source = self.source;
        let parent = source.declaring_type(method).ok_or_else(|| self.orphan(source.method(method).name.as_str()))?;
        let parent = self.import_type(parent);
        let sig = self.import_method_sig(&source.method(method).sig);
        Ok(self.member_ref(parent, &source.method(method).name, MemberSig::Method(sig)))
    }

    /// Member reference to a field defined in the source module.
    ///
    /// ## Errors
    ///
    /// Fails if the field does not belong to any type.
    pub fn import_field(&mut self, field: FieldId) -> Result<MemberRefId, ResolutionError>
    {
        let source = self.source;
        let parent = source
            .field_declaring_type(field)
            .ok_or_else(|| self.orphan(source.field(field).name.as_str()))?;
        let parent = self.import_type(parent);
        let ty = self.import_sig(&source.field(field).ty);
        Ok(self.member_ref(parent, &source.field(field).name, MemberSig::Field(ty)))
    }

    fn orphan(&self, member: &str) -> ResolutionError
    {
        ResolutionError::ShapeMismatch {
            symbol: format!("[{}]{member}", self.source.name()),
            reason: "member has no declaring type".to_string(),
        }
    }

    fn scope(&mut self, name: &str, version: Version) -> AssemblyRefId
    {
        self.target.find_assembly_ref(name).unwrap_or_else(|| {
            self.target.add_assembly_ref(AssemblyRef {
                name: name.to_string(),
                version,
            })
        })
    }

    fn type_ref(&mut self, scope: AssemblyRefId, namespace: String, name: String) -> TypeRefId
    {
        let existing = self
            .target
            .type_refs()
            .iter()
            .position(|r| r.scope == scope && r.namespace == namespace && r.name == name);
        match existing {
            Some(index) => TypeRefId::new(index as u32),
            None => self.target.add_type_ref(TypeRef { scope, namespace, name }),
        }
    }

    fn member_ref(&mut self, parent: TypeRefId, name: &str, sig: MemberSig) -> MemberRefId
    {
        let existing = self
            .target
            .member_refs()
            .iter()
            .position(|m| m.parent == parent && m.name == name && m.sig == sig);
        match existing {
            Some(index) => MemberRefId::new(index as u32),
            None => self.target.add_member_ref(MemberRef {
                parent,
                name: name.to_string(),
                sig,
            }),
        }
    }
}
