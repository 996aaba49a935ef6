//! Shared fixtures: a host installation with the three host modules and a
//! subject module carrying the four stubs.

#![allow(dead_code)]

pub mod interp;

use std::fs;
use std::path::{Path, PathBuf};

use stubweld_core::container::{encode_module, read_module};
use stubweld_core::host::{HostLayout, module_file_name};
use stubweld_core::il::{Instruction, MethodBody, OpCode, Token};
use stubweld_core::metadata::{
    AssemblyRef, AssemblyRefId, FieldAttributes, FieldDef, MemberRef, MemberSig, MethodAttributes, MethodDef,
    MethodId, MethodSig, Module, ModuleAccess, NewType, TypeHandle, TypeKind, TypeRef, TypeSig, Version,
};
use stubweld_core::resolve::{find_method, find_type, MethodShape};
use tempfile::TempDir;

pub const CORE: &str = "HostEngine.CoreModule";
pub const INTEROP: &str = "HostEngine.InteropModule";
pub const RENDER: &str = "HostEngine.RenderModule";
pub const SUBJECT: &str = "Bridge";
pub const STUB_OWNER: &str = "Bridge.NativeMethods";
pub const STUBS: [&str; 4] = ["MemoryCopy", "MemoryClear", "UploadBuffer", "MarshalObject"];

/// What to leave out of the fixture.
#[derive(Debug, Clone, Default)]
pub struct Fixture
{
    pub without_wrapper: bool,
    pub without_stub: Option<&'static str>,
    pub layout: Option<HostLayout>,
}

/// A host installation and subject module on disk.
pub struct HostTree
{
    pub dir: TempDir,
    pub root: PathBuf,
    pub input: PathBuf,
}

impl HostTree
{
    pub fn output(&self, name: &str) -> PathBuf
    {
        self.dir.path().join(name)
    }
}

impl Fixture
{
    pub fn build(&self) -> HostTree
    {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("host");
        let layout = self.layout.clone().unwrap_or_else(HostLayout::editor);
        let managed = layout.resolve(&root);
        fs::create_dir_all(&managed).unwrap();

        save(&managed, &core_module());
        save(&managed, &interop_module(self.without_wrapper));
        save(&managed, &render_module());
        let input = save(dir.path(), &subject_module(self.without_stub));

        HostTree { dir, root, input }
    }
}

pub fn save(dir: &Path, module: &Module) -> PathBuf
{
    let path = dir.join(module_file_name(module.name()));
    fs::write(&path, encode_module(module).unwrap()).unwrap();
    path
}

pub fn load(path: &Path) -> Module
{
    read_module(path, ModuleAccess::ReadOnly).unwrap()
}

pub fn stub(module: &Module, name: &str) -> MethodId
{
    let owner = find_type(module, STUB_OWNER).unwrap();
    find_method(module, owner, name, MethodShape::any()).unwrap()
}

fn public_static() -> MethodAttributes
{
    MethodAttributes::PUBLIC.union(MethodAttributes::STATIC)
}

fn ctor(params: impl IntoIterator<Item = TypeSig>) -> MethodDef
{
    MethodDef::new(
        ".ctor",
        MethodAttributes::PUBLIC
            .union(MethodAttributes::SPECIAL_NAME)
            .union(MethodAttributes::RT_SPECIAL_NAME),
        MethodSig::new_instance(TypeSig::Void, params),
    )
}

fn assembly(module: &mut Module, name: &str) -> AssemblyRefId
{
    module.add_assembly_ref(AssemblyRef {
        name: name.into(),
        version: Version::new(1, 0, 0, 0),
    })
}

pub fn core_module() -> Module
{
    let mut module = Module::new(CORE, Version::new(1, 0, 0, 0));
    module.add_type(
        NewType::new("HostEngine", "Object", TypeKind::Class)
            .field(FieldDef::new("m_CachedPtr", FieldAttributes::PRIVATE, TypeSig::IntPtr))
            .method(MethodDef::new(
                "GetInstanceID",
                MethodAttributes::PUBLIC,
                MethodSig::new_instance(TypeSig::Int32, []),
            ))
            .method(MethodDef::new(
                "GetPtrFromInstanceID",
                MethodAttributes::PRIVATE.union(MethodAttributes::STATIC),
                MethodSig::new_static(TypeSig::IntPtr, [TypeSig::Int32, TypeSig::Object]),
            )),
    );
    module.add_type(
        NewType::new("HostEngine.Memory", "NativeMemory", TypeKind::Class)
            // overload that must not be picked for the three argument stub
            .method(MethodDef::new(
                "Copy",
                public_static(),
                MethodSig::new_static(TypeSig::Void, [TypeSig::void_ptr(), TypeSig::void_ptr()]),
            ))
            .method(MethodDef::new(
                "Copy",
                public_static(),
                MethodSig::new_static(TypeSig::Void, [TypeSig::void_ptr(), TypeSig::void_ptr(), TypeSig::Int64]),
            ))
            .method(MethodDef::new(
                "Clear",
                public_static(),
                MethodSig::new_static(TypeSig::Void, [TypeSig::void_ptr(), TypeSig::Int64]),
            )),
    );
    module
}

pub fn interop_module(without_wrapper: bool) -> Module
{
    let mut module = Module::new(INTEROP, Version::new(1, 0, 0, 0));
    if !without_wrapper {
        module.add_type(
            NewType::new("HostEngine.Bindings", "ManagedSpanWrapper", TypeKind::ValueType)
                .field(FieldDef::new("begin", FieldAttributes::PUBLIC, TypeSig::void_ptr()))
                .field(FieldDef::new("length", FieldAttributes::PUBLIC, TypeSig::Int32))
                .method(ctor([TypeSig::void_ptr(), TypeSig::Int32])),
        );
    }
    module.add_type(NewType::new("HostEngine.Bindings", "Marshalling", TypeKind::Class));
    module
}

pub fn render_module() -> Module
{
    let mut module = Module::new(RENDER, Version::new(1, 0, 0, 0));
    let interop = assembly(&mut module, INTEROP);
    let wrapper = module.add_type_ref(TypeRef {
        scope: interop,
        namespace: "HostEngine.Bindings".into(),
        name: "ManagedSpanWrapper".into(),
    });
    module.add_type(
        NewType::new("HostEngine.Rendering", "GpuBuffer", TypeKind::Class).method(MethodDef::new(
            "UploadInternal",
            MethodAttributes::PRIVATE.union(MethodAttributes::STATIC),
            MethodSig::new_static(
                TypeSig::Int32,
                [TypeSig::IntPtr, TypeSig::by_ref(TypeSig::ValueType(TypeHandle::Ref(wrapper)))],
            ),
        )),
    );
    module
}

/// `newobj NotImplementedException::.ctor; throw`
fn placeholder_body(not_implemented: Token) -> MethodBody
{
    MethodBody {
        max_stack: 1,
        instructions: vec![
            Instruction::with_token(OpCode::Newobj, not_implemented),
            Instruction::simple(OpCode::Throw),
        ],
        ..MethodBody::default()
    }
}

pub fn subject_module(without_stub: Option<&str>) -> Module
{
    let mut module = Module::new(SUBJECT, Version::new(0, 1, 0, 0));
    let corlib = assembly(&mut module, "mscorlib");
    let runtime = assembly(&mut module, "System.Runtime");
    let core = assembly(&mut module, CORE);

    // compiled against the reference facade, as real subjects are
    module.add_type_ref(TypeRef {
        scope: runtime,
        namespace: "System".into(),
        name: "Object".into(),
    });

    let exception = module.add_type_ref(TypeRef {
        scope: corlib,
        namespace: "System".into(),
        name: "NotImplementedException".into(),
    });
    let host_object = module.add_type_ref(TypeRef {
        scope: core,
        namespace: "HostEngine".into(),
        name: "Object".into(),
    });
    let throw_ctor = module.add_member_ref(MemberRef {
        parent: exception,
        name: ".ctor".into(),
        sig: MemberSig::Method(MethodSig::new_instance(TypeSig::Void, [])),
    });

    let span = module.add_type(
        NewType::new("Bridge.Interop", "ByteSpan", TypeKind::ValueType)
            .field(FieldDef::new("ptr", FieldAttributes::PRIVATE, TypeSig::void_ptr()))
            .field(FieldDef::new("length", FieldAttributes::PRIVATE, TypeSig::Int32)),
    );
    let object = TypeSig::Class(TypeHandle::Ref(host_object));
    let signatures = [
        (
            "MemoryCopy",
            MethodSig::new_static(TypeSig::Void, [TypeSig::IntPtr, TypeSig::IntPtr, TypeSig::Int64]),
        ),
        ("MemoryClear", MethodSig::new_static(TypeSig::Void, [TypeSig::IntPtr, TypeSig::Int64])),
        (
            "UploadBuffer",
            MethodSig::new_static(TypeSig::Void, [object.clone(), TypeSig::ValueType(TypeHandle::Def(span))]),
        ),
        ("MarshalObject", MethodSig::new_static(TypeSig::IntPtr, [object])),
    ];

    let mut owner = NewType::new("Bridge", "NativeMethods", TypeKind::Class);
    for (name, sig) in signatures {
        if without_stub == Some(name) {
            continue;
        }
        owner = owner.method(
            MethodDef::new(name, MethodAttributes::PUBLIC.union(MethodAttributes::STATIC), sig)
                .with_body(placeholder_body(Token::member_ref(throw_ctor))),
        );
    }
    module.add_type(owner);
    module
}
