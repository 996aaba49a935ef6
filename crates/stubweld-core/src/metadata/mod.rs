//! # Metadata
//!
//! In-memory symbol graph for one module.
//!
//! Every module is an independent arena: types, fields, methods and the
//! cross-module reference tables live in flat vectors addressed by typed
//! indices. Nothing in one module points into another; references to foreign
//! symbols go through [`TypeRef`] and [`MemberRef`] rows that name them.

mod module;
mod signature;

pub use module::{
    AssemblyRef, FieldAttributes, FieldDef, MemberRef, MethodAttributes, MethodDef, Module, ModuleAccess, NewType,
    TypeDef, TypeKind, TypeRef, Version,
};
pub use signature::{MemberSig, MethodSig, ScalarClass, TypeHandle, TypeSig};

macro_rules! table_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name
        {
            /// Zero-based row index.
            #[must_use]
            pub const fn new(index: u32) -> Self
            {
                Self(index)
            }

            #[must_use]
            pub const fn index(self) -> usize
            {
                self.0 as usize
            }

            #[must_use]
            pub const fn raw(self) -> u32
            {
                self.0
            }
        }
    };
}

table_id!(
    /// Row in the type definition table.
    TypeId
);
table_id!(
    /// Row in the field table.
    FieldId
);
table_id!(
    /// Row in the method table.
    MethodId
);
table_id!(
    /// Row in the type reference table.
    TypeRefId
);
table_id!(
    /// Row in the member reference table.
    MemberRefId
);
table_id!(
    /// Row in the assembly reference table.
    AssemblyRefId
);
