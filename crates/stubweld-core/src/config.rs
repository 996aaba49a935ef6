//! # Patch Configuration
//!
//! Everything the pipeline needs to know about the host framework and the
//! subject module: where the host modules live, which wrapper types are
//! foundational, and which stubs to rewrite into what.
//!
//! [`PatchConfig::default`] carries the built-in host description.

use std::fmt;

use crate::host::HostLayout;

/// A static method in a reference module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTarget
{
    /// Reference module name, without the file extension
    pub module: String,
    /// Fully qualified declaring type
    pub type_name: String,
    pub method: String,
    /// Declared parameter count, used to pick between overloads
    pub arity: usize,
}

impl ExternalTarget
{
    pub fn new(module: &str, type_name: &str, method: &str, arity: usize) -> Self
    {
        Self {
            module: module.to_string(),
            type_name: type_name.to_string(),
            method: method.to_string(),
            arity,
        }
    }
}

impl fmt::Display for ExternalTarget
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}]{}::{}", self.module, self.type_name, self.method)
    }
}

/// How a stub body is synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template
{
    /// Forward every argument unchanged
    Forwarding(ExternalTarget),
    /// Translate one span-like argument into the host wrapper, forward the rest
    WrapperTranslation(ExternalTarget),
    /// Derive a native pointer for an object reference
    PointerResolution,
}

/// One stub method of the subject module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubSpec
{
    /// Fully qualified declaring type in the subject module
    pub owner: String,
    pub name: String,
    pub template: Template,
}

impl StubSpec
{
    pub fn new(owner: &str, name: &str, template: Template) -> Self
    {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            template,
        }
    }

    #[must_use]
    pub fn qualified_name(&self) -> String
    {
        format!("{}::{}", self.owner, self.name)
    }
}

/// The (pointer, length) wrapper pair.
///
/// Both types are foundational: if either is missing the run aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperConfig
{
    /// Span-like value type in the subject module
    pub subject_type: String,
    pub reference_module: String,
    /// Structurally identical value type in `reference_module`
    pub reference_type: String,
}

/// Host symbols used by the pointer resolution template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMarshalConfig
{
    /// Module and type used when the stub parameter type cannot be followed
    pub module: String,
    pub type_name: String,
    /// Private pointer cache on the object
    pub cache_field: String,
    /// Instance method returning the object's identifier
    pub id_accessor: String,
    /// Static id to pointer lookup
    pub lookup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig
{
    /// Host layouts, probed in order
    pub layouts: Vec<HostLayout>,
    /// Reference module names, without the file extension
    pub reference_modules: Vec<String>,
    pub wrapper: WrapperConfig,
    pub object: ObjectMarshalConfig,
    pub stubs: Vec<StubSpec>,
    /// Dependency record removed from the output, if present
    pub pruned_reference: Option<String>,
    /// Record that takes over the type refs of the pruned one
    pub prune_retarget: String,
}

pub const CORE_MODULE: &str = "HostEngine.CoreModule";
pub const INTEROP_MODULE: &str = "HostEngine.InteropModule";
pub const RENDER_MODULE: &str = "HostEngine.RenderModule";

const STUB_OWNER: &str = "Bridge.NativeMethods";

impl Default for PatchConfig
{
    fn default() -> Self
    {
        Self {
            layouts: HostLayout::builtin(),
            reference_modules: vec![
                CORE_MODULE.to_string(),
                INTEROP_MODULE.to_string(),
                RENDER_MODULE.to_string(),
            ],
            wrapper: WrapperConfig {
                subject_type: "Bridge.Interop.ByteSpan".to_string(),
                reference_module: INTEROP_MODULE.to_string(),
                reference_type: "HostEngine.Bindings.ManagedSpanWrapper".to_string(),
            },
            object: ObjectMarshalConfig {
                module: CORE_MODULE.to_string(),
                type_name: "HostEngine.Object".to_string(),
                cache_field: "m_CachedPtr".to_string(),
                id_accessor: "GetInstanceID".to_string(),
                lookup: "GetPtrFromInstanceID".to_string(),
            },
            stubs: vec![
                StubSpec::new(
                    STUB_OWNER,
                    "MemoryCopy",
                    Template::Forwarding(ExternalTarget::new(CORE_MODULE, "HostEngine.Memory.NativeMemory", "Copy", 3)),
                ),
                StubSpec::new(
                    STUB_OWNER,
                    "MemoryClear",
                    Template::Forwarding(ExternalTarget::new(
                        CORE_MODULE,
                        "HostEngine.Memory.NativeMemory",
                        "Clear",
                        2,
                    )),
                ),
                StubSpec::new(
                    STUB_OWNER,
                    "UploadBuffer",
                    Template::WrapperTranslation(ExternalTarget::new(
                        RENDER_MODULE,
                        "HostEngine.Rendering.GpuBuffer",
                        "UploadInternal",
                        2,
                    )),
                ),
                StubSpec::new(STUB_OWNER, "MarshalObject", Template::PointerResolution),
            ],
            pruned_reference: Some("System.Runtime".to_string()),
            prune_retarget: "mscorlib".to_string(),
        }
    }
}

impl PatchConfig
{
    /// Put `layouts` ahead of the configured ones.
    pub fn prepend_layouts(&mut self, layouts: impl IntoIterator<Item = HostLayout>)
    {
        let mut combined: Vec<HostLayout> = layouts.into_iter().collect();
        combined.append(&mut self.layouts);
        self.layouts = combined;
    }
}
