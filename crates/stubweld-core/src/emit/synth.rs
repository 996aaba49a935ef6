//! # Method Body Synthesizer
//!
//! Rewrites each configured stub with a body built from its template.
//!
//! Stubs are independent: a stub whose own symbols cannot be resolved is
//! skipped with a warning and the rest carry on. Pointer resolution stubs are
//! processed first because the other templates marshal object arguments by
//! calling the patched marshaller.
//!
//! Every body is checked by the stack verifier before it replaces the stub's
//! original body. A rejected body leaves the stub untouched, and the
//! references imported for it are dropped again.

use tracing::{debug, trace, warn};

use super::BodyBuilder;
use super::pointer::{PointerSymbols, emit_pointer_resolution};
use super::span::SpanTranslation;
use crate::config::{ExternalTarget, PatchConfig, StubSpec, Template};
use crate::error::{EmissionError, ResolutionError};
use crate::il::{Instruction, MethodBody, OpCode, Token, verify};
use crate::import::Importer;
use crate::loader::ModuleSet;
use crate::metadata::{MethodId, MethodSig, ScalarClass, TypeHandle, TypeSig};
use crate::resolve::{MethodShape, TypeLocation, find_type, require_method, require_type, resolve_type_ref};
use crate::stub::{PatchTarget, SkipReason, StubReport, StubState};

/// How one stub argument reaches the external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgPlan
{
    Forward,
    Span
    {
        by_ref: bool,
    },
    Marshal,
}

/// Rewrites stub bodies in the subject module of a [`ModuleSet`].
pub struct Synthesizer<'a>
{
    set: &'a mut ModuleSet,
    config: &'a PatchConfig,
    span: &'a SpanTranslation,
    marshaller: Option<MethodId>,
}

impl<'a> Synthesizer<'a>
{
    pub fn new(set: &'a mut ModuleSet, config: &'a PatchConfig, span: &'a SpanTranslation) -> Self
    {
        Self {
            set,
            config,
            span,
            marshaller: None,
        }
    }

    /// Patch every configured stub. Reports come back in configuration order.
    pub fn run(mut self) -> Vec<StubReport>
    {
        let config = self.config;
        let stubs = &config.stubs;
        let mut states = vec![StubState::Unpatched; stubs.len()];

        let (pointer, other): (Vec<usize>, Vec<usize>) =
            (0..stubs.len()).partition(|&index| stubs[index].template == Template::PointerResolution);
        for index in pointer.into_iter().chain(other) {
            let spec = &stubs[index];
            states[index] = match self.patch_stub(spec) {
                Ok(target) => {
                    debug!(stub = %spec.qualified_name(), %target, "patched stub");
                    StubState::Patched(target)
                }
                Err(reason) => {
                    warn!(stub = %spec.qualified_name(), %reason, "skipping stub");
                    StubState::Skipped(reason)
                }
            };
        }

        stubs
            .iter()
            .zip(states)
            .map(|(spec, state)| StubReport {
                stub: spec.qualified_name(),
                state,
            })
            .collect()
    }

    fn patch_stub(&mut self, spec: &StubSpec) -> Result<PatchTarget, SkipReason>
    {
        self.rolled_back(|this| this.build_stub(spec))
    }

    /// Run `step`, dropping any reference rows it imported if it fails.
    fn rolled_back<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T, SkipReason>) -> Result<T, SkipReason>
    {
        let marks = self.set.subject().ref_marks();
        let result = step(self);
        if result.is_err() {
            self.set.subject_mut().truncate_refs(marks);
        }
        result
    }

    fn build_stub(&mut self, spec: &StubSpec) -> Result<PatchTarget, SkipReason>
    {
        let stub = self.locate_stub(spec)?;
        let (body, target) = match &spec.template {
            Template::PointerResolution => self.pointer_body(stub)?,
            Template::Forwarding(target) => self.forwarding_body(stub, target, false)?,
            Template::WrapperTranslation(target) => self.forwarding_body(stub, target, true)?,
        };
        self.install(stub, body)?;
        if spec.template == Template::PointerResolution {
            self.marshaller = Some(stub);
        }
        Ok(target)
    }

    fn locate_stub(&self, spec: &StubSpec) -> Result<MethodId, ResolutionError>
    {
        let subject = self.set.subject();
        let owner = require_type(subject, &spec.owner)?;
        let stub = require_method(subject, owner, &spec.name, MethodShape::any())?;
        if subject.method(stub).sig.has_this {
            return Err(ResolutionError::ShapeMismatch {
                symbol: spec.qualified_name(),
                reason: "instance stubs are not supported".to_string(),
            });
        }
        Ok(stub)
    }

    fn stub_sig(&self, stub: MethodId) -> MethodSig
    {
        self.set.subject().method(stub).sig.clone()
    }

    fn pointer_body(&mut self, stub: MethodId) -> Result<(MethodBody, PatchTarget), SkipReason>
    {
        let sig = self.stub_sig(stub);
        let stub_name = self.set.subject().method_full_name(stub);
        let shape_ok = sig.params.len() == 1
            && sig.params[0].is_reference()
            && sig.ret.scalar_class() == Some(ScalarClass::Pointer);
        if !shape_ok {
            return Err(ResolutionError::ShapeMismatch {
                symbol: stub_name,
                reason: "expected (object) -> pointer".to_string(),
            }
            .into());
        }

        let location = self.object_type(&sig.params[0])?;
        let symbols = PointerSymbols::resolve(self.set, location, &self.config.object)?;
        let mut builder = BodyBuilder::new();
        emit_pointer_resolution(&mut builder, &symbols)?;

        let target = PatchTarget {
            module: self.set.reference(location.module).name().to_string(),
            symbol: symbols.lookup_name,
        };
        Ok((builder.finish()?, target))
    }

    /// The host object type a marshaller parameter refers to, or the
    /// configured fallback when the reference cannot be followed.
    fn object_type(&mut self, param: &TypeSig) -> Result<TypeLocation, ResolutionError>
    {
        if let TypeSig::Class(TypeHandle::Ref(reference)) = param {
            if let Some(location) = resolve_type_ref(self.set, *reference) {
                return Ok(location);
            }
            debug!(
                type_ref = %self.set.subject().type_ref(*reference).full_name(),
                "object parameter type not resolvable, using configured type"
            );
        }

        let object = &self.config.object;
        let module = self
            .set
            .ensure_loaded(&object.module)
            .ok_or_else(|| ResolutionError::ModuleNotLoaded(object.module.clone()))?;
        let ty = find_type(self.set.reference(module), &object.type_name).ok_or_else(|| {
            ResolutionError::TypeNotFound {
                module: object.module.clone(),
                type_name: object.type_name.clone(),
            }
        })?;
        Ok(TypeLocation { module, ty })
    }

    fn forwarding_body(
        &mut self,
        stub: MethodId,
        target: &ExternalTarget,
        translate: bool,
    ) -> Result<(MethodBody, PatchTarget), SkipReason>
    {
        let module = self
            .set
            .ensure_loaded(&target.module)
            .ok_or_else(|| ResolutionError::ModuleNotLoaded(target.module.clone()))?;
        let reference = self.set.reference(module);
        let ty = require_type(reference, &target.type_name)?;
        let method = require_method(reference, ty, &target.method, MethodShape::with_params(target.arity))?;
        let target_sig = reference.method(method).sig.clone();
        let mismatch = |reason: String| ResolutionError::ShapeMismatch {
            symbol: target.to_string(),
            reason,
        };

        if target_sig.has_this {
            return Err(mismatch("instance targets are not supported".to_string()).into());
        }
        let stub_sig = self.stub_sig(stub);
        if stub_sig.params.len() != target_sig.params.len() {
            return Err(mismatch(format!(
                "stub takes {} argument(s), target takes {}",
                stub_sig.params.len(),
                target_sig.params.len()
            ))
            .into());
        }

        let mut plans = Vec::with_capacity(stub_sig.params.len());
        for (index, (ours, theirs)) in stub_sig.params.iter().zip(&target_sig.params).enumerate() {
            let plan = self
                .plan_argument(ours, theirs)
                .ok_or_else(|| mismatch(format!("argument {index}: {ours} cannot be passed as {theirs}")))?;
            plans.push(plan);
        }

        let spans = plans.iter().filter(|plan| matches!(plan, ArgPlan::Span { .. })).count();
        match (translate, spans) {
            (true, 1) | (false, 0) => {}
            (true, n) => return Err(mismatch(format!("expected one span argument, found {n}")).into()),
            (false, _) => return Err(mismatch("span arguments need the wrapper template".to_string()).into()),
        }

        let discard_result = match (stub_sig.ret.is_void(), target_sig.ret.is_void()) {
            (true, true) => false,
            (true, false) => true,
            (false, true) => return Err(mismatch("target returns void".to_string()).into()),
            (false, false) => {
                let class = stub_sig.ret.scalar_class();
                if class.is_none() || class != target_sig.ret.scalar_class() {
                    let reason = format!("return type {} differs from {}", stub_sig.ret, target_sig.ret);
                    return Err(mismatch(reason).into());
                }
                false
            }
        };

        let mut builder = BodyBuilder::new();
        for (index, plan) in plans.iter().enumerate() {
            let arg = u16::try_from(index).map_err(|_| EmissionError::IndexOverflow { kind: "argument", index })?;
            match plan {
                ArgPlan::Forward => {
                    builder.emit(Instruction::ldarg(arg));
                }
                ArgPlan::Span { by_ref } => {
                    self.span.emit(&mut builder, arg, *by_ref)?;
                }
                ArgPlan::Marshal => {
                    let Some(marshaller) = self.marshaller else {
                        return Err(SkipReason::MarshallerUnavailable(self.marshaller_name()));
                    };
                    builder
                        .emit(Instruction::ldarg(arg))
                        .op_token(OpCode::Call, Token::method_def(marshaller));
                }
            }
        }

        let (subject, reference) = self.set.split_mut(module);
        let call = Importer::new(subject, reference).import_method(method)?;
        builder.op_token(OpCode::Call, Token::member_ref(call));
        if discard_result {
            builder.op(OpCode::Pop);
        }
        builder.op(OpCode::Ret);

        let target = PatchTarget {
            module: target.module.clone(),
            symbol: format!("{}::{}", target.type_name, target.method),
        };
        Ok((builder.finish()?, target))
    }

    fn plan_argument(&self, ours: &TypeSig, theirs: &TypeSig) -> Option<ArgPlan>
    {
        if self.span.is_span(ours) {
            return match theirs {
                TypeSig::ByRef(inner) if matches!(**inner, TypeSig::ValueType(_)) => {
                    Some(ArgPlan::Span { by_ref: true })
                }
                TypeSig::ValueType(_) => Some(ArgPlan::Span { by_ref: false }),
                _ => None,
            };
        }
        if ours.is_reference() {
            return (theirs.scalar_class() == Some(ScalarClass::Pointer)).then_some(ArgPlan::Marshal);
        }
        match (ours.scalar_class(), theirs.scalar_class()) {
            (Some(a), Some(b)) if a == b => Some(ArgPlan::Forward),
            _ => None,
        }
    }

    fn marshaller_name(&self) -> String
    {
        self.config
            .stubs
            .iter()
            .find(|stub| stub.template == Template::PointerResolution)
            .map_or_else(|| "(none configured)".to_string(), StubSpec::qualified_name)
    }

    /// Replace the stub body with `body` if it verifies.
    fn install(&mut self, stub: MethodId, mut body: MethodBody) -> Result<(), SkipReason>
    {
        let subject = self.set.subject_mut();
        let returns_value = !subject.method(stub).sig.ret.is_void();
        let original = subject.take_body(stub);

        body.init_locals = true;
        match verify(subject, &body, returns_value) {
            Ok(max_stack) => {
                body.max_stack = max_stack;
                for (index, instruction) in body.instructions.iter().enumerate() {
                    trace!(stub = %subject.method_full_name(stub), "IL_{index:04}: {instruction}");
                }
                subject.set_body(stub, Some(body));
                Ok(())
            }
            Err(err) => {
                subject.set_body(stub, original);
                Err(err.into())
            }
        }
    }
}

/// Patch every stub in `config` and return their reports in configuration order.
pub fn synthesize(set: &mut ModuleSet, config: &PatchConfig, span: &SpanTranslation) -> Vec<StubReport>
{
    Synthesizer::new(set, config, span).run()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::loader::SearchPathResolver;
    use crate::metadata::{
        FieldId, MemberRefId, MethodAttributes, MethodDef, Module, NewType, TypeId, TypeKind, TypeRefId, Version,
    };

    fn static_method(name: &str, ret: TypeSig, params: impl IntoIterator<Item = TypeSig>) -> MethodDef
    {
        MethodDef::new(
            name,
            MethodAttributes::PUBLIC.union(MethodAttributes::STATIC),
            MethodSig::new_static(ret, params),
        )
    }

    fn set() -> ModuleSet
    {
        let placeholder = MethodBody {
            instructions: vec![Instruction::simple(OpCode::Ldnull), Instruction::simple(OpCode::Throw)],
            ..MethodBody::default()
        };
        let mut subject = Module::new("Bridge", Version::default());
        subject.add_type(
            NewType::new("Bridge", "NativeMethods", TypeKind::Class)
                .method(static_method("Widen", TypeSig::Int32, [TypeSig::Int32]).with_body(placeholder.clone()))
                .method(static_method("Run", TypeSig::Int32, [TypeSig::Int64]).with_body(placeholder.clone()))
                .method(static_method("Fire", TypeSig::Void, [TypeSig::Int64]).with_body(placeholder)),
        );

        let mut host = Module::new("Host", Version::default());
        host.add_type(
            NewType::new("Host", "Api", TypeKind::Class).method(static_method("Run", TypeSig::Int32, [TypeSig::Int64])),
        );
        ModuleSet::new(subject, vec![host], SearchPathResolver::disabled())
    }

    fn forwarding(stub: &str) -> PatchConfig
    {
        PatchConfig {
            stubs: vec![StubSpec::new(
                "Bridge.NativeMethods",
                stub,
                Template::Forwarding(ExternalTarget::new("Host", "Host.Api", "Run", 1)),
            )],
            ..PatchConfig::default()
        }
    }

    fn no_spans() -> SpanTranslation
    {
        SpanTranslation {
            subject_type: TypeId::new(u32::MAX),
            pointer_field: FieldId::new(0),
            length_field: FieldId::new(1),
            wrapper: TypeRefId::new(0),
            ctor: MemberRefId::new(0),
        }
    }

    #[test]
    fn test_forwarding_body()
    {
        let mut set = set();
        let reports = synthesize(&mut set, &forwarding("Run"), &no_spans());
        assert!(matches!(reports[0].state, StubState::Patched(_)), "{:?}", reports[0]);

        let subject = set.subject();
        let body = subject.methods()[1].body.as_ref().unwrap();
        let opcodes: Vec<_> = body.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![OpCode::Ldarg0, OpCode::Call, OpCode::Ret]);
        assert_eq!(body.max_stack, 1);
        assert_eq!(subject.member_ref_full_name(MemberRefId::new(0)), "Host.Api::Run");
    }

    #[test]
    fn test_discarded_result_is_popped()
    {
        let mut set = set();
        synthesize(&mut set, &forwarding("Fire"), &no_spans());

        let body = set.subject().methods()[2].body.as_ref().unwrap();
        let opcodes: Vec<_> = body.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![OpCode::Ldarg0, OpCode::Call, OpCode::Pop, OpCode::Ret]);
    }

    #[test]
    fn test_scalar_width_mismatch_is_skipped()
    {
        let mut set = set();
        let original = set.subject().methods()[0].body.clone();
        let reports = synthesize(&mut set, &forwarding("Widen"), &no_spans());

        assert!(matches!(
            reports[0].state,
            StubState::Skipped(SkipReason::Resolution(ResolutionError::ShapeMismatch { .. }))
        ));
        assert_eq!(set.subject().methods()[0].body, original);
        assert!(set.subject().member_refs().is_empty());
    }

    #[test]
    fn test_rejected_body_drops_its_imports()
    {
        let mut set = set();
        let config = forwarding("Run");
        let span = no_spans();
        let original = set.subject().methods()[1].body.clone();
        let stub = MethodId::new(1);

        let mut synthesizer = Synthesizer::new(&mut set, &config, &span);
        let result = synthesizer.rolled_back(|this| {
            let (subject, host) = this.set.split_mut(0);
            let call = Importer::new(subject, host).import_method(MethodId::new(0))?;
            // pops the result of a call that was never made
            let body = MethodBody {
                instructions: vec![
                    Instruction::simple(OpCode::Pop),
                    Instruction::with_token(OpCode::Call, Token::member_ref(call)),
                    Instruction::simple(OpCode::Ret),
                ],
                ..MethodBody::default()
            };
            this.install(stub, body)
        });

        assert!(matches!(result, Err(SkipReason::Emission(_))));
        let subject = set.subject();
        assert_eq!(subject.methods()[1].body, original);
        assert!(subject.member_refs().is_empty());
        assert!(subject.type_refs().is_empty());
        assert!(subject.assembly_refs().is_empty());
    }

    #[test]
    fn test_unloaded_target_module()
    {
        let mut set = set();
        let mut config = forwarding("Run");
        config.stubs[0].template = Template::Forwarding(ExternalTarget::new("Elsewhere", "Host.Api", "Run", 1));
        let reports = synthesize(&mut set, &config, &no_spans());
        assert_eq!(
            reports[0].state,
            StubState::Skipped(SkipReason::Resolution(ResolutionError::ModuleNotLoaded("Elsewhere".into())))
        );
    }
}
