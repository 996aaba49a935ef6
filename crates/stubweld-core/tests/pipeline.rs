//! End-to-end runs of the patch pipeline against a fixture host installation

mod common;

use std::fs;

use common::{load, stub, Fixture, CORE, INTEROP, RENDER, STUBS, STUB_OWNER};
use stubweld_core::error::{LoadError, PatchError, ResolutionError};
use stubweld_core::host::HostLayout;
use stubweld_core::il::{OpCode, Token};
use stubweld_core::metadata::{MemberRefId, Module};
use stubweld_core::prune::PruneOutcome;
use stubweld_core::stub::{SkipReason, StubState};
use stubweld_core::{PatchConfig, Patcher};

/// Module the member reference called by `token` resolves through.
fn call_scope(module: &Module, token: Token) -> String
{
    assert_eq!(token.table(), Token::MEMBER_REF, "stub calls {token}, not a member reference");
    let member = module.member_ref(MemberRefId::new(token.row().unwrap()));
    let scope = module.type_ref(member.parent).scope;
    module.assembly_ref(scope).name.clone()
}

#[test]
fn test_all_stubs_patched()
{
    let tree = Fixture::default().build();
    let output = tree.output("Bridge.patched.dll");

    let report = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap();
    assert_eq!(report.patched_count(), 4, "{report}");

    let patched = load(&output);
    for name in STUBS {
        let body = patched.method(stub(&patched, name)).body.as_ref().unwrap();
        assert!(
            body.instructions
                .iter()
                .all(|i| !matches!(i.opcode, OpCode::Newobj | OpCode::Throw)),
            "{name} still throws"
        );

        let mut tail = body.instructions.iter().rev();
        assert_eq!(tail.next().map(|i| i.opcode), Some(OpCode::Ret), "{name} does not end in ret");
        let call = tail.find(|i| i.opcode != OpCode::Pop).unwrap();
        assert_eq!(call.opcode, OpCode::Call, "{name} does not end in a call");
        let scope = call_scope(&patched, call.token().unwrap());
        assert!([CORE, INTEROP, RENDER].contains(&scope.as_str()), "{name} calls into {scope}");
        assert!(body.max_stack > 0);
    }
}

#[test]
fn test_report_names_targets()
{
    let tree = Fixture::default().build();
    let report = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &tree.output("out.dll"))
        .unwrap();

    let StubState::Patched(target) = report.state_of(&format!("{STUB_OWNER}::MemoryCopy")).unwrap() else {
        panic!("MemoryCopy not patched: {report}");
    };
    assert_eq!(target.to_string(), "[HostEngine.CoreModule]HostEngine.Memory.NativeMemory::Copy");

    let StubState::Patched(target) = report.state_of(&format!("{STUB_OWNER}::MarshalObject")).unwrap() else {
        panic!("MarshalObject not patched: {report}");
    };
    assert_eq!(target.symbol, "HostEngine.Object::GetPtrFromInstanceID");
}

#[test]
fn test_overload_picked_by_arity()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap();

    let patched = load(&output);
    let body = patched.method(stub(&patched, "MemoryCopy")).body.as_ref().unwrap();
    let call = body.instructions.iter().find(|i| i.opcode == OpCode::Call).unwrap();
    let member = patched.member_ref(MemberRefId::new(call.token().unwrap().row().unwrap()));
    assert_eq!(member.sig.as_method().unwrap().params.len(), 3);
}

#[test]
fn test_output_is_byte_identical_across_runs()
{
    let tree = Fixture::default().build();
    let first = tree.output("first.dll");
    let second = tree.output("second.dll");

    let patcher = Patcher::new(PatchConfig::default());
    patcher.run(&tree.root, &tree.input, &first).unwrap();
    patcher.run(&tree.root, &tree.input, &second).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_dangling_reference_pruned()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    let report = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap();

    assert_eq!(
        report.pruned,
        Some(PruneOutcome::Removed {
            name: "System.Runtime".into(),
            retargeted: 1
        })
    );
    let input = load(&tree.input);
    let patched = load(&output);
    assert!(input.find_assembly_ref("System.Runtime").is_some());
    assert!(patched.find_assembly_ref("System.Runtime").is_none());
    assert!(patched.debug_stream().is_none());

    // type references keep their module, except the pruned one's which move to the replacement
    for reference in input.type_refs() {
        let scope = match input.assembly_ref(reference.scope).name.as_str() {
            "System.Runtime" => "mscorlib",
            other => other,
        };
        let kept = patched
            .type_refs()
            .iter()
            .find(|candidate| candidate.full_name() == reference.full_name())
            .unwrap();
        assert_eq!(patched.assembly_ref(kept.scope).name, scope);
    }
}

#[test]
fn test_pruned_reference_with_users_is_removed()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    let mut config = PatchConfig::default();
    config.prune_retarget = "netstandard".into();
    let report = Patcher::new(config).run(&tree.root, &tree.input, &output).unwrap();

    let patched = load(&output);
    assert!(patched.find_assembly_ref("System.Runtime").is_none());
    let object = patched
        .type_refs()
        .iter()
        .find(|reference| reference.full_name() == "System.Object")
        .unwrap();
    assert_eq!(patched.assembly_ref(object.scope).name, "netstandard");
    assert!(report.to_string().contains("removed reference System.Runtime, 1 type reference(s) retargeted"));
}

#[test]
fn test_self_retarget_is_foundational()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    let mut config = PatchConfig::default();
    config.prune_retarget = "System.Runtime".into();

    let err = Patcher::new(config).run(&tree.root, &tree.input, &output).unwrap_err();
    assert!(matches!(err, PatchError::Foundational(ResolutionError::ShapeMismatch { .. })));
    assert!(!output.exists());
}

#[test]
fn test_missing_wrapper_writes_nothing()
{
    let tree = Fixture {
        without_wrapper: true,
        ..Fixture::default()
    }
    .build();
    let output = tree.output("out.dll");

    let err = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap_err();
    assert!(
        matches!(err, PatchError::Foundational(ResolutionError::TypeNotFound { ref type_name, .. })
            if type_name == "HostEngine.Bindings.ManagedSpanWrapper"),
        "{err}"
    );
    assert!(!output.exists());
}

#[test]
fn test_missing_stub_is_the_only_skip()
{
    let tree = Fixture {
        without_stub: Some("MemoryClear"),
        ..Fixture::default()
    }
    .build();
    let output = tree.output("out.dll");

    let report = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap();
    assert!(output.exists());
    assert_eq!(report.patched_count(), 3);

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    let (name, reason) = skipped[0];
    assert_eq!(name, "Bridge.NativeMethods::MemoryClear");
    assert!(matches!(
        reason,
        SkipReason::Resolution(ResolutionError::MethodNotFound { method, .. }) if method == "MemoryClear"
    ));
    assert!(report.to_string().contains("MemoryClear"));
}

#[test]
fn test_unpatched_marshaller_skips_its_users()
{
    let tree = Fixture::default().build();
    let mut config = PatchConfig::default();
    config.object.cache_field = "m_Missing".into();

    let report = Patcher::new(config)
        .run(&tree.root, &tree.input, &tree.output("out.dll"))
        .unwrap();
    assert_eq!(report.patched_count(), 2);
    assert!(matches!(
        report.state_of("Bridge.NativeMethods::MarshalObject"),
        Some(StubState::Skipped(SkipReason::Resolution(ResolutionError::FieldNotFound { .. })))
    ));
    assert_eq!(
        report.state_of("Bridge.NativeMethods::UploadBuffer"),
        Some(&StubState::Skipped(SkipReason::MarshallerUnavailable(
            "Bridge.NativeMethods::MarshalObject".into()
        )))
    );
}

#[test]
fn test_skipped_stub_keeps_original_body()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    let mut config = PatchConfig::default();
    config.object.lookup = "Missing".into();
    Patcher::new(config).run(&tree.root, &tree.input, &output).unwrap();

    let input = load(&tree.input);
    let patched = load(&output);
    assert_eq!(
        patched.method(stub(&patched, "MarshalObject")).body,
        input.method(stub(&input, "MarshalObject")).body
    );
}

#[test]
fn test_host_not_found()
{
    let tree = Fixture {
        layout: Some(HostLayout::new("Managed")),
        ..Fixture::default()
    }
    .build();
    let output = tree.output("out.dll");

    let err = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.input, &output)
        .unwrap_err();
    assert!(matches!(err, PatchError::Load(LoadError::HostNotFound { .. })), "{err}");
    assert!(!output.exists());

    let mut config = PatchConfig::default();
    config.prepend_layouts([HostLayout::new("Managed")]);
    let report = Patcher::new(config).run(&tree.root, &tree.input, &output).unwrap();
    assert_eq!(report.patched_count(), 4);
}

#[test]
fn test_unreadable_input()
{
    let tree = Fixture::default().build();
    let output = tree.output("out.dll");
    let err = Patcher::new(PatchConfig::default())
        .run(&tree.root, &tree.output("Missing.dll"), &output)
        .unwrap_err();
    assert!(matches!(err, PatchError::Load(LoadError::Unreadable { .. })));
    assert!(!output.exists());
}
