//! # Reference Pruner
//!
//! Drops one module-level dependency record that does not apply to the target
//! runtime. Type references scoped to the record move to a replacement record
//! first, so the removal never leaves a dangling scope. Absent records are a
//! no-op, so pruning twice is the same as pruning once.

use std::fmt;

use tracing::debug;

use crate::error::ResolutionError;
use crate::metadata::{AssemblyRef, Module};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome
{
    Removed
    {
        name: String,
        /// Type references moved onto the replacement record
        retargeted: usize,
    },
    Absent
    {
        name: String,
    },
}

impl fmt::Display for PruneOutcome
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            PruneOutcome::Removed { name, retargeted: 0 } => write!(f, "removed reference {name}"),
            PruneOutcome::Removed { name, retargeted } => {
                write!(f, "removed reference {name}, {retargeted} type reference(s) retargeted")
            }
            PruneOutcome::Absent { name } => write!(f, "reference {name} not present"),
        }
    }
}

/// Remove the dependency record named `name` from `module`.
///
/// Type references scoped to it are moved to the record named `retarget`,
/// which is added (with the pruned record's version) when the module has none.
///
/// ## Errors
///
/// Returns [`ResolutionError::ShapeMismatch`] if the record is still in use
/// and `retarget` names the record itself.
pub fn prune_reference(module: &mut Module, name: &str, retarget: &str) -> Result<PruneOutcome, ResolutionError>
{
    let Some(id) = module.find_assembly_ref(name) else {
        debug!(reference = name, "nothing to prune");
        return Ok(PruneOutcome::Absent { name: name.to_string() });
    };

    let mut retargeted = 0;
    if module.assembly_ref_users(id) > 0 {
        if retarget == name {
            return Err(ResolutionError::ShapeMismatch {
                symbol: name.to_string(),
                reason: "still in use and cannot be retargeted onto itself".to_string(),
            });
        }
        let replacement = match module.find_assembly_ref(retarget) {
            Some(existing) => existing,
            None => {
                let version = module.assembly_ref(id).version;
                module.add_assembly_ref(AssemblyRef {
                    name: retarget.to_string(),
                    version,
                })
            }
        };
        retargeted = module.retarget_assembly_ref(id, replacement);
        debug!(reference = name, replacement = retarget, retargeted, "retargeted type references");
    }

    module.remove_assembly_ref(id);
    debug!(reference = name, "pruned dangling reference");
    Ok(PruneOutcome::Removed {
        name: name.to_string(),
        retargeted,
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::metadata::{TypeRef, Version};

    fn module(references: &[&str]) -> Module
    {
        let mut module = Module::new("Bridge", Version::default());
        for name in references {
            module.add_assembly_ref(AssemblyRef {
                name: (*name).into(),
                version: Version::new(4, 2, 0, 0),
            });
        }
        module
    }

    fn type_ref(module: &mut Module, scope: &str, namespace: &str, name: &str)
    {
        let scope = module.find_assembly_ref(scope).unwrap();
        module.add_type_ref(TypeRef {
            scope,
            namespace: namespace.into(),
            name: name.into(),
        });
    }

    #[test]
    fn test_prune_is_idempotent()
    {
        let mut module = module(&["mscorlib", "System.Runtime", "HostEngine.CoreModule"]);
        type_ref(&mut module, "HostEngine.CoreModule", "HostEngine", "Object");

        assert_eq!(
            prune_reference(&mut module, "System.Runtime", "mscorlib").unwrap(),
            PruneOutcome::Removed {
                name: "System.Runtime".into(),
                retargeted: 0
            }
        );
        assert_eq!(
            prune_reference(&mut module, "System.Runtime", "mscorlib").unwrap(),
            PruneOutcome::Absent {
                name: "System.Runtime".into()
            }
        );
        assert_eq!(module.assembly_refs().len(), 2);
        let scope = module.type_refs()[0].scope;
        assert_eq!(module.assembly_ref(scope).name, "HostEngine.CoreModule");
    }

    #[test]
    fn test_users_move_to_existing_replacement()
    {
        let mut module = module(&["System.Runtime", "mscorlib", "HostEngine.CoreModule"]);
        type_ref(&mut module, "System.Runtime", "System", "Object");
        type_ref(&mut module, "HostEngine.CoreModule", "HostEngine", "Object");
        type_ref(&mut module, "System.Runtime", "System", "Exception");

        let outcome = prune_reference(&mut module, "System.Runtime", "mscorlib").unwrap();
        assert_eq!(
            outcome,
            PruneOutcome::Removed {
                name: "System.Runtime".into(),
                retargeted: 2
            }
        );
        assert_eq!(module.assembly_refs().len(), 2);
        let scopes: Vec<_> = module
            .type_refs()
            .iter()
            .map(|reference| module.assembly_ref(reference.scope).name.as_str())
            .collect();
        assert_eq!(scopes, vec!["mscorlib", "HostEngine.CoreModule", "mscorlib"]);
    }

    #[test]
    fn test_missing_replacement_is_added()
    {
        let mut module = module(&["System.Runtime"]);
        type_ref(&mut module, "System.Runtime", "System", "Object");

        prune_reference(&mut module, "System.Runtime", "mscorlib").unwrap();
        assert_eq!(module.assembly_refs().len(), 1);
        assert_eq!(module.assembly_refs()[0].name, "mscorlib");
        assert_eq!(module.assembly_refs()[0].version, Version::new(4, 2, 0, 0));
        assert_eq!(module.assembly_ref(module.type_refs()[0].scope).name, "mscorlib");
    }

    #[test]
    fn test_retarget_onto_itself_is_rejected()
    {
        let mut module = module(&["System.Runtime"]);
        type_ref(&mut module, "System.Runtime", "System", "Object");

        let result = prune_reference(&mut module, "System.Runtime", "System.Runtime");
        assert!(matches!(result, Err(ResolutionError::ShapeMismatch { .. })));
        assert_eq!(module.assembly_refs().len(), 1);
    }
}
