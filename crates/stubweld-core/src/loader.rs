//! # Module Loader
//!
//! Loads the writable subject module and the read-only reference modules into
//! a [`ModuleSet`].
//!
//! References whose assembly scope was not loaded explicitly are resolved
//! lazily through a [`SearchPathResolver`]: the first time a scope is needed,
//! `<scope>.dll` is probed in the search directory and cached on success. A
//! failed probe is a miss, never an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use stubweld_core::loader::Loader;
//!
//! let host = Path::new("/opt/host/Editor/Data/Managed/HostEngine");
//! let set = Loader::new(host).load(
//!     Path::new("Bridge.dll"),
//!     &[host.join("HostEngine.CoreModule.dll")],
//! )?;
//! assert_eq!(set.references().len(), 1);
//! # Ok::<(), stubweld_core::error::LoadError>(())
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container::read_module;
use crate::error::LoadError;
use crate::host::module_file_name;
use crate::metadata::{Module, ModuleAccess};

/// Probes a directory for modules named after assembly scopes.
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver
{
    directory: Option<PathBuf>,
}

impl SearchPathResolver
{
    pub fn new(directory: impl Into<PathBuf>) -> Self
    {
        Self {
            directory: Some(directory.into()),
        }
    }

    /// A resolver that never finds anything.
    #[must_use]
    pub fn disabled() -> Self
    {
        Self::default()
    }

    /// Path of the module for `scope`, if it exists in the search directory.
    #[must_use]
    pub fn candidate(&self, scope: &str) -> Option<PathBuf>
    {
        let path = self.directory.as_ref()?.join(module_file_name(scope));
        path.is_file().then_some(path)
    }
}

/// The subject module plus every reference module loaded so far.
#[derive(Debug)]
pub struct ModuleSet
{
    subject: Module,
    references: Vec<Module>,
    resolver: SearchPathResolver,
    misses: BTreeSet<String>,
}

impl ModuleSet
{
    #[must_use]
    pub fn new(subject: Module, references: Vec<Module>, resolver: SearchPathResolver) -> Self
    {
        Self {
            subject,
            references,
            resolver,
            misses: BTreeSet::new(),
        }
    }

    pub fn subject(&self) -> &Module
    {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut Module
    {
        &mut self.subject
    }

    #[must_use]
    pub fn into_subject(self) -> Module
    {
        self.subject
    }

    pub fn references(&self) -> &[Module]
    {
        &self.references
    }

    pub fn reference(&self, index: usize) -> &Module
    {
        &self.references[index]
    }

    /// Index of the already loaded reference module named `name`.
    pub fn reference_index(&self, name: &str) -> Option<usize>
    {
        self.references.iter().position(|module| module.name() == name)
    }

    /// Index of the reference module named `name`, loading it through the
    /// search path on first use.
    pub fn ensure_loaded(&mut self, name: &str) -> Option<usize>
    {
        if let Some(index) = self.reference_index(name) {
            return Some(index);
        }
        if self.misses.contains(name) {
            return None;
        }
        let loaded = self
            .resolver
            .candidate(name)
            .map(|path| read_module(&path, ModuleAccess::ReadOnly));
        match loaded {
            Some(Ok(module)) => {
                debug!(module = name, "resolved module through search path");
                self.references.push(module);
                Some(self.references.len() - 1)
            }
            Some(Err(err)) => {
                debug!(module = name, error = %err, "search path candidate failed to load");
                self.misses.insert(name.to_string());
                None
            }
            None => {
                debug!(module = name, "module not on search path");
                self.misses.insert(name.to_string());
                None
            }
        }
    }

    /// Borrow the subject mutably alongside one reference module.
    pub fn split_mut(&mut self, reference: usize) -> (&mut Module, &Module)
    {
        (&mut self.subject, &self.references[reference])
    }
}

/// Loads module files into a [`ModuleSet`].
#[derive(Debug, Clone)]
pub struct Loader
{
    search_directory: PathBuf,
}

impl Loader
{
    pub fn new(search_directory: impl Into<PathBuf>) -> Self
    {
        Self {
            search_directory: search_directory.into(),
        }
    }

    /// Load `subject` writable and every path in `references` read-only.
    ///
    /// ## Errors
    ///
    /// Returns the first [`LoadError`] encountered; nothing is loaded partially.
    pub fn load(&self, subject: &Path, references: &[PathBuf]) -> Result<ModuleSet, LoadError>
    {
        let subject = read_module(subject, ModuleAccess::Writable)?;
        let references = references
            .iter()
            .map(|path| read_module(path, ModuleAccess::ReadOnly))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ModuleSet::new(
            subject,
            references,
            SearchPathResolver::new(self.search_directory.clone()),
        ))
    }
}
