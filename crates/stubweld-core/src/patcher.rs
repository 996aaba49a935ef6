//! # Patch Pipeline
//!
//! Runs the components in dependency order:
//!
//! 1. locate the host installation and load the subject and reference modules
//! 2. resolve the foundational wrapper pair
//! 3. synthesize every stub body
//! 4. prune the configured dependency record
//! 5. write the subject module
//!
//! A failure in steps 1 or 2 aborts before anything is written. Per-stub
//! failures are recorded in the [`PatchReport`] and never abort the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use stubweld_core::config::PatchConfig;
//! use stubweld_core::patcher::Patcher;
//!
//! let report = Patcher::new(PatchConfig::default()).run(
//!     Path::new("/opt/host"),
//!     Path::new("Bridge.dll"),
//!     Path::new("out/Bridge.dll"),
//! )?;
//! println!("{report}");
//! # Ok::<(), stubweld_core::error::PatchError>(())
//! ```

use std::path::Path;

use tracing::{error, info, info_span};

use crate::config::PatchConfig;
use crate::emit::span::SpanTranslation;
use crate::emit::synth::synthesize;
use crate::error::PatchResult;
use crate::host::{locate_host, module_file_name};
use crate::loader::{Loader, ModuleSet};
use crate::prune::prune_reference;
use crate::stub::PatchReport;
use crate::writer::write_module;

#[derive(Debug, Clone, Default)]
pub struct Patcher
{
    config: PatchConfig,
}

impl Patcher
{
    #[must_use]
    pub fn new(config: PatchConfig) -> Self
    {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PatchConfig
    {
        &self.config
    }

    /// Patch `input` against the host installed under `host_root` and write
    /// the result to `output`.
    ///
    /// ## Errors
    ///
    /// Returns a [`PatchError`](crate::error::PatchError) if the host or a
    /// module cannot be loaded, a foundational symbol is missing, or the
    /// output cannot be written. `output` is not created in any of these cases.
    pub fn run(&self, host_root: &Path, input: &Path, output: &Path) -> PatchResult<PatchReport>
    {
        let _span = info_span!("patch", input = %input.display()).entered();

        let host = locate_host(host_root, &self.config.layouts, &self.config.reference_modules)?;
        info!(host = %host.display(), "using host installation");

        let references: Vec<_> = self
            .config
            .reference_modules
            .iter()
            .map(|module| host.join(module_file_name(module)))
            .collect();
        let mut set = Loader::new(&host).load(input, &references)?;

        let report = self.patch(&mut set)?;
        write_module(set.subject(), output)?;
        info!(patched = report.patched_count(), skipped = report.skipped().count(), "patch complete");
        Ok(report)
    }

    /// Rewrite the stubs of an already loaded subject module in place.
    ///
    /// ## Errors
    ///
    /// Returns [`PatchError::Foundational`](crate::error::PatchError::Foundational)
    /// if the wrapper pair cannot be resolved, in which case the subject is
    /// untouched, or if the configured dependency record cannot be pruned.
    pub fn patch(&self, set: &mut ModuleSet) -> PatchResult<PatchReport>
    {
        let span = SpanTranslation::prepare(set, &self.config.wrapper).inspect_err(|err| {
            error!(%err, "wrapper types unavailable, aborting");
        })?;

        let stubs = synthesize(set, &self.config, &span);
        let pruned = match self.config.pruned_reference.as_deref() {
            Some(name) => Some(
                prune_reference(set.subject_mut(), name, &self.config.prune_retarget).inspect_err(|err| {
                    error!(%err, "dependency record cannot be pruned, aborting");
                })?,
            ),
            None => None,
        };

        Ok(PatchReport { stubs, pruned })
    }
}
