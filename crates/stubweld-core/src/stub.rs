//! Per-stub outcome tracking.

use std::fmt;

use crate::error::{EmissionError, ResolutionError};
use crate::prune::PruneOutcome;

/// The external method a stub now calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget
{
    pub module: String,
    pub symbol: String,
}

impl fmt::Display for PatchTarget
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}]{}", self.module, self.symbol)
    }
}

/// Why a stub kept its original body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason
{
    Resolution(ResolutionError),
    Emission(EmissionError),
    /// Object arguments are marshalled through a stub that was itself skipped
    MarshallerUnavailable(String),
}

impl fmt::Display for SkipReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SkipReason::Resolution(err) => write!(f, "{err}"),
            SkipReason::Emission(err) => write!(f, "synthesized body rejected: {err}"),
            SkipReason::MarshallerUnavailable(stub) => write!(f, "object marshaller {stub} was not patched"),
        }
    }
}

impl From<ResolutionError> for SkipReason
{
    fn from(err: ResolutionError) -> Self
    {
        SkipReason::Resolution(err)
    }
}

impl From<EmissionError> for SkipReason
{
    fn from(err: EmissionError) -> Self
    {
        SkipReason::Emission(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubState
{
    Unpatched,
    Patched(PatchTarget),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubReport
{
    /// `Owner::Name`
    pub stub: String,
    pub state: StubState,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchReport
{
    /// In configuration order
    pub stubs: Vec<StubReport>,
    pub pruned: Option<PruneOutcome>,
}

impl PatchReport
{
    #[must_use]
    pub fn patched_count(&self) -> usize
    {
        self.stubs
            .iter()
            .filter(|report| matches!(report.state, StubState::Patched(_)))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)>
    {
        self.stubs.iter().filter_map(|report| match &report.state {
            StubState::Skipped(reason) => Some((report.stub.as_str(), reason)),
            _ => None,
        })
    }

    #[must_use]
    pub fn state_of(&self, stub: &str) -> Option<&StubState>
    {
        self.stubs
            .iter()
            .find(|report| report.stub == stub)
            .map(|report| &report.state)
    }
}

impl fmt::Display for PatchReport
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "patched {} of {} stub(s)", self.patched_count(), self.stubs.len())?;
        for report in &self.stubs {
            match &report.state {
                StubState::Patched(target) => writeln!(f, "  patched  {} -> {target}", report.stub)?,
                StubState::Skipped(reason) => writeln!(f, "  skipped  {}: {reason}", report.stub)?,
                StubState::Unpatched => writeln!(f, "  untouched {}", report.stub)?,
            }
        }
        if let Some(pruned) = &self.pruned {
            writeln!(f, "{pruned}")?;
        }
        Ok(())
    }
}
