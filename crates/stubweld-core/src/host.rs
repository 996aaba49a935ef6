//! # Host Locator
//!
//! Finds the directory of a host installation that holds the reference modules.
//!
//! A host root can be laid out in several ways depending on how it was
//! installed. Each [`HostLayout`] is a path relative to the root; layouts are
//! probed in order and the first directory containing every reference module
//! wins.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LoadError;

/// A candidate location of the managed host modules, relative to the host root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout(PathBuf);

impl HostLayout
{
    pub fn new(relative: impl Into<PathBuf>) -> Self
    {
        Self(relative.into())
    }

    /// Editor installations.
    #[must_use]
    pub fn editor() -> Self
    {
        Self::new("Editor/Data/Managed/HostEngine")
    }

    /// Application bundles.
    #[must_use]
    pub fn bundle() -> Self
    {
        Self::new("Contents/Managed/HostEngine")
    }

    #[must_use]
    pub fn builtin() -> Vec<Self>
    {
        vec![Self::editor(), Self::bundle()]
    }

    pub fn relative(&self) -> &Path
    {
        &self.0
    }

    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf
    {
        root.join(&self.0)
    }
}

impl fmt::Display for HostLayout
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0.display())
    }
}

/// File name of a module on disk.
#[must_use]
pub fn module_file_name(module: &str) -> String
{
    format!("{module}.dll")
}

/// Return the first layout directory under `root` that contains every module in `modules`.
///
/// ## Errors
///
/// Returns [`LoadError::HostNotFound`] listing every probed directory when no
/// layout qualifies.
pub fn locate_host(root: &Path, layouts: &[HostLayout], modules: &[String]) -> Result<PathBuf, LoadError>
{
    let mut probed = Vec::with_capacity(layouts.len());
    for layout in layouts {
        let directory = layout.resolve(root);
        let missing = modules
            .iter()
            .find(|module| !directory.join(module_file_name(module)).is_file());
        match missing {
            None => {
                debug!(directory = %directory.display(), "host installation found");
                return Ok(directory);
            }
            Some(module) => {
                debug!(directory = %directory.display(), missing = %module, "layout rejected");
                probed.push(directory);
            }
        }
    }
    Err(LoadError::HostNotFound {
        root: root.to_path_buf(),
        probed,
    })
}
