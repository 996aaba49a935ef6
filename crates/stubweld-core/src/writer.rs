//! # Binary Writer
//!
//! Serializes the subject module to disk.
//!
//! The whole container is encoded in memory before the output path is
//! touched, so an encoding failure never leaves a file behind.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::container::encode_module;
use crate::error::WriteError;
use crate::metadata::Module;

/// Write `module` to `path`.
///
/// ## Errors
///
/// Returns a [`WriteError`] if the module cannot be encoded or the file cannot
/// be written. A partially written file is removed.
pub fn write_module(module: &Module, path: &Path) -> Result<(), WriteError>
{
    let bytes = encode_module(module)?;
    debug!(path = %path.display(), bytes = bytes.len(), "encoded module");

    if let Err(source) = fs::write(path, &bytes) {
        if path.is_file() {
            let _ = fs::remove_file(path);
        }
        return Err(WriteError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    info!(module = module.name(), path = %path.display(), "wrote patched module");
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::container::read_module;
    use crate::metadata::{ModuleAccess, Version};

    #[test]
    fn test_write_then_read()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Out.dll");
        write_module(&Module::new("Out", Version::new(1, 0, 0, 0)), &path).unwrap();

        let module = read_module(&path, ModuleAccess::ReadOnly).unwrap();
        assert_eq!(module.name(), "Out");
    }

    #[test]
    fn test_missing_directory_is_an_io_error()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("Out.dll");
        let err = write_module(&Module::new("Out", Version::default()), &path).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
        assert!(!path.exists());
    }
}
