// src/fs/mod.rs

//! Filesystem access used for pidfiles.
//!
//! The agent writes its own pidfile at startup and reads task pidfiles on
//! every watchdog tick. Both go through [`FileSystem`] so probes can be
//! exercised against [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Read a file; `Ok(None)` when it does not exist.
    fn read_optional(&self, path: &Path) -> Result<Option<String>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    /// Remove a file; missing files are not an error.
    fn remove(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading file {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        let mut file =
            fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents)
            .with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing file {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Write the current process id to `path`, creating parent directories.
pub fn write_own_pidfile(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let pid = std::process::id();
    fs.write(path, format!("{pid}\n").as_bytes())
}
