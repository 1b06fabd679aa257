//! Scratch directory and temporary-resource ownership.
//!
//! Every intermediate file the engine creates is a [`TempResource`]. Dropping
//! one deletes the file; [`TempResource::keep`] hands the path to the caller,
//! after which the engine no longer owns it.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Process-private directory that holds every temporary file the engine creates.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Creates a handle for `dir`; the directory itself is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates an empty file named `{prefix}{random}{suffix}`.
    pub fn create(&self, prefix: &str, suffix: &str) -> Result<TempResource> {
        self.create_with(prefix, suffix, |_| Ok(()))
    }

    /// Creates a file and fills it with `write`.
    ///
    /// A failing writer leaves nothing behind: the partial file is removed
    /// before the error is returned.
    ///
    /// # Example
    /// ```no_run
    /// use std::io::Write;
    /// use video_engine::lifecycle::ScratchSpace;
    ///
    /// let scratch = ScratchSpace::new(std::env::temp_dir().join("video_native"));
    /// let resource = scratch
    ///     .create_with("note_", ".txt", |file| file.write_all(b"hello"))
    ///     .expect("scratch file");
    /// assert!(resource.path().exists());
    /// ```
    pub fn create_with<F>(&self, prefix: &str, suffix: &str, write: F) -> Result<TempResource>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        self.ensure_dir()?;
        let mut file = Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .map_err(|source| EngineError::io("failed to create scratch file", &self.dir, source))?;
        let path = file.path().to_path_buf();
        write(file.as_file_mut())
            .map_err(|source| EngineError::io("failed to write scratch file", &path, source))?;
        debug!(path = %path.display(), "scratch file created");
        Ok(TempResource {
            path: file.into_temp_path(),
        })
    }

    /// Removes the scratch directory and everything in it.
    pub fn purge(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "scratch directory purged");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::io(
                "failed to purge scratch directory",
                &self.dir,
                source,
            )),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|source| EngineError::io("failed to create scratch directory", &self.dir, source))
    }
}

/// A file owned by the engine until it is kept or dropped.
#[derive(Debug)]
pub struct TempResource {
    path: TempPath,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands the file off to the caller; it will no longer be deleted.
    pub fn keep(self) -> Result<PathBuf> {
        self.path.keep().map_err(|err| {
            let path = err.path.to_path_buf();
            EngineError::io("failed to hand off scratch file", path, err.error)
        })
    }

    /// Moves the file to `target`, which must not exist yet.
    ///
    /// An existing `target` is never replaced. When a rename is impossible,
    /// for example across file systems, the file is copied into a newly
    /// created `target` instead. The scratch file is gone afterwards either way.
    pub fn persist_to(self, target: &Path) -> Result<PathBuf> {
        let err = match self.path.persist_noclobber(target) {
            Ok(()) => return Ok(target.to_path_buf()),
            Err(err) => err,
        };
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            return Err(EngineError::io("output path already exists", target, err.error));
        }
        debug!(target = %target.display(), error = %err.error, "rename failed; copying output");
        copy_into_new(&err.path, target)
            .map_err(|source| EngineError::io("failed to write output", target, source))?;
        Ok(target.to_path_buf())
    }

    /// Deletes the file now, logging instead of failing when it is already gone.
    pub fn release(self) {
        let shown = self.path.display().to_string();
        if let Err(err) = self.path.close() {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %shown, error = %err, "failed to delete scratch file");
            }
        }
    }
}

fn copy_into_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut out = OpenOptions::new().write(true).create_new(true).open(to)?;
    let copied = File::open(from).and_then(|mut input| io::copy(&mut input, &mut out));
    drop(out);
    if let Err(err) = copied {
        let _ = fs::remove_file(to);
        return Err(err);
    }
    Ok(())
}
