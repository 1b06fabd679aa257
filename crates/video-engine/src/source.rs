use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::frame::RawImage;
use crate::lifecycle::{ScratchSpace, TempResource};
use crate::pool::CancelToken;

const REMOTE_SCHEME: &str = "content://";
const FILE_SCHEME: &str = "file://";
const LOCAL_COPY_PREFIX: &str = "scoped_video_";
const LOCAL_COPY_SUFFIX: &str = ".tmp";
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Where a media asset comes from.
#[derive(Debug)]
pub enum MediaReference {
    /// An opaque handle only a [`ContentResolver`] can open.
    RemoteHandle(String),
    LocalPath(PathBuf),
    /// A caller-owned open file; its read position is preserved.
    OpenDescriptor(File),
}

impl MediaReference {
    /// Classifies a caller-supplied string.
    ///
    /// # Example
    /// ```
    /// use video_engine::MediaReference;
    ///
    /// assert!(MediaReference::parse("content://media/video/12").is_remote());
    /// assert!(!MediaReference::parse("/sdcard/clip.mp4").is_remote());
    /// ```
    pub fn parse(input: &str) -> Self {
        let remote = input
            .get(..REMOTE_SCHEME.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(REMOTE_SCHEME));
        if remote {
            Self::RemoteHandle(input.to_string())
        } else if let Some(path) = input.strip_prefix(FILE_SCHEME) {
            Self::LocalPath(PathBuf::from(path))
        } else {
            Self::LocalPath(PathBuf::from(input))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteHandle(_))
    }

    /// Duplicates the reference. A duplicated descriptor shares its read offset.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Self::RemoteHandle(handle) => Self::RemoteHandle(handle.clone()),
            Self::LocalPath(path) => Self::LocalPath(path.clone()),
            Self::OpenDescriptor(file) => Self::OpenDescriptor(file.try_clone()?),
        })
    }

    /// Human-readable form used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Self::RemoteHandle(handle) => handle.clone(),
            Self::LocalPath(path) => path.display().to_string(),
            Self::OpenDescriptor(_) => "<open descriptor>".to_string(),
        }
    }
}

/// Platform content access for remote handles.
///
/// Every method may fail; the engine falls back to a local copy or the next
/// extraction strategy.
pub trait ContentResolver: Send + Sync {
    /// Resolves the handle to a readable path on the local file system.
    fn resolve_local_path(&self, handle: &str) -> io::Result<PathBuf>;

    fn open_stream(&self, handle: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Platform fast-path thumbnail for the handle, at most `size_px` on its longest side.
    fn load_thumbnail(&self, handle: &str, size_px: u32) -> io::Result<RawImage>;

    /// Persists read access to `uri` across restarts.
    fn persist_permission(&self, uri: &str, flags: i32) -> io::Result<()>;
}

/// Resolver for hosts without a content provider: every remote call is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnlyResolver;

impl ContentResolver for LocalOnlyResolver {
    fn resolve_local_path(&self, handle: &str) -> io::Result<PathBuf> {
        Err(unsupported(handle))
    }

    fn open_stream(&self, handle: &str) -> io::Result<Box<dyn Read + Send>> {
        Err(unsupported(handle))
    }

    fn load_thumbnail(&self, handle: &str, _size_px: u32) -> io::Result<RawImage> {
        Err(unsupported(handle))
    }

    fn persist_permission(&self, uri: &str, _flags: i32) -> io::Result<()> {
        Err(unsupported(uri))
    }
}

fn unsupported(handle: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("no content resolver available for {handle}"),
    )
}

/// A readable local file for a [`MediaReference`], plus the scratch copy backing it if any.
#[derive(Debug)]
pub struct MaterializedSource {
    path: PathBuf,
    copy: Option<TempResource>,
}

impl MaterializedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_copy(&self) -> bool {
        self.copy.is_some()
    }
}

/// Produces a local, seekable file for `reference`.
///
/// Local paths pass through untouched. Remote handles use the resolver's
/// local path when one is readable and otherwise stream into a scratch copy.
/// Open descriptors are duplicated and copied; the caller's read offset is
/// restored afterwards on every path.
///
/// Copies stop between chunks once `cancel` is raised, and the partial copy
/// is removed.
pub fn materialize_local_copy(
    reference: &MediaReference,
    resolver: &dyn ContentResolver,
    scratch: &ScratchSpace,
    cancel: &CancelToken,
) -> Result<MaterializedSource> {
    match reference {
        MediaReference::LocalPath(path) => Ok(MaterializedSource {
            path: path.clone(),
            copy: None,
        }),
        MediaReference::RemoteHandle(handle) => {
            materialize_remote(handle, resolver, scratch, cancel)
        }
        MediaReference::OpenDescriptor(file) => materialize_descriptor(file, scratch, cancel),
    }
}

fn materialize_remote(
    handle: &str,
    resolver: &dyn ContentResolver,
    scratch: &ScratchSpace,
    cancel: &CancelToken,
) -> Result<MaterializedSource> {
    match resolver.resolve_local_path(handle) {
        Ok(path) if path.is_file() => {
            debug!(handle, path = %path.display(), "remote handle resolved to local path");
            return Ok(MaterializedSource { path, copy: None });
        }
        Ok(path) => {
            debug!(handle, path = %path.display(), "resolved path is not readable; copying");
        }
        Err(err) => debug!(handle, error = %err, "no local path for handle; copying"),
    }

    let mut stream = resolver
        .open_stream(handle)
        .map_err(|source| EngineError::io("failed to open content stream", handle, source))?;
    let copy = scratch.create_with(LOCAL_COPY_PREFIX, LOCAL_COPY_SUFFIX, |file| {
        copy_until_cancelled(&mut stream, file, cancel)
    })?;
    Ok(MaterializedSource {
        path: copy.path().to_path_buf(),
        copy: Some(copy),
    })
}

fn materialize_descriptor(
    file: &File,
    scratch: &ScratchSpace,
    cancel: &CancelToken,
) -> Result<MaterializedSource> {
    let descriptor = PathBuf::from("<open descriptor>");
    let mut duplicate = file
        .try_clone()
        .map_err(|source| EngineError::io("failed to duplicate descriptor", &descriptor, source))?;
    let mut guard = OffsetGuard::capture(&mut duplicate)
        .map_err(|source| EngineError::io("failed to read descriptor offset", &descriptor, source))?;

    let copy = scratch.create_with(LOCAL_COPY_PREFIX, LOCAL_COPY_SUFFIX, |out| {
        guard.file.seek(SeekFrom::Start(0))?;
        copy_until_cancelled(&mut *guard.file, out, cancel)
    })?;
    drop(guard);

    Ok(MaterializedSource {
        path: copy.path().to_path_buf(),
        copy: Some(copy),
    })
}

fn copy_until_cancelled<R>(
    reader: &mut R,
    out: &mut File,
    cancel: &CancelToken,
) -> io::Result<()>
where
    R: Read + ?Sized,
{
    let mut buffer = vec![0; COPY_CHUNK_BYTES];
    loop {
        if cancel.is_cancelled() {
            return Err(io::Error::other("local copy cancelled"));
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        out.write_all(&buffer[..read])?;
    }
}

/// Restores a descriptor's read offset when dropped.
struct OffsetGuard<'a> {
    file: &'a mut File,
    original: u64,
}

impl<'a> OffsetGuard<'a> {
    fn capture(file: &'a mut File) -> io::Result<Self> {
        let original = file.stream_position()?;
        Ok(Self { file, original })
    }
}

impl Drop for OffsetGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.file.seek(SeekFrom::Start(self.original)) {
            warn!(offset = self.original, error = %err, "failed to restore descriptor offset");
        }
    }
}
