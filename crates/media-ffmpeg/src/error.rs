use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, MediaFfmpegError>;

/// Error type for probing, frame extraction and transcoding backed by FFmpeg CLI tools.
#[derive(Debug)]
pub enum MediaFfmpegError {
    InvalidRational {
        num: i32,
        den: i32,
    },
    InvalidTimestampMicros(i64),
    MissingVideoStream(PathBuf),
    MissingVideoDimensions(PathBuf),
    NoFrameDecoded {
        path: PathBuf,
        at_micros: i64,
    },
    InvalidTranscodeRequest {
        reason: &'static str,
    },
    Cancelled {
        command: String,
    },
    Io {
        context: &'static str,
        source: std::io::Error,
    },
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    Json {
        context: &'static str,
        source: serde_json::Error,
    },
    Image(image::ImageError),
    Parse {
        context: &'static str,
        value: String,
    },
}

impl MediaFfmpegError {
    /// Returns true when the failure was caused by a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl Display for MediaFfmpegError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRational { num, den } => {
                write!(f, "invalid rational {num}/{den}")
            }
            Self::InvalidTimestampMicros(value) => {
                write!(f, "invalid timestamp micros: {value}")
            }
            Self::MissingVideoStream(path) => {
                write!(f, "video stream not found: {}", path.display())
            }
            Self::MissingVideoDimensions(path) => {
                write!(f, "video dimensions missing: {}", path.display())
            }
            Self::NoFrameDecoded { path, at_micros } => {
                write!(
                    f,
                    "no frame decoded at {at_micros}us: {}",
                    path.display()
                )
            }
            Self::InvalidTranscodeRequest { reason } => {
                write!(f, "invalid transcode request: {reason}")
            }
            Self::Cancelled { command } => write!(f, "command cancelled: {command}"),
            Self::Io { context, source } => {
                write!(f, "{context}: {source}")
            }
            Self::CommandFailed {
                command,
                status,
                stderr,
            } => {
                write!(
                    f,
                    "command failed ({status}): {command}; stderr: {}",
                    stderr.trim()
                )
            }
            Self::Json { context, source } => write!(f, "json error ({context}): {source}"),
            Self::Image(err) => write!(f, "image decode error: {err}"),
            Self::Parse { context, value } => {
                write!(f, "parse error ({context}): {value}")
            }
        }
    }
}

impl std::error::Error for MediaFfmpegError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<image::ImageError> for MediaFfmpegError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}
