use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine requests.
#[derive(Debug)]
pub enum EngineError {
    /// A required argument was missing or malformed; reported before any work starts.
    InvalidArgument {
        field: &'static str,
        reason: String,
    },
    /// Every frame-extraction strategy failed or timed out.
    DecodeExhausted {
        source: String,
    },
    /// The backend transcode failed.
    ExportFailed {
        reason: String,
    },
    /// The request was cancelled by the caller or superseded by a newer export.
    Cancelled,
    /// A bounded wait elapsed without a result.
    Timeout {
        context: &'static str,
    },
    /// The engine has been disposed.
    Disposed,
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    Image(image::ImageError),
    Media(media_ffmpeg::MediaFfmpegError),
}

/// Coarse error category, stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    InvalidArgument,
    DecodeExhausted,
    ExportFailed,
    Cancelled,
    Timeout,
    Disposed,
    Other,
}

impl EngineErrorKind {
    /// Error code reported over the method-call contract.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument => "bad_args",
            Self::DecodeExhausted => "decode_exhausted",
            Self::ExportFailed => "export_failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Disposed => "disposed",
            Self::Other => "error",
        }
    }
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> EngineErrorKind {
        match self {
            Self::InvalidArgument { .. } => EngineErrorKind::InvalidArgument,
            Self::DecodeExhausted { .. } => EngineErrorKind::DecodeExhausted,
            Self::ExportFailed { .. } => EngineErrorKind::ExportFailed,
            Self::Cancelled => EngineErrorKind::Cancelled,
            Self::Timeout { .. } => EngineErrorKind::Timeout,
            Self::Disposed => EngineErrorKind::Disposed,
            Self::Media(err) if err.is_cancelled() => EngineErrorKind::Cancelled,
            Self::Io { .. } | Self::Image(_) | Self::Media(_) => EngineErrorKind::Other,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { field, reason } => {
                write!(f, "invalid argument `{field}`: {reason}")
            }
            Self::DecodeExhausted { source } => {
                write!(f, "unable to extract a frame from {source}")
            }
            Self::ExportFailed { reason } => write!(f, "export failed: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout { context } => write!(f, "timed out: {context}"),
            Self::Disposed => write!(f, "engine has been disposed"),
            Self::Io {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::Image(err) => write!(f, "image error: {err}"),
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Image(err) => Some(err),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}

impl From<image::ImageError> for EngineError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}
