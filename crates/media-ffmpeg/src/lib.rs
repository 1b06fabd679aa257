//! FFmpeg CLI capability provider: probing, single-frame extraction and
//! edited transcodes. Every long-running call accepts a cancellation flag.

mod decode;
mod error;
mod probe;
mod process;
mod time;
mod transcode;

pub use decode::{
    DecodedVideoFrame, SeekPolicy, decode_frame_at, decode_frame_with_pipeline,
    extract_thumbnail, fit_within,
};
pub use error::{MediaFfmpegError, Result};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_media, probe_media_cancellable};
pub use time::{Rational, clamp_seek_micros, format_seconds, rescale};
pub use transcode::{ColorOperation, CropRect, TranscodeRequest, transcode_mp4};
