use std::path::{Path, PathBuf};

use crate::composition::{Composition, SourceInfo};
use crate::error::{EngineError, Result};
use crate::frame::RawImage;
use crate::pool::CancelToken;
use crate::timeline::Effect;

/// Seek precision for frame-at-time decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPolicy {
    Closest,
    ClosestSync,
}

impl From<SeekPolicy> for media_ffmpeg::SeekPolicy {
    fn from(value: SeekPolicy) -> Self {
        match value {
            SeekPolicy::Closest => Self::Closest,
            SeekPolicy::ClosestSync => Self::ClosestSync,
        }
    }
}

/// Input for one edited transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub composition: Composition,
    pub target_bitrate_bps: u32,
    pub output_path: PathBuf,
}

/// Media operations required by the engine.
///
/// Implementations must poll `cancel` during long work and return promptly
/// once it is raised.
pub trait MediaBackend: Send + Sync {
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<SourceInfo>;

    /// Whether [`MediaBackend::thumbnail`] is available on this host.
    fn supports_thumbnail_utility(&self) -> bool {
        true
    }

    /// Representative frame near `at_micros`, at most `max_side` on its longest side.
    fn thumbnail(
        &self,
        path: &Path,
        at_micros: i64,
        max_side: u32,
        cancel: &CancelToken,
    ) -> Result<RawImage>;

    fn frame_at_time(
        &self,
        path: &Path,
        at_micros: i64,
        policy: SeekPolicy,
        cancel: &CancelToken,
    ) -> Result<RawImage>;

    /// Decodes a short window starting at `at_micros` and returns its first frame.
    fn decode_pipeline_frame(
        &self,
        path: &Path,
        at_micros: i64,
        cancel: &CancelToken,
    ) -> Result<RawImage>;

    fn transcode(&self, job: &TranscodeJob, cancel: &CancelToken) -> Result<()>;
}

/// FFmpeg CLI-backed backend used by production wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegMediaBackend;

impl MediaBackend for FfmpegMediaBackend {
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<SourceInfo> {
        let info = media_ffmpeg::probe_media_cancellable(path, cancel.as_flag())?;
        let (width, height) = info.video_dimensions()?;
        Ok(SourceInfo {
            duration_micros: info.duration_micros(),
            width,
            height,
        })
    }

    fn thumbnail(
        &self,
        path: &Path,
        at_micros: i64,
        max_side: u32,
        cancel: &CancelToken,
    ) -> Result<RawImage> {
        let frame = media_ffmpeg::extract_thumbnail(path, at_micros, max_side, cancel.as_flag())?;
        Ok(frame.into())
    }

    fn frame_at_time(
        &self,
        path: &Path,
        at_micros: i64,
        policy: SeekPolicy,
        cancel: &CancelToken,
    ) -> Result<RawImage> {
        let frame =
            media_ffmpeg::decode_frame_at(path, at_micros, policy.into(), cancel.as_flag())?;
        Ok(frame.into())
    }

    fn decode_pipeline_frame(
        &self,
        path: &Path,
        at_micros: i64,
        cancel: &CancelToken,
    ) -> Result<RawImage> {
        let frame = media_ffmpeg::decode_frame_with_pipeline(path, at_micros, cancel.as_flag())?;
        Ok(frame.into())
    }

    fn transcode(&self, job: &TranscodeJob, cancel: &CancelToken) -> Result<()> {
        let request = transcode_request(job)?;
        media_ffmpeg::transcode_mp4(&request, cancel.as_flag())?;
        Ok(())
    }
}

fn transcode_request(job: &TranscodeJob) -> Result<media_ffmpeg::TranscodeRequest> {
    let composition = &job.composition;
    let spatial = composition.spatial.as_ref();
    let scale = spatial
        .map(|spatial| (spatial.scale_x, spatial.scale_y))
        .filter(|&(x, y)| x != 1.0 || y != 1.0);

    let color_operations = composition
        .effects
        .iter()
        .map(|effect| match effect {
            Effect::ColorMatrix { matrix } => media_ffmpeg::ColorOperation::Matrix(*matrix),
            Effect::Lut { path, .. } => media_ffmpeg::ColorOperation::HaldLut(path.clone()),
        })
        .collect();

    if job.target_bitrate_bps == 0 {
        return Err(EngineError::invalid("targetBitrateBps", "must be positive"));
    }

    Ok(media_ffmpeg::TranscodeRequest {
        input: job.input.clone(),
        start_micros: composition.time_range.map(|range| range.start_micros),
        end_micros: composition.time_range.map(|range| range.end_micros),
        crop: spatial.and_then(|spatial| spatial.crop).map(|rect| media_ffmpeg::CropRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }),
        scale,
        rotation_degrees: spatial.map_or(0.0, |spatial| spatial.rotation_degrees),
        color_operations,
        video_bitrate_bps: job.target_bitrate_bps,
        output_path: job.output_path.clone(),
    })
}
