use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;

use image::ImageFormat;

use crate::error::{MediaFfmpegError, Result};
use crate::probe::probe_media_cancellable;
use crate::process::run_cancellable;
use crate::time::{clamp_seek_micros, format_seconds};

/// Frames scanned by the `thumbnail` filter when picking a representative frame.
const THUMBNAIL_SCAN_FRAMES: u32 = 12;
/// Window decoded by the pipeline extractor, starting at the requested time.
const PIPELINE_WINDOW_MICROS: i64 = 1_000_000;

/// A decoded video frame in RGBA format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// How strictly a frame-at-time decode honours the requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPolicy {
    /// Decode forward from the previous keyframe up to the exact timestamp.
    Closest,
    /// Take the keyframe nearest to the timestamp; cheaper and more tolerant.
    ClosestSync,
}

/// Decodes the frame at `at_micros` using the given seek policy.
///
/// # Example
/// ```no_run
/// use std::sync::atomic::AtomicBool;
/// use media_ffmpeg::{SeekPolicy, decode_frame_at};
///
/// let frame = decode_frame_at("sample.mp4", 500_000, SeekPolicy::Closest, &AtomicBool::new(false))
///     .expect("decode should succeed");
/// assert!(!frame.rgba.is_empty());
/// ```
pub fn decode_frame_at(
    path: impl AsRef<Path>,
    at_micros: i64,
    policy: SeekPolicy,
    cancel: &AtomicBool,
) -> Result<DecodedVideoFrame> {
    validate_timestamp(at_micros)?;
    let path = path.as_ref();
    let media = probe_media_cancellable(path, cancel)?;
    let (width, height) = media.video_dimensions()?;
    let seek = clamp_seek_micros(at_micros, media.duration_micros());

    let mut command = Command::new("ffmpeg");
    command.args(["-hide_banner", "-v", "error"]);
    if policy == SeekPolicy::ClosestSync {
        command.arg("-noaccurate_seek");
    }
    command
        .arg("-ss")
        .arg(format_seconds(seek))
        .arg("-i")
        .arg(path)
        .args(["-map", "0:v:0", "-frames:v", "1"])
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"]);

    let rgba = run_cancellable(
        command,
        format!("ffmpeg decode frame {policy:?} {}", path.display()),
        cancel,
    )?;
    raw_frame(path, at_micros, width, height, rgba)
}

/// Picks a representative frame near `at_micros` with FFmpeg's `thumbnail`
/// filter, scaled so the longest side does not exceed `max_side`.
pub fn extract_thumbnail(
    path: impl AsRef<Path>,
    at_micros: i64,
    max_side: u32,
    cancel: &AtomicBool,
) -> Result<DecodedVideoFrame> {
    validate_timestamp(at_micros)?;
    let path = path.as_ref();
    let media = probe_media_cancellable(path, cancel)?;
    let (source_width, source_height) = media.video_dimensions()?;
    let (width, height) = fit_within(source_width, source_height, max_side);
    let seek = clamp_seek_micros(at_micros, media.duration_micros());

    let mut command = Command::new("ffmpeg");
    command
        .args(["-hide_banner", "-v", "error", "-noaccurate_seek"])
        .arg("-ss")
        .arg(format_seconds(seek))
        .arg("-i")
        .arg(path)
        .args(["-map", "0:v:0", "-an"])
        .arg("-vf")
        .arg(format!(
            "thumbnail={THUMBNAIL_SCAN_FRAMES},scale={width}:{height}"
        ))
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"]);

    let rgba = run_cancellable(
        command,
        format!("ffmpeg thumbnail {}", path.display()),
        cancel,
    )?;
    raw_frame(path, at_micros, width, height, rgba)
}

/// Runs a one-frame transcode pipeline over a short window starting at
/// `at_micros` and decodes the PNG it emits.
///
/// Slowest of the extractors, but it does not depend on probe metadata.
pub fn decode_frame_with_pipeline(
    path: impl AsRef<Path>,
    at_micros: i64,
    cancel: &AtomicBool,
) -> Result<DecodedVideoFrame> {
    validate_timestamp(at_micros)?;
    let path = path.as_ref();

    let mut command = Command::new("ffmpeg");
    command
        .args(["-hide_banner", "-v", "error"])
        .arg("-ss")
        .arg(format_seconds(at_micros))
        .arg("-t")
        .arg(format_seconds(PIPELINE_WINDOW_MICROS))
        .arg("-i")
        .arg(path)
        .args(["-an", "-sn", "-frames:v", "1"])
        .args(["-vf", "format=rgba", "-c:v", "png", "-f", "image2pipe", "-"]);

    let encoded = run_cancellable(
        command,
        format!("ffmpeg pipeline frame {}", path.display()),
        cancel,
    )?;
    if encoded.is_empty() {
        return Err(MediaFfmpegError::NoFrameDecoded {
            path: path.to_path_buf(),
            at_micros,
        });
    }

    let image = image::load_from_memory_with_format(&encoded, ImageFormat::Png)?.into_rgba8();
    Ok(DecodedVideoFrame {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

/// Largest size with the same aspect ratio whose longest side is at most `max_side`.
///
/// Never upscales.
///
/// # Example
/// ```
/// use media_ffmpeg::fit_within;
///
/// assert_eq!(fit_within(1920, 1080, 320), (320, 180));
/// assert_eq!(fit_within(100, 50, 320), (100, 50));
/// ```
pub fn fit_within(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side {
        return (width, height);
    }
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(max_side) + u64::from(longest) / 2)
            / u64::from(longest);
        scaled.max(1) as u32
    };
    (scale(width), scale(height))
}

fn validate_timestamp(at_micros: i64) -> Result<()> {
    if at_micros < 0 {
        return Err(MediaFfmpegError::InvalidTimestampMicros(at_micros));
    }
    Ok(())
}

fn raw_frame(
    path: &Path,
    at_micros: i64,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
) -> Result<DecodedVideoFrame> {
    if rgba.is_empty() {
        return Err(MediaFfmpegError::NoFrameDecoded {
            path: path.to_path_buf(),
            at_micros,
        });
    }
    let expected_size = width as usize * height as usize * 4;
    if rgba.len() != expected_size {
        return Err(MediaFfmpegError::Parse {
            context: "decoded rgba size",
            value: format!("expected {expected_size} bytes, got {}", rgba.len()),
        });
    }

    Ok(DecodedVideoFrame {
        width,
        height,
        rgba,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{fit_within, raw_frame};
    use crate::MediaFfmpegError;

    #[test]
    fn fit_within_preserves_aspect_ratio_for_portrait_sources() {
        assert_eq!(fit_within(1080, 1920, 320), (180, 320));
        assert_eq!(fit_within(3000, 1, 320), (320, 1));
    }

    #[test]
    fn raw_frame_treats_empty_output_as_missing_frame() {
        let result = raw_frame(Path::new("clip.mp4"), 1_000_000, 2, 2, Vec::new());
        assert!(matches!(
            result,
            Err(MediaFfmpegError::NoFrameDecoded {
                at_micros: 1_000_000,
                ..
            })
        ));
    }

    #[test]
    fn raw_frame_rejects_truncated_output() {
        let result = raw_frame(Path::new("clip.mp4"), 0, 2, 2, vec![0; 12]);
        assert!(matches!(result, Err(MediaFfmpegError::Parse { .. })));
    }
}
