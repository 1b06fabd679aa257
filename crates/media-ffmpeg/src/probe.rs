use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;

use serde::Deserialize;

use crate::error::{MediaFfmpegError, Result};
use crate::process::run_cancellable;
use crate::time::{Rational, rescale};

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub time_base: Option<Rational>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotation_degrees: i32,
    pub start_pts: Option<i64>,
    pub duration_ts: Option<i64>,
}

impl StreamInfo {
    /// Frame size after FFmpeg applies the stream's display rotation.
    pub fn display_dimensions(&self) -> Option<(u32, u32)> {
        let (width, height) = (self.width?, self.height?);
        if width == 0 || height == 0 {
            return None;
        }
        if self.rotation_degrees.rem_euclid(180) == 90 {
            Some((height, width))
        } else {
            Some((width, height))
        }
    }
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    /// Returns the first video stream.
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Container duration in microseconds, falling back to the longest stream.
    pub fn duration_micros(&self) -> Option<i64> {
        if let Some(seconds) = self.duration_seconds {
            return Some((seconds * 1_000_000.0).round() as i64);
        }

        let mut best = None;
        for stream in &self.streams {
            let (Some(duration_ts), Some(time_base)) = (stream.duration_ts, stream.time_base)
            else {
                continue;
            };
            let micros = rescale(duration_ts, time_base, Rational::MICROS);
            best = Some(best.map_or(micros, |current: i64| current.max(micros)));
        }
        best
    }

    /// Display dimensions of the first video stream.
    pub fn video_dimensions(&self) -> Result<(u32, u32)> {
        let video = self
            .first_video()
            .ok_or_else(|| MediaFfmpegError::MissingVideoStream(self.path.clone()))?;
        video
            .display_dimensions()
            .ok_or_else(|| MediaFfmpegError::MissingVideoDimensions(self.path.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    time_base: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    start_pts: Option<i64>,
    duration_ts: Option<i64>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probes a media file via `ffprobe`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::probe_media;
///
/// let info = probe_media("sample.mp4").expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// ```
pub fn probe_media(path: impl AsRef<Path>) -> Result<MediaInfo> {
    probe_media_cancellable(path, &AtomicBool::new(false))
}

/// Same as [`probe_media`] but aborts `ffprobe` once `cancel` is raised.
pub fn probe_media_cancellable(path: impl AsRef<Path>, cancel: &AtomicBool) -> Result<MediaInfo> {
    let path = path.as_ref();

    let mut command = Command::new("ffprobe");
    command
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path);
    let stdout = run_cancellable(
        command,
        format!("ffprobe {}", path.display()),
        cancel,
    )?;

    parse_probe_output(path, &stdout)
}

fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<MediaInfo> {
    let output: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|source| MediaFfmpegError::Json {
            context: "ffprobe output",
            source,
        })?;

    if output.streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    let streams = output
        .streams
        .into_iter()
        .map(stream_info)
        .collect::<Result<Vec<_>>>()?;
    let duration_seconds = output
        .format
        .and_then(|format| format.duration)
        .map(|raw| parse_duration_seconds(&raw))
        .transpose()?
        .flatten();

    Ok(MediaInfo {
        path: path.to_path_buf(),
        streams,
        duration_seconds,
    })
}

fn stream_info(stream: ProbeStream) -> Result<StreamInfo> {
    let kind = match stream.codec_type.as_deref() {
        Some("video") => StreamKind::Video,
        Some("audio") => StreamKind::Audio,
        _ => StreamKind::Other,
    };
    let time_base = match stream.time_base.as_deref() {
        None | Some("") | Some("0/0") | Some("N/A") => None,
        Some(raw) => Some(Rational::parse(raw)?),
    };

    Ok(StreamInfo {
        index: stream.index,
        kind,
        codec_name: stream.codec_name,
        time_base,
        width: stream.width,
        height: stream.height,
        rotation_degrees: rotation_degrees(&stream.tags, &stream.side_data_list),
        start_pts: stream.start_pts,
        duration_ts: stream.duration_ts,
    })
}

fn rotation_degrees(tags: &HashMap<String, String>, side_data: &[ProbeSideData]) -> i32 {
    if let Some(rotation) = side_data.iter().find_map(|entry| entry.rotation) {
        return rotation.round() as i32;
    }
    tags.get("rotate")
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(0)
}

fn parse_duration_seconds(raw: &str) -> Result<Option<f64>> {
    let value = raw.trim();
    if value.is_empty() || value == "N/A" {
        return Ok(None);
    }
    let seconds = value.parse::<f64>().map_err(|_| MediaFfmpegError::Parse {
        context: "format duration seconds",
        value: value.to_string(),
    })?;
    Ok(Some(seconds))
}
