use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::AtomicBool;

use crate::error::{MediaFfmpegError, Result};
use crate::process::run_cancellable;
use crate::time::format_seconds;

/// Pixel-space crop applied before any other spatial filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Colour operation applied after the spatial filters, in list order.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorOperation {
    /// Row-major 4x5 RGBA matrix; the fifth column is an offset in 0..255 units.
    Matrix([f32; 20]),
    /// Hald CLUT image applied with `haldclut`.
    HaldLut(PathBuf),
}

/// Request payload for an edited MP4 transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub start_micros: Option<i64>,
    pub end_micros: Option<i64>,
    pub crop: Option<CropRect>,
    pub scale: Option<(f32, f32)>,
    pub rotation_degrees: f32,
    pub color_operations: Vec<ColorOperation>,
    pub video_bitrate_bps: u32,
    pub output_path: PathBuf,
}

/// Transcodes `request.input` into an H.264/AAC MP4, aborting when `cancel` is raised.
///
/// A cancelled or failed run may leave a partial file at `output_path`; the
/// caller owns its removal.
pub fn transcode_mp4(request: &TranscodeRequest, cancel: &AtomicBool) -> Result<()> {
    validate_request(request)?;

    let mut command = Command::new("ffmpeg");
    command.args(["-hide_banner", "-v", "error", "-y"]);
    if let Some(start) = request.start_micros {
        command.arg("-ss").arg(format_seconds(start));
    }
    if let Some(end) = request.end_micros {
        command.arg("-to").arg(format_seconds(end));
    }
    command.arg("-i").arg(&request.input);
    for lut in hald_luts(request) {
        command.arg("-i").arg(lut);
    }

    command
        .arg("-filter_complex")
        .arg(build_filter_complex(request))
        .args(["-map", "[vout]", "-map", "0:a?"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg("-b:v")
        .arg(request.video_bitrate_bps.to_string())
        .args(["-c:a", "aac", "-movflags", "+faststart"])
        .arg(&request.output_path);

    run_cancellable(
        command,
        format!("ffmpeg transcode {}", request.output_path.display()),
        cancel,
    )?;
    Ok(())
}

fn hald_luts(request: &TranscodeRequest) -> impl Iterator<Item = &PathBuf> {
    request
        .color_operations
        .iter()
        .filter_map(|operation| match operation {
            ColorOperation::HaldLut(path) => Some(path),
            ColorOperation::Matrix(_) => None,
        })
}

fn build_filter_complex(request: &TranscodeRequest) -> String {
    let mut filters = Vec::<String>::new();
    if let Some(crop) = request.crop {
        filters.push(format!(
            "crop={}:{}:{}:{}",
            crop.width, crop.height, crop.x, crop.y
        ));
    }
    if let Some((scale_x, scale_y)) = request.scale {
        filters.push(format!("scale=iw*{scale_x}:ih*{scale_y}"));
    }
    if request.rotation_degrees != 0.0 {
        let radians = f64::from(request.rotation_degrees).to_radians();
        filters.push(format!(
            "rotate={radians:.6}:ow=rotw({radians:.6}):oh=roth({radians:.6})"
        ));
    }

    let mut chains = Vec::<String>::new();
    let mut current = "0:v:0".to_string();
    let mut pending = filters;
    let mut lut_input = 1usize;
    let mut stage = 0usize;

    for operation in &request.color_operations {
        match operation {
            ColorOperation::Matrix(matrix) => {
                pending.push("format=rgba".to_string());
                pending.push(color_channel_mixer(matrix));
                if let Some(offsets) = color_offsets(matrix) {
                    pending.push(offsets);
                }
            }
            ColorOperation::HaldLut(_) => {
                let label = format!("c{stage}");
                chains.push(close_chain(&current, &pending, &label));
                pending.clear();
                let applied = format!("h{stage}");
                chains.push(format!("[{label}][{lut_input}:v]haldclut[{applied}]"));
                current = applied;
                lut_input += 1;
                stage += 1;
            }
        }
    }

    pending.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string());
    pending.push("format=yuv420p".to_string());
    chains.push(close_chain(&current, &pending, "vout"));
    chains.join(";")
}

fn close_chain(input: &str, filters: &[String], output: &str) -> String {
    let body = if filters.is_empty() {
        "null".to_string()
    } else {
        filters.join(",")
    };
    format!("[{input}]{body}[{output}]")
}

fn color_channel_mixer(matrix: &[f32; 20]) -> String {
    const CHANNELS: [char; 4] = ['r', 'g', 'b', 'a'];
    let mut options = Vec::with_capacity(16);
    for (row, out) in CHANNELS.iter().enumerate() {
        for (column, input) in CHANNELS.iter().enumerate() {
            options.push(format!("{out}{input}={}", matrix[row * 5 + column]));
        }
    }
    format!("colorchannelmixer={}", options.join(":"))
}

fn color_offsets(matrix: &[f32; 20]) -> Option<String> {
    let offsets = [matrix[4], matrix[9], matrix[14], matrix[19]];
    if offsets.iter().all(|offset| *offset == 0.0) {
        return None;
    }
    Some(format!(
        "lutrgb=r=val+{}:g=val+{}:b=val+{}:a=val+{}",
        offsets[0], offsets[1], offsets[2], offsets[3]
    ))
}

fn validate_request(request: &TranscodeRequest) -> Result<()> {
    if request.video_bitrate_bps == 0 {
        return Err(MediaFfmpegError::InvalidTranscodeRequest {
            reason: "video bitrate must be positive",
        });
    }
    if let (Some(start), Some(end)) = (request.start_micros, request.end_micros) {
        if end <= start {
            return Err(MediaFfmpegError::InvalidTranscodeRequest {
                reason: "time range is not positive",
            });
        }
    }
    if request.start_micros.is_some_and(|start| start < 0) {
        return Err(MediaFfmpegError::InvalidTranscodeRequest {
            reason: "time range starts before zero",
        });
    }
    if let Some(crop) = request.crop {
        if crop.width == 0 || crop.height == 0 {
            return Err(MediaFfmpegError::InvalidTranscodeRequest {
                reason: "crop area is empty",
            });
        }
    }
    if let Some((scale_x, scale_y)) = request.scale {
        if !(scale_x.is_finite() && scale_y.is_finite() && scale_x > 0.0 && scale_y > 0.0) {
            return Err(MediaFfmpegError::InvalidTranscodeRequest {
                reason: "scale factors must be positive",
            });
        }
    }
    if !request.rotation_degrees.is_finite() {
        return Err(MediaFfmpegError::InvalidTranscodeRequest {
            reason: "rotation must be finite",
        });
    }
    if request.input == request.output_path {
        return Err(MediaFfmpegError::InvalidTranscodeRequest {
            reason: "output path equals input path",
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        ColorOperation, CropRect, TranscodeRequest, build_filter_complex, validate_request,
    };
    use crate::MediaFfmpegError;

    fn base_request() -> TranscodeRequest {
        TranscodeRequest {
            input: PathBuf::from("in.mp4"),
            start_micros: None,
            end_micros: None,
            crop: None,
            scale: None,
            rotation_degrees: 0.0,
            color_operations: Vec::new(),
            video_bitrate_bps: 2_000_000,
            output_path: PathBuf::from("out.mp4"),
        }
    }

    #[test]
    fn filter_complex_without_edits_only_normalizes_output() {
        let filter = build_filter_complex(&base_request());
        assert_eq!(
            filter,
            "[0:v:0]scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p[vout]"
        );
    }

    #[test]
    fn filter_complex_applies_crop_before_scale_and_rotation() {
        let request = TranscodeRequest {
            crop: Some(CropRect {
                x: 16,
                y: 9,
                width: 128,
                height: 72,
            }),
            scale: Some((0.5, 0.5)),
            rotation_degrees: 90.0,
            ..base_request()
        };

        let filter = build_filter_complex(&request);
        assert_eq!(
            filter,
            "[0:v:0]crop=128:72:16:9,scale=iw*0.5:ih*0.5,\
rotate=1.570796:ow=rotw(1.570796):oh=roth(1.570796),\
scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p[vout]"
        );
    }

    #[test]
    fn filter_complex_routes_hald_luts_through_extra_inputs() {
        let mut identity = [0.0f32; 20];
        identity[0] = 1.0;
        identity[6] = 1.0;
        identity[12] = 1.0;
        identity[18] = 1.0;
        identity[4] = 10.0;
        let request = TranscodeRequest {
            color_operations: vec![
                ColorOperation::Matrix(identity),
                ColorOperation::HaldLut(PathBuf::from("lut.png")),
            ],
            ..base_request()
        };

        let filter = build_filter_complex(&request);
        assert_eq!(
            filter,
            "[0:v:0]format=rgba,colorchannelmixer=rr=1:rg=0:rb=0:ra=0:gr=0:gg=1:gb=0:ga=0:\
br=0:bg=0:bb=1:ba=0:ar=0:ag=0:ab=0:aa=1,lutrgb=r=val+10:g=val+0:b=val+0:a=val+0[c0];\
[c0][1:v]haldclut[h0];\
[h0]scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p[vout]"
        );
    }

    #[test]
    fn validate_request_rejects_inverted_time_range() {
        let request = TranscodeRequest {
            start_micros: Some(2_000_000),
            end_micros: Some(1_000_000),
            ..base_request()
        };

        assert!(matches!(
            validate_request(&request),
            Err(MediaFfmpegError::InvalidTranscodeRequest {
                reason: "time range is not positive"
            })
        ));
    }

    #[test]
    fn validate_request_rejects_zero_bitrate() {
        let request = TranscodeRequest {
            video_bitrate_bps: 0,
            ..base_request()
        };

        assert!(validate_request(&request).is_err());
    }
}
