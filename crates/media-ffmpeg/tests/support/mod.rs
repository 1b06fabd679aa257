use std::path::{Path, PathBuf};
use std::process::Command;

/// Returns false (and logs) when the FFmpeg CLI tools are not installed.
pub fn ffmpeg_available() -> bool {
    let available = ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    });
    if !available {
        eprintln!("ffmpeg/ffprobe not found on PATH; skipping");
    }
    available
}

/// Synthesizes a 160x90, 2 second test clip with a sine audio track.
pub fn make_sample_video(dir: &Path) -> PathBuf {
    let output = dir.join("sample.mp4");

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=160x90:rate=30",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            "2",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&output)
        .output()
        .expect("ffmpeg must run");

    assert!(
        status.status.success(),
        "ffmpeg command must succeed: {}",
        String::from_utf8_lossy(&status.stderr)
    );
    output
}
