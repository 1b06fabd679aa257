mod support;

use std::sync::atomic::AtomicBool;

use media_ffmpeg::{CropRect, TranscodeRequest, probe_media, transcode_mp4};

#[test]
fn transcode_applies_trim_and_crop() {
    if !support::ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let sample = support::make_sample_video(dir.path());
    let output = dir.path().join("edited.mp4");

    let request = TranscodeRequest {
        input: sample,
        start_micros: Some(500_000),
        end_micros: Some(1_500_000),
        crop: Some(CropRect {
            x: 40,
            y: 0,
            width: 80,
            height: 90,
        }),
        scale: None,
        rotation_degrees: 0.0,
        color_operations: Vec::new(),
        video_bitrate_bps: 500_000,
        output_path: output.clone(),
    };
    transcode_mp4(&request, &AtomicBool::new(false)).expect("transcode should succeed");

    let info = probe_media(&output).expect("probe output");
    assert_eq!(info.video_dimensions().expect("dimensions"), (80, 90));
    let duration = info.duration_micros().expect("duration");
    assert!(
        (800_000..=1_200_000).contains(&duration),
        "unexpected duration {duration}"
    );
}
