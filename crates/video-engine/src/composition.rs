use serde::Serialize;
use tracing::debug;

use crate::time::TimeRange;
use crate::timeline::{EditTimeline, Effect, NormalizedRect};

/// Facts about the source that composition depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub duration_micros: Option<i64>,
    /// Display width, after container rotation.
    pub width: u32,
    pub height: u32,
}

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialTransform {
    pub crop: Option<PixelRect>,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation_degrees: f32,
}

/// Render plan for one export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    /// `None` renders the whole source.
    pub time_range: Option<TimeRange>,
    pub render_size: (u32, u32),
    /// `None` when no crop, scale or rotation applies.
    pub spatial: Option<SpatialTransform>,
    pub effects: Vec<Effect>,
}

/// Builds the render plan for `timeline` over `source`.
///
/// Pure: the same inputs always give the same composition. Trim bounds are
/// clamped to the source duration and a trim that collapses after clamping is
/// ignored.
///
/// # Example
/// ```
/// use serde_json::json;
/// use video_engine::{EditTimeline, SourceInfo, compose};
///
/// let parsed = EditTimeline::from_json(&json!({ "crop": { "left": 0.5 } }));
/// let source = SourceInfo { duration_micros: Some(2_000_000), width: 1920, height: 1080 };
/// let composition = compose(&parsed.timeline, &source);
/// assert_eq!(composition.render_size, (960, 1080));
/// ```
pub fn compose(timeline: &EditTimeline, source: &SourceInfo) -> Composition {
    let time_range = timeline.trim.and_then(|trim| {
        let duration = source.duration_micros.unwrap_or(i64::MAX).max(0);
        let start = trim.start_micros.clamp(0, duration);
        let end = trim.end_micros.unwrap_or(duration).clamp(0, duration);
        if end <= start {
            debug!(start, end, duration, "trim collapses after clamping; rendering full source");
            return None;
        }
        if start == 0 && source.duration_micros == Some(end) {
            return None;
        }
        Some(TimeRange {
            start_micros: start,
            end_micros: end,
        })
    });

    let crop = timeline
        .crop
        .filter(|rect| !rect.is_noop())
        .map(|rect| pixel_rect(&rect, source.width, source.height));
    let render_size = crop.map_or((source.width, source.height), |rect| {
        (rect.width, rect.height)
    });

    let scale = timeline.scale.filter(|scale| !scale.is_identity());
    let spatial = (crop.is_some() || scale.is_some()).then(|| SpatialTransform {
        crop,
        scale_x: scale.map_or(1.0, |scale| scale.scale_x),
        scale_y: scale.map_or(1.0, |scale| scale.scale_y),
        rotation_degrees: scale.map_or(0.0, |scale| scale.rotation_degrees),
    });

    Composition {
        time_range,
        render_size,
        spatial,
        effects: timeline.effects.clone(),
    }
}

fn pixel_rect(rect: &NormalizedRect, width: u32, height: u32) -> PixelRect {
    let to_px = |fraction: f32, extent: u32| (fraction as f64 * extent as f64).round() as u32;
    let x = to_px(rect.left, width).min(width.saturating_sub(1));
    let y = to_px(rect.top, height).min(height.saturating_sub(1));
    let crop_width = to_px(rect.width(), width).clamp(1, width.saturating_sub(x).max(1));
    let crop_height = to_px(rect.height(), height).clamp(1, height.saturating_sub(y).max(1));
    PixelRect {
        x,
        y,
        width: crop_width,
        height: crop_height,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{PixelRect, SourceInfo, compose};
    use crate::time::TimeRange;
    use crate::timeline::{EditTimeline, Effect, NormalizedRect, ScaleRotate, TrimRange};

    const SOURCE: SourceInfo = SourceInfo {
        duration_micros: Some(10_000_000),
        width: 1920,
        height: 1080,
    };

    #[test]
    fn empty_timeline_renders_whole_source() {
        let composition = compose(&EditTimeline::default(), &SOURCE);

        assert_eq!(composition.time_range, None);
        assert_eq!(composition.render_size, (1920, 1080));
        assert_eq!(composition.spatial, None);
        assert!(composition.effects.is_empty());
    }

    #[test]
    fn trim_is_clamped_to_duration() {
        let timeline = EditTimeline {
            trim: Some(TrimRange {
                start_micros: 2_000_000,
                end_micros: Some(60_000_000),
            }),
            ..EditTimeline::default()
        };

        let composition = compose(&timeline, &SOURCE);

        assert_eq!(
            composition.time_range,
            Some(TimeRange {
                start_micros: 2_000_000,
                end_micros: 10_000_000,
            })
        );
    }

    #[test]
    fn trim_starting_past_the_end_is_ignored() {
        let timeline = EditTimeline {
            trim: Some(TrimRange {
                start_micros: 12_000_000,
                end_micros: None,
            }),
            ..EditTimeline::default()
        };

        assert_eq!(compose(&timeline, &SOURCE).time_range, None);
    }

    #[test]
    fn crop_defines_render_size_and_keeps_scale() {
        let timeline = EditTimeline {
            crop: Some(NormalizedRect::clamped(0.25, 0.0, 0.75, 0.5)),
            scale: Some(ScaleRotate {
                scale_x: 0.5,
                scale_y: 0.5,
                rotation_degrees: 90.0,
            }),
            ..EditTimeline::default()
        };

        let composition = compose(&timeline, &SOURCE);
        let spatial = composition.spatial.expect("spatial transform");

        assert_eq!(composition.render_size, (960, 540));
        assert_eq!(
            spatial.crop,
            Some(PixelRect {
                x: 480,
                y: 0,
                width: 960,
                height: 540,
            })
        );
        assert_eq!((spatial.scale_x, spatial.rotation_degrees), (0.5, 90.0));
    }

    #[test]
    fn noop_crop_is_never_emitted() {
        let timeline = EditTimeline {
            crop: Some(NormalizedRect::FULL),
            ..EditTimeline::default()
        };

        let composition = compose(&timeline, &SOURCE);

        assert_eq!(composition.spatial, None);
        assert_eq!(composition.render_size, (1920, 1080));
    }

    #[test]
    fn sliver_and_inverted_crops_are_never_emitted() {
        for crop in [
            NormalizedRect::clamped(0.5, 0.0, 0.50005, 1.0),
            NormalizedRect::clamped(0.0, 0.25, 1.0, 0.25),
            NormalizedRect::clamped(0.8, 0.0, 0.2, 1.0),
        ] {
            let timeline = EditTimeline {
                crop: Some(crop),
                ..EditTimeline::default()
            };

            let composition = compose(&timeline, &SOURCE);

            assert_eq!(composition.spatial, None, "crop {crop:?}");
            assert_eq!(composition.render_size, (1920, 1080));
        }
    }

    #[test]
    fn effects_keep_their_order_and_compose_is_deterministic() {
        let timeline = EditTimeline {
            effects: vec![
                Effect::Lut {
                    path: PathBuf::from("/luts/warm.png"),
                    width: 512,
                    height: 512,
                    depth: 64,
                },
                Effect::ColorMatrix { matrix: [0.5; 20] },
            ],
            ..EditTimeline::default()
        };

        let first = compose(&timeline, &SOURCE);
        let second = compose(&timeline, &SOURCE);

        assert_eq!(first, second);
        assert!(matches!(first.effects[0], Effect::Lut { .. }));
        assert!(matches!(first.effects[1], Effect::ColorMatrix { .. }));
    }
}
