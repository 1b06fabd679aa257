//! Edit-timeline parsing.
//!
//! The wire form is a loosely typed JSON object. Parsing never fails: each
//! invalid section is dropped and reported as a [`Diagnostic`], and the rest
//! of the timeline is kept.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::time::seconds_to_micros;

/// Area, in normalized units, below which a crop is treated as empty.
pub const CROP_EPSILON: f32 = 1e-4;

const COLOR_MATRIX_LEN: usize = 20;

/// Source-time trim. A missing end means "until the end of the source".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrimRange {
    pub start_micros: i64,
    pub end_micros: Option<i64>,
}

/// Crop rectangle in normalized `[0, 1]` coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub const FULL: Self = Self {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    /// Builds a rectangle with every edge clamped into `[0, 1]`.
    pub fn clamped(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: clamp_unit(left),
            top: clamp_unit(top),
            right: clamp_unit(right),
            bottom: clamp_unit(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn has_area(&self) -> bool {
        self.width() > CROP_EPSILON && self.height() > CROP_EPSILON
    }

    pub fn is_full_frame(&self) -> bool {
        self.left <= CROP_EPSILON
            && self.top <= CROP_EPSILON
            && 1.0 - self.right <= CROP_EPSILON
            && 1.0 - self.bottom <= CROP_EPSILON
    }

    /// True when applying this crop would change nothing or leave nothing.
    pub fn is_noop(&self) -> bool {
        !self.has_area() || self.is_full_frame()
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Uniform spatial transform applied after the crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleRotate {
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation_degrees: f32,
}

impl ScaleRotate {
    pub fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0 && self.rotation_degrees % 360.0 == 0.0
    }
}

/// Colour effect, applied in list order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Row-major 4x5 colour matrix.
    ColorMatrix { matrix: [f32; COLOR_MATRIX_LEN] },
    /// 3D lookup table stored as an image.
    Lut {
        path: PathBuf,
        width: u32,
        height: u32,
        depth: u32,
    },
}

/// Normalized edit description. Every present section has passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditTimeline {
    pub trim: Option<TrimRange>,
    pub crop: Option<NormalizedRect>,
    pub scale: Option<ScaleRotate>,
    pub effects: Vec<Effect>,
}

/// One dropped section and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub field: String,
    pub reason: String,
}

impl Diagnostic {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Parser output: the normalized timeline plus everything that was dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedTimeline {
    pub timeline: EditTimeline,
    pub diagnostics: Vec<Diagnostic>,
}

impl EditTimeline {
    /// Parses a timeline object, or a JSON string holding one.
    ///
    /// # Example
    /// ```
    /// use serde_json::json;
    /// use video_engine::EditTimeline;
    ///
    /// let parsed = EditTimeline::from_json(&json!({
    ///     "trim": { "startSeconds": 1.0, "endSeconds": 3.5 },
    ///     "scale": { "x": 0.5, "y": 0.5 },
    /// }));
    /// let trim = parsed.timeline.trim.expect("trim kept");
    /// assert_eq!(trim.start_micros, 1_000_000);
    /// assert!(parsed.diagnostics.is_empty());
    /// ```
    pub fn from_json(value: &Value) -> ParsedTimeline {
        let mut diagnostics = Vec::new();
        let timeline = match value {
            Value::Null => Self::default(),
            Value::Object(map) => parse_object(map, &mut diagnostics),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => parse_object(&map, &mut diagnostics),
                Ok(_) => {
                    diagnostics.push(Diagnostic::new("timeline", "expected a JSON object"));
                    Self::default()
                }
                Err(err) => {
                    diagnostics.push(Diagnostic::new("timeline", format!("invalid JSON: {err}")));
                    Self::default()
                }
            },
            _ => {
                diagnostics.push(Diagnostic::new("timeline", "expected a JSON object"));
                Self::default()
            }
        };

        for diagnostic in &diagnostics {
            warn!(
                field = %diagnostic.field,
                reason = %diagnostic.reason,
                "timeline section dropped"
            );
        }
        ParsedTimeline {
            timeline,
            diagnostics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trim.is_none() && self.crop.is_none() && self.scale.is_none() && self.effects.is_empty()
    }
}

fn parse_object(map: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) -> EditTimeline {
    EditTimeline {
        trim: section(map, "trim", diagnostics, parse_trim),
        crop: section(map, "crop", diagnostics, parse_crop),
        scale: section(map, "scale", diagnostics, parse_scale),
        effects: parse_effects(map.get("effects"), diagnostics),
    }
}

fn section<T>(
    map: &Map<String, Value>,
    key: &str,
    diagnostics: &mut Vec<Diagnostic>,
    parse: fn(&Map<String, Value>) -> Result<Option<T>, String>,
) -> Option<T> {
    let value = match map.get(key) {
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };
    let Value::Object(fields) = value else {
        diagnostics.push(Diagnostic::new(key, "expected an object"));
        return None;
    };
    match parse(fields) {
        Ok(parsed) => parsed,
        Err(reason) => {
            diagnostics.push(Diagnostic::new(key, reason));
            None
        }
    }
}

/// Reads an optional numeric field; present-but-not-a-number is an error.
fn number(map: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| format!("`{key}` must be a number")),
    }
}

fn parse_trim(map: &Map<String, Value>) -> Result<Option<TrimRange>, String> {
    let start_seconds = number(map, "startSeconds")?.unwrap_or(0.0).max(0.0);
    let start_micros = seconds_to_micros(start_seconds)
        .ok_or_else(|| "`startSeconds` is out of range".to_string())?;
    let end_micros = match number(map, "endSeconds")? {
        Some(seconds) => Some(
            seconds_to_micros(seconds).ok_or_else(|| "`endSeconds` is out of range".to_string())?,
        ),
        None => None,
    };
    if end_micros.is_some_and(|end| end <= start_micros) {
        return Err("end must be after start".to_string());
    }
    Ok(Some(TrimRange {
        start_micros,
        end_micros,
    }))
}

fn parse_crop(map: &Map<String, Value>) -> Result<Option<NormalizedRect>, String> {
    let edge = |key: &str, default: f32| -> Result<f32, String> {
        Ok(number(map, key)?.map_or(default, |value| value as f32))
    };
    let rect = NormalizedRect::clamped(
        edge("left", 0.0)?,
        edge("top", 0.0)?,
        edge("right", 1.0)?,
        edge("bottom", 1.0)?,
    );
    if !rect.has_area() {
        return Err("crop has no area".to_string());
    }
    Ok((!rect.is_full_frame()).then_some(rect))
}

fn parse_scale(map: &Map<String, Value>) -> Result<Option<ScaleRotate>, String> {
    let factor = |keys: [&str; 3]| -> Result<f32, String> {
        for key in keys {
            if let Some(value) = number(map, key)? {
                return Ok(value as f32);
            }
        }
        Ok(1.0)
    };
    let scale_x = factor(["x", "scaleX", "width"])?;
    let scale_y = factor(["y", "scaleY", "height"])?;
    let rotation_degrees = number(map, "rotationDegrees")?.unwrap_or(0.0) as f32;

    if !(scale_x.is_finite() && scale_x > 0.0 && scale_y.is_finite() && scale_y > 0.0) {
        return Err("scale factors must be positive".to_string());
    }
    let transform = ScaleRotate {
        scale_x,
        scale_y,
        rotation_degrees,
    };
    Ok((!transform.is_identity()).then_some(transform))
}

fn parse_effects(value: Option<&Value>, diagnostics: &mut Vec<Diagnostic>) -> Vec<Effect> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            diagnostics.push(Diagnostic::new("effects", "expected an array"));
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_effect(item) {
            Ok(effect) => Some(effect),
            Err(reason) => {
                diagnostics.push(Diagnostic::new(format!("effects[{index}]"), reason));
                None
            }
        })
        .collect()
}

fn parse_effect(item: &Value) -> Result<Effect, String> {
    let Value::Object(map) = item else {
        return Err("expected an object".to_string());
    };
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing `type`".to_string())?;

    match kind {
        "lut" => {
            let path = map
                .get("path")
                .and_then(Value::as_str)
                .filter(|path| !path.trim().is_empty())
                .ok_or_else(|| "lut requires a `path`".to_string())?;
            Ok(Effect::Lut {
                path: PathBuf::from(path),
                width: positive_dimension(map, "width")?,
                height: positive_dimension(map, "height")?,
                depth: positive_dimension(map, "depth")?,
            })
        }
        "colorFilter" | "colorMatrix" => {
            let values = map
                .get("matrix")
                .and_then(Value::as_array)
                .ok_or_else(|| "color matrix requires a `matrix` array".to_string())?;
            if values.len() != COLOR_MATRIX_LEN {
                return Err(format!(
                    "color matrix needs {COLOR_MATRIX_LEN} values, got {}",
                    values.len()
                ));
            }
            let mut matrix = [0.0_f32; COLOR_MATRIX_LEN];
            for (slot, value) in matrix.iter_mut().zip(values) {
                *slot = value
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| "color matrix values must be numbers".to_string())?
                    as f32;
            }
            Ok(Effect::ColorMatrix { matrix })
        }
        other => Err(format!("unknown effect type `{other}`")),
    }
}

fn positive_dimension(map: &Map<String, Value>, key: &str) -> Result<u32, String> {
    let value = number(map, key)?.ok_or_else(|| format!("lut requires `{key}`"))?;
    if value < 1.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(format!("lut `{key}` must be a positive integer"));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EditTimeline, Effect, NormalizedRect, ScaleRotate, TrimRange};

    #[test]
    fn inverted_trim_is_dropped_with_diagnostic() {
        let parsed = EditTimeline::from_json(&json!({
            "trim": { "startSeconds": 2, "endSeconds": 1 }
        }));

        assert_eq!(parsed.timeline.trim, None);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].field, "trim");
    }

    #[test]
    fn trim_defaults_start_and_clamps_negative() {
        let parsed = EditTimeline::from_json(&json!({
            "trim": { "startSeconds": -3, "endSeconds": 1.25 }
        }));
        assert_eq!(
            parsed.timeline.trim,
            Some(TrimRange {
                start_micros: 0,
                end_micros: Some(1_250_000),
            })
        );

        let open_ended = EditTimeline::from_json(&json!({ "trim": { "startSeconds": 4 } }));
        assert_eq!(
            open_ended.timeline.trim,
            Some(TrimRange {
                start_micros: 4_000_000,
                end_micros: None,
            })
        );
    }

    #[test]
    fn crop_is_clamped_and_noop_crops_are_dropped() {
        let parsed = EditTimeline::from_json(&json!({
            "crop": { "left": -0.5, "top": 0.25, "right": 1.5, "bottom": 0.75 }
        }));
        assert_eq!(
            parsed.timeline.crop,
            Some(NormalizedRect {
                left: 0.0,
                top: 0.25,
                right: 1.0,
                bottom: 0.75,
            })
        );

        let full = EditTimeline::from_json(&json!({ "crop": { "left": 0, "right": 1 } }));
        assert_eq!(full.timeline.crop, None);
        assert!(full.diagnostics.is_empty());

        let sliver = EditTimeline::from_json(&json!({
            "crop": { "left": 0.5, "right": 0.50005 }
        }));
        assert_eq!(sliver.timeline.crop, None);
        assert_eq!(sliver.diagnostics.len(), 1);
    }

    #[test]
    fn scale_aliases_resolve_in_order() {
        let parsed = EditTimeline::from_json(&json!({
            "scale": { "scaleX": 2.0, "width": 3.0, "height": 0.5, "rotationDegrees": 90 }
        }));
        assert_eq!(
            parsed.timeline.scale,
            Some(ScaleRotate {
                scale_x: 2.0,
                scale_y: 0.5,
                rotation_degrees: 90.0,
            })
        );

        let identity = EditTimeline::from_json(&json!({ "scale": { "x": 1, "y": 1 } }));
        assert_eq!(identity.timeline.scale, None);

        let negative = EditTimeline::from_json(&json!({ "scale": { "x": -1 } }));
        assert_eq!(negative.timeline.scale, None);
        assert_eq!(negative.diagnostics.len(), 1);
    }

    #[test]
    fn invalid_effects_are_dropped_individually() {
        let mut matrix = vec![0.0; 20];
        matrix[0] = 1.0;
        let parsed = EditTimeline::from_json(&json!({
            "effects": [
                { "type": "lut", "path": "/luts/a.png", "width": 0, "height": 64, "depth": 64 },
                { "type": "colorFilter", "matrix": matrix },
                { "type": "sparkles" },
                { "type": "colorMatrix", "matrix": [1, 2, 3] },
                { "type": "lut", "path": "/luts/b.png", "width": 512, "height": 512, "depth": 64 },
            ]
        }));

        assert_eq!(parsed.timeline.effects.len(), 2);
        assert!(matches!(parsed.timeline.effects[0], Effect::ColorMatrix { .. }));
        assert!(matches!(
            &parsed.timeline.effects[1],
            Effect::Lut { width: 512, depth: 64, .. }
        ));
        let fields: Vec<_> = parsed
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.field.as_str())
            .collect();
        assert_eq!(fields, ["effects[0]", "effects[2]", "effects[3]"]);
    }

    #[test]
    fn string_encoded_timeline_is_accepted() {
        let parsed = EditTimeline::from_json(&json!(
            r#"{"trim":{"startSeconds":0.5},"crop":{"left":0.1}}"#
        ));
        assert!(parsed.timeline.trim.is_some());
        assert!(parsed.timeline.crop.is_some());

        let garbage = EditTimeline::from_json(&json!("not json"));
        assert!(garbage.timeline.is_empty());
        assert_eq!(garbage.diagnostics.len(), 1);
    }
}
