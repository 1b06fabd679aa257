use serde::Serialize;

/// Frame time used when a request leaves it unset or non-positive: 1 second.
pub const DEFAULT_FRAME_TIME_MICROS: i64 = 1_000_000;
/// Longest output side used when a request leaves it unset.
pub const DEFAULT_TARGET_SIZE_PX: u32 = 320;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Replaces a non-positive requested frame time with `default_micros`.
///
/// # Example
/// ```
/// use video_engine::time::{DEFAULT_FRAME_TIME_MICROS, sanitize_frame_time_micros};
///
/// assert_eq!(sanitize_frame_time_micros(0, DEFAULT_FRAME_TIME_MICROS), 1_000_000);
/// assert_eq!(sanitize_frame_time_micros(250_000, DEFAULT_FRAME_TIME_MICROS), 250_000);
/// ```
pub fn sanitize_frame_time_micros(requested: i64, default_micros: i64) -> i64 {
    if requested <= 0 { default_micros } else { requested }
}

/// Replaces a zero target size with `default_px`.
pub fn sanitize_target_size(requested: u32, default_px: u32) -> u32 {
    if requested == 0 { default_px } else { requested }
}

/// Converts seconds to microseconds, rejecting non-finite and out-of-range input.
///
/// # Example
/// ```
/// use video_engine::time::seconds_to_micros;
///
/// assert_eq!(seconds_to_micros(1.5), Some(1_500_000));
/// assert_eq!(seconds_to_micros(f64::NAN), None);
/// ```
pub fn seconds_to_micros(seconds: f64) -> Option<i64> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * MICROS_PER_SECOND).round();
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return None;
    }
    Some(micros as i64)
}

/// Half-open source range `[start_micros, end_micros)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start_micros: i64,
    pub end_micros: i64,
}

impl TimeRange {
    pub fn duration_micros(&self) -> i64 {
        self.end_micros - self.start_micros
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_FRAME_TIME_MICROS, DEFAULT_TARGET_SIZE_PX, sanitize_frame_time_micros,
        sanitize_target_size, seconds_to_micros,
    };

    #[test]
    fn non_positive_frame_times_fall_back_to_default() {
        for requested in [i64::MIN, -1_000_000, -1, 0] {
            assert_eq!(
                sanitize_frame_time_micros(requested, DEFAULT_FRAME_TIME_MICROS),
                DEFAULT_FRAME_TIME_MICROS
            );
        }
        for requested in [1, 33_333, 5_000_000, i64::MAX] {
            assert_eq!(
                sanitize_frame_time_micros(requested, DEFAULT_FRAME_TIME_MICROS),
                requested
            );
        }
    }

    #[test]
    fn zero_target_size_falls_back_to_default() {
        assert_eq!(sanitize_target_size(0, DEFAULT_TARGET_SIZE_PX), 320);
        assert_eq!(sanitize_target_size(96, DEFAULT_TARGET_SIZE_PX), 96);
    }

    #[test]
    fn seconds_to_micros_rounds_to_nearest() {
        assert_eq!(seconds_to_micros(0.0000014), Some(1));
        assert_eq!(seconds_to_micros(-2.0), Some(-2_000_000));
        assert_eq!(seconds_to_micros(f64::INFINITY), None);
        assert_eq!(seconds_to_micros(1e30), None);
    }
}
