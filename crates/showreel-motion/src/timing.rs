//! Easing and duration math

use std::time::Duration;

/// Base pointer speed in pixels per millisecond
pub const BASE_SPEED_PX_PER_MS: f64 = 1.2;

/// Shortest duration of any animated move
pub const MIN_DURATION: Duration = Duration::from_millis(200);

/// Target emission rate of animation frames
pub const FRAMES_PER_SECOND: f64 = 60.0;

/// Cubic ease-in-out over `[0, 1]`
pub fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Duration of a move before random variance is applied
pub fn base_duration_ms(distance: f64, speed_factor: f64) -> f64 {
    let speed_factor = if speed_factor.is_finite() && speed_factor > 0.0 {
        speed_factor
    } else {
        1.0
    };
    distance / (BASE_SPEED_PX_PER_MS * speed_factor)
}

/// Convert milliseconds to a duration no shorter than [`MIN_DURATION`]
pub fn clamp_duration(ms: f64) -> Duration {
    Duration::from_secs_f64(ms.max(0.0) / 1000.0).max(MIN_DURATION)
}

/// Number of frames for a duration at [`FRAMES_PER_SECOND`], endpoints included
pub fn frame_count(duration: Duration) -> usize {
    let frame_ms = 1000.0 / FRAMES_PER_SECOND;
    let steps = (duration.as_secs_f64() * 1000.0 / frame_ms).ceil() as usize;
    steps.max(1) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_in_out_shape() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-12);
        // slow start, slow finish
        assert!(ease_in_out(0.1) < 0.1);
        assert!(ease_in_out(0.9) > 0.9);

        let mut previous = 0.0;
        for i in 1..=100 {
            let value = ease_in_out(i as f64 / 100.0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_base_duration_handles_bad_speed() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(base_duration_ms(120.0, 1.0), 100.0));
        assert!(close(base_duration_ms(120.0, 2.0), 50.0));
        assert!(close(base_duration_ms(120.0, 0.0), 100.0));
        assert!(close(base_duration_ms(120.0, f64::NAN), 100.0));
    }

    #[test]
    fn test_clamp_duration_minimum() {
        assert_eq!(clamp_duration(10.0), MIN_DURATION);
        assert_eq!(clamp_duration(500.0), Duration::from_millis(500));
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(Duration::from_millis(200)), 13);
        assert_eq!(frame_count(Duration::from_millis(1000)), 61);
        assert_eq!(frame_count(Duration::ZERO), 2);
    }
}
