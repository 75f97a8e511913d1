//! Natural motion generator
//!
//! Produces the frames the interaction driver replays to move the pointer.
//! Two levels of easing shape a human-looking move: the curve itself bends
//! away from the straight line, and the traversal along the curve eases in
//! and out. Eased overall progress indexes into the sampled spline; the spline
//! is never re-parameterized.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use showreel_core::Point;
use std::time::Duration;

use crate::bezier::random_curve;
use crate::timing::{base_duration_ms, clamp_duration, ease_in_out, frame_count};

/// Moves shorter than this are a single direct step
pub const DIRECT_MOVE_THRESHOLD: f64 = 5.0;

/// Fewest spline points for any curved move
pub const MIN_SPLINE_POINTS: usize = 15;

/// One spline point per this many pixels of distance
pub const PIXELS_PER_SPLINE_POINT: f64 = 8.0;

/// Largest tremor offset in pixels
pub const MAX_JITTER: f64 = 2.0;

/// Frames at each end that never receive jitter
pub const JITTER_EDGE_FRAMES: usize = 2;

/// Per-move options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionOptions {
    /// Multiplier on the base pointer speed
    pub speed_factor: f64,
    /// Curved, jittered, timing-noisy moves; `false` gives a straight eased move
    pub human_like: bool,
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            speed_factor: 1.0,
            human_like: true,
        }
    }
}

impl MotionOptions {
    pub fn linear() -> Self {
        Self {
            human_like: false,
            ..Self::default()
        }
    }

    pub fn with_speed(mut self, speed_factor: f64) -> Self {
        self.speed_factor = speed_factor;
        self
    }
}

/// Result of planning a pointer move
#[derive(Debug, Clone, PartialEq)]
pub enum MotionPlan {
    /// Negligible distance: jump straight to the target
    Direct(Point),
    /// Animated move
    Path(Trajectory),
}

impl MotionPlan {
    /// Positions to visit in order
    pub fn frames(&self) -> &[Point] {
        match self {
            MotionPlan::Direct(point) => std::slice::from_ref(point),
            MotionPlan::Path(trajectory) => &trajectory.frames,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            MotionPlan::Direct(_) => Duration::ZERO,
            MotionPlan::Path(trajectory) => trajectory.duration,
        }
    }

    /// Delay between consecutive frames
    pub fn frame_interval(&self) -> Duration {
        match self {
            MotionPlan::Direct(_) => Duration::ZERO,
            MotionPlan::Path(trajectory) => trajectory.frame_interval(),
        }
    }

    pub fn end(&self) -> Point {
        match self {
            MotionPlan::Direct(point) => *point,
            MotionPlan::Path(trajectory) => trajectory.end(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, MotionPlan::Direct(_))
    }
}

/// An animated pointer move
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Sampled curve, first and last points equal to the move's endpoints
    pub spline: Vec<Point>,
    /// Per-frame positions at 60 fps
    pub frames: Vec<Point>,
    /// Total duration of the move
    pub duration: Duration,
}

impl Trajectory {
    pub fn frame_interval(&self) -> Duration {
        let steps = self.frames.len().saturating_sub(1).max(1) as u32;
        self.duration / steps
    }

    pub fn end(&self) -> Point {
        self.frames.last().copied().unwrap_or_default()
    }
}

/// Number of spline points for a move of `distance` pixels
pub fn spline_point_count(distance: f64) -> usize {
    ((distance / PIXELS_PER_SPLINE_POINT).ceil() as usize).max(MIN_SPLINE_POINTS)
}

/// Largest jitter for a move of `distance` pixels; long moves tremble less
pub fn jitter_amplitude(distance: f64) -> f64 {
    MAX_JITTER / (1.0 + distance / 500.0)
}

/// Position along a polyline at progress `t` in `[0, 1]`
fn sample_polyline(points: &[Point], t: f64) -> Point {
    match points.len() {
        0 => Point::default(),
        1 => points[0],
        len => {
            let scaled = t.clamp(0.0, 1.0) * (len - 1) as f64;
            let index = (scaled.floor() as usize).min(len - 2);
            let local = scaled - index as f64;
            points[index].lerp(points[index + 1], local)
        }
    }
}

/// Plans pointer moves, owning its random source
pub struct MotionGenerator<R: Rng = StdRng> {
    rng: R,
}

impl MotionGenerator<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for tests and reproducible recordings
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for MotionGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> MotionGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Plan a move from `start` to `end`
    pub fn plan(&mut self, start: Point, end: Point, options: MotionOptions) -> MotionPlan {
        let distance = start.distance_to(end);
        if distance < DIRECT_MOVE_THRESHOLD {
            return MotionPlan::Direct(end);
        }

        if options.human_like {
            MotionPlan::Path(self.human_trajectory(start, end, distance, options.speed_factor))
        } else {
            MotionPlan::Path(linear_trajectory(start, end, distance, options.speed_factor))
        }
    }

    /// Random value in `[min, max]`, shared with callers that need human timing noise
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    fn human_trajectory(
        &mut self,
        start: Point,
        end: Point,
        distance: f64,
        speed_factor: f64,
    ) -> Trajectory {
        let curve = random_curve(&mut self.rng, start, end);
        let spline = curve.sample(spline_point_count(distance));

        let variance = self.rng.random_range(0.8..=1.2);
        let duration = clamp_duration(base_duration_ms(distance, speed_factor) * variance);

        let count = frame_count(duration);
        let last = count - 1;
        let amplitude = jitter_amplitude(distance);

        let frames = (0..count)
            .map(|i| {
                let progress = ease_in_out(i as f64 / last as f64);
                let point = sample_polyline(&spline, progress);
                if i >= JITTER_EDGE_FRAMES && i + JITTER_EDGE_FRAMES <= last {
                    let angle = self.rng.random_range(0.0..std::f64::consts::TAU);
                    let radius = self.rng.random_range(0.0..=amplitude);
                    point.offset(radius * angle.cos(), radius * angle.sin())
                } else {
                    point
                }
            })
            .collect();

        Trajectory {
            spline,
            frames,
            duration,
        }
    }
}

/// Straight ease-in-out move with no randomness
fn linear_trajectory(start: Point, end: Point, distance: f64, speed_factor: f64) -> Trajectory {
    let duration = clamp_duration(base_duration_ms(distance, speed_factor));
    let count = frame_count(duration);
    let last = count - 1;

    let mut frames: Vec<Point> = (0..count)
        .map(|i| start.lerp(end, ease_in_out(i as f64 / last as f64)))
        .collect();
    frames[0] = start;
    frames[last] = end;

    Trajectory {
        spline: vec![start, end],
        frames,
        duration,
    }
}
