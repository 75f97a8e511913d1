//! Bézier curves and control point placement

use rand::Rng;
use showreel_core::Point;

/// Largest perpendicular control point offset in pixels
pub const MAX_CONTROL_OFFSET: f64 = 50.0;

/// Control point offset cap as a fraction of the move distance
pub const CONTROL_OFFSET_RATIO: f64 = 0.1;

/// A quadratic or cubic Bézier curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Quadratic {
        start: Point,
        control: Point,
        end: Point,
    },
    Cubic {
        start: Point,
        control1: Point,
        control2: Point,
        end: Point,
    },
}

impl Curve {
    /// Point on the curve at parameter `t` in `[0, 1]`
    pub fn at(&self, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        match *self {
            Curve::Quadratic { start, control, end } => Point {
                x: u * u * start.x + 2.0 * u * t * control.x + t * t * end.x,
                y: u * u * start.y + 2.0 * u * t * control.y + t * t * end.y,
            },
            Curve::Cubic {
                start,
                control1,
                control2,
                end,
            } => Point {
                x: u * u * u * start.x
                    + 3.0 * u * u * t * control1.x
                    + 3.0 * u * t * t * control2.x
                    + t * t * t * end.x,
                y: u * u * u * start.y
                    + 3.0 * u * u * t * control1.y
                    + 3.0 * u * t * t * control2.y
                    + t * t * t * end.y,
            },
        }
    }

    pub fn control_points(&self) -> Vec<Point> {
        match *self {
            Curve::Quadratic { control, .. } => vec![control],
            Curve::Cubic {
                control1, control2, ..
            } => vec![control1, control2],
        }
    }

    /// Sample `count` points, pinning the first and last to the exact endpoints
    pub fn sample(&self, count: usize) -> Vec<Point> {
        let (start, end) = match *self {
            Curve::Quadratic { start, end, .. } | Curve::Cubic { start, end, .. } => (start, end),
        };
        if count < 2 {
            return vec![end];
        }

        let last = count - 1;
        let mut points: Vec<Point> = (0..count)
            .map(|i| self.at(i as f64 / last as f64))
            .collect();
        points[0] = start;
        points[last] = end;
        points
    }
}

/// Cap for the perpendicular offset of control points on a move of `distance` pixels
pub fn control_offset_cap(distance: f64) -> f64 {
    MAX_CONTROL_OFFSET.min(distance * CONTROL_OFFSET_RATIO)
}

/// Build a curve from `start` to `end` with one or two (50/50) control points
/// displaced perpendicular to the straight line between them.
pub fn random_curve<R: Rng>(rng: &mut R, start: Point, end: Point) -> Curve {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let distance = dx.hypot(dy);
    if distance == 0.0 {
        return Curve::Quadratic {
            start,
            control: start,
            end,
        };
    }

    // Unit normal to the start→end vector
    let nx = -dy / distance;
    let ny = dx / distance;
    let cap = control_offset_cap(distance);
    let single_control = rng.random_bool(0.5);

    let mut displaced = |along_min: f64, along_max: f64| {
        let along = rng.random_range(along_min..along_max);
        let offset = rng.random_range(-cap..=cap);
        start.lerp(end, along).offset(nx * offset, ny * offset)
    };

    if single_control {
        Curve::Quadratic {
            start,
            control: displaced(0.3, 0.7),
            end,
        }
    } else {
        Curve::Cubic {
            start,
            control1: displaced(0.2, 0.4),
            control2: displaced(0.6, 0.8),
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / dx.hypot(dy)
    }

    #[test]
    fn test_curve_endpoints() {
        let curve = Curve::Cubic {
            start: Point::new(0.0, 0.0),
            control1: Point::new(10.0, 30.0),
            control2: Point::new(40.0, -20.0),
            end: Point::new(50.0, 0.0),
        };
        assert_eq!(curve.at(0.0), Point::new(0.0, 0.0));
        assert_eq!(curve.at(1.0), Point::new(50.0, 0.0));
    }

    #[test]
    fn test_sample_pins_endpoints() {
        let start = Point::new(13.3, 7.7);
        let end = Point::new(401.9, 222.1);
        let curve = Curve::Quadratic {
            start,
            control: Point::new(200.0, 40.0),
            end,
        };
        let points = curve.sample(20);
        assert_eq!(points.len(), 20);
        assert_eq!(points[0], start);
        assert_eq!(points[19], end);
    }

    #[test]
    fn test_control_offset_cap() {
        assert_eq!(control_offset_cap(100.0), 10.0);
        assert_eq!(control_offset_cap(2000.0), MAX_CONTROL_OFFSET);
    }

    #[test]
    fn test_random_curve_respects_offset_cap() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Point::new(100.0, 100.0);
        let end = Point::new(700.0, 400.0);
        let cap = control_offset_cap(start.distance_to(end));

        let mut saw_quadratic = false;
        let mut saw_cubic = false;
        for _ in 0..200 {
            let curve = random_curve(&mut rng, start, end);
            match curve {
                Curve::Quadratic { .. } => saw_quadratic = true,
                Curve::Cubic { .. } => saw_cubic = true,
            }
            for control in curve.control_points() {
                assert!(perpendicular_distance(control, start, end) <= cap + 1e-9);
            }
        }
        assert!(saw_quadratic && saw_cubic);
    }
}
