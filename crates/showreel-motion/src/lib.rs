//! # showreel-motion
//!
//! Pure math for human-looking pointer movement. No I/O.
//!
//! ```
//! use showreel_core::Point;
//! use showreel_motion::{MotionGenerator, MotionOptions};
//!
//! let mut generator = MotionGenerator::seeded(7);
//! let plan = generator.plan(Point::new(10.0, 10.0), Point::new(400.0, 300.0), MotionOptions::default());
//! assert_eq!(plan.frames().first(), Some(&Point::new(10.0, 10.0)));
//! assert_eq!(plan.end(), Point::new(400.0, 300.0));
//! ```

pub mod bezier;
pub mod generator;
pub mod timing;

pub use bezier::Curve;
pub use generator::{MotionGenerator, MotionOptions, MotionPlan, Trajectory};
pub use timing::ease_in_out;
