//! Core data types shared across the crate.

mod echo;
mod pose;
mod scan;

pub use echo::Echo;
pub use pose::{Point2D, Pose2D};
pub use scan::{Bounds, LaserScan};
