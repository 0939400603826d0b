//! Orchestration layer: the online SLAM front-end.

pub mod slam;

pub use slam::{MapUpdateCallback, PoseUpdateCallback, Slam};
