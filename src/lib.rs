//! SetuSLAM - Online 2D pose-graph SLAM core
//!
//! Tracks a robot pose in the world frame from planar range-bearing
//! observations and optional wheel-odometry increments, while
//! accumulating a set of *key scans* whose poses are refined by
//! pose-graph optimization.
//!
//! # Architecture
//!
//! The crate is organized into 5 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │        (key-scan admission, callbacks)              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    graph/                           │  ← Backend
//! │        (factor storage, batch optimization)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   matching/                         │  ← Core algorithms
//! │             (k-d tree, robust ICP)                  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor processing
//! │              (wheel odometry)                       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! [`Echo`] samples become a [`LaserScan`]; [`Slam::update_with_scan`]
//! stamps it with the current pose, finds the closest key scan and runs
//! ICP against it. Near an existing key scan the result only refines the
//! pose; far from every key scan the observation is admitted as a new
//! key scan, constrained against its neighbors through the
//! [`PoseGraphBackend`], and the optimized node poses are pulled back
//! into the stored scans.
//!
//! # Example
//!
//! ```
//! use setu_slam::{GraphSlam, LaserScan, Point2D, Pose2D, Slam};
//!
//! let mut slam = Slam::with_backend(GraphSlam::new());
//! slam.register_map_update_callback(|| println!("map changed"));
//!
//! let points = (0..40)
//!     .map(|i| Point2D::new(i as f64 * 0.1, 1.0))
//!     .collect::<Vec<_>>();
//! slam.update_with_scan(LaserScan::from_points(points, Pose2D::identity()));
//!
//! assert_eq!(slam.scans().len(), 1);
//! ```
//!
//! The core is single-threaded: one producer drives the `update_with_*`
//! methods, callbacks run inline before they return, and external
//! threading requires an outer mutex.

// ============================================================================
// Layer 1: Core foundation (types, math)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Scan matching (depends on core)
// ============================================================================
pub mod matching;

// ============================================================================
// Layer 4: Pose-graph backend (depends on core)
// ============================================================================
pub mod graph;

// ============================================================================
// Layer 5: SLAM front-end (depends on all layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::math;
pub use crate::core::types::{Bounds, Echo, LaserScan, Point2D, Pose2D};

// Sensors
pub use sensors::odometry::differential_drive_delta;

// Matching
pub use matching::{IcpConfig, IcpResult, KdTree2D};

// Graph backend
pub use graph::{
    Factor, GraphError, GraphOptimizer, GraphOptimizerConfig, GraphSlam, NoopBackend,
    OptimizationResult, PoseGraphBackend, TerminationReason,
};

// Engine
pub use engine::{MapUpdateCallback, PoseUpdateCallback, Slam};
