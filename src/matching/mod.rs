//! Scan matching: spatial index and ICP alignment.

pub mod icp;
pub mod kdtree;

pub use icp::IcpConfig;
pub use kdtree::KdTree2D;

use crate::core::types::Pose2D;

/// Result of an ICP alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcpResult {
    /// Pose of the query scan expressed in the reference scan's frame.
    pub relative: Pose2D,

    /// Fraction of query points within the match threshold of the
    /// reference at termination (last iteration's value). Used directly
    /// as an information weight for graph factors; 0 marks a failed or
    /// degenerate match whose `relative` is just the initial estimate.
    pub ratio: f64,
}
