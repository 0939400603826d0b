//! Pose-graph back-end: factor storage and batch optimization.
//!
//! The front-end depends on the [`PoseGraphBackend`] capability set only,
//! so the solver is swappable. [`GraphSlam`] is the batteries-included
//! implementation; [`NoopBackend`] supports append-only builds with no
//! loop closure.

pub mod optimizer;
pub mod pose_graph;

pub use optimizer::{GraphOptimizer, GraphOptimizerConfig, OptimizationResult, TerminationReason};
pub use pose_graph::{Factor, GraphSlam};

use crate::core::types::{Point2D, Pose2D};
use thiserror::Error;

/// Errors from pose-graph node management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The referenced node does not exist or was already removed.
    #[error("unknown pose-graph node id {0}")]
    UnknownNode(usize),
}

/// Capability set of a pose-graph solver.
///
/// Node ids are non-negative integers chosen by the caller. Referencing
/// an id beyond the current table grows the table, instantiating default
/// nodes for every gap; nodes are otherwise created on first reference
/// and destroyed only by [`remove`](PoseGraphBackend::remove) or
/// [`clear`](PoseGraphBackend::clear).
pub trait PoseGraphBackend {
    /// Anchor `node` with a unary prior at `pose`.
    ///
    /// `cov` is an isotropic information weight (3×3 identity scaled);
    /// non-positive values are coerced to 1.0.
    fn add_prior(&mut self, node: usize, pose: Pose2D, cov: f64);

    /// Constrain `node` relative to `node_ref` by `relative`.
    ///
    /// `cov` is an isotropic information weight; non-positive values are
    /// coerced to 1.0.
    fn add_relative(&mut self, node_ref: usize, node: usize, relative: Pose2D, cov: f64);

    /// Remove a node, detach its factors, and re-optimize.
    fn remove(&mut self, node: usize) -> Result<(), GraphError>;

    /// Reset nodes and factors.
    fn clear(&mut self);

    /// Run batch nonlinear least squares over the graph.
    fn optimize(&mut self);

    /// Current value of every live node, by id.
    fn nodes(&self) -> Vec<(usize, Pose2D)>;

    /// Endpoint positions of every binary factor, for visualization.
    fn factors(&self) -> Vec<(Point2D, Point2D)>;
}

/// Backend that stores nothing and never optimizes.
///
/// For builds that run the front-end append-only, without loop closure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl PoseGraphBackend for NoopBackend {
    fn add_prior(&mut self, _node: usize, _pose: Pose2D, _cov: f64) {}

    fn add_relative(&mut self, _node_ref: usize, _node: usize, _relative: Pose2D, _cov: f64) {}

    fn remove(&mut self, _node: usize) -> Result<(), GraphError> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn optimize(&mut self) {}

    fn nodes(&self) -> Vec<(usize, Pose2D)> {
        Vec::new()
    }

    fn factors(&self) -> Vec<(Point2D, Point2D)> {
        Vec::new()
    }
}
