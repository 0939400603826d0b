//! Sparse pose graph with tombstoned node removal.

use super::optimizer::{GraphOptimizer, GraphOptimizerConfig};
use super::{GraphError, PoseGraphBackend};
use crate::core::types::{Point2D, Pose2D};
use serde::{Deserialize, Serialize};

/// A probabilistic constraint over one or two nodes.
///
/// `information` is the isotropic weight of the constraint: the factor's
/// information matrix is `information · I₃`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Factor {
    /// Unary anchor holding a node at a measured pose.
    Prior {
        node: usize,
        pose: Pose2D,
        information: f64,
    },
    /// Binary constraint: pose of `to` expressed in `from`'s frame.
    Relative {
        from: usize,
        to: usize,
        measurement: Pose2D,
        information: f64,
    },
}

impl Factor {
    /// Whether the factor involves `id`.
    pub fn references(&self, id: usize) -> bool {
        match self {
            Factor::Prior { node, .. } => *node == id,
            Factor::Relative { from, to, .. } => *from == id || *to == id,
        }
    }
}

/// Pose-graph backend with batch Gauss-Newton optimization.
///
/// Nodes live in a dense table indexed by id; removed nodes leave
/// tombstones so ids stay stable. Referencing an id beyond the table
/// grows it, instantiating identity nodes for every gap. A node freshly
/// created by a factor is seeded from that factor's prediction, so an
/// unoptimized graph already carries usable values.
#[derive(Debug, Default)]
pub struct GraphSlam {
    nodes: Vec<Option<Pose2D>>,
    factors: Vec<Factor>,
    optimizer: GraphOptimizer,
}

impl GraphSlam {
    /// Create an empty graph with default optimizer settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with explicit optimizer settings.
    pub fn with_config(config: GraphOptimizerConfig) -> Self {
        Self {
            nodes: Vec::new(),
            factors: Vec::new(),
            optimizer: GraphOptimizer::new(config),
        }
    }

    /// Number of live (non-removed) nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of stored factors.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Current value of a node, if live.
    pub fn node(&self, id: usize) -> Option<Pose2D> {
        self.nodes.get(id).copied().flatten()
    }

    /// Ensure `id` exists in the table.
    ///
    /// Returns true when the node was freshly instantiated (including a
    /// revived tombstone); the caller then seeds its value.
    fn ensure_node(&mut self, id: usize) -> bool {
        if id < self.nodes.len() {
            if self.nodes[id].is_none() {
                self.nodes[id] = Some(Pose2D::identity());
                return true;
            }
            return false;
        }
        self.nodes.resize(id + 1, Some(Pose2D::identity()));
        true
    }

    fn coerce_information(cov: f64) -> f64 {
        // Zero or negative information is meaningless; weight as 1.
        if cov <= 0.0 {
            1.0
        } else {
            cov
        }
    }
}

impl PoseGraphBackend for GraphSlam {
    fn add_prior(&mut self, node: usize, pose: Pose2D, cov: f64) {
        let information = Self::coerce_information(cov);
        if self.ensure_node(node) {
            self.nodes[node] = Some(pose);
        }
        self.factors.push(Factor::Prior {
            node,
            pose,
            information,
        });
    }

    fn add_relative(&mut self, node_ref: usize, node: usize, relative: Pose2D, cov: f64) {
        let information = Self::coerce_information(cov);
        self.ensure_node(node_ref);
        if self.ensure_node(node) {
            let base = self.nodes[node_ref].expect("node ensured above");
            self.nodes[node] = Some(base.compose(&relative));
        }
        self.factors.push(Factor::Relative {
            from: node_ref,
            to: node,
            measurement: relative,
            information,
        });
    }

    fn remove(&mut self, node: usize) -> Result<(), GraphError> {
        match self.nodes.get_mut(node) {
            Some(slot) if slot.is_some() => *slot = None,
            _ => return Err(GraphError::UnknownNode(node)),
        }
        self.factors.retain(|f| !f.references(node));
        self.optimize();
        Ok(())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.factors.clear();
    }

    fn optimize(&mut self) {
        let result = self.optimizer.optimize(&mut self.nodes, &self.factors);
        log::debug!(
            "graph optimization: {:?} after {} iterations, error {:.6} -> {:.6}",
            result.termination_reason,
            result.iterations,
            result.initial_error,
            result.final_error
        );
    }

    fn nodes(&self) -> Vec<(usize, Pose2D)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, n)| n.map(|pose| (id, pose)))
            .collect()
    }

    fn factors(&self) -> Vec<(Point2D, Point2D)> {
        self.factors
            .iter()
            .filter_map(|f| match f {
                Factor::Relative { from, to, .. } => {
                    let a = self.node(*from)?;
                    let b = self.node(*to)?;
                    Some((a.position(), b.position()))
                }
                Factor::Prior { .. } => None,
            })
            .collect()
    }
}
