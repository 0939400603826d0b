//! Batch graph optimization using Gauss-Newton with LM damping.
//!
//! Minimizes the weighted squared error over all factors:
//!
//! ```text
//! F(x) = Σ e_k(x)^T · ω_k·I₃ · e_k(x)
//! ```
//!
//! where `e_k` is a prior or relative-pose residual and `ω_k` its
//! isotropic information weight. Each round assembles the normal
//! equations `H·Δx = -b` from per-factor closed forms (the isotropic
//! weight reduces every block to `ω·JᵀJ`, which for SE(2) factors has a
//! handful of nonzero entries), solves them by an in-place LDLᵀ
//! factorization, and applies the increment; on divergence the step is
//! reverted and the damping raised. Graphs small enough for
//! per-admission batch runs (hundreds of key scans) stay well within
//! the dense solver's comfort zone.

use super::pose_graph::Factor;
use crate::core::math::{angle_diff, normalize_angle};
use crate::core::types::{Point2D, Pose2D};

/// Diagonal weight pinning the first node when no prior anchors the graph.
const GAUGE_WEIGHT: f64 = 1e10;

/// Error growth beyond this ratio marks a step as diverging.
const DIVERGENCE_RATIO: f64 = 1.1;

/// Damping multiplier after a rejected step.
const DAMPING_GROWTH: f64 = 10.0;

/// Damping multiplier after an accepted step.
const DAMPING_SHRINK: f64 = 0.1;

/// Lower clamp for the damping once steps keep succeeding.
const DAMPING_MIN: f64 = 1e-10;

/// Damping above this bound means no step length helps; give up.
const DAMPING_MAX: f64 = 1e10;

/// Result of a graph optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Number of iterations performed.
    pub iterations: u32,

    /// Initial chi-squared error.
    pub initial_error: f64,

    /// Final chi-squared error.
    pub final_error: f64,

    /// Whether the optimization converged.
    pub converged: bool,

    /// Reason for termination.
    pub termination_reason: TerminationReason,
}

/// Reason for optimization termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Relative error change fell below the threshold.
    Converged,

    /// Maximum iterations reached.
    MaxIterations,

    /// Error kept increasing even with maximum damping.
    Diverged,

    /// Normal equations were not positive definite.
    SolveFailed,

    /// Nothing to optimize.
    NoFactors,
}

/// Configuration for graph optimization.
#[derive(Debug, Clone)]
pub struct GraphOptimizerConfig {
    /// Maximum number of iterations.
    pub max_iterations: u32,

    /// Convergence threshold for the relative error change.
    pub convergence_threshold: f64,

    /// Initial Levenberg-Marquardt damping factor.
    pub damping_factor: f64,

    /// Whether to use Levenberg-Marquardt (vs pure Gauss-Newton).
    pub use_levenberg_marquardt: bool,
}

impl Default for GraphOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_threshold: 1e-6,
            damping_factor: 1e-3,
            use_levenberg_marquardt: true,
        }
    }
}

/// Batch Gauss-Newton / Levenberg-Marquardt optimizer over a factor list.
#[derive(Debug)]
pub struct GraphOptimizer {
    config: GraphOptimizerConfig,
}

impl Default for GraphOptimizer {
    fn default() -> Self {
        Self::new(GraphOptimizerConfig::default())
    }
}

impl GraphOptimizer {
    /// Create a new optimizer.
    pub fn new(config: GraphOptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimize node values in place.
    ///
    /// Tombstoned nodes and factors touching them are skipped. When no
    /// prior anchors the graph, the first live node is pinned to remove
    /// the gauge freedom.
    pub fn optimize(
        &self,
        nodes: &mut [Option<Pose2D>],
        factors: &[Factor],
    ) -> OptimizationResult {
        // Column assignment for live nodes.
        let mut column: Vec<Option<usize>> = vec![None; nodes.len()];
        let mut ids: Vec<usize> = Vec::new();
        for (id, node) in nodes.iter().enumerate() {
            if node.is_some() {
                column[id] = Some(ids.len());
                ids.push(id);
            }
        }

        let active: Vec<&Factor> = factors
            .iter()
            .filter(|f| match f {
                Factor::Prior { node, .. } => column.get(*node).copied().flatten().is_some(),
                Factor::Relative { from, to, .. } => {
                    column.get(*from).copied().flatten().is_some()
                        && column.get(*to).copied().flatten().is_some()
                }
            })
            .collect();

        if active.is_empty() || ids.is_empty() {
            return OptimizationResult {
                iterations: 0,
                initial_error: 0.0,
                final_error: 0.0,
                converged: true,
                termination_reason: TerminationReason::NoFactors,
            };
        }

        let dim = ids.len() * 3;
        let anchored = active.iter().any(|f| matches!(f, Factor::Prior { .. }));

        let initial_error = chi_squared(nodes, &active);
        let mut current_error = initial_error;
        let mut lambda = self.config.damping_factor;
        let mut iterations = 0;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;

            let (mut h, mut b) = build_normal_equations(nodes, &active, &column, dim);
            if !anchored {
                for d in 0..3 {
                    h[d * dim + d] += GAUGE_WEIGHT;
                }
            }
            if self.config.use_levenberg_marquardt {
                for i in 0..dim {
                    h[i * dim + i] += lambda * h[i * dim + i].max(1.0);
                }
            }

            if !ldlt_solve_in_place(&mut h, &mut b, dim) {
                return OptimizationResult {
                    iterations,
                    initial_error,
                    final_error: current_error,
                    converged: false,
                    termination_reason: TerminationReason::SolveFailed,
                };
            }
            let dx = b;

            apply_update(nodes, &ids, &dx);
            let new_error = chi_squared(nodes, &active);

            if new_error > current_error * DIVERGENCE_RATIO {
                // Revert and retry with stronger damping.
                let reverted: Vec<f64> = dx.iter().map(|x| -x).collect();
                apply_update(nodes, &ids, &reverted);

                if self.config.use_levenberg_marquardt {
                    lambda *= DAMPING_GROWTH;
                    if lambda > DAMPING_MAX {
                        return OptimizationResult {
                            iterations,
                            initial_error,
                            final_error: current_error,
                            converged: false,
                            termination_reason: TerminationReason::Diverged,
                        };
                    }
                    continue;
                }
                return OptimizationResult {
                    iterations,
                    initial_error,
                    final_error: current_error,
                    converged: false,
                    termination_reason: TerminationReason::Diverged,
                };
            }

            if self.config.use_levenberg_marquardt {
                lambda = (lambda * DAMPING_SHRINK).max(DAMPING_MIN);
            }

            let relative_change = (current_error - new_error).abs() / current_error.max(1e-10);
            current_error = new_error;

            if relative_change < self.config.convergence_threshold {
                return OptimizationResult {
                    iterations,
                    initial_error,
                    final_error: current_error,
                    converged: true,
                    termination_reason: TerminationReason::Converged,
                };
            }
        }

        OptimizationResult {
            iterations,
            initial_error,
            final_error: current_error,
            converged: false,
            termination_reason: TerminationReason::MaxIterations,
        }
    }
}

/// Residual of a factor at the current node values.
fn factor_error(nodes: &[Option<Pose2D>], factor: &Factor) -> [f64; 3] {
    match factor {
        Factor::Prior { node, pose, .. } => {
            let x = nodes[*node].expect("live node");
            [
                x.x - pose.x,
                x.y - pose.y,
                angle_diff(pose.theta, x.theta),
            ]
        }
        Factor::Relative {
            from,
            to,
            measurement,
            ..
        } => {
            let xi = nodes[*from].expect("live node");
            let xj = nodes[*to].expect("live node");
            let predicted = xj.relative_to(&xi);
            [
                predicted.x - measurement.x,
                predicted.y - measurement.y,
                angle_diff(measurement.theta, predicted.theta),
            ]
        }
    }
}

/// Total weighted squared error over the active factors.
fn chi_squared(nodes: &[Option<Pose2D>], active: &[&Factor]) -> f64 {
    let mut chi2 = 0.0;
    for &factor in active {
        let information = match *factor {
            Factor::Prior { information, .. } | Factor::Relative { information, .. } => information,
        };
        let e = factor_error(nodes, factor);
        chi2 += information * (e[0] * e[0] + e[1] * e[1] + e[2] * e[2]);
    }
    chi2
}

/// Assemble the normal equations H·Δx = -b over the live-node columns.
fn build_normal_equations(
    nodes: &[Option<Pose2D>],
    active: &[&Factor],
    column: &[Option<usize>],
    dim: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut h = vec![0.0; dim * dim];
    let mut b = vec![0.0; dim];

    for &factor in active {
        let e = factor_error(nodes, factor);
        match *factor {
            Factor::Prior {
                node, information, ..
            } => {
                // The prior's Jacobian is the identity: ω on the block
                // diagonal, ω·e on the gradient.
                let base = column[node].expect("live column") * 3;
                for r in 0..3 {
                    h[(base + r) * dim + base + r] += information;
                    b[base + r] += information * e[r];
                }
            }
            Factor::Relative {
                from,
                to,
                information,
                ..
            } => {
                let xi = nodes[from].expect("live node");
                let xj = nodes[to].expect("live node");
                let base_i = column[from].expect("live column") * 3;
                let base_j = column[to].expect("live column") * 3;
                accumulate_relative(&mut h, &mut b, dim, base_i, base_j, &xi, &xj, information, &e);
            }
        }
    }

    (h, b)
}

/// Add a relative factor's closed-form contribution to H and b.
///
/// The residual is `e = (xj ⊖ xi) - z` (heading wrapped). With the
/// isotropic weight ω, the `JᵀΩJ` blocks collapse: writing `r = xj ⊖ xi`
/// for the predicted relative pose and `w = R(θi)·(r.y, -r.x)`,
///
/// ```text
/// ω⁻¹·Hᵢᵢ = [ I₂       -w ]    ω⁻¹·Hᵢⱼ = [ -I₂     0 ]    ω⁻¹·Hⱼⱼ = I₃
///           [ -wᵀ  |r|²+1 ]              [  wᵀ    -1 ]
///
/// ω⁻¹·bᵢ = (-R(θi)·e_xy, (r.y, -r.x)·e_xy - e_θ)
/// ω⁻¹·bⱼ = ( R(θi)·e_xy, e_θ)
/// ```
///
/// because ∂e/∂xj is the rotation R(θi)ᵀ (orthonormal, so its square
/// vanishes into the identity) and ∂e/∂xi differs from -∂e/∂xj only in
/// the heading column, which is `r` rotated a quarter turn.
#[allow(clippy::too_many_arguments)]
fn accumulate_relative(
    h: &mut [f64],
    b: &mut [f64],
    dim: usize,
    base_i: usize,
    base_j: usize,
    xi: &Pose2D,
    xj: &Pose2D,
    information: f64,
    e: &[f64; 3],
) {
    let rot_i = Pose2D::new(0.0, 0.0, xi.theta);
    let r = xj.relative_to(xi);
    let w = rot_i.transform_point(&Point2D::new(r.y, -r.x));
    let we = rot_i.transform_point(&Point2D::new(e[0], e[1]));
    let rr = r.x * r.x + r.y * r.y;

    // H_ii
    h[base_i * dim + base_i] += information;
    h[(base_i + 1) * dim + base_i + 1] += information;
    h[base_i * dim + base_i + 2] -= information * w.x;
    h[(base_i + 2) * dim + base_i] -= information * w.x;
    h[(base_i + 1) * dim + base_i + 2] -= information * w.y;
    h[(base_i + 2) * dim + base_i + 1] -= information * w.y;
    h[(base_i + 2) * dim + base_i + 2] += information * (rr + 1.0);

    // H_jj
    for d in 0..3 {
        h[(base_j + d) * dim + base_j + d] += information;
    }

    // H_ij and H_ji = H_ij^T
    h[base_i * dim + base_j] -= information;
    h[(base_i + 1) * dim + base_j + 1] -= information;
    h[(base_i + 2) * dim + base_j] += information * w.x;
    h[(base_i + 2) * dim + base_j + 1] += information * w.y;
    h[(base_i + 2) * dim + base_j + 2] -= information;

    h[base_j * dim + base_i] -= information;
    h[(base_j + 1) * dim + base_i + 1] -= information;
    h[base_j * dim + base_i + 2] += information * w.x;
    h[(base_j + 1) * dim + base_i + 2] += information * w.y;
    h[(base_j + 2) * dim + base_i + 2] -= information;

    // Gradients
    b[base_i] -= information * we.x;
    b[base_i + 1] -= information * we.y;
    b[base_i + 2] += information * (r.y * e[0] - r.x * e[1] - e[2]);
    b[base_j] += information * we.x;
    b[base_j + 1] += information * we.y;
    b[base_j + 2] += information * e[2];
}

/// Solve H·Δx = -b by an in-place LDLᵀ factorization.
///
/// `h` is overwritten with the factors (unit-lower triangle below the
/// diagonal, D on it) and `b` with the solution. Returns false when a
/// pivot is not positive, i.e. H is not positive definite.
fn ldlt_solve_in_place(h: &mut [f64], b: &mut [f64], dim: usize) -> bool {
    for j in 0..dim {
        let mut pivot = h[j * dim + j];
        for k in 0..j {
            pivot -= h[j * dim + k] * h[j * dim + k] * h[k * dim + k];
        }
        if pivot <= 0.0 {
            return false;
        }
        h[j * dim + j] = pivot;

        for i in (j + 1)..dim {
            let mut value = h[i * dim + j];
            for k in 0..j {
                value -= h[i * dim + k] * h[j * dim + k] * h[k * dim + k];
            }
            h[i * dim + j] = value / pivot;
        }
    }

    // Right-hand side of H·Δx = -b, then L·D·Lᵀ substitution sweeps.
    for value in b.iter_mut() {
        *value = -*value;
    }
    for i in 0..dim {
        for j in 0..i {
            b[i] -= h[i * dim + j] * b[j];
        }
    }
    for i in 0..dim {
        b[i] /= h[i * dim + i];
    }
    for i in (0..dim).rev() {
        for j in (i + 1)..dim {
            b[i] -= h[j * dim + i] * b[j];
        }
    }

    true
}

/// Apply an increment to the live nodes, renormalizing headings.
fn apply_update(nodes: &mut [Option<Pose2D>], ids: &[usize], dx: &[f64]) {
    for (col, &id) in ids.iter().enumerate() {
        let base = col * 3;
        if base + 2 >= dx.len() {
            continue;
        }
        if let Some(pose) = nodes[id].as_mut() {
            pose.x += dx[base];
            pose.y += dx[base + 1];
            pose.theta = normalize_angle(pose.theta + dx[base + 2]);
        }
    }
}
