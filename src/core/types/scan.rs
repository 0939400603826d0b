//! Laser scan storage with a lazily maintained world-frame view.

use super::echo::Echo;
use super::pose::{Point2D, Pose2D};
use crate::matching::icp::{self, IcpConfig};
use crate::matching::IcpResult;
use serde::{Deserialize, Serialize};

/// Axis-aligned extent of a scan in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// World-frame view of the scan, recomputed whenever the pose changes.
#[derive(Debug, Clone)]
struct WorldCache {
    points: Vec<Point2D>,
    bounds: Bounds,
}

/// A laser scan: sensor-frame points plus the pose they were taken from.
///
/// The scan owns its sensor-frame points (projected once from the input
/// echoes) and a world-frame pose. The world-frame point set and its
/// bounds are computed lazily and invalidated by every pose change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserScan {
    points_self: Vec<Point2D>,
    pose: Pose2D,
    #[serde(skip)]
    world: Option<WorldCache>,
    match_threshold: f64,
    dist_threshold: f64,
}

impl LaserScan {
    /// Distance under which a point pair counts toward the match ratio.
    pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.1;
    /// Distance over which a point pair is rejected as an outlier.
    pub const DEFAULT_DIST_THRESHOLD: f64 = 1.0;

    /// Build a scan from raw echoes, at the identity pose.
    ///
    /// The echoes are projected to sensor-frame points and not retained.
    pub fn from_echoes(echoes: &[Echo]) -> Self {
        Self::from_echoes_at(echoes, Pose2D::identity())
    }

    /// Build a scan from raw echoes at a known pose.
    pub fn from_echoes_at(echoes: &[Echo], pose: Pose2D) -> Self {
        Self::from_points(echoes.iter().map(Echo::point).collect(), pose)
    }

    /// Build a scan directly from sensor-frame points.
    pub fn from_points(points_self: Vec<Point2D>, pose: Pose2D) -> Self {
        Self {
            points_self,
            pose,
            world: None,
            match_threshold: Self::DEFAULT_MATCH_THRESHOLD,
            dist_threshold: Self::DEFAULT_DIST_THRESHOLD,
        }
    }

    /// Number of points in the scan.
    #[inline]
    pub fn len(&self) -> usize {
        self.points_self.len()
    }

    /// Check if the scan has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_self.is_empty()
    }

    /// Points in the sensor's local frame.
    #[inline]
    pub fn points_self(&self) -> &[Point2D] {
        &self.points_self
    }

    /// The scan's pose in the world frame.
    #[inline]
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Set the scan's world pose, invalidating the world-frame cache.
    pub fn set_pose(&mut self, pose: Pose2D) {
        self.pose = pose;
        self.world = None;
    }

    /// Match-ratio distance threshold used by [`LaserScan::icp`].
    #[inline]
    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    /// Set the match-ratio distance threshold.
    pub fn set_match_threshold(&mut self, threshold: f64) {
        self.match_threshold = threshold;
    }

    /// Outlier-rejection distance threshold used by [`LaserScan::icp`].
    #[inline]
    pub fn dist_threshold(&self) -> f64 {
        self.dist_threshold
    }

    /// Set the outlier-rejection distance threshold.
    pub fn set_dist_threshold(&mut self, threshold: f64) {
        self.dist_threshold = threshold;
    }

    /// Points transformed into the world frame by the current pose.
    pub fn points_world(&mut self) -> &[Point2D] {
        &self.ensure_world().points
    }

    /// World-frame axis-aligned bounds. All zero for an empty scan.
    pub fn bounds(&mut self) -> Bounds {
        self.ensure_world().bounds
    }

    /// Minimum world-frame x over all points.
    pub fn min_x_world(&mut self) -> f64 {
        self.ensure_world().bounds.min_x
    }

    /// Maximum world-frame x over all points.
    pub fn max_x_world(&mut self) -> f64 {
        self.ensure_world().bounds.max_x
    }

    /// Minimum world-frame y over all points.
    pub fn min_y_world(&mut self) -> f64 {
        self.ensure_world().bounds.min_y
    }

    /// Maximum world-frame y over all points.
    pub fn max_y_world(&mut self) -> f64 {
        self.ensure_world().bounds.max_y
    }

    /// Recompute the world-frame points and bounds in one pass.
    fn ensure_world(&mut self) -> &WorldCache {
        if self.world.is_none() {
            let mut points = Vec::with_capacity(self.points_self.len());
            let mut bounds = Bounds::default();
            for (i, p) in self.points_self.iter().enumerate() {
                let w = self.pose.transform_point(p);
                if i == 0 {
                    bounds = Bounds {
                        min_x: w.x,
                        max_x: w.x,
                        min_y: w.y,
                        max_y: w.y,
                    };
                } else {
                    bounds.min_x = bounds.min_x.min(w.x);
                    bounds.max_x = bounds.max_x.max(w.x);
                    bounds.min_y = bounds.min_y.min(w.y);
                    bounds.max_y = bounds.max_y.max(w.y);
                }
                points.push(w);
            }
            self.world = Some(WorldCache { points, bounds });
        }
        self.world.as_ref().unwrap()
    }

    /// Align `other` against this scan with point-to-point ICP.
    ///
    /// Returns the pose of `other` expressed in this scan's frame, seeded
    /// from the current pose belief (`other.pose ⊖ self.pose`), together
    /// with the fraction of `other`'s points that ended up within
    /// `match_threshold` of the reference.
    pub fn icp(&self, other: &LaserScan) -> IcpResult {
        let config = IcpConfig {
            match_threshold: self.match_threshold,
            dist_threshold: self.dist_threshold,
            ..IcpConfig::default()
        };
        let initial = other.pose.relative_to(&self.pose);
        icp::align(&self.points_self, &other.points_self, initial, &config)
    }
}
