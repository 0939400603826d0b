//! Online SLAM front-end.
//!
//! Integrates odometry increments, decides when an observation becomes a
//! key scan, drives ICP against stored key scans, and feeds relative-pose
//! factors into the pose-graph backend. Designed for a single producer
//! calling the `update_with_*` methods in sequence; callbacks run inline
//! on the caller's thread and must not re-enter the instance.

use std::f64::consts::FRAC_PI_4;

use crate::core::math::normalize_angle;
use crate::core::types::{LaserScan, Point2D, Pose2D};
use crate::graph::{NoopBackend, PoseGraphBackend};
use crate::sensors::odometry::differential_drive_delta;

/// Single-slot subscriber for pose updates. Registering again replaces.
pub type PoseUpdateCallback = Box<dyn FnMut(Pose2D)>;

/// Single-slot subscriber for map (key-scan set) updates.
pub type MapUpdateCallback = Box<dyn FnMut()>;

/// Online SLAM front-end over a swappable pose-graph backend.
///
/// Tracks the robot pose in the world frame while accumulating key
/// scans. Incoming scans near an existing key scan only refine the pose
/// (scan-to-key-scan ICP); scans far from every key scan are admitted as
/// new key scans, constrained against their neighbors, and — with a
/// backend present — trigger batch optimization of all key-scan poses.
pub struct Slam<B: PoseGraphBackend = NoopBackend> {
    pose: Pose2D,
    scans: Vec<LaserScan>,
    keyscan_threshold: f64,
    factor_threshold: f64,
    backend: Option<B>,
    pose_update_callback: Option<PoseUpdateCallback>,
    map_update_callback: Option<MapUpdateCallback>,
}

impl Slam<NoopBackend> {
    /// Front-end without a backend: key scans are append-only and no
    /// loop closure is performed.
    pub fn new() -> Self {
        Self::from_backend(None)
    }
}

impl Default for Slam<NoopBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PoseGraphBackend> Slam<B> {
    /// Admission radius: observations farther than this from every key
    /// scan become key scans themselves.
    pub const DEFAULT_KEYSCAN_THRESHOLD: f64 = 0.4;

    /// Constraint radius: a new key scan is matched against every
    /// existing key scan within this translational distance.
    pub const DEFAULT_FACTOR_THRESHOLD: f64 = 0.9;

    /// Front-end driving the given pose-graph backend.
    pub fn with_backend(backend: B) -> Self {
        Self::from_backend(Some(backend))
    }

    fn from_backend(backend: Option<B>) -> Self {
        Self {
            pose: Pose2D::identity(),
            scans: Vec::new(),
            keyscan_threshold: Self::DEFAULT_KEYSCAN_THRESHOLD,
            factor_threshold: Self::DEFAULT_FACTOR_THRESHOLD,
            backend,
            pose_update_callback: None,
            map_update_callback: None,
        }
    }

    /// Current pose estimate in the world frame.
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Key scans accumulated so far, in admission order. A scan's index
    /// is its pose-graph node id.
    pub fn scans(&self) -> &[LaserScan] {
        &self.scans
    }

    /// Mutable access to the key scans (world-point accessors need it).
    pub fn scans_mut(&mut self) -> &mut [LaserScan] {
        &mut self.scans
    }

    /// Binary-factor endpoints from the backend, for visualization.
    pub fn factors(&self) -> Vec<(Point2D, Point2D)> {
        self.backend.as_ref().map(|b| b.factors()).unwrap_or_default()
    }

    /// Key-scan admission threshold.
    pub fn keyscan_threshold(&self) -> f64 {
        self.keyscan_threshold
    }

    /// Factor search radius.
    pub fn factor_threshold(&self) -> f64 {
        self.factor_threshold
    }

    /// Set the admission threshold, widening the factor radius if needed
    /// to keep `factor_threshold >= 2 * keyscan_threshold`.
    pub fn set_keyscan_threshold(&mut self, threshold: f64) {
        self.keyscan_threshold = threshold;
        if self.keyscan_threshold * 2.0 > self.factor_threshold {
            self.factor_threshold = self.keyscan_threshold * 2.0;
        }
    }

    /// Set the factor radius, tightening the admission threshold if
    /// needed to keep `factor_threshold >= 2 * keyscan_threshold`.
    pub fn set_factor_threshold(&mut self, threshold: f64) {
        self.factor_threshold = threshold;
        if self.keyscan_threshold * 2.0 > self.factor_threshold {
            self.keyscan_threshold = self.factor_threshold / 2.0;
        }
    }

    /// Register the pose-update subscriber, replacing any previous one.
    pub fn register_pose_update_callback(&mut self, callback: impl FnMut(Pose2D) + 'static) {
        self.pose_update_callback = Some(Box::new(callback));
    }

    /// Register the map-update subscriber, replacing any previous one.
    pub fn register_map_update_callback(&mut self, callback: impl FnMut() + 'static) {
        self.map_update_callback = Some(Box::new(callback));
    }

    /// Compose an externally computed delta onto the current pose.
    pub fn update_with_pose(&mut self, delta: Pose2D) {
        self.pose = self.pose.compose(&delta);
    }

    /// Integrate a differential-drive encoder increment.
    ///
    /// `left` and `right` are wheel travel distances in meters, `tread`
    /// the wheel separation.
    pub fn update_with_encoder(&mut self, left: f64, right: f64, tread: f64) {
        self.pose = self
            .pose
            .compose(&differential_drive_delta(left, right, tread));
        self.fire_pose_update();
    }

    /// Process a new observation.
    ///
    /// The scan is stamped with the current pose, matched against the
    /// closest key scan, and either used to refine the pose (tracking)
    /// or admitted as a new key scan (with factors into the backend and
    /// a batch optimization when at least two were added).
    pub fn update_with_scan(&mut self, mut scan: LaserScan) {
        scan.set_pose(self.pose);

        if self.scans.is_empty() {
            if let Some(backend) = self.backend.as_mut() {
                backend.add_prior(0, self.pose, 1.0);
            }
            self.scans.push(scan);
            log::info!("add key scan {}: {}", self.scans.len(), self.pose);
            self.fire_map_update();
            return;
        }

        let (closest, min_dist) = self.closest_key_scan(&scan);

        if min_dist < self.keyscan_threshold {
            // Track: refine the pose against the closest key scan. A
            // failed match returns the seed relative pose, which
            // composes back to the unchanged belief.
            let result = self.scans[closest].icp(&scan);
            self.pose = self.scans[closest].pose().compose(&result.relative);
        } else {
            self.admit_key_scan(scan);
        }

        self.fire_pose_update();
    }

    /// Closest key scan under the composite translation/rotation metric.
    ///
    /// Heading error is converted into translational units with the
    /// admission threshold over 3π/4 as the exchange rate, then combined
    /// with the position error by Euclidean sum.
    fn closest_key_scan(&self, scan: &LaserScan) -> (usize, f64) {
        let angular_scale = self.keyscan_threshold / (FRAC_PI_4 * 3.0);
        let mut closest = 0usize;
        let mut min_dist = f64::INFINITY;

        for (i, key) in self.scans.iter().enumerate() {
            let dpos = key.pose().position().distance(&scan.pose().position());
            let dtheta =
                normalize_angle((key.pose().theta - scan.pose().theta).abs()) * angular_scale;
            let dist = (dpos * dpos + dtheta * dtheta).sqrt();
            if dist < min_dist {
                min_dist = dist;
                closest = i;
            }
        }

        (closest, min_dist)
    }

    /// Admit `scan` as a new key scan.
    ///
    /// With a backend: match against every key scan within the factor
    /// radius, insert one relative factor per match weighted by its
    /// match ratio, optimize when two or more factors were added, then
    /// pull the optimized poses back into the stored scans; the incoming
    /// scan is appended with the backend's value for its node.
    fn admit_key_scan(&mut self, scan: LaserScan) {
        let new_id = self.scans.len();

        if let Some(backend) = self.backend.as_mut() {
            let mut constraint_count = 0usize;
            for i in 0..self.scans.len() {
                let distance = self
                    .pose
                    .position()
                    .distance(&self.scans[i].pose().position());
                if distance < self.factor_threshold {
                    constraint_count += 1;
                    let result = self.scans[i].icp(&scan);
                    backend.add_relative(i, new_id, result.relative, result.ratio);
                    if let Some(callback) = self.pose_update_callback.as_mut() {
                        callback(self.pose);
                    }
                }
            }
            if constraint_count > 1 {
                backend.optimize();
            }

            let mut pending = Some(scan);
            for (id, node_pose) in backend.nodes() {
                if id < new_id {
                    self.scans[id].set_pose(node_pose);
                } else if id == new_id {
                    if let Some(mut admitted) = pending.take() {
                        self.pose = node_pose;
                        admitted.set_pose(node_pose);
                        self.scans.push(admitted);
                    }
                }
            }
        } else {
            self.scans.push(scan);
        }

        log::info!("add key scan {}: {}", self.scans.len(), self.pose);
        self.fire_map_update();
    }

    fn fire_pose_update(&mut self) {
        let pose = self.pose;
        if let Some(callback) = self.pose_update_callback.as_mut() {
            callback(pose);
        }
    }

    fn fire_map_update(&mut self) {
        if let Some(callback) = self.map_update_callback.as_mut() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSlam;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Corridor walls at y = ±1 for x in [0, 5], ordered along each wall.
    fn corridor_world() -> Vec<Point2D> {
        let n = 51;
        let mut points = Vec::with_capacity(2 * n);
        for i in 0..n {
            points.push(Point2D::new(i as f64 * 0.1, 1.0));
        }
        for i in (0..n).rev() {
            points.push(Point2D::new(i as f64 * 0.1, -1.0));
        }
        points
    }

    /// Scan of the corridor as seen by a robot at `pose`.
    fn corridor_scan(pose: &Pose2D) -> LaserScan {
        let inv = pose.inverse();
        let points = corridor_world()
            .iter()
            .map(|p| inv.transform_point(p))
            .collect();
        LaserScan::from_points(points, Pose2D::identity())
    }

    #[test]
    fn test_bootstrap_admits_first_scan() {
        let mut slam = Slam::new();
        let map_updates = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&map_updates);
        slam.register_map_update_callback(move || *counter.borrow_mut() += 1);

        slam.update_with_scan(corridor_scan(&Pose2D::identity()));

        assert_eq!(slam.scans().len(), 1);
        assert_eq!(*map_updates.borrow(), 1);
    }

    #[test]
    fn test_tracking_keeps_single_key_scan() {
        let mut slam = Slam::new();
        slam.update_with_scan(corridor_scan(&Pose2D::identity()));

        for i in 1..5 {
            let true_pose = Pose2D::new(i as f64 * 0.05, 0.0, 0.0);
            slam.update_with_pose(Pose2D::new(0.05, 0.0, 0.0));
            slam.update_with_scan(corridor_scan(&true_pose));
        }

        assert_eq!(slam.scans().len(), 1);
        assert_relative_eq!(slam.pose().x, 0.2, epsilon = 0.02);
    }

    #[test]
    fn test_distant_scan_admitted() {
        let mut slam = Slam::new();
        slam.update_with_scan(corridor_scan(&Pose2D::identity()));

        let far = Pose2D::new(2.0 * slam.keyscan_threshold(), 0.0, 0.0);
        slam.update_with_pose(far);
        slam.update_with_scan(corridor_scan(&far));

        assert_eq!(slam.scans().len(), 2);
    }

    #[test]
    fn test_admission_with_backend_constrains_graph() {
        let mut slam = Slam::with_backend(GraphSlam::new());
        slam.update_with_scan(corridor_scan(&Pose2D::identity()));

        let far = Pose2D::new(0.8, 0.0, 0.0);
        slam.update_with_pose(far);
        slam.update_with_scan(corridor_scan(&far));

        assert_eq!(slam.scans().len(), 2);
        assert_eq!(slam.factors().len(), 1);
        assert_relative_eq!(slam.pose().x, 0.8, epsilon = 0.02);
        assert_relative_eq!(slam.scans()[1].pose().x, 0.8, epsilon = 0.02);
    }

    #[test]
    fn test_threshold_invariant_from_keyscan_side() {
        let mut slam = Slam::new();
        slam.set_keyscan_threshold(1.0);
        assert!(slam.factor_threshold() >= 2.0);
    }

    #[test]
    fn test_threshold_invariant_from_factor_side() {
        let mut slam = Slam::new();
        slam.set_factor_threshold(0.2);
        assert!(slam.keyscan_threshold() <= 0.1);
        assert_relative_eq!(slam.factor_threshold(), 0.2);
    }

    #[test]
    fn test_threshold_setters_keep_consistent_values() {
        let mut slam = Slam::new();
        slam.set_factor_threshold(3.0);
        // Already satisfied: keyscan threshold untouched.
        assert_relative_eq!(slam.keyscan_threshold(), 0.4);
        assert_relative_eq!(slam.factor_threshold(), 3.0);
    }

    #[test]
    fn test_encoder_update_moves_pose_and_fires_callback() {
        let mut slam = Slam::new();
        let poses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&poses);
        slam.register_pose_update_callback(move |p| sink.borrow_mut().push(p));

        slam.update_with_encoder(0.5, 0.5, 0.2);

        assert_relative_eq!(slam.pose().x, 0.5);
        assert_relative_eq!(slam.pose().theta, 0.0);
        assert_eq!(poses.borrow().len(), 1);
    }

    #[test]
    fn test_update_with_pose_composes_in_local_frame() {
        let mut slam = Slam::new();
        slam.update_with_pose(Pose2D::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        slam.update_with_pose(Pose2D::new(1.0, 0.0, 0.0));

        assert_relative_eq!(slam.pose().x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(slam.pose().y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_callback_replacement_is_single_slot() {
        let mut slam = Slam::new();
        let first = Rc::new(RefCell::new(0usize));
        let second = Rc::new(RefCell::new(0usize));

        let sink = Rc::clone(&first);
        slam.register_pose_update_callback(move |_| *sink.borrow_mut() += 1);
        let sink = Rc::clone(&second);
        slam.register_pose_update_callback(move |_| *sink.borrow_mut() += 1);

        slam.update_with_encoder(0.1, 0.1, 0.2);

        assert_eq!(*first.borrow(), 0);
        assert_eq!(*second.borrow(), 1);
    }
}
