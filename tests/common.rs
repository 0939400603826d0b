//! Shared helpers for integration tests.

#![allow(dead_code)]

use setu_slam::{LaserScan, Point2D, Pose2D};

/// Corridor walls: two parallel lines at y = ±1 extending x ∈ [0, 5],
/// sampled every 10 cm, in world coordinates.
///
/// Points are ordered along each wall (upper wall left to right, lower
/// wall right to left) the way a sweeping sensor traces them.
pub fn corridor_world() -> Vec<Point2D> {
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

/// Rectangular room: walls of a [0, 5] × [-1, 1] box sampled every
/// 10 cm, ordered counterclockwise around the perimeter. The end walls
/// make translation observable along both axes.
pub fn room_world() -> Vec<Point2D> {
    let mut points = Vec::new();
    let mut x = 0.0;
    while x < 5.0 - 1e-9 {
        points.push(Point2D::new(x, -1.0));
        x += 0.1;
    }
    let mut y = -1.0;
    while y < 1.0 - 1e-9 {
        points.push(Point2D::new(5.0, y));
        y += 0.1;
    }
    let mut x = 5.0;
    while x > 1e-9 {
        points.push(Point2D::new(x, 1.0));
        x -= 0.1;
    }
    let mut y = 1.0;
    while y > -1.0 + 1e-9 {
        points.push(Point2D::new(0.0, y));
        y -= 0.1;
    }
    points
}

/// Scan of `world` as captured by a robot at `pose`.
///
/// The scan itself carries the identity pose; the front-end stamps it
/// with its own estimate on arrival.
pub fn scan_from(world: &[Point2D], pose: &Pose2D) -> LaserScan {
    let inv = pose.inverse();
    let points = world.iter().map(|p| inv.transform_point(p)).collect();
    LaserScan::from_points(points, Pose2D::identity())
}
