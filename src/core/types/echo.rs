//! Raw range-bearing samples from a 2D laser sensor.

use super::pose::Point2D;
use serde::{Deserialize, Serialize};

/// One range-bearing-intensity sample with its capture timestamp.
///
/// Angle 0 points along the sensor's forward axis (x), positive angles
/// turn left (counterclockwise). Range is meters, timestamp nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    range: f64,
    angle: f64,
    intensity: f64,
    timestamp_ns: i64,
}

impl Echo {
    /// Create a new echo.
    #[inline]
    pub fn new(range: f64, angle: f64, intensity: f64, timestamp_ns: i64) -> Self {
        Self {
            range,
            angle,
            intensity,
            timestamp_ns,
        }
    }

    /// Range in meters.
    #[inline]
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Bearing in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Return-signal intensity (sensor-specific units).
    #[inline]
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Capture timestamp in nanoseconds.
    #[inline]
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Cartesian projection into the sensor frame.
    #[inline]
    pub fn point(&self) -> Point2D {
        Point2D::new(self.range * self.angle.cos(), self.range * self.angle.sin())
    }
}
