//! Sensor processing: odometry conversion.

pub mod odometry;

pub use odometry::differential_drive_delta;
